//! Model-facing abstractions for Parley.
//!
//! - `ChatProvider`: RPITIT trait for concrete model backends
//! - `BoxChatProvider`: object-safe wrapper for dynamic dispatch
//! - `TokenCounter`: per-message token estimation

pub mod box_provider;
pub mod provider;
pub mod token_counter;
