//! Business logic and capability traits for Parley.
//!
//! This crate defines the "ports" (provider, executor, repository traits)
//! that the infrastructure layer implements, plus the engine components built
//! on them. It depends only on `parley-types` -- never on `parley-infra` or
//! any filesystem crate.

pub mod conversation;
pub mod llm;
pub mod lorebook;
pub mod memory;
pub mod tool;
pub mod turn;
pub mod vetting;
