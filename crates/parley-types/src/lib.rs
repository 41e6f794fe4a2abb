//! Shared domain types for Parley.
//!
//! This crate contains the core domain types used across the conversation
//! engine: messages, tool calls, lorebooks, conversation events and metadata,
//! configuration, and their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod conversation;
pub mod error;
pub mod event;
pub mod lorebook;
pub mod message;
