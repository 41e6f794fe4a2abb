//! Conversation event log: persistence port, in-memory adapter, and the
//! service that keeps observers in sync with durable state.

pub mod log;
pub mod memory_repository;
pub mod repository;
