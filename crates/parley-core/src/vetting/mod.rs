//! Human-in-the-loop approval of tool calls.

pub mod coordinator;
