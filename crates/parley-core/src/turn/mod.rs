//! Turn engine: drives one user turn through memory, lore injection, the
//! model, vetting and tool execution.

pub mod engine;
pub mod prompt;
