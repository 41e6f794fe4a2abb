//! Tool registry and execution capability.

pub mod executor;
pub mod registry;
