//! Tracing setup shared by Parley binaries.

pub mod tracing_setup;
