//! Infrastructure layer for Parley.
//!
//! Contains implementations of the repository traits defined in `parley-core`
//! (the filesystem conversation store) plus configuration loading and
//! data-directory resolution.

pub mod config;
pub mod filesystem;
