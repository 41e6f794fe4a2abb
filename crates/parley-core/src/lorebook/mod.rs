//! Lorebook entry selection and placement.
//!
//! - `matcher`: per-entry key matching against the scan context
//! - `selector`: scan, order and budget-trim the matching entries
//! - `placement`: split the selection around the character definition
//! - `tags`: `{{char}}` / `{{user}}` substitution helper

pub mod matcher;
pub mod placement;
pub mod selector;
pub mod tags;
