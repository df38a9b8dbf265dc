#![forbid(unsafe_code)]
//! tabula-core: element sentinels, identifiers, configuration, and errors.
//!
//! Pure data; no threads, no I/O. The exec and frame crates build on these.

pub mod config;
pub mod error;
pub mod id;
pub mod prelude;
pub mod types;

/// Reserved pseudo-column name that addresses the row index.
pub const INDEX_NAME: &str = "INDEX";
