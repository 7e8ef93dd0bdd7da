//! Sleuth: cross-file find-references for JavaScript and TypeScript.
//!
//! Given a cursor position, this library determines the entity under it (a
//! local binding, a class or object property, or a module export) and
//! returns every location in the workspace that refers to the same entity.
//! Property accesses are matched through inferred receiver types, so
//! same-named members of unrelated types are not reported.

#![warn(missing_docs)]
// env_logger is used by src/main.rs (binary), not this library
#![expect(unused_crate_dependencies)]

pub mod cli;
pub mod config;
pub mod error;
pub mod graph;
pub mod infer;
pub mod ingest;
pub mod pool;
pub mod query;
pub mod resolve;
pub mod symbol;

/// Re-export common error types for convenience.
pub use error::{Result, SleuthError};

/// Re-export the query entry point for convenience.
pub use query::{Engine, QueryText};

/// Sleuth version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
