//! Reference resolution.
//!
//! - [`identifier`]: lexical bindings within one file
//! - [`references`]: class and object properties, driven by inferred types
//! - [`cross_file`]: export → import bindings in dependent files
//! - [`module_resolver`]: import specifier → workspace file

pub mod cross_file;
pub mod identifier;
pub mod module_resolver;
pub mod references;

pub use cross_file::{correlate, correlate_all, ImportQuery};
pub use identifier::{resolve, resolve_in, IdentifierMatch, MatchOrigin};
pub use references::classify::{classify, Classification};
pub use references::property::scan;
pub use references::{DefinitionIdentity, PropertyAccessEvidence};
