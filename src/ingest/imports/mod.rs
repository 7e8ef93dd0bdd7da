//! Import statement extraction from JavaScript/TypeScript syntax trees.
//!
//! Covers ES `import` declarations, `export ... from` re-exports, TypeScript
//! `import x = require()` and CommonJS `require()` calls. Each fact records
//! the module specifier and the local bindings the statement introduces.

pub mod typescript;

use crate::symbol::Location;
use std::path::Path;

/// A single import-like statement.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportFact {
    /// Module specifier as written (`./a`, `lodash`).
    pub specifier: String,

    /// Kind of import (determines how bindings relate to the module).
    pub import_kind: ImportKind,

    /// Whether this is a TypeScript `import type` statement.
    pub is_type_only: bool,

    /// Local bindings introduced by the statement.
    pub bindings: Vec<ImportBinding>,

    /// Byte span of the statement in source.
    pub byte_span: (usize, usize),
}

/// Kind of import statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    /// `import ... from 'm'`
    EsImport,

    /// `import 'm'`
    SideEffect,

    /// `require('m')` in any position
    Require,

    /// `import x = require('m')`
    TsImportRequire,

    /// `export ... from 'm'`
    ReExport,

    /// `import('m')`
    DynamicImport,
}

impl ImportKind {
    /// Convert to string for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportKind::EsImport => "EsImport",
            ImportKind::SideEffect => "SideEffect",
            ImportKind::Require => "Require",
            ImportKind::TsImportRequire => "TsImportRequire",
            ImportKind::ReExport => "ReExport",
            ImportKind::DynamicImport => "DynamicImport",
        }
    }
}

/// One local binding introduced by an import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportBinding {
    /// What the binding refers to in the imported module.
    pub imported: ImportedName,

    /// Local name in the importing file.
    pub local_name: String,

    /// Location of the local binding's declaring identifier.
    pub local: Location,
}

/// The part of a module an import binding refers to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ImportedName {
    /// `import x from 'm'`
    Default,

    /// `import * as ns from 'm'`
    Namespace,

    /// `import { a } from 'm'`, `const { a } = require('m')`
    Named(String),

    /// The module object itself: `const m = require('m')`,
    /// `import m = require('m')`.
    Module,
}

impl ImportedName {
    /// Whether member accesses on the binding reach named exports.
    pub fn is_module_object(&self) -> bool {
        matches!(self, ImportedName::Namespace | ImportedName::Module)
    }
}

/// Extract every import-like statement of a parsed file, in source order.
///
/// # Examples
///
/// ```
/// # use sleuth::ingest::parse_source;
/// # use sleuth::ingest::imports::{ImportKind, ImportedName};
/// # use std::path::Path;
/// let parsed = parse_source(Path::new("/w/b.ts"), "import { foo as bar } from './a';\n")?;
/// let import = &parsed.signature.imports[0];
/// assert_eq!(import.import_kind, ImportKind::EsImport);
/// assert_eq!(import.specifier, "./a");
/// assert_eq!(import.bindings[0].imported, ImportedName::Named("foo".to_string()));
/// assert_eq!(import.bindings[0].local_name, "bar");
/// # Ok::<(), sleuth::SleuthError>(())
/// ```
pub fn extract_imports(path: &Path, root: tree_sitter::Node, source: &[u8]) -> Vec<ImportFact> {
    let mut imports = Vec::new();
    typescript::extract_import_statements(path, root, source, &mut imports);
    imports.sort_by_key(|i| i.byte_span);
    imports
}
