//! ES module and CommonJS import extraction.
//!
//! The JavaScript, TypeScript and TSX grammars share node kinds for every
//! construct handled here, so one walker serves all three dialects.

use super::{ImportBinding, ImportFact, ImportKind, ImportedName};
use crate::ingest::{node_text, string_content};
use crate::symbol::Location;
use std::path::Path;

/// Walk the tree and push every import-like statement onto `imports`.
pub fn extract_import_statements(
    path: &Path,
    node: tree_sitter::Node,
    source: &[u8],
    imports: &mut Vec<ImportFact>,
) {
    match node.kind() {
        "import_statement" => {
            if let Some(import) = extract_import_statement(path, node, source) {
                imports.push(import);
            }
            return; // Don't recurse into import_statement
        }
        "export_statement" => {
            if let Some(specifier) = node
                .child_by_field_name("source")
                .and_then(|s| string_content(s, source))
            {
                imports.push(ImportFact {
                    specifier,
                    import_kind: ImportKind::ReExport,
                    is_type_only: has_type_keyword(node),
                    bindings: Vec::new(),
                    byte_span: (node.start_byte(), node.end_byte()),
                });
                return;
            }
        }
        "variable_declarator" => {
            if let Some(import) = extract_require_declarator(path, node, source) {
                imports.push(import);
                return; // Don't recurse into processed variable_declarator
            }
        }
        "call_expression" => {
            if let Some((kind, specifier)) = require_or_dynamic_import(node, source) {
                imports.push(ImportFact {
                    specifier,
                    import_kind: kind,
                    is_type_only: false,
                    bindings: Vec::new(),
                    byte_span: (node.start_byte(), node.end_byte()),
                });
                return;
            }
        }
        _ => {}
    }

    // Recursively process children
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        extract_import_statements(path, child, source, imports);
    }
}

fn extract_import_statement(
    path: &Path,
    node: tree_sitter::Node,
    source: &[u8],
) -> Option<ImportFact> {
    let is_type_only = has_type_keyword(node);
    let mut bindings = Vec::new();
    let mut specifier = node
        .child_by_field_name("source")
        .and_then(|s| string_content(s, source));
    let mut import_kind = ImportKind::EsImport;
    let mut has_clause = false;

    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "import_clause" => {
                has_clause = true;
                let mut clause_cursor = child.walk();
                for part in child.named_children(&mut clause_cursor) {
                    match part.kind() {
                        "identifier" => {
                            // Default import: `import foo from 'bar'`
                            bindings.push(binding(path, part, source, ImportedName::Default));
                        }
                        "namespace_import" => {
                            // Namespace import: `import * as foo from 'bar'`
                            let mut ns_cursor = part.walk();
                            let local = part
                                .named_children(&mut ns_cursor)
                                .find(|n| n.kind() == "identifier");
                            if let Some(local) = local {
                                bindings.push(binding(
                                    path,
                                    local,
                                    source,
                                    ImportedName::Namespace,
                                ));
                            }
                        }
                        "named_imports" => {
                            let mut named_cursor = part.walk();
                            for named in part.named_children(&mut named_cursor) {
                                if named.kind() != "import_specifier" {
                                    continue;
                                }
                                let Some(name) = named.child_by_field_name("name") else {
                                    continue;
                                };
                                let imported = module_export_name(name, source);
                                let local = named.child_by_field_name("alias").unwrap_or(name);
                                let imported = if imported == "default" {
                                    ImportedName::Default
                                } else {
                                    ImportedName::Named(imported)
                                };
                                bindings.push(binding(path, local, source, imported));
                            }
                        }
                        _ => {}
                    }
                }
            }
            "import_require_clause" => {
                // `import foo = require('bar')`
                import_kind = ImportKind::TsImportRequire;
                let mut clause_cursor = child.walk();
                let parts: Vec<_> = child.named_children(&mut clause_cursor).collect();
                if specifier.is_none() {
                    specifier = parts.iter().find_map(|p| string_content(*p, source));
                }
                if let Some(&local) = parts.iter().find(|n| n.kind() == "identifier") {
                    bindings.push(binding(path, local, source, ImportedName::Module));
                }
            }
            _ => {}
        }
    }

    let specifier = specifier?;
    // Handle side-effect imports: `import 'bar'`
    if bindings.is_empty() && import_kind == ImportKind::EsImport && !has_clause {
        import_kind = ImportKind::SideEffect;
    }

    Some(ImportFact {
        specifier,
        import_kind,
        is_type_only,
        bindings,
        byte_span: (node.start_byte(), node.end_byte()),
    })
}

/// `const x = require('m')`, `const { a, b: c } = require('m')`,
/// `const f = require('m').foo`.
fn extract_require_declarator(
    path: &Path,
    node: tree_sitter::Node,
    source: &[u8],
) -> Option<ImportFact> {
    let name = node.child_by_field_name("name")?;
    let value = node.child_by_field_name("value")?;

    let (specifier, member) = match value.kind() {
        "call_expression" => match require_or_dynamic_import(value, source)? {
            (ImportKind::Require, specifier) => (specifier, None),
            _ => return None,
        },
        "member_expression" => {
            let object = value.child_by_field_name("object")?;
            let property = value.child_by_field_name("property")?;
            match require_or_dynamic_import(object, source)? {
                (ImportKind::Require, specifier) => {
                    (specifier, Some(node_text(property, source).to_string()))
                }
                _ => return None,
            }
        }
        _ => return None,
    };

    let mut bindings = Vec::new();
    match (name.kind(), member) {
        ("identifier", Some(member)) => {
            bindings.push(binding(path, name, source, ImportedName::Named(member)));
        }
        ("identifier", None) => {
            bindings.push(binding(path, name, source, ImportedName::Module));
        }
        ("object_pattern", None) => {
            let mut cursor = name.walk();
            for property in name.named_children(&mut cursor) {
                match property.kind() {
                    "shorthand_property_identifier_pattern" => {
                        let imported = ImportedName::Named(node_text(property, source).to_string());
                        bindings.push(binding(path, property, source, imported));
                    }
                    "pair_pattern" => {
                        let key = property.child_by_field_name("key");
                        let value = property.child_by_field_name("value");
                        if let (Some(key), Some(value)) = (key, value) {
                            if value.kind() == "identifier" {
                                let imported = ImportedName::Named(property_key(key, source));
                                bindings.push(binding(path, value, source, imported));
                            }
                        }
                    }
                    "object_assignment_pattern" => {
                        if let Some(left) = property.child_by_field_name("left") {
                            if left.kind() == "shorthand_property_identifier_pattern" {
                                let imported =
                                    ImportedName::Named(node_text(left, source).to_string());
                                bindings.push(binding(path, left, source, imported));
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
        _ => {}
    }

    Some(ImportFact {
        specifier,
        import_kind: ImportKind::Require,
        is_type_only: false,
        bindings,
        byte_span: (node.start_byte(), node.end_byte()),
    })
}

/// `require('m')` or `import('m')` with a literal specifier.
fn require_or_dynamic_import(
    node: tree_sitter::Node,
    source: &[u8],
) -> Option<(ImportKind, String)> {
    if node.kind() != "call_expression" {
        return None;
    }
    let function = node.child_by_field_name("function")?;
    let kind = match (function.kind(), node_text(function, source)) {
        ("identifier", "require") => ImportKind::Require,
        ("import", _) => ImportKind::DynamicImport,
        _ => return None,
    };
    let arguments = node.child_by_field_name("arguments")?;
    let mut cursor = arguments.walk();
    let first = arguments.named_children(&mut cursor).next()?;
    let specifier = string_content(first, source)?;
    Some((kind, specifier))
}

fn binding(
    path: &Path,
    local: tree_sitter::Node,
    source: &[u8],
    imported: ImportedName,
) -> ImportBinding {
    ImportBinding {
        imported,
        local_name: node_text(local, source).to_string(),
        local: Location::from_node(path, local),
    }
}

fn module_export_name(node: tree_sitter::Node, source: &[u8]) -> String {
    string_content(node, source).unwrap_or_else(|| node_text(node, source).to_string())
}

fn property_key(node: tree_sitter::Node, source: &[u8]) -> String {
    string_content(node, source).unwrap_or_else(|| node_text(node, source).to_string())
}

/// Whether the statement carries a `type` keyword (`import type`, `export type`).
fn has_type_keyword(node: tree_sitter::Node) -> bool {
    let mut cursor = node.walk();
    let found = node
        .children(&mut cursor)
        .any(|c| !c.is_named() && c.kind() == "type");
    found
}

#[cfg(test)]
mod tests {
    use crate::ingest::imports::{ImportKind, ImportedName};
    use crate::ingest::parse_source;
    use std::path::Path;

    fn imports_of(name: &str, source: &str) -> Vec<crate::ingest::imports::ImportFact> {
        parse_source(Path::new(name), source).unwrap().signature.imports
    }

    #[test]
    fn test_extract_named_import() {
        let imports = imports_of("/w/test.ts", "import { Component } from 'react';\n");
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].import_kind, ImportKind::EsImport);
        assert_eq!(imports[0].specifier, "react");
        assert_eq!(imports[0].bindings[0].local_name, "Component");
        assert_eq!(
            imports[0].bindings[0].imported,
            ImportedName::Named("Component".to_string())
        );
    }

    #[test]
    fn test_extract_default_and_namespace_imports() {
        let imports = imports_of(
            "/w/test.js",
            "import React from 'react';\nimport * as utils from './utils';\n",
        );
        assert_eq!(imports.len(), 2);
        assert_eq!(imports[0].bindings[0].imported, ImportedName::Default);
        assert_eq!(imports[1].bindings[0].imported, ImportedName::Namespace);
        assert_eq!(imports[1].bindings[0].local_name, "utils");
    }

    #[test]
    fn test_extract_side_effect_import() {
        let imports = imports_of("/w/test.ts", "import 'polyfills';\n");
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].import_kind, ImportKind::SideEffect);
        assert!(imports[0].bindings.is_empty());
    }

    #[test]
    fn test_extract_type_only_import() {
        let imports = imports_of("/w/test.ts", "import type { User, Admin } from './types';\n");
        assert_eq!(imports.len(), 1);
        assert!(imports[0].is_type_only);
        assert_eq!(imports[0].bindings.len(), 2);
    }

    #[test]
    fn test_extract_import_with_alias_points_at_local() {
        let source = "import { Button as Btn } from './ui';\n";
        let imports = imports_of("/w/test.ts", source);
        let binding = &imports[0].bindings[0];
        assert_eq!(binding.local_name, "Btn");
        assert_eq!(&source[binding.local.byte_start..binding.local.byte_end], "Btn");
    }

    #[test]
    fn test_extract_require_forms() {
        let source = "const fs = require('fs');\nconst { a, b: c } = require('./m');\nconst f = require('./n').foo;\nrequire('./side');\n";
        let imports = imports_of("/w/test.js", source);
        assert_eq!(imports.len(), 4);
        assert!(imports.iter().all(|i| i.import_kind == ImportKind::Require));
        assert_eq!(imports[0].bindings[0].imported, ImportedName::Module);
        let names: Vec<_> = imports[1]
            .bindings
            .iter()
            .map(|b| (b.imported.clone(), b.local_name.as_str()))
            .collect();
        assert_eq!(
            names,
            vec![
                (ImportedName::Named("a".to_string()), "a"),
                (ImportedName::Named("b".to_string()), "c"),
            ]
        );
        assert_eq!(imports[2].bindings[0].imported, ImportedName::Named("foo".to_string()));
        assert!(imports[3].bindings.is_empty());
    }

    #[test]
    fn test_extract_import_equals_require() {
        let imports = imports_of("/w/test.ts", "import fs = require('fs');\n");
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].import_kind, ImportKind::TsImportRequire);
        assert_eq!(imports[0].specifier, "fs");
        assert_eq!(imports[0].bindings[0].imported, ImportedName::Module);
    }

    #[test]
    fn test_extract_reexport() {
        let imports = imports_of("/w/test.ts", "export { a } from './a';\nexport * from './b';\n");
        assert_eq!(imports.len(), 2);
        assert!(imports.iter().all(|i| i.import_kind == ImportKind::ReExport));
        assert_eq!(imports[1].specifier, "./b");
    }
}
