//! Export table extraction.
//!
//! Records what a module exports and which local binding (if any) each export
//! refers to. ES exports and CommonJS `module.exports` / `exports.x`
//! assignments are both covered; only top-level statements export.

use crate::ingest::{node_text, string_content};
use crate::symbol::Location;
use std::path::Path;

/// Name under which a value is exported.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExportName {
    /// The default export (`export default`, `module.exports =`).
    Default,
    /// A named export.
    Named(String),
}

impl ExportName {
    /// Display form (`default` for the default export).
    pub fn as_str(&self) -> &str {
        match self {
            ExportName::Default => "default",
            ExportName::Named(name) => name,
        }
    }
}

/// Syntactic form of an export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportKind {
    /// `export const x = ...`, `export function f() {}`
    Declaration,
    /// `export { a as b }`
    Specifier,
    /// `export default <declaration or expression>`
    Default,
    /// `export { a } from 'm'`, `export * as ns from 'm'`
    Reexport {
        /// Module specifier.
        specifier: String,
        /// Name in the source module; `None` for a namespace re-export.
        imported: Option<String>,
    },
    /// `module.exports = X`, `export = X`
    CommonJsModule,
    /// `exports.x = X`, `module.exports.x = X`, keys of `module.exports = {..}`
    CommonJsProperty,
}

/// One entry of a module's export table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportEntry {
    /// Exported name.
    pub name: ExportName,
    /// Syntactic form.
    pub kind: ExportKind,
    /// Token naming the export (declared identifier, alias, `default`
    /// keyword or property name).
    pub token: Location,
    /// Identifier occurrence of the local binding being exported, when the
    /// export refers to one.
    pub local: Option<Location>,
    /// Span of the exported expression, when the export has one.
    pub value: Option<Location>,
}

/// Build the export table and the export pseudo-uses of a file.
///
/// Pseudo-uses are tokens that name an export without being identifier
/// occurrences: `exports.foo`, `module.exports.foo`, `export { a as foo }`
/// aliases and keys of an exported object literal.
pub fn extract_exports(
    path: &Path,
    root: tree_sitter::Node,
    source: &[u8],
) -> (Vec<ExportEntry>, Vec<(String, Location)>) {
    let mut extractor = Extractor {
        path,
        source,
        exports: Vec::new(),
        pseudo_uses: Vec::new(),
    };

    let mut cursor = root.walk();
    let statements: Vec<_> = root.named_children(&mut cursor).collect();
    for statement in statements {
        match statement.kind() {
            "export_statement" => extractor.export_statement(statement),
            "expression_statement" => {
                if let Some(expression) = statement.named_child(0) {
                    extractor.commonjs_assignment(expression);
                }
            }
            _ => {}
        }
    }
    extractor.collect_member_pseudo_uses(root);

    let Extractor {
        exports,
        mut pseudo_uses,
        ..
    } = extractor;
    pseudo_uses.sort_by(|a, b| a.1.cmp(&b.1));
    pseudo_uses.dedup_by(|a, b| a.1 == b.1);
    (exports, pseudo_uses)
}

struct Extractor<'a> {
    path: &'a Path,
    source: &'a [u8],
    exports: Vec<ExportEntry>,
    pseudo_uses: Vec<(String, Location)>,
}

impl<'a> Extractor<'a> {
    fn location(&self, node: tree_sitter::Node) -> Location {
        Location::from_node(self.path, node)
    }

    fn push(
        &mut self,
        name: ExportName,
        kind: ExportKind,
        token: tree_sitter::Node,
        local: Option<tree_sitter::Node>,
        value: Option<tree_sitter::Node>,
    ) {
        let entry = ExportEntry {
            name,
            kind,
            token: self.location(token),
            local: local.map(|n| self.location(n)),
            value: value.map(|n| self.location(n)),
        };
        self.exports.push(entry);
    }

    fn export_statement(&mut self, node: tree_sitter::Node) {
        let source_specifier = node
            .child_by_field_name("source")
            .and_then(|s| string_content(s, self.source));
        let is_default = {
            let mut cursor = node.walk();
            let found = node
                .children(&mut cursor)
                .any(|c| !c.is_named() && c.kind() == "default");
            found
        };

        if let Some(declaration) = node.child_by_field_name("declaration") {
            if is_default {
                let name = declaration.child_by_field_name("name");
                let token = name.or_else(|| default_keyword(node)).unwrap_or(declaration);
                self.push(ExportName::Default, ExportKind::Default, token, name, Some(declaration));
            } else {
                self.exported_declaration(declaration);
            }
            return;
        }

        if let Some(value) = node.child_by_field_name("value") {
            let token = default_keyword(node).unwrap_or(value);
            let local = local_reference(value);
            self.push(ExportName::Default, ExportKind::Default, token, local, Some(value));
            return;
        }

        let mut cursor = node.walk();
        let children: Vec<_> = node.named_children(&mut cursor).collect();
        for child in children {
            match child.kind() {
                "export_clause" => self.export_clause(child, source_specifier.as_deref()),
                "namespace_export" => {
                    let Some(specifier) = source_specifier.clone() else {
                        continue;
                    };
                    let mut ns_cursor = child.walk();
                    let alias = child.named_children(&mut ns_cursor).next();
                    if let Some(alias) = alias {
                        let name = self.export_name(alias);
                        self.pseudo_uses.push((name.as_str().to_string(), self.location(alias)));
                        let kind = ExportKind::Reexport {
                            specifier,
                            imported: None,
                        };
                        self.push(name, kind, alias, None, None);
                    }
                }
                // TypeScript `export = X`
                kind if source_specifier.is_none() && is_expression_kind(kind) => {
                    let local = local_reference(child);
                    self.push(
                        ExportName::Default,
                        ExportKind::CommonJsModule,
                        child,
                        local,
                        Some(child),
                    );
                }
                _ => {}
            }
        }
    }

    fn exported_declaration(&mut self, declaration: tree_sitter::Node) {
        match declaration.kind() {
            "lexical_declaration" | "variable_declaration" => {
                let mut cursor = declaration.walk();
                let declarators: Vec<_> = declaration.named_children(&mut cursor).collect();
                for declarator in declarators {
                    if declarator.kind() != "variable_declarator" {
                        continue;
                    }
                    let Some(pattern) = declarator.child_by_field_name("name") else {
                        continue;
                    };
                    // Only a plain identifier receives the whole initializer.
                    let value = declarator
                        .child_by_field_name("value")
                        .filter(|_| pattern.kind() == "identifier");
                    let mut names = Vec::new();
                    pattern_identifiers(pattern, &mut names);
                    for name in names {
                        let export = ExportName::Named(node_text(name, self.source).to_string());
                        self.push(export, ExportKind::Declaration, name, Some(name), value);
                    }
                }
            }
            _ => {
                if let Some(name) = declaration.child_by_field_name("name") {
                    let export = ExportName::Named(node_text(name, self.source).to_string());
                    self.push(export, ExportKind::Declaration, name, Some(name), Some(declaration));
                }
            }
        }
    }

    fn export_clause(&mut self, clause: tree_sitter::Node, specifier: Option<&str>) {
        let mut cursor = clause.walk();
        let specifiers: Vec<_> = clause.named_children(&mut cursor).collect();
        for export in specifiers {
            if export.kind() != "export_specifier" {
                continue;
            }
            let Some(name) = export.child_by_field_name("name") else {
                continue;
            };
            let alias = export.child_by_field_name("alias");
            let token = alias.unwrap_or(name);
            let exported = self.export_name(token);
            if let Some(alias) = alias {
                self.pseudo_uses
                    .push((exported.as_str().to_string(), self.location(alias)));
            }
            match specifier {
                Some(specifier) => {
                    if alias.is_none() {
                        self.pseudo_uses
                            .push((exported.as_str().to_string(), self.location(name)));
                    }
                    let kind = ExportKind::Reexport {
                        specifier: specifier.to_string(),
                        imported: Some(self.export_name(name).as_str().to_string()),
                    };
                    self.push(exported, kind, token, None, None);
                }
                None => {
                    let local = (name.kind() == "identifier").then_some(name);
                    self.push(exported, ExportKind::Specifier, token, local, local);
                }
            }
        }
    }

    fn export_name(&self, node: tree_sitter::Node) -> ExportName {
        let text = string_content(node, self.source)
            .unwrap_or_else(|| node_text(node, self.source).to_string());
        if text == "default" {
            ExportName::Default
        } else {
            ExportName::Named(text)
        }
    }

    /// `module.exports = X`, `exports.x = X`, `module.exports.x = X`.
    fn commonjs_assignment(&mut self, expression: tree_sitter::Node) {
        if expression.kind() != "assignment_expression" {
            return;
        }
        let (Some(left), Some(right)) = (
            expression.child_by_field_name("left"),
            expression.child_by_field_name("right"),
        ) else {
            return;
        };
        if left.kind() != "member_expression" {
            return;
        }

        if is_module_exports(left, self.source) {
            self.push(
                ExportName::Default,
                ExportKind::CommonJsModule,
                left,
                local_reference(right),
                Some(right),
            );
            if right.kind() == "object" {
                self.exported_object(right);
            }
            return;
        }

        let (Some(object), Some(property)) = (
            left.child_by_field_name("object"),
            left.child_by_field_name("property"),
        ) else {
            return;
        };
        if is_exports_object(object, self.source) {
            let name = ExportName::Named(node_text(property, self.source).to_string());
            self.push(
                name,
                ExportKind::CommonJsProperty,
                property,
                local_reference(right),
                Some(right),
            );
        }
    }

    fn exported_object(&mut self, object: tree_sitter::Node) {
        let mut cursor = object.walk();
        let members: Vec<_> = object.named_children(&mut cursor).collect();
        for member in members {
            match member.kind() {
                "pair" => {
                    let (Some(key), Some(value)) = (
                        member.child_by_field_name("key"),
                        member.child_by_field_name("value"),
                    ) else {
                        continue;
                    };
                    if key.kind() == "computed_property_name" {
                        continue;
                    }
                    let name = self.export_name(key);
                    self.pseudo_uses
                        .push((name.as_str().to_string(), self.location(key)));
                    self.push(
                        name,
                        ExportKind::CommonJsProperty,
                        key,
                        local_reference(value),
                        Some(value),
                    );
                }
                "shorthand_property_identifier" => {
                    let name = ExportName::Named(node_text(member, self.source).to_string());
                    self.push(
                        name,
                        ExportKind::CommonJsProperty,
                        member,
                        Some(member),
                        Some(member),
                    );
                }
                "method_definition" => {
                    if let Some(key) = member.child_by_field_name("name") {
                        let name = self.export_name(key);
                        self.pseudo_uses
                            .push((name.as_str().to_string(), self.location(key)));
                        self.push(name, ExportKind::CommonJsProperty, key, None, Some(member));
                    }
                }
                _ => {}
            }
        }
    }

    /// Every `exports.x` / `module.exports.x` property token in the file.
    fn collect_member_pseudo_uses(&mut self, node: tree_sitter::Node) {
        if node.kind() == "member_expression" {
            if let (Some(object), Some(property)) = (
                node.child_by_field_name("object"),
                node.child_by_field_name("property"),
            ) {
                if is_exports_object(object, self.source)
                    && property.kind() == "property_identifier"
                {
                    let name = node_text(property, self.source).to_string();
                    self.pseudo_uses.push((name, self.location(property)));
                }
            }
        }
        let mut cursor = node.walk();
        let children: Vec<_> = node.named_children(&mut cursor).collect();
        for child in children {
            self.collect_member_pseudo_uses(child);
        }
    }
}

/// `exports` or `module.exports`.
fn is_exports_object(node: tree_sitter::Node, source: &[u8]) -> bool {
    match node.kind() {
        "identifier" => node_text(node, source) == "exports",
        "member_expression" => is_module_exports(node, source),
        _ => false,
    }
}

/// `module.exports`.
fn is_module_exports(node: tree_sitter::Node, source: &[u8]) -> bool {
    let (Some(object), Some(property)) = (
        node.child_by_field_name("object"),
        node.child_by_field_name("property"),
    ) else {
        return false;
    };
    object.kind() == "identifier"
        && node_text(object, source) == "module"
        && node_text(property, source) == "exports"
}

fn default_keyword(node: tree_sitter::Node) -> Option<tree_sitter::Node> {
    let mut cursor = node.walk();
    let found = node
        .children(&mut cursor)
        .find(|c| !c.is_named() && c.kind() == "default");
    found
}

/// The identifier an exported expression refers to, unwrapping parentheses.
/// Named function and class expressions refer to their own name.
fn local_reference(node: tree_sitter::Node) -> Option<tree_sitter::Node> {
    match node.kind() {
        "identifier" => Some(node),
        "function_expression" | "function" | "generator_function" | "class" => {
            node.child_by_field_name("name")
        }
        "parenthesized_expression" => node.named_child(0).and_then(local_reference),
        _ => None,
    }
}

fn pattern_identifiers<'t>(node: tree_sitter::Node<'t>, out: &mut Vec<tree_sitter::Node<'t>>) {
    match node.kind() {
        "identifier" | "shorthand_property_identifier_pattern" => out.push(node),
        "pair_pattern" => {
            if let Some(value) = node.child_by_field_name("value") {
                pattern_identifiers(value, out);
            }
        }
        "assignment_pattern" | "object_assignment_pattern" => {
            if let Some(left) = node.child_by_field_name("left") {
                pattern_identifiers(left, out);
            }
        }
        "object_pattern" | "array_pattern" | "rest_pattern" => {
            let mut cursor = node.walk();
            let children: Vec<_> = node.named_children(&mut cursor).collect();
            for child in children {
                pattern_identifiers(child, out);
            }
        }
        _ => {}
    }
}

fn is_expression_kind(kind: &str) -> bool {
    !matches!(
        kind,
        "export_clause" | "namespace_export" | "decorator" | "comment" | "string"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::parse_source;

    fn table(name: &str, source: &str) -> (Vec<ExportEntry>, Vec<(String, Location)>) {
        let parsed = parse_source(Path::new(name), source).unwrap();
        (parsed.signature.exports, parsed.signature.pseudo_uses)
    }

    fn names(exports: &[ExportEntry]) -> Vec<&str> {
        exports.iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn test_es_declarations() {
        let (exports, _) = table(
            "/w/a.ts",
            "export const x = 1, { y } = o;\nexport function f() {}\nexport class C {}\nexport interface I {}\n",
        );
        assert_eq!(names(&exports), vec!["x", "y", "f", "C", "I"]);
        assert!(exports.iter().all(|e| e.kind == ExportKind::Declaration));
        assert!(exports.iter().all(|e| e.local.as_ref() == Some(&e.token)));
    }

    #[test]
    fn test_default_exports() {
        let (exports, _) = table("/w/a.js", "const a = 1;\nexport default a;\n");
        assert_eq!(exports.len(), 1);
        assert_eq!(exports[0].name, ExportName::Default);
        assert_eq!(exports[0].local.as_ref().map(|l| l.line), Some(2));

        let (exports, _) = table("/w/b.js", "export default function run() {}\n");
        assert_eq!(exports[0].name, ExportName::Default);
        assert!(exports[0].local.is_some());

        let (exports, _) = table("/w/c.js", "export default { a: 1 };\n");
        assert_eq!(exports[0].name, ExportName::Default);
        assert!(exports[0].local.is_none());
        assert!(exports[0].value.is_some());
    }

    #[test]
    fn test_specifier_alias_is_pseudo_use() {
        let source = "const a = 1;\nexport { a as b };\n";
        let (exports, pseudo_uses) = table("/w/a.ts", source);
        assert_eq!(names(&exports), vec!["b"]);
        assert_eq!(exports[0].kind, ExportKind::Specifier);
        let local = exports[0].local.as_ref().unwrap();
        assert_eq!(&source[local.byte_start..local.byte_end], "a");
        assert_eq!(pseudo_uses.len(), 1);
        assert_eq!(pseudo_uses[0].0, "b");
    }

    #[test]
    fn test_commonjs_exports() {
        let source = "function f() {}\nexports.run = f;\nmodule.exports.stop = 1;\nexports.run();\n";
        let (exports, pseudo_uses) = table("/w/a.js", source);
        assert_eq!(names(&exports), vec!["run", "stop"]);
        assert!(exports.iter().all(|e| e.kind == ExportKind::CommonJsProperty));
        assert!(exports[0].local.is_some());
        let used: Vec<_> = pseudo_uses.iter().map(|(n, l)| (n.as_str(), l.line)).collect();
        assert_eq!(used, vec![("run", 2), ("stop", 3), ("run", 4)]);
    }

    #[test]
    fn test_module_exports_object() {
        let source = "const a = 1;\nmodule.exports = { a, b: a, c() {} };\n";
        let (exports, _) = table("/w/a.js", source);
        assert_eq!(names(&exports), vec!["default", "a", "b", "c"]);
        assert_eq!(exports[0].kind, ExportKind::CommonJsModule);
    }

    #[test]
    fn test_reexports_have_no_local() {
        let (exports, _) = table(
            "/w/a.ts",
            "export { a as b } from './m';\nexport * as ns from './n';\n",
        );
        assert_eq!(names(&exports), vec!["b", "ns"]);
        assert!(exports.iter().all(|e| e.local.is_none()));
        assert_eq!(
            exports[0].kind,
            ExportKind::Reexport {
                specifier: "./m".to_string(),
                imported: Some("a".to_string())
            }
        );
    }

    #[test]
    fn test_nested_assignments_do_not_export() {
        let (exports, _) = table("/w/a.js", "function f() { exports.x = 1; }\n");
        assert!(exports.is_empty());
    }
}
