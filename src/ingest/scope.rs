//! Lexical scope analysis.
//!
//! Builds a tree of scopes over a JavaScript/TypeScript syntax tree and
//! resolves every identifier occurrence to a binding.
//!
//! # Rules
//! - `var` declarations and parameters bind in the nearest function scope.
//! - `let`, `const`, `class`, function declarations, imports and TypeScript
//!   type declarations bind in the current block scope.
//! - A binding is visible in its whole scope (hoisting and the temporal dead
//!   zone are not distinguished).
//! - Names that resolve nowhere share one implicit global binding per name.

use crate::ingest::node_text;
use crate::symbol::{Cursor, Location};
use std::collections::HashMap;
use std::path::Path;

/// Index of a scope in a [`ScopeTree`].
pub type ScopeId = usize;

/// Index of a binding in a [`ScopeTree`].
pub type BindingId = usize;

/// Kind of lexical scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// The module itself.
    Program,
    /// Function, method or arrow function body (var target).
    Function,
    /// Block, loop head or class body.
    Block,
    /// Catch clause.
    Catch,
}

/// How a binding was introduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    /// `var`
    Var,
    /// `let`
    Let,
    /// `const`
    Const,
    /// Function or arrow parameter.
    Parameter,
    /// Function declaration or named function expression.
    Function,
    /// Class declaration or named class expression.
    Class,
    /// Import or `import x = require()` local.
    Import,
    /// TypeScript interface, type alias, enum or type parameter.
    Type,
    /// Catch clause parameter.
    CatchParameter,
    /// Unresolved name (global).
    Global,
}

/// A lexical scope.
#[derive(Debug, Clone)]
pub struct Scope {
    /// Enclosing scope.
    pub parent: Option<ScopeId>,
    /// Kind of scope.
    pub kind: ScopeKind,
    /// Start byte offset.
    pub byte_start: usize,
    /// End byte offset.
    pub byte_end: usize,
    names: HashMap<String, BindingId>,
}

/// A named binding.
#[derive(Debug, Clone)]
pub struct Binding {
    /// Binding name.
    pub name: String,
    /// How the binding was introduced.
    pub kind: BindingKind,
    /// Declaring scope (`None` for globals).
    pub scope: Option<ScopeId>,
    /// First declaration site (`None` for globals).
    pub declaration: Option<Location>,
}

/// One identifier token resolved to a binding.
#[derive(Debug, Clone)]
pub struct Occurrence {
    /// Token location.
    pub location: Location,
    /// Binding the token refers to.
    pub binding: BindingId,
    /// Whether the token declares the binding.
    pub is_declaration: bool,
}

/// Scopes, bindings and occurrences of one file.
#[derive(Debug, Clone, Default)]
pub struct ScopeTree {
    scopes: Vec<Scope>,
    bindings: Vec<Binding>,
    occurrences: Vec<Occurrence>,
    by_span: HashMap<(usize, usize), usize>,
}

impl ScopeTree {
    /// Analyse a syntax tree.
    pub fn build(path: &Path, root: tree_sitter::Node, source: &[u8]) -> Self {
        let mut builder = Builder {
            path,
            source,
            tree: ScopeTree::default(),
            pending: Vec::new(),
            globals: HashMap::new(),
        };
        let program = builder.push_scope(None, ScopeKind::Program, root);
        builder.visit_children(root, program);
        builder.finish()
    }

    /// All bindings.
    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    /// A binding by id.
    pub fn binding(&self, id: BindingId) -> &Binding {
        &self.bindings[id]
    }

    /// All scopes.
    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }

    /// All occurrences, sorted by location.
    pub fn occurrences(&self) -> &[Occurrence] {
        &self.occurrences
    }

    /// Occurrences whose span covers the cursor.
    pub fn occurrences_at(&self, cursor: &Cursor) -> Vec<&Occurrence> {
        self.occurrences
            .iter()
            .filter(|o| o.location.contains(cursor))
            .collect()
    }

    /// The occurrence spanning exactly `[byte_start, byte_end)`.
    pub fn occurrence_at_span(&self, byte_start: usize, byte_end: usize) -> Option<&Occurrence> {
        self.by_span
            .get(&(byte_start, byte_end))
            .map(|&i| &self.occurrences[i])
    }

    /// Binding of the identifier node spanning exactly this node, if any.
    pub fn binding_of_node(&self, node: tree_sitter::Node) -> Option<BindingId> {
        self.occurrence_at_span(node.start_byte(), node.end_byte())
            .map(|o| o.binding)
    }

    /// Every occurrence of a binding, declaration included, sorted.
    pub fn uses_of(&self, binding: BindingId) -> Vec<Location> {
        self.occurrences
            .iter()
            .filter(|o| o.binding == binding)
            .map(|o| o.location.clone())
            .collect()
    }

    /// Binding visible under `name` from the program scope.
    pub fn top_level(&self, name: &str) -> Option<BindingId> {
        self.scopes.first().and_then(|s| s.names.get(name).copied())
    }
}

struct Pending {
    name: String,
    location: Location,
    scope: ScopeId,
}

struct Builder<'a> {
    path: &'a Path,
    source: &'a [u8],
    tree: ScopeTree,
    pending: Vec<Pending>,
    globals: HashMap<String, BindingId>,
}

impl<'a> Builder<'a> {
    fn push_scope(
        &mut self,
        parent: Option<ScopeId>,
        kind: ScopeKind,
        node: tree_sitter::Node,
    ) -> ScopeId {
        let id = self.tree.scopes.len();
        self.tree.scopes.push(Scope {
            parent,
            kind,
            byte_start: node.start_byte(),
            byte_end: node.end_byte(),
            names: HashMap::new(),
        });
        id
    }

    fn function_scope_of(&self, mut scope: ScopeId) -> ScopeId {
        loop {
            let s = &self.tree.scopes[scope];
            match (s.kind, s.parent) {
                (ScopeKind::Function | ScopeKind::Program, _) | (_, None) => return scope,
                (_, Some(parent)) => scope = parent,
            }
        }
    }

    fn declare(&mut self, node: tree_sitter::Node, kind: BindingKind, scope: ScopeId) {
        let name = node_text(node, self.source).to_string();
        if name.is_empty() {
            return;
        }
        let target = if kind == BindingKind::Var {
            self.function_scope_of(scope)
        } else {
            scope
        };
        let location = Location::from_node(self.path, node);
        let binding = match self.tree.scopes[target].names.get(&name) {
            Some(&existing) => existing,
            None => {
                let id = self.tree.bindings.len();
                self.tree.bindings.push(Binding {
                    name: name.clone(),
                    kind,
                    scope: Some(target),
                    declaration: Some(location.clone()),
                });
                self.tree.scopes[target].names.insert(name, id);
                id
            }
        };
        self.tree.occurrences.push(Occurrence {
            location,
            binding,
            is_declaration: true,
        });
    }

    fn reference(&mut self, node: tree_sitter::Node, scope: ScopeId) {
        let name = node_text(node, self.source).to_string();
        if name.is_empty() {
            return;
        }
        self.pending.push(Pending {
            name,
            location: Location::from_node(self.path, node),
            scope,
        });
    }

    fn visit_children(&mut self, node: tree_sitter::Node, scope: ScopeId) {
        let mut cursor = node.walk();
        let children: Vec<_> = node.named_children(&mut cursor).collect();
        for child in children {
            self.visit(child, scope);
        }
    }

    fn visit_field(&mut self, node: tree_sitter::Node, field: &str, scope: ScopeId) {
        if let Some(child) = node.child_by_field_name(field) {
            self.visit(child, scope);
        }
    }

    fn visit(&mut self, node: tree_sitter::Node, scope: ScopeId) {
        match node.kind() {
            "identifier"
            | "shorthand_property_identifier"
            | "shorthand_property_identifier_pattern" => {
                self.reference(node, scope);
            }
            "type_identifier" => self.reference(node, scope),

            "lexical_declaration" | "variable_declaration" => {
                let kind = declaration_kind(node, self.source);
                let mut cursor = node.walk();
                let declarators: Vec<_> = node.named_children(&mut cursor).collect();
                for declarator in declarators {
                    if declarator.kind() != "variable_declarator" {
                        continue;
                    }
                    if let Some(name) = declarator.child_by_field_name("name") {
                        self.declare_pattern(name, kind, scope);
                    }
                    self.visit_field(declarator, "type", scope);
                    self.visit_field(declarator, "value", scope);
                }
            }

            "function_declaration" | "generator_function_declaration" => {
                if let Some(name) = node.child_by_field_name("name") {
                    self.declare(name, BindingKind::Function, scope);
                }
                self.visit_function(node, scope);
            }
            "function_signature" => {
                if let Some(name) = node.child_by_field_name("name") {
                    self.declare(name, BindingKind::Function, scope);
                }
                self.visit_function(node, scope);
            }
            "function_expression" | "function" | "generator_function" => {
                let inner = self.push_scope(Some(scope), ScopeKind::Function, node);
                if let Some(name) = node.child_by_field_name("name") {
                    let target = if is_default_export(node) { scope } else { inner };
                    self.declare(name, BindingKind::Function, target);
                }
                self.visit_function_in(node, inner);
            }
            "arrow_function"
            | "method_definition"
            | "method_signature"
            | "abstract_method_signature" => {
                if let Some(name) = node.child_by_field_name("name") {
                    if name.kind() == "computed_property_name" {
                        self.visit(name, scope);
                    }
                }
                self.visit_function(node, scope);
            }

            "class_declaration" | "abstract_class_declaration" | "class" => {
                let is_expression = node.kind() == "class";
                let inner = self.push_scope(Some(scope), ScopeKind::Block, node);
                if let Some(name) = node.child_by_field_name("name") {
                    let target = if is_expression && !is_default_export(node) {
                        inner
                    } else {
                        scope
                    };
                    self.declare(name, BindingKind::Class, target);
                }
                let mut cursor = node.walk();
                let children: Vec<_> = node.named_children(&mut cursor).collect();
                for child in children {
                    if Some(child) == node.child_by_field_name("name") {
                        continue;
                    }
                    self.visit(child, inner);
                }
            }
            "public_field_definition" | "field_definition" | "property_signature" => {
                for field in ["name", "property"] {
                    if let Some(name) = node.child_by_field_name(field) {
                        if name.kind() == "computed_property_name" {
                            self.visit(name, scope);
                        }
                    }
                }
                self.visit_field(node, "type", scope);
                self.visit_field(node, "value", scope);
            }

            "interface_declaration" | "type_alias_declaration" => {
                if let Some(name) = node.child_by_field_name("name") {
                    self.declare(name, BindingKind::Type, scope);
                }
                let inner = self.push_scope(Some(scope), ScopeKind::Block, node);
                let mut cursor = node.walk();
                let children: Vec<_> = node.named_children(&mut cursor).collect();
                for child in children {
                    if Some(child) == node.child_by_field_name("name") {
                        continue;
                    }
                    self.visit(child, inner);
                }
            }
            "enum_declaration" => {
                if let Some(name) = node.child_by_field_name("name") {
                    self.declare(name, BindingKind::Type, scope);
                }
            }
            "type_parameter" => {
                if let Some(name) = node.child_by_field_name("name") {
                    self.declare(name, BindingKind::Type, scope);
                }
                self.visit_field(node, "constraint", scope);
                self.visit_field(node, "value", scope);
            }

            "statement_block" => {
                let inner = self.push_scope(Some(scope), ScopeKind::Block, node);
                self.visit_children(node, inner);
            }
            "for_statement" => {
                let inner = self.push_scope(Some(scope), ScopeKind::Block, node);
                self.visit_children(node, inner);
            }
            "for_in_statement" => {
                let inner = self.push_scope(Some(scope), ScopeKind::Block, node);
                let declared = node
                    .child_by_field_name("kind")
                    .map(|k| match node_text(k, self.source) {
                        "var" => BindingKind::Var,
                        "let" => BindingKind::Let,
                        _ => BindingKind::Const,
                    });
                if let Some(left) = node.child_by_field_name("left") {
                    match declared {
                        Some(kind) => self.declare_pattern(left, kind, inner),
                        None => self.visit(left, inner),
                    }
                }
                self.visit_field(node, "right", inner);
                self.visit_field(node, "body", inner);
            }
            "catch_clause" => {
                let inner = self.push_scope(Some(scope), ScopeKind::Catch, node);
                if let Some(parameter) = node.child_by_field_name("parameter") {
                    self.declare_pattern(parameter, BindingKind::CatchParameter, inner);
                }
                if let Some(body) = node.child_by_field_name("body") {
                    self.visit_children(body, inner);
                }
            }

            "import_statement" => self.visit_import(node, scope),
            "export_statement" => {
                if node.child_by_field_name("source").is_some() {
                    // Re-exports name bindings of another module.
                    return;
                }
                let mut cursor = node.walk();
                let children: Vec<_> = node.named_children(&mut cursor).collect();
                for child in children {
                    if child.kind() == "export_clause" {
                        let mut inner_cursor = child.walk();
                        let specifiers: Vec<_> = child.named_children(&mut inner_cursor).collect();
                        for specifier in specifiers {
                            if let Some(name) = specifier.child_by_field_name("name") {
                                if name.kind() == "identifier" {
                                    self.reference(name, scope);
                                }
                            }
                        }
                    } else {
                        self.visit(child, scope);
                    }
                }
            }

            // Property names, labels and literals never name a binding.
            "property_identifier" | "private_property_identifier" | "statement_identifier"
            | "string" | "template_string" | "regex" | "number" | "comment" => {}

            _ => self.visit_children(node, scope),
        }
    }

    fn visit_function(&mut self, node: tree_sitter::Node, scope: ScopeId) {
        let inner = self.push_scope(Some(scope), ScopeKind::Function, node);
        self.visit_function_in(node, inner);
    }

    fn visit_function_in(&mut self, node: tree_sitter::Node, inner: ScopeId) {
        self.visit_field(node, "type_parameters", inner);
        if let Some(parameter) = node.child_by_field_name("parameter") {
            self.declare_pattern(parameter, BindingKind::Parameter, inner);
        }
        if let Some(parameters) = node.child_by_field_name("parameters") {
            let mut cursor = parameters.walk();
            let params: Vec<_> = parameters.named_children(&mut cursor).collect();
            for param in params {
                self.declare_pattern(param, BindingKind::Parameter, inner);
            }
        }
        self.visit_field(node, "return_type", inner);
        if let Some(body) = node.child_by_field_name("body") {
            if body.kind() == "statement_block" {
                self.visit_children(body, inner);
            } else {
                self.visit(body, inner);
            }
        }
    }

    fn declare_pattern(&mut self, node: tree_sitter::Node, kind: BindingKind, scope: ScopeId) {
        match node.kind() {
            "identifier" | "shorthand_property_identifier_pattern" => {
                self.declare(node, kind, scope)
            }
            "object_pattern" | "array_pattern" => {
                let mut cursor = node.walk();
                let children: Vec<_> = node.named_children(&mut cursor).collect();
                for child in children {
                    self.declare_pattern(child, kind, scope);
                }
            }
            "pair_pattern" => {
                if let Some(key) = node.child_by_field_name("key") {
                    if key.kind() == "computed_property_name" {
                        self.visit(key, scope);
                    }
                }
                if let Some(value) = node.child_by_field_name("value") {
                    self.declare_pattern(value, kind, scope);
                }
            }
            "assignment_pattern" | "object_assignment_pattern" => {
                if let Some(left) = node.child_by_field_name("left") {
                    self.declare_pattern(left, kind, scope);
                }
                self.visit_field(node, "right", scope);
            }
            "rest_pattern" => {
                let mut cursor = node.walk();
                let children: Vec<_> = node.named_children(&mut cursor).collect();
                for child in children {
                    self.declare_pattern(child, kind, scope);
                }
            }
            "required_parameter" | "optional_parameter" => {
                if let Some(pattern) = node.child_by_field_name("pattern") {
                    self.declare_pattern(pattern, kind, scope);
                }
                self.visit_field(node, "type", scope);
                self.visit_field(node, "value", scope);
            }
            "this" | "comment" | "accessibility_modifier" | "decorator" => {}
            _ => self.visit(node, scope),
        }
    }

    fn visit_import(&mut self, node: tree_sitter::Node, scope: ScopeId) {
        let mut cursor = node.walk();
        let children: Vec<_> = node.named_children(&mut cursor).collect();
        for child in children {
            match child.kind() {
                "import_clause" => {
                    let mut clause_cursor = child.walk();
                    let parts: Vec<_> = child.named_children(&mut clause_cursor).collect();
                    for part in parts {
                        match part.kind() {
                            "identifier" => self.declare(part, BindingKind::Import, scope),
                            "namespace_import" => {
                                let mut ns_cursor = part.walk();
                                let names: Vec<_> = part.named_children(&mut ns_cursor).collect();
                                for name in names.into_iter().filter(|n| n.kind() == "identifier") {
                                    self.declare(name, BindingKind::Import, scope);
                                }
                            }
                            "named_imports" => {
                                let mut named_cursor = part.walk();
                                let specifiers: Vec<_> =
                                    part.named_children(&mut named_cursor).collect();
                                for specifier in specifiers {
                                    let local = specifier
                                        .child_by_field_name("alias")
                                        .or_else(|| specifier.child_by_field_name("name"));
                                    if let Some(local) = local {
                                        self.declare(local, BindingKind::Import, scope);
                                    }
                                }
                            }
                            _ => {}
                        }
                    }
                }
                "import_require_clause" => {
                    let mut clause_cursor = child.walk();
                    let parts: Vec<_> = child.named_children(&mut clause_cursor).collect();
                    if let Some(name) = parts.into_iter().find(|p| p.kind() == "identifier") {
                        self.declare(name, BindingKind::Import, scope);
                    }
                }
                _ => {}
            }
        }
    }

    fn finish(mut self) -> ScopeTree {
        let pending = std::mem::take(&mut self.pending);
        for reference in pending {
            let binding = self
                .lookup(reference.scope, &reference.name)
                .unwrap_or_else(|| self.global(&reference.name));
            self.tree.occurrences.push(Occurrence {
                location: reference.location,
                binding,
                is_declaration: false,
            });
        }

        let mut tree = self.tree;
        tree.occurrences.sort_by(|a, b| a.location.cmp(&b.location));
        tree.occurrences
            .dedup_by(|a, b| a.location == b.location && a.binding == b.binding);
        tree.by_span = tree
            .occurrences
            .iter()
            .enumerate()
            .map(|(i, o)| ((o.location.byte_start, o.location.byte_end), i))
            .collect();
        tree
    }

    fn lookup(&self, mut scope: ScopeId, name: &str) -> Option<BindingId> {
        loop {
            let s = &self.tree.scopes[scope];
            if let Some(&binding) = s.names.get(name) {
                return Some(binding);
            }
            scope = s.parent?;
        }
    }

    fn global(&mut self, name: &str) -> BindingId {
        if let Some(&id) = self.globals.get(name) {
            return id;
        }
        let id = self.tree.bindings.len();
        self.tree.bindings.push(Binding {
            name: name.to_string(),
            kind: BindingKind::Global,
            scope: None,
            declaration: None,
        });
        self.globals.insert(name.to_string(), id);
        id
    }
}

/// `export default function name() {}` binds `name` in the module scope.
fn is_default_export(node: tree_sitter::Node) -> bool {
    node.parent().map(|p| p.kind()) == Some("export_statement")
}

fn declaration_kind(node: tree_sitter::Node, source: &[u8]) -> BindingKind {
    if node.kind() == "variable_declaration" {
        return BindingKind::Var;
    }
    match node
        .child_by_field_name("kind")
        .or_else(|| node.child(0))
        .map(|k| node_text(k, source))
    {
        Some("let") => BindingKind::Let,
        Some("var") => BindingKind::Var,
        _ => BindingKind::Const,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::parse_source;

    fn offset_of(source: &str, needle: &str, nth: usize) -> usize {
        source.match_indices(needle).nth(nth).map(|(i, _)| i).unwrap()
    }

    #[test]
    fn test_shadowing_separates_bindings() {
        let source = "let a = 1;\nfunction f(a) { return a; }\nconsole.log(a);\n";
        let parsed = parse_source(Path::new("/w/a.js"), source).unwrap();
        let scopes = &parsed.scopes;

        let outer = scopes
            .occurrence_at_span(4, 5)
            .map(|o| o.binding)
            .unwrap();
        let uses = scopes.uses_of(outer);
        assert_eq!(uses.len(), 2);
        assert_eq!(uses[1].byte_start, offset_of(source, "a)", 1));

        let param_start = offset_of(source, "a)", 0);
        let param = scopes.occurrence_at_span(param_start, param_start + 1).unwrap();
        assert!(param.is_declaration);
        assert_eq!(scopes.uses_of(param.binding).len(), 2);
    }

    #[test]
    fn test_var_hoists_to_function_scope() {
        let source = "function f() { if (x) { var v = 1; } return v; }\n";
        let parsed = parse_source(Path::new("/w/a.js"), source).unwrap();
        let start = offset_of(source, "v = 1", 0);
        let binding = parsed.scopes.occurrence_at_span(start, start + 1).unwrap().binding;
        assert_eq!(parsed.scopes.uses_of(binding).len(), 2);
        assert_eq!(parsed.scopes.binding(binding).kind, BindingKind::Var);
    }

    #[test]
    fn test_let_is_block_scoped() {
        let source = "{ let v = 1; }\nv;\n";
        let parsed = parse_source(Path::new("/w/a.js"), source).unwrap();
        let inner = parsed.scopes.occurrence_at_span(6, 7).unwrap().binding;
        assert_eq!(parsed.scopes.uses_of(inner).len(), 1);
        let outer_start = offset_of(source, "v;", 0);
        let outer = parsed.scopes.occurrence_at_span(outer_start, outer_start + 1).unwrap();
        assert_eq!(parsed.scopes.binding(outer.binding).kind, BindingKind::Global);
    }

    #[test]
    fn test_property_names_are_not_occurrences() {
        let source = "const o = { a: 1 };\no.a;\n";
        let parsed = parse_source(Path::new("/w/a.js"), source).unwrap();
        let names: Vec<_> = parsed
            .scopes
            .occurrences()
            .iter()
            .map(|o| parsed.scopes.binding(o.binding).name.clone())
            .collect();
        assert_eq!(names, vec!["o", "o"]);
    }

    #[test]
    fn test_import_alias_declares_local_only() {
        let source = "import { foo as bar } from './a';\nbar();\n";
        let parsed = parse_source(Path::new("/w/b.ts"), source).unwrap();
        let names: Vec<_> = parsed
            .scopes
            .occurrences()
            .iter()
            .map(|o| parsed.scopes.binding(o.binding).name.clone())
            .collect();
        assert_eq!(names, vec!["bar", "bar"]);
        assert_eq!(
            parsed.scopes.binding(parsed.scopes.top_level("bar").unwrap()).kind,
            BindingKind::Import
        );
    }

    #[test]
    fn test_destructuring_declares_each_name() {
        let source = "const { a, b: c, ...rest } = obj;\nc + a + rest;\n";
        let parsed = parse_source(Path::new("/w/a.js"), source).unwrap();
        for name in ["a", "c", "rest"] {
            let id = parsed.scopes.top_level(name).unwrap();
            assert_eq!(parsed.scopes.uses_of(id).len(), 2, "{}", name);
        }
        assert!(parsed.scopes.top_level("b").is_none());
    }

    #[test]
    fn test_type_references_resolve_to_declarations() {
        let source = "interface P { x: number }\nfunction f(p: P): P { return p; }\n";
        let parsed = parse_source(Path::new("/w/a.ts"), source).unwrap();
        let id = parsed.scopes.top_level("P").unwrap();
        assert_eq!(parsed.scopes.uses_of(id).len(), 3);
    }
}
