//! Structural checker.
//!
//! A shallow checker that knows classes (with inheritance, statics and
//! TypeScript parameter properties), object literals, interfaces, object
//! type aliases, annotated bindings and function signatures. Everything else
//! is [`TypeForm::Dynamic`].
//!
//! Types of bindings are computed on demand from their declarations and
//! memoised per check. Imports are followed into other workspace modules
//! through the [`ModuleGraph`]; modules are parsed at most once per check and
//! cycles resolve to [`TypeForm::Unresolved`].
//!
//! A check walks the file twice. The first walk runs with [`NoHooks`] and
//! settles the memo tables; the second reports to the caller's hooks. Both
//! walks see identical types, so a hook observing the same location twice
//! sees the same answer twice.

use super::{
    CheckHooks, ClassInfo, InferenceOracle, MemberDecl, MemberType, NoHooks, ObjectInfo,
    ObjectOrigin, Signature, TypeForm, TypeHandle, TypeRef, TypedFile, MAX_HIERARCHY_DEPTH,
};
use crate::error::Result;
use crate::graph::ModuleGraph;
use crate::ingest::exports::{ExportKind, ExportName};
use crate::ingest::imports::ImportedName;
use crate::ingest::scope::BindingId;
use crate::ingest::{string_content, ParsedFile, Sources};
use crate::symbol::Location;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Upper bound on nested expression evaluation.
const MAX_EVAL_DEPTH: usize = 128;

/// Inference oracle over the module graph of a workspace.
pub struct StructuralChecker {
    graph: Arc<dyn ModuleGraph>,
}

impl StructuralChecker {
    /// Create a checker that follows imports through `graph`.
    pub fn new(graph: Arc<dyn ModuleGraph>) -> Self {
        Self { graph }
    }
}

impl std::fmt::Debug for StructuralChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StructuralChecker").finish_non_exhaustive()
    }
}

impl InferenceOracle for StructuralChecker {
    fn check_file(
        &self,
        parsed: &ParsedFile,
        sources: &Sources,
        hooks: &mut dyn CheckHooks,
    ) -> Result<TypedFile> {
        let origin = Arc::new(parsed.clone());
        let mut session = Session::new(self.graph.as_ref(), sources, origin.clone());
        let mut walker = Walker {
            session: &mut session,
            slots: Vec::new(),
        };

        walker.walk(&origin, origin.root(), &Context::default(), &mut NoHooks);
        walker.walk(&origin, origin.root(), &Context::default(), hooks);

        let slots = walker.slots;
        log::debug!(
            "checked {} ({} types, {} module(s) loaded)",
            parsed.path.display(),
            slots.len(),
            session.files.len()
        );
        Ok(TypedFile::new(parsed.path.clone(), slots))
    }
}

/// Value or type namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Space {
    Value,
    Type,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Pending {
    Binding(PathBuf, BindingId, Space),
    Export(PathBuf, ExportName, Space),
    Class(Location),
}

/// Evaluation context of an expression.
#[derive(Debug, Clone, Default)]
struct Context {
    this: Option<TypeForm>,
    returns: Option<TypeRef>,
}

/// Memo tables of one check.
struct Session<'a> {
    graph: &'a dyn ModuleGraph,
    sources: &'a Sources,
    files: HashMap<PathBuf, Option<Arc<ParsedFile>>>,
    classes: HashMap<Location, Arc<ClassInfo>>,
    objects: HashMap<Location, Arc<ObjectInfo>>,
    signatures: HashMap<Location, Arc<Signature>>,
    bindings: HashMap<(PathBuf, BindingId, Space), TypeForm>,
    exports: HashMap<(PathBuf, ExportName, Space), TypeForm>,
    /// Name tokens of class members; accesses there are declarations.
    member_sites: HashSet<Location>,
    in_progress: HashSet<Pending>,
    depth: usize,
}

impl<'a> Session<'a> {
    fn new(graph: &'a dyn ModuleGraph, sources: &'a Sources, origin: Arc<ParsedFile>) -> Self {
        let mut files = HashMap::new();
        files.insert(origin.path.clone(), Some(origin));
        Self {
            graph,
            sources,
            files,
            classes: HashMap::new(),
            objects: HashMap::new(),
            signatures: HashMap::new(),
            bindings: HashMap::new(),
            exports: HashMap::new(),
            member_sites: HashSet::new(),
            in_progress: HashSet::new(),
            depth: 0,
        }
    }

    fn file(&mut self, path: &Path) -> Option<Arc<ParsedFile>> {
        if let Some(file) = self.files.get(path) {
            return file.clone();
        }
        let parsed = match self.sources.parse(path) {
            Ok(parsed) => Some(Arc::new(parsed)),
            Err(err) => {
                log::debug!("types of {} unavailable: {}", path.display(), err);
                None
            }
        };
        self.files.insert(path.to_path_buf(), parsed.clone());
        parsed
    }

    // ---- bindings ---------------------------------------------------------

    fn binding_form(&mut self, file: &ParsedFile, binding: BindingId, space: Space) -> TypeForm {
        let key = (file.path.clone(), binding, space);
        if let Some(form) = self.bindings.get(&key) {
            return form.clone();
        }
        let pending = Pending::Binding(file.path.clone(), binding, space);
        if !self.in_progress.insert(pending.clone()) {
            return TypeForm::Unresolved;
        }
        let form = self.compute_binding_form(file, binding, space);
        self.in_progress.remove(&pending);
        self.bindings.insert(key, form.clone());
        form
    }

    fn compute_binding_form(
        &mut self,
        file: &ParsedFile,
        binding: BindingId,
        space: Space,
    ) -> TypeForm {
        let Some(decl) = file.scopes.binding(binding).declaration.clone() else {
            return TypeForm::Dynamic;
        };

        let imported = file.signature.imports.iter().find_map(|fact| {
            fact.bindings
                .iter()
                .find(|b| b.local == decl)
                .map(|b| (fact.specifier.clone(), b.imported.clone()))
        });
        if let Some((specifier, imported)) = imported {
            return self.import_form(&file.path, &specifier, &imported, space);
        }

        let Some(node) = file.node_at(&decl) else {
            return TypeForm::Unresolved;
        };
        let Some(parent) = node.parent() else {
            return TypeForm::Dynamic;
        };

        match (parent.kind(), space) {
            ("class_declaration" | "abstract_class_declaration" | "class", _) => {
                match self.class_info(file, parent) {
                    Some(class) if space == Space::Value => TypeForm::Class(class),
                    Some(class) => TypeForm::Instance(class),
                    None => TypeForm::Unresolved,
                }
            }
            (
                "function_declaration"
                | "generator_function_declaration"
                | "function_expression"
                | "function"
                | "generator_function"
                | "function_signature",
                Space::Value,
            ) => TypeForm::Function(self.signature(file, parent)),
            ("interface_declaration", Space::Type) => match parent.child_by_field_name("body") {
                Some(body) => TypeForm::Object(self.object_type_info(file, body)),
                None => TypeForm::Dynamic,
            },
            ("type_alias_declaration", Space::Type) => match parent.child_by_field_name("value") {
                Some(value) => {
                    let reference = self.type_ref(file, value);
                    self.resolve_ref(&reference)
                }
                None => TypeForm::Dynamic,
            },
            ("variable_declarator", Space::Value) => {
                if let Some(annotation) = parent.child_by_field_name("type") {
                    let reference = self.type_ref(file, annotation);
                    self.resolve_ref(&reference)
                } else if let Some(value) = parent.child_by_field_name("value") {
                    self.expr_form(file, value, &Context::default())
                } else {
                    TypeForm::Dynamic
                }
            }
            ("required_parameter" | "optional_parameter", Space::Value) => {
                match parent.child_by_field_name("type") {
                    Some(annotation) => {
                        let reference = self.type_ref(file, annotation);
                        self.resolve_ref(&reference)
                    }
                    None => TypeForm::Dynamic,
                }
            }
            // `const { a } = source`
            ("object_pattern", Space::Value) => {
                let source = self.pattern_source(file, parent);
                self.member_form(&source, file.text(node))
            }
            // `const { key: a } = source`
            ("pair_pattern", Space::Value) => {
                let (Some(key), Some(pattern)) =
                    (parent.child_by_field_name("key"), parent.parent())
                else {
                    return TypeForm::Dynamic;
                };
                let Some((name, _)) = key_of(file, key) else {
                    return TypeForm::Dynamic;
                };
                let source = self.pattern_source(file, pattern);
                self.member_form(&source, &name)
            }
            _ => TypeForm::Dynamic,
        }
    }

    /// Type of the value an object pattern destructures.
    fn pattern_source(&mut self, file: &ParsedFile, pattern: tree_sitter::Node) -> TypeForm {
        let Some(parent) = pattern.parent() else {
            return TypeForm::Dynamic;
        };
        match parent.kind() {
            "variable_declarator" => {
                if let Some(annotation) = parent.child_by_field_name("type") {
                    let reference = self.type_ref(file, annotation);
                    self.resolve_ref(&reference)
                } else if let Some(value) = parent.child_by_field_name("value") {
                    self.expr_form(file, value, &Context::default())
                } else {
                    TypeForm::Dynamic
                }
            }
            "required_parameter" | "optional_parameter" => {
                match parent.child_by_field_name("type") {
                    Some(annotation) => {
                        let reference = self.type_ref(file, annotation);
                        self.resolve_ref(&reference)
                    }
                    None => TypeForm::Dynamic,
                }
            }
            _ => TypeForm::Dynamic,
        }
    }

    // ---- modules ----------------------------------------------------------

    fn import_form(
        &mut self,
        from: &Path,
        specifier: &str,
        imported: &ImportedName,
        space: Space,
    ) -> TypeForm {
        let handle = self.graph.resolve_module(from, specifier);
        let Some(target) = self.graph.file_of_module(&handle) else {
            return TypeForm::Dynamic;
        };
        match imported {
            ImportedName::Default => self.export_form(&target, &ExportName::Default, space),
            ImportedName::Named(name) => {
                self.export_form(&target, &ExportName::Named(name.clone()), space)
            }
            ImportedName::Namespace => match space {
                Space::Value => TypeForm::Module(target),
                Space::Type => TypeForm::Dynamic,
            },
            ImportedName::Module => match self.export_form(&target, &ExportName::Default, space) {
                TypeForm::Unresolved if space == Space::Value => TypeForm::Module(target),
                form => form,
            },
        }
    }

    fn export_form(&mut self, path: &Path, name: &ExportName, space: Space) -> TypeForm {
        let key = (path.to_path_buf(), name.clone(), space);
        if let Some(form) = self.exports.get(&key) {
            return form.clone();
        }
        let pending = Pending::Export(path.to_path_buf(), name.clone(), space);
        if !self.in_progress.insert(pending.clone()) {
            return TypeForm::Unresolved;
        }
        let form = self.compute_export_form(path, name, space);
        self.in_progress.remove(&pending);
        self.exports.insert(key, form.clone());
        form
    }

    fn compute_export_form(&mut self, path: &Path, name: &ExportName, space: Space) -> TypeForm {
        let Some(file) = self.file(path) else {
            return TypeForm::Unresolved;
        };
        let entry = file
            .signature
            .exports
            .iter()
            .filter(|e| &e.name == name)
            .last()
            .cloned();

        let Some(entry) = entry else {
            // `module.exports = value` exports the members of `value`.
            if let ExportName::Named(member) = name {
                let whole_module = file
                    .signature
                    .exports
                    .iter()
                    .any(|e| e.kind == ExportKind::CommonJsModule);
                if whole_module {
                    let whole = self.export_form(path, &ExportName::Default, space);
                    return self.member_form(&whole, member);
                }
            }
            return TypeForm::Unresolved;
        };

        if let ExportKind::Reexport { specifier, imported } = &entry.kind {
            let handle = self.graph.resolve_module(path, specifier);
            let Some(target) = self.graph.file_of_module(&handle) else {
                return TypeForm::Dynamic;
            };
            return match imported {
                Some(original) => {
                    let original = if original == "default" {
                        ExportName::Default
                    } else {
                        ExportName::Named(original.clone())
                    };
                    self.export_form(&target, &original, space)
                }
                None if space == Space::Value => TypeForm::Module(target),
                None => TypeForm::Dynamic,
            };
        }

        if let Some(local) = &entry.local {
            return match file.scopes.occurrence_at_span(local.byte_start, local.byte_end) {
                Some(occurrence) => self.binding_form(&file, occurrence.binding, space),
                None => TypeForm::Unresolved,
            };
        }

        let Some(node) = entry.value.as_ref().and_then(|v| file.node_at(v)) else {
            return TypeForm::Unresolved;
        };
        match (space, node.kind()) {
            (Space::Type, "class" | "class_declaration" | "abstract_class_declaration") => {
                match self.class_info(&file, node) {
                    Some(class) => TypeForm::Instance(class),
                    None => TypeForm::Unresolved,
                }
            }
            (Space::Type, _) => TypeForm::Dynamic,
            (Space::Value, "class_declaration" | "abstract_class_declaration") => {
                match self.class_info(&file, node) {
                    Some(class) => TypeForm::Class(class),
                    None => TypeForm::Unresolved,
                }
            }
            (Space::Value, "function_declaration" | "generator_function_declaration") => {
                TypeForm::Function(self.signature(&file, node))
            }
            (Space::Value, _) => self.expr_form(&file, node, &Context::default()),
        }
    }

    // ---- expressions ------------------------------------------------------

    fn expr_form(&mut self, file: &ParsedFile, node: tree_sitter::Node, cx: &Context) -> TypeForm {
        if file.header.is_unchecked() {
            return TypeForm::Dynamic;
        }
        if self.depth >= MAX_EVAL_DEPTH {
            return TypeForm::Unresolved;
        }
        self.depth += 1;
        let form = self.eval(file, node, cx);
        self.depth -= 1;
        form
    }

    fn eval(&mut self, file: &ParsedFile, node: tree_sitter::Node, cx: &Context) -> TypeForm {
        match node.kind() {
            "identifier" | "shorthand_property_identifier" => {
                match file.scopes.binding_of_node(node) {
                    Some(binding) => self.binding_form(file, binding, Space::Value),
                    None => TypeForm::Dynamic,
                }
            }
            "this" => cx.this.clone().unwrap_or(TypeForm::Dynamic),
            "parenthesized_expression" | "non_null_expression" => match node.named_child(0) {
                Some(inner) => self.expr_form(file, inner, cx),
                None => TypeForm::Dynamic,
            },
            "satisfies_expression" => match node.named_child(0) {
                Some(inner) => self.expr_form(file, inner, cx),
                None => TypeForm::Dynamic,
            },
            "as_expression" => match node.named_child(1) {
                Some(target) => {
                    let reference = self.type_ref(file, target);
                    self.resolve_ref(&reference)
                }
                None => TypeForm::Dynamic,
            },
            "assignment_expression" => match node.child_by_field_name("right") {
                Some(right) => self.expr_form(file, right, cx),
                None => TypeForm::Dynamic,
            },
            "new_expression" => {
                let Some(constructor) = node.child_by_field_name("constructor") else {
                    return TypeForm::Dynamic;
                };
                match self.expr_form(file, constructor, cx) {
                    TypeForm::Class(class) => TypeForm::Instance(class),
                    _ => TypeForm::Dynamic,
                }
            }
            "member_expression" => {
                let (Some(object), Some(property)) = (
                    node.child_by_field_name("object"),
                    node.child_by_field_name("property"),
                ) else {
                    return TypeForm::Dynamic;
                };
                let receiver = self.expr_form(file, object, cx);
                self.member_form(&receiver, file.text(property))
            }
            "subscript_expression" => {
                let (Some(object), Some(index)) = (
                    node.child_by_field_name("object"),
                    node.child_by_field_name("index"),
                ) else {
                    return TypeForm::Dynamic;
                };
                let Some(name) = string_content(index, file.source.as_bytes()) else {
                    return TypeForm::Dynamic;
                };
                let receiver = self.expr_form(file, object, cx);
                self.member_form(&receiver, &name)
            }
            "call_expression" => {
                let Some(function) = node.child_by_field_name("function") else {
                    return TypeForm::Dynamic;
                };
                match self.expr_form(file, function, cx) {
                    TypeForm::Function(signature) => match &signature.returns {
                        Some(returns) => self.resolve_ref(returns),
                        None => TypeForm::Dynamic,
                    },
                    _ => TypeForm::Dynamic,
                }
            }
            "object" => TypeForm::Object(self.object_literal_info(file, node)),
            "class" => match self.class_info(file, node) {
                Some(class) => TypeForm::Class(class),
                None => TypeForm::Unresolved,
            },
            "function_expression" | "function" | "arrow_function" | "generator_function" => {
                TypeForm::Function(self.signature(file, node))
            }
            _ => TypeForm::Dynamic,
        }
    }

    /// Type of member `name` on `receiver`.
    fn member_form(&mut self, receiver: &TypeForm, name: &str) -> TypeForm {
        let member = match receiver {
            TypeForm::Instance(class) => lookup_chain(class, name, |c| &c.members),
            TypeForm::Class(class) => lookup_chain(class, name, |c| &c.statics),
            TypeForm::Object(object) => object.properties.get(name).cloned(),
            TypeForm::Module(path) => {
                let path = path.clone();
                return self.export_form(&path, &ExportName::Named(name.to_string()), Space::Value);
            }
            _ => None,
        };
        match member {
            Some(member) => self.member_decl_form(&member),
            None => TypeForm::Dynamic,
        }
    }

    fn member_decl_form(&mut self, member: &MemberDecl) -> TypeForm {
        match &member.ty {
            MemberType::Unknown => TypeForm::Dynamic,
            MemberType::Typed(reference) => self.resolve_ref(reference),
            MemberType::Method(signature) => TypeForm::Function(signature.clone()),
        }
    }

    // ---- type references --------------------------------------------------

    fn type_ref(&mut self, file: &ParsedFile, node: tree_sitter::Node) -> TypeRef {
        match node.kind() {
            "type_annotation" | "parenthesized_type" | "readonly_type" => {
                match node.named_child(0) {
                    Some(inner) => self.type_ref(file, inner),
                    None => TypeRef::Dynamic,
                }
            }
            "type_identifier" => TypeRef::Named {
                name: file.text(node).to_string(),
                site: file.location(node),
            },
            "generic_type" => {
                match node.child_by_field_name("name").or_else(|| node.named_child(0)) {
                    Some(name) if name.kind() == "type_identifier" => self.type_ref(file, name),
                    _ => TypeRef::Dynamic,
                }
            }
            "object_type" => TypeRef::Inline(self.object_type_info(file, node)),
            _ => TypeRef::Dynamic,
        }
    }

    fn resolve_ref(&mut self, reference: &TypeRef) -> TypeForm {
        match reference {
            TypeRef::Named { site, .. } => {
                let Some(file) = self.file(&site.file) else {
                    return TypeForm::Unresolved;
                };
                match file.scopes.occurrence_at_span(site.byte_start, site.byte_end) {
                    Some(occurrence) => self.binding_form(&file, occurrence.binding, Space::Type),
                    None => TypeForm::Dynamic,
                }
            }
            TypeRef::Inline(object) => TypeForm::Object(object.clone()),
            TypeRef::Expr(location) => {
                let Some(file) = self.file(&location.file) else {
                    return TypeForm::Unresolved;
                };
                match file.node_at(location) {
                    Some(node) => self.expr_form(&file, node, &Context::default()),
                    None => TypeForm::Unresolved,
                }
            }
            TypeRef::Dynamic => TypeForm::Dynamic,
        }
    }

    // ---- declarations -----------------------------------------------------

    fn signature(&mut self, file: &ParsedFile, node: tree_sitter::Node) -> Arc<Signature> {
        let key = file.location(node);
        if let Some(signature) = self.signatures.get(&key) {
            return signature.clone();
        }

        let mut params = Vec::new();
        if let Some(parameters) = node.child_by_field_name("parameters") {
            let mut cursor = parameters.walk();
            let list: Vec<_> = parameters.named_children(&mut cursor).collect();
            for param in list {
                match param.kind() {
                    "required_parameter" | "optional_parameter" => {
                        let annotation = param.child_by_field_name("type");
                        params.push(annotation.map(|a| self.type_ref(file, a)));
                    }
                    "comment" => {}
                    _ => params.push(None),
                }
            }
        } else if node.child_by_field_name("parameter").is_some() {
            params.push(None);
        }

        let returns = match node.child_by_field_name("return_type") {
            Some(annotation) => Some(self.type_ref(file, annotation)),
            None => node
                .child_by_field_name("body")
                .filter(|body| body.kind() != "statement_block")
                .map(|body| TypeRef::Expr(file.location(body))),
        };

        let signature = Arc::new(Signature { params, returns });
        self.signatures.insert(key, signature.clone());
        signature
    }

    fn object_type_info(&mut self, file: &ParsedFile, node: tree_sitter::Node) -> Arc<ObjectInfo> {
        let key = file.location(node);
        if let Some(object) = self.objects.get(&key) {
            return object.clone();
        }

        let mut properties = BTreeMap::new();
        let mut cursor = node.walk();
        let members: Vec<_> = node.named_children(&mut cursor).collect();
        for member in members {
            let Some((name, token)) = member
                .child_by_field_name("name")
                .and_then(|n| key_of(file, n))
            else {
                continue;
            };
            let ty = match member.kind() {
                "property_signature" => match member.child_by_field_name("type") {
                    Some(annotation) => MemberType::Typed(self.type_ref(file, annotation)),
                    None => MemberType::Unknown,
                },
                "method_signature" => MemberType::Method(self.signature(file, member)),
                _ => continue,
            };
            properties.entry(name).or_insert(MemberDecl {
                location: file.location(token),
                ty,
            });
        }

        let object = Arc::new(ObjectInfo {
            decl: key.clone(),
            origin: ObjectOrigin::Declared,
            properties,
        });
        self.objects.insert(key, object.clone());
        object
    }

    fn object_literal_info(
        &mut self,
        file: &ParsedFile,
        node: tree_sitter::Node,
    ) -> Arc<ObjectInfo> {
        let key = file.location(node);
        if let Some(object) = self.objects.get(&key) {
            return object.clone();
        }

        let mut properties = BTreeMap::new();
        let mut cursor = node.walk();
        let members: Vec<_> = node.named_children(&mut cursor).collect();
        for member in members {
            let (name, token, ty) = match member.kind() {
                "pair" => {
                    let Some((name, token)) = member
                        .child_by_field_name("key")
                        .and_then(|k| key_of(file, k))
                    else {
                        continue;
                    };
                    let ty = match member.child_by_field_name("value") {
                        Some(value) => MemberType::Typed(TypeRef::Expr(file.location(value))),
                        None => MemberType::Unknown,
                    };
                    (name, token, ty)
                }
                "shorthand_property_identifier" => (
                    file.text(member).to_string(),
                    member,
                    MemberType::Typed(TypeRef::Expr(file.location(member))),
                ),
                "method_definition" => {
                    let Some((name, token)) = member
                        .child_by_field_name("name")
                        .and_then(|n| key_of(file, n))
                    else {
                        continue;
                    };
                    (name, token, MemberType::Method(self.signature(file, member)))
                }
                _ => continue,
            };
            properties.entry(name).or_insert(MemberDecl {
                location: file.location(token),
                ty,
            });
        }

        let object = Arc::new(ObjectInfo {
            decl: key.clone(),
            origin: ObjectOrigin::Literal,
            properties,
        });
        self.objects.insert(key, object.clone());
        object
    }

    fn class_info(&mut self, file: &ParsedFile, node: tree_sitter::Node) -> Option<Arc<ClassInfo>> {
        let key = file.location(node);
        if let Some(class) = self.classes.get(&key) {
            return Some(class.clone());
        }
        let pending = Pending::Class(key.clone());
        if !self.in_progress.insert(pending.clone()) {
            log::debug!("inheritance cycle through {}", key);
            return None;
        }
        let class = self.build_class(file, node);
        self.in_progress.remove(&pending);
        self.classes.insert(key, class.clone());
        Some(class)
    }

    fn build_class(&mut self, file: &ParsedFile, node: tree_sitter::Node) -> Arc<ClassInfo> {
        let name_node = node.child_by_field_name("name");
        let name = name_node
            .map(|n| file.text(n).to_string())
            .unwrap_or_else(|| "<anonymous>".to_string());
        let decl = file.location(name_node.unwrap_or(node));

        let superclass = match heritage_expression(node) {
            Some(expression) => match self.expr_form(file, expression, &Context::default()) {
                TypeForm::Class(class) => Some(class),
                _ => None,
            },
            None => None,
        };

        let mut members = BTreeMap::new();
        let mut statics = BTreeMap::new();
        let mut constructor = None;

        if let Some(body) = node.child_by_field_name("body") {
            let mut cursor = body.walk();
            let items: Vec<_> = body.named_children(&mut cursor).collect();
            for item in items {
                let is_static = has_keyword(item, "static");
                let name_field = match item.kind() {
                    "field_definition" => "property",
                    _ => "name",
                };
                let Some((member_name, token)) = item
                    .child_by_field_name(name_field)
                    .and_then(|n| key_of(file, n))
                else {
                    continue;
                };

                let ty = match item.kind() {
                    "method_definition" if member_name == "constructor" && !is_static => {
                        let signature = self.signature(file, item);
                        constructor = Some(signature);
                        self.constructor_members(file, item, &mut members);
                        continue;
                    }
                    "method_definition" | "method_signature" | "abstract_method_signature" => {
                        MemberType::Method(self.signature(file, item))
                    }
                    "field_definition" | "public_field_definition" => {
                        if let Some(annotation) = item.child_by_field_name("type") {
                            MemberType::Typed(self.type_ref(file, annotation))
                        } else if let Some(value) = item.child_by_field_name("value") {
                            MemberType::Typed(TypeRef::Expr(file.location(value)))
                        } else {
                            MemberType::Unknown
                        }
                    }
                    _ => continue,
                };

                let location = file.location(token);
                self.member_sites.insert(location.clone());
                let table = if is_static { &mut statics } else { &mut members };
                table.entry(member_name).or_insert(MemberDecl { location, ty });
            }
        }

        Arc::new(ClassInfo {
            name,
            decl,
            members,
            statics,
            constructor,
            superclass,
        })
    }

    /// Parameter properties and `this.x = ...` assignments of a constructor.
    fn constructor_members(
        &mut self,
        file: &ParsedFile,
        constructor: tree_sitter::Node,
        members: &mut BTreeMap<String, MemberDecl>,
    ) {
        if let Some(parameters) = constructor.child_by_field_name("parameters") {
            let mut cursor = parameters.walk();
            let list: Vec<_> = parameters.named_children(&mut cursor).collect();
            for param in list {
                if !matches!(param.kind(), "required_parameter" | "optional_parameter") {
                    continue;
                }
                let mut param_cursor = param.walk();
                let is_property = param
                    .children(&mut param_cursor)
                    .any(|c| c.kind() == "accessibility_modifier" || c.kind() == "readonly");
                let Some(pattern) = param.child_by_field_name("pattern") else {
                    continue;
                };
                if !is_property || pattern.kind() != "identifier" {
                    continue;
                }
                let ty = match param.child_by_field_name("type") {
                    Some(annotation) => MemberType::Typed(self.type_ref(file, annotation)),
                    None => MemberType::Unknown,
                };
                let location = file.location(pattern);
                self.member_sites.insert(location.clone());
                members
                    .entry(file.text(pattern).to_string())
                    .or_insert(MemberDecl { location, ty });
            }
        }

        let Some(body) = constructor.child_by_field_name("body") else {
            return;
        };
        let mut cursor = body.walk();
        let statements: Vec<_> = body.named_children(&mut cursor).collect();
        for statement in statements {
            if statement.kind() != "expression_statement" {
                continue;
            }
            let Some(assignment) = statement
                .named_child(0)
                .filter(|n| n.kind() == "assignment_expression")
            else {
                continue;
            };
            let (Some(left), Some(right)) = (
                assignment.child_by_field_name("left"),
                assignment.child_by_field_name("right"),
            ) else {
                continue;
            };
            if left.kind() != "member_expression" {
                continue;
            }
            let (Some(object), Some(property)) = (
                left.child_by_field_name("object"),
                left.child_by_field_name("property"),
            ) else {
                continue;
            };
            if object.kind() != "this" || property.kind() != "property_identifier" {
                continue;
            }
            let name = file.text(property).to_string();
            if members.contains_key(&name) {
                continue;
            }
            let location = file.location(property);
            self.member_sites.insert(location.clone());
            members.insert(
                name,
                MemberDecl {
                    location,
                    ty: MemberType::Typed(TypeRef::Expr(file.location(right))),
                },
            );
        }
    }
}

/// First declaration of `name` walking up the superclass chain.
fn lookup_chain(
    class: &Arc<ClassInfo>,
    name: &str,
    table: impl Fn(&ClassInfo) -> &BTreeMap<String, MemberDecl>,
) -> Option<MemberDecl> {
    let mut current = Some(class.clone());
    for _ in 0..MAX_HIERARCHY_DEPTH {
        let class = current?;
        if let Some(member) = table(&class).get(name) {
            return Some(member.clone());
        }
        current = class.superclass.clone();
    }
    None
}

/// Expression after `extends`.
fn heritage_expression(class: tree_sitter::Node) -> Option<tree_sitter::Node> {
    let mut cursor = class.walk();
    let heritage = class
        .named_children(&mut cursor)
        .find(|c| c.kind() == "class_heritage")?;
    let mut heritage_cursor = heritage.walk();
    let first = heritage.named_children(&mut heritage_cursor).next()?;
    if first.kind() == "extends_clause" {
        first
            .child_by_field_name("value")
            .or_else(|| first.named_child(0))
    } else if first.kind() == "implements_clause" {
        None
    } else {
        Some(first)
    }
}

fn has_keyword(node: tree_sitter::Node, keyword: &str) -> bool {
    let mut cursor = node.walk();
    let found = node
        .children(&mut cursor)
        .any(|c| !c.is_named() && c.kind() == keyword);
    found
}

/// Name and name token of a property key.
///
/// String keys report their fragment so the token lines up with what the
/// property scanner pre-filters on.
pub(crate) fn key_of<'t>(
    file: &ParsedFile,
    node: tree_sitter::Node<'t>,
) -> Option<(String, tree_sitter::Node<'t>)> {
    match node.kind() {
        "property_identifier" | "private_property_identifier" | "identifier" | "number" => {
            Some((file.text(node).to_string(), node))
        }
        "string" => {
            let content = string_content(node, file.source.as_bytes())?;
            let mut cursor = node.walk();
            let fragment = node
                .named_children(&mut cursor)
                .find(|c| c.kind() == "string_fragment");
            Some((content, fragment.unwrap_or(node)))
        }
        "computed_property_name" => {
            let inner = node.named_child(0)?;
            if inner.kind() == "string" {
                key_of(file, inner)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// The checking walk.
struct Walker<'s, 'a> {
    session: &'s mut Session<'a>,
    slots: Vec<TypeForm>,
}

impl<'s, 'a> Walker<'s, 'a> {
    fn intern(&mut self, form: TypeForm) -> TypeHandle {
        let handle = TypeHandle(self.slots.len() as u32);
        self.slots.push(form);
        handle
    }

    fn walk_children(
        &mut self,
        file: &ParsedFile,
        node: tree_sitter::Node,
        cx: &Context,
        hooks: &mut dyn CheckHooks,
    ) {
        let mut cursor = node.walk();
        let children: Vec<_> = node.named_children(&mut cursor).collect();
        for child in children {
            self.walk(file, child, cx, hooks);
        }
    }

    fn walk(
        &mut self,
        file: &ParsedFile,
        node: tree_sitter::Node,
        cx: &Context,
        hooks: &mut dyn CheckHooks,
    ) {
        match node.kind() {
            "class_declaration" | "abstract_class_declaration" | "class" => {
                self.class(file, node, cx, hooks);
                return;
            }
            "function_declaration" | "generator_function_declaration" | "function_expression"
            | "function" | "generator_function" => {
                let inner = Context {
                    this: None,
                    returns: self.return_type(file, node),
                };
                self.walk_children(file, node, &inner, hooks);
                return;
            }
            "method_definition" | "arrow_function" => {
                let inner = Context {
                    this: cx.this.clone(),
                    returns: self.return_type(file, node),
                };
                self.walk_children(file, node, &inner, hooks);
                return;
            }
            "member_expression" => self.member_access(file, node, cx, hooks),
            "subscript_expression" => self.subscript_access(file, node, cx, hooks),
            "object" => {
                let object = self.session.object_literal_info(file, node);
                let handle = self.intern(TypeForm::Object(object.clone()));
                for (name, property) in &object.properties {
                    hooks.object_key(handle, name, &property.location);
                }
            }
            "object_type" | "interface_body" => {
                let object = self.session.object_type_info(file, node);
                let handle = self.intern(TypeForm::Object(object.clone()));
                for (name, property) in &object.properties {
                    hooks.object_key(handle, name, &property.location);
                }
            }
            "variable_declarator" => self.declarator(file, node, cx, hooks),
            "required_parameter" | "optional_parameter" => {
                if let (Some(pattern), Some(annotation)) = (
                    node.child_by_field_name("pattern"),
                    node.child_by_field_name("type"),
                ) {
                    if pattern.kind() == "object_pattern" {
                        let reference = self.session.type_ref(file, annotation);
                        let source = self.session.resolve_ref(&reference);
                        self.pattern_uses(file, pattern, source, hooks, 0);
                    }
                }
            }
            "call_expression" => {
                if let Some(function) = node.child_by_field_name("function") {
                    if let TypeForm::Function(signature) =
                        self.session.expr_form(file, function, cx)
                    {
                        self.argument_flows(file, node, &signature, cx, hooks);
                    }
                }
            }
            "new_expression" => {
                if let Some(constructor) = node.child_by_field_name("constructor") {
                    if let TypeForm::Class(class) = self.session.expr_form(file, constructor, cx) {
                        if let Some(signature) = constructor_of(&class) {
                            self.argument_flows(file, node, &signature, cx, hooks);
                        }
                    }
                }
            }
            "as_expression" | "satisfies_expression" => {
                if let (Some(value), Some(target)) = (node.named_child(0), node.named_child(1)) {
                    let reference = self.session.type_ref(file, target);
                    let target = self.session.resolve_ref(&reference);
                    self.flow(file, value, target, cx, hooks);
                }
            }
            "return_statement" => {
                if let (Some(returns), Some(value)) = (cx.returns.clone(), node.named_child(0)) {
                    let target = self.session.resolve_ref(&returns);
                    self.flow(file, value, target, cx, hooks);
                }
            }
            "assignment_expression" => {
                if let (Some(left), Some(right)) = (
                    node.child_by_field_name("left"),
                    node.child_by_field_name("right"),
                ) {
                    if left.kind() == "member_expression" {
                        let target = self.session.expr_form(file, left, cx);
                        self.flow(file, right, target, cx, hooks);
                    }
                }
            }
            _ => {}
        }
        self.walk_children(file, node, cx, hooks);
    }

    fn return_type(&mut self, file: &ParsedFile, node: tree_sitter::Node) -> Option<TypeRef> {
        node.child_by_field_name("return_type")
            .map(|annotation| self.session.type_ref(file, annotation))
    }

    fn class(
        &mut self,
        file: &ParsedFile,
        node: tree_sitter::Node,
        cx: &Context,
        hooks: &mut dyn CheckHooks,
    ) {
        let Some(class) = self.session.class_info(file, node) else {
            self.walk_children(file, node, cx, hooks);
            return;
        };

        let instance = self.intern(TypeForm::Instance(class.clone()));
        for (name, member) in &class.members {
            hooks.class_member(instance, name, &member.location);
        }
        let statics = self.intern(TypeForm::Class(class.clone()));
        for (name, member) in &class.statics {
            hooks.class_member(statics, name, &member.location);
        }

        let body = node.child_by_field_name("body");
        let mut cursor = node.walk();
        let children: Vec<_> = node.named_children(&mut cursor).collect();
        for child in children {
            if Some(child) != body {
                self.walk(file, child, cx, hooks);
                continue;
            }
            let mut body_cursor = child.walk();
            let items: Vec<_> = child.named_children(&mut body_cursor).collect();
            for item in items {
                let this = if has_keyword(item, "static") {
                    TypeForm::Class(class.clone())
                } else {
                    TypeForm::Instance(class.clone())
                };
                let inner = Context {
                    this: Some(this),
                    returns: None,
                };
                self.walk(file, item, &inner, hooks);
            }
        }
    }

    fn member_access(
        &mut self,
        file: &ParsedFile,
        node: tree_sitter::Node,
        cx: &Context,
        hooks: &mut dyn CheckHooks,
    ) {
        let (Some(object), Some(property)) = (
            node.child_by_field_name("object"),
            node.child_by_field_name("property"),
        ) else {
            return;
        };
        if !matches!(property.kind(), "property_identifier" | "private_property_identifier") {
            return;
        }
        let location = file.location(property);
        if self.session.member_sites.contains(&location) {
            return;
        }
        let receiver = self.session.expr_form(file, object, cx);
        let handle = self.intern(receiver);
        hooks.member_use(handle, file.text(property), &location);
    }

    fn subscript_access(
        &mut self,
        file: &ParsedFile,
        node: tree_sitter::Node,
        cx: &Context,
        hooks: &mut dyn CheckHooks,
    ) {
        let (Some(object), Some(index)) = (
            node.child_by_field_name("object"),
            node.child_by_field_name("index"),
        ) else {
            return;
        };
        let Some((name, token)) = key_of(file, index).filter(|_| index.kind() == "string") else {
            return;
        };
        let receiver = self.session.expr_form(file, object, cx);
        let handle = self.intern(receiver);
        hooks.member_use(handle, &name, &file.location(token));
    }

    fn declarator(
        &mut self,
        file: &ParsedFile,
        node: tree_sitter::Node,
        cx: &Context,
        hooks: &mut dyn CheckHooks,
    ) {
        let name = node.child_by_field_name("name");
        let value = node.child_by_field_name("value");
        let annotated = node.child_by_field_name("type").map(|annotation| {
            let reference = self.session.type_ref(file, annotation);
            self.session.resolve_ref(&reference)
        });

        if let (Some(target), Some(value)) = (annotated.clone(), value) {
            self.flow(file, value, target, cx, hooks);
        }

        if let Some(pattern) = name.filter(|n| n.kind() == "object_pattern") {
            let source = match (annotated, value) {
                (Some(target), _) => target,
                (None, Some(value)) => self.session.expr_form(file, value, cx),
                (None, None) => TypeForm::Dynamic,
            };
            self.pattern_uses(file, pattern, source, hooks, 0);
        }
    }

    /// Keys of a destructuring pattern read members of `source`.
    fn pattern_uses(
        &mut self,
        file: &ParsedFile,
        pattern: tree_sitter::Node,
        source: TypeForm,
        hooks: &mut dyn CheckHooks,
        depth: usize,
    ) {
        if depth >= MAX_HIERARCHY_DEPTH {
            return;
        }
        let handle = self.intern(source.clone());
        let mut cursor = pattern.walk();
        let entries: Vec<_> = pattern.named_children(&mut cursor).collect();
        for entry in entries {
            match entry.kind() {
                "shorthand_property_identifier_pattern" => {
                    hooks.member_use(handle, file.text(entry), &file.location(entry));
                }
                "object_assignment_pattern" => {
                    if let Some(left) = entry
                        .child_by_field_name("left")
                        .filter(|l| l.kind() == "shorthand_property_identifier_pattern")
                    {
                        hooks.member_use(handle, file.text(left), &file.location(left));
                    }
                }
                "pair_pattern" => {
                    let Some((name, token)) = entry
                        .child_by_field_name("key")
                        .and_then(|k| key_of(file, k))
                    else {
                        continue;
                    };
                    hooks.member_use(handle, &name, &file.location(token));
                    if let Some(nested) = entry
                        .child_by_field_name("value")
                        .filter(|v| v.kind() == "object_pattern")
                    {
                        let inner = self.session.member_form(&source, &name);
                        self.pattern_uses(file, nested, inner, hooks, depth + 1);
                    }
                }
                _ => {}
            }
        }
    }

    fn argument_flows(
        &mut self,
        file: &ParsedFile,
        call: tree_sitter::Node,
        signature: &Signature,
        cx: &Context,
        hooks: &mut dyn CheckHooks,
    ) {
        let Some(arguments) = call.child_by_field_name("arguments") else {
            return;
        };
        let mut cursor = arguments.walk();
        let list: Vec<_> = arguments.named_children(&mut cursor).collect();
        for (argument, param) in list.into_iter().zip(signature.params.iter()) {
            if let Some(param) = param {
                let target = self.session.resolve_ref(param);
                self.flow(file, argument, target, cx, hooks);
            }
        }
    }

    fn flow(
        &mut self,
        file: &ParsedFile,
        value: tree_sitter::Node,
        target: TypeForm,
        cx: &Context,
        hooks: &mut dyn CheckHooks,
    ) {
        let source = self.session.expr_form(file, value, cx);
        self.flow_forms(source, target, hooks, 0);
    }

    /// Report an object literal flowing into a declared type, then the
    /// literal's nested literals into the matching member types.
    fn flow_forms(
        &mut self,
        source: TypeForm,
        target: TypeForm,
        hooks: &mut dyn CheckHooks,
        depth: usize,
    ) {
        let TypeForm::Object(literal) = &source else {
            return;
        };
        if literal.origin != ObjectOrigin::Literal || depth >= MAX_HIERARCHY_DEPTH {
            return;
        }
        let declared = match &target {
            TypeForm::Object(object) => object.origin == ObjectOrigin::Declared,
            TypeForm::Instance(_) => true,
            _ => false,
        };
        if !declared {
            return;
        }

        let literal = literal.clone();
        let literal_handle = self.intern(source);
        let target_handle = self.intern(target.clone());
        hooks.object_flow(literal_handle, target_handle);

        for (name, property) in &literal.properties {
            let nested_source = self.session.member_decl_form(property);
            if !matches!(nested_source, TypeForm::Object(_)) {
                continue;
            }
            let nested_target = self.session.member_form(&target, name);
            self.flow_forms(nested_source, nested_target, hooks, depth + 1);
        }
    }
}

fn constructor_of(class: &Arc<ClassInfo>) -> Option<Arc<Signature>> {
    let mut current = Some(class.clone());
    for _ in 0..MAX_HIERARCHY_DEPTH {
        let class = current?;
        if let Some(signature) = &class.constructor {
            return Some(signature.clone());
        }
        current = class.superclass.clone();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::graph::WorkspaceGraph;
    use crate::ingest::parse_source;

    #[derive(Default)]
    struct Recorder {
        uses: Vec<(TypeHandle, String, usize)>,
        members: Vec<(TypeHandle, String, usize)>,
        keys: Vec<(TypeHandle, String, usize)>,
        flows: Vec<(TypeHandle, TypeHandle)>,
    }

    impl CheckHooks for Recorder {
        fn member_use(&mut self, receiver: TypeHandle, name: &str, location: &Location) {
            self.uses.push((receiver, name.to_string(), location.line));
        }
        fn class_member(&mut self, class: TypeHandle, name: &str, location: &Location) {
            self.members.push((class, name.to_string(), location.line));
        }
        fn object_key(&mut self, object: TypeHandle, name: &str, location: &Location) {
            self.keys.push((object, name.to_string(), location.line));
        }
        fn object_flow(&mut self, literal: TypeHandle, target: TypeHandle) {
            self.flows.push((literal, target));
        }
    }

    fn check(files: &[(&str, &str)], origin: &str) -> (tempfile::TempDir, TypedFile, Recorder) {
        let dir = tempfile::tempdir().unwrap();
        for (name, text) in files {
            std::fs::write(dir.path().join(name), text).unwrap();
        }
        let graph = Arc::new(WorkspaceGraph::open(dir.path(), &EngineConfig::default()).unwrap());
        let path = graph.root().join(origin);
        let text = std::fs::read_to_string(&path).unwrap();
        let parsed = parse_source(&path, &text).unwrap();
        let checker = StructuralChecker::new(graph);
        let mut recorder = Recorder::default();
        let typed = checker
            .check_file(&parsed, &Sources::new(), &mut recorder)
            .unwrap();
        (dir, typed, recorder)
    }

    fn class_name(form: &TypeForm) -> Option<String> {
        match form {
            TypeForm::Instance(class) | TypeForm::Class(class) => Some(class.name.clone()),
            _ => None,
        }
    }

    #[test]
    fn test_member_use_receivers_follow_new_and_inheritance() {
        let source = "class Base { m() {} }\nclass Derived extends Base {}\nconst d = new Derived();\nd.m();\n";
        let (_dir, typed, recorder) = check(&[("a.ts", source)], "a.ts");
        let (receiver, name, line) = recorder.uses.last().unwrap();
        assert_eq!((name.as_str(), *line), ("m", 4));
        let form = typed.resolve(*receiver);
        assert_eq!(class_name(&form).as_deref(), Some("Derived"));
        match form {
            TypeForm::Instance(class) => {
                assert_eq!(class.superclass.as_ref().map(|s| s.name.as_str()), Some("Base"));
            }
            other => panic!("expected instance, got {}", other.kind()),
        }
    }

    #[test]
    fn test_class_members_reported_once_per_pass() {
        let source = "class C {\n  x = 1;\n  static s() {}\n  constructor(private p: number) { this.q = 2; }\n}\n";
        let (_dir, typed, recorder) = check(&[("a.ts", source)], "a.ts");
        let mut names: Vec<_> = recorder.members.iter().map(|(_, n, _)| n.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["p", "q", "s", "x"]);
        let (statics, _, _) = recorder.members.iter().find(|(_, n, _)| n == "s").unwrap();
        assert!(matches!(typed.resolve(*statics), TypeForm::Class(_)));
        // `this.q = 2` declares q; it is not also a use.
        assert!(recorder.uses.iter().all(|(_, n, _)| n != "q"));
    }

    #[test]
    fn test_annotated_literal_flows_into_interface() {
        let source = "interface P { x: number }\nconst p: P = { x: 1 };\np.x;\n";
        let (_dir, typed, recorder) = check(&[("a.ts", source)], "a.ts");
        assert_eq!(recorder.flows.len(), 1);
        let (literal, target) = recorder.flows[0];
        match (typed.resolve(literal), typed.resolve(target)) {
            (TypeForm::Object(l), TypeForm::Object(t)) => {
                assert_eq!(l.origin, ObjectOrigin::Literal);
                assert_eq!(t.origin, ObjectOrigin::Declared);
                assert_eq!(t.properties["x"].location.line, 1);
            }
            _ => panic!("expected object forms"),
        }
        let (receiver, _, _) = recorder.uses.iter().find(|(_, n, _)| n == "x").unwrap();
        match typed.resolve(*receiver) {
            TypeForm::Object(object) => assert_eq!(object.origin, ObjectOrigin::Declared),
            other => panic!("expected object, got {}", other.kind()),
        }
    }

    #[test]
    fn test_imported_class_resolves_across_modules() {
        let (_dir, typed, recorder) = check(
            &[
                ("base.ts", "export class Base { run() {} }\n"),
                ("main.ts", "import { Base as B } from './base';\nnew B().run();\n"),
            ],
            "main.ts",
        );
        let (receiver, _, _) = recorder.uses.iter().find(|(_, n, _)| n == "run").unwrap();
        let form = typed.resolve(*receiver);
        assert_eq!(class_name(&form).as_deref(), Some("Base"));
    }

    #[test]
    fn test_nocheck_makes_receivers_dynamic() {
        let source = "// @ts-nocheck\nclass C { m() {} }\nnew C().m();\n";
        let (_dir, typed, recorder) = check(&[("a.ts", source)], "a.ts");
        let (receiver, _, _) = recorder.uses.iter().find(|(_, n, _)| n == "m").unwrap();
        assert!(matches!(typed.resolve(*receiver), TypeForm::Dynamic));
        assert!(!recorder.members.is_empty());
    }

    #[test]
    fn test_import_cycle_is_unresolved_not_fatal() {
        let (_dir, typed, recorder) = check(
            &[
                ("a.ts", "import { b } from './b';\nexport const a = b;\na.x;\n"),
                ("b.ts", "import { a } from './a';\nexport const b = a;\n"),
            ],
            "a.ts",
        );
        let (receiver, _, _) = recorder.uses.iter().find(|(_, n, _)| n == "x").unwrap();
        assert!(matches!(
            typed.resolve(*receiver),
            TypeForm::Unresolved | TypeForm::Dynamic
        ));
    }
}
