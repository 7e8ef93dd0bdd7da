//! Property reference scanning in one file.
//!
//! A scan checks the file with an [`AccessCollector`] of its own, then keeps
//! the accesses whose receiver resolves back to the queried identity. Scans
//! never touch shared state, so any number can run in parallel.

use super::{override_chain, DefinitionIdentity};
use crate::error::Result;
use crate::infer::{CheckHooks, InferenceOracle, TypeForm, TypeHandle, TypedFile};
use crate::ingest::{node_text, ParsedFile, Sources};
use crate::symbol::{sort_dedup, Location};
use std::collections::BTreeMap;

/// Node kinds that can carry a property name.
const PROPERTY_TOKEN_KINDS: &[&str] = &[
    "property_identifier",
    "private_property_identifier",
    "shorthand_property_identifier",
    "shorthand_property_identifier_pattern",
    "string_fragment",
    "number",
    "identifier",
];

/// Whether any property-name token in the file spells `name`.
///
/// Plain identifiers are included because TypeScript parameter properties
/// declare members with them.
pub fn mentions_property(parsed: &ParsedFile, name: &str) -> bool {
    let source = parsed.source.as_bytes();
    let mut cursor = parsed.tree.walk();
    loop {
        let node = cursor.node();
        if PROPERTY_TOKEN_KINDS.contains(&node.kind()) && node_text(node, source) == name {
            return true;
        }
        if cursor.goto_first_child() || cursor.goto_next_sibling() {
            continue;
        }
        loop {
            if !cursor.goto_parent() {
                return false;
            }
            if cursor.goto_next_sibling() {
                break;
            }
        }
    }
}

/// Collects accesses and keys of one property name.
#[derive(Debug)]
struct AccessCollector<'n> {
    name: &'n str,
    uses: BTreeMap<Location, TypeHandle>,
    keys: BTreeMap<Location, TypeHandle>,
    flows: Vec<(TypeHandle, TypeHandle)>,
}

impl<'n> AccessCollector<'n> {
    fn new(name: &'n str) -> Self {
        Self {
            name,
            uses: BTreeMap::new(),
            keys: BTreeMap::new(),
            flows: Vec::new(),
        }
    }
}

impl CheckHooks for AccessCollector<'_> {
    fn member_use(&mut self, receiver: TypeHandle, name: &str, location: &Location) {
        if name == self.name {
            self.uses.insert(location.clone(), receiver);
        }
    }

    fn class_member(&mut self, class: TypeHandle, name: &str, location: &Location) {
        if name == self.name {
            self.keys.insert(location.clone(), class);
        }
    }

    fn object_key(&mut self, object: TypeHandle, name: &str, location: &Location) {
        if name == self.name {
            self.keys.insert(location.clone(), object);
        }
    }

    fn object_flow(&mut self, literal: TypeHandle, target: TypeHandle) {
        self.flows.push((literal, target));
    }
}

/// Every location in `parsed` referring to property `name` of `identity`,
/// sorted. Declaration sites of the identity that lie in this file are
/// included exactly once.
///
/// # Errors
/// Checker failures. Receivers that are dynamic, unresolved or failed are
/// excluded, never errors.
pub fn scan(
    parsed: &ParsedFile,
    oracle: &dyn InferenceOracle,
    sources: &Sources,
    identity: &DefinitionIdentity,
    name: &str,
) -> Result<Vec<Location>> {
    let own_sites: Vec<Location> = identity
        .locations()
        .into_iter()
        .filter(|l| l.file == parsed.path)
        .collect();

    if !mentions_property(parsed, name) {
        log::debug!("{}: no '{}' token, skipped", parsed.path.display(), name);
        return Ok(sort_dedup(own_sites));
    }

    let mut collector = AccessCollector::new(name);
    let typed = oracle.check_file(parsed, sources, &mut collector)?;

    let mut found = Vec::new();
    for (location, receiver) in &collector.uses {
        let form = oracle.resolve_type(&typed, *receiver);
        if receiver_matches(oracle, &typed, &form, identity, name) {
            found.push(location.clone());
        }
    }

    for (location, owner) in &collector.keys {
        let form = oracle.resolve_type(&typed, *owner);
        if key_matches(oracle, &typed, &form, &collector.flows, identity, name) {
            found.push(location.clone());
        }
    }

    found.retain(|l| !identity.is_site(l));
    found.extend(own_sites);
    let found = sort_dedup(found);
    log::debug!(
        "{}: {} reference(s) to '{}'",
        parsed.path.display(),
        found.len(),
        name
    );
    Ok(found)
}

fn receiver_matches(
    oracle: &dyn InferenceOracle,
    typed: &TypedFile,
    form: &TypeForm,
    identity: &DefinitionIdentity,
    name: &str,
) -> bool {
    match form {
        TypeForm::Instance(_) | TypeForm::Class(_) => {
            match override_chain(oracle, typed, form, name) {
                Ok(chain) => identity.matches_chain(&chain),
                Err(err) => {
                    log::debug!("receiver excluded: {}", err);
                    false
                }
            }
        }
        TypeForm::Object(object) => object
            .properties
            .get(name)
            .is_some_and(|p| identity.matches_object_site(&p.location)),
        _ => false,
    }
}

/// A key matches when its own declaration is the identity, or when its
/// literal flows into a type whose `name` is the identity.
fn key_matches(
    oracle: &dyn InferenceOracle,
    typed: &TypedFile,
    owner: &TypeForm,
    flows: &[(TypeHandle, TypeHandle)],
    identity: &DefinitionIdentity,
    name: &str,
) -> bool {
    if receiver_matches(oracle, typed, owner, identity, name) {
        return true;
    }
    let TypeForm::Object(object) = owner else {
        return false;
    };
    flows.iter().any(|(literal, target)| {
        let same_literal = matches!(
            oracle.resolve_type(typed, *literal),
            TypeForm::Object(ref l) if l.decl == object.decl
        );
        same_literal
            && receiver_matches(oracle, typed, &oracle.resolve_type(typed, *target), identity, name)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::graph::WorkspaceGraph;
    use crate::infer::StructuralChecker;
    use crate::ingest::parse_source;
    use std::collections::BTreeSet;
    use std::sync::Arc;

    fn setup(source: &str) -> (tempfile::TempDir, ParsedFile, StructuralChecker) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.ts"), source).unwrap();
        let graph = Arc::new(WorkspaceGraph::open(dir.path(), &EngineConfig::default()).unwrap());
        let path = graph.root().join("a.ts");
        let parsed = parse_source(&path, source).unwrap();
        (dir, parsed, StructuralChecker::new(graph))
    }

    fn token(parsed: &ParsedFile, needle: &str, nth: usize) -> Location {
        let start = parsed.source.match_indices(needle).nth(nth).unwrap().0;
        let node = parsed
            .root()
            .named_descendant_for_byte_range(start, start + needle.len())
            .unwrap();
        parsed.location(node)
    }

    fn lines(locations: &[Location]) -> Vec<usize> {
        locations.iter().map(|l| l.line).collect()
    }

    #[test]
    fn test_inherited_member_matches_through_chain() {
        let source = "class Base { m() {} }\nclass Derived extends Base {}\nclass Other { m() {} }\nnew Base().m();\nnew Derived().m();\nnew Other().m();\n";
        let (_dir, parsed, checker) = setup(source);
        let identity = DefinitionIdentity::ClassMember(vec![token(&parsed, "m", 0)]);
        let found = scan(&parsed, &checker, &Sources::new(), &identity, "m").unwrap();
        assert_eq!(lines(&found), vec![1, 4, 5]);
    }

    #[test]
    fn test_override_is_a_different_member() {
        let source = "class Base { m() {} }\nclass Derived extends Base { m() {} }\nnew Base().m();\nnew Derived().m();\n";
        let (_dir, parsed, checker) = setup(source);
        let identity = DefinitionIdentity::ClassMember(vec![token(&parsed, "m", 0)]);
        let found = scan(&parsed, &checker, &Sources::new(), &identity, "m").unwrap();
        assert_eq!(lines(&found), vec![1, 3]);
    }

    #[test]
    fn test_dynamic_receivers_are_excluded() {
        let source = "interface P { x: number }\nfunction f(p: P, q: any) { p.x; q.x; }\n";
        let (_dir, parsed, checker) = setup(source);
        let identity = DefinitionIdentity::ObjectProperty(BTreeSet::from([token(&parsed, "x", 0)]));
        let found = scan(&parsed, &checker, &Sources::new(), &identity, "x").unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[1].column, 29);
    }

    #[test]
    fn test_flowing_literal_keys_are_references() {
        let source = "interface P { x: number }\nconst p: P = { x: 1 };\nconst free = { x: 2 };\n";
        let (_dir, parsed, checker) = setup(source);
        let identity = DefinitionIdentity::ObjectProperty(BTreeSet::from([token(&parsed, "x", 0)]));
        let found = scan(&parsed, &checker, &Sources::new(), &identity, "x").unwrap();
        assert_eq!(lines(&found), vec![1, 2]);
    }

    #[test]
    fn test_prefilter_skips_files_without_the_name() {
        let (_dir, parsed, checker) = setup("const a = 1;\n");
        assert!(!mentions_property(&parsed, "zzz"));
        let identity = DefinitionIdentity::ObjectProperty(BTreeSet::from([Location {
            file: parsed.path.clone(),
            byte_start: 6,
            byte_end: 7,
            line: 1,
            column: 6,
        }]));
        let found = scan(&parsed, &checker, &Sources::new(), &identity, "zzz").unwrap();
        assert_eq!(found.len(), 1);
    }
}
