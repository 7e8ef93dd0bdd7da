//! Cross-file import correlation.
//!
//! Finds, in files that import a module, the local bindings standing for one
//! of its exports, and expands each to its full local use-set.
//! Handles default and named imports, renamed imports, namespace imports,
//! `import x = require()` and CommonJS `require()` in declarator position.

use crate::error::Result;
use crate::graph::ModuleGraph;
use crate::ingest::imports::ImportedName;
use crate::ingest::{ParsedFile, Sources};
use crate::pool::TaskPool;
use crate::resolve::identifier::resolve_in;
use crate::symbol::{sort_dedup, Cursor, Location};
use std::path::{Path, PathBuf};

/// Which export of the origin module is being followed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ImportQuery {
    /// The module value itself (`export default`, `module.exports =`).
    WholeModule,
    /// A named export.
    Named(String),
}

/// Read, parse and correlate one candidate file.
///
/// # Errors
/// The candidate cannot be read or parsed.
pub fn correlate(
    graph: &dyn ModuleGraph,
    sources: &Sources,
    origin: &Path,
    queries: &[ImportQuery],
    candidate: &Path,
) -> Result<Vec<Location>> {
    let parsed = sources.parse(candidate)?;
    correlate_parsed(graph, origin, queries, &parsed)
}

/// Locations in `candidate` that refer to the queried exports of `origin`.
pub fn correlate_parsed(
    graph: &dyn ModuleGraph,
    origin: &Path,
    queries: &[ImportQuery],
    candidate: &ParsedFile,
) -> Result<Vec<Location>> {
    let mut seeds = Vec::new();
    let mut found = Vec::new();

    for fact in &candidate.signature.imports {
        let target = graph.file_of_module(&graph.resolve_module(&candidate.path, &fact.specifier));
        if target.as_deref() != Some(origin) {
            continue;
        }
        for binding in &fact.bindings {
            for query in queries {
                match (&binding.imported, query) {
                    (ImportedName::Default | ImportedName::Module, ImportQuery::WholeModule) => {
                        seeds.push(binding.local.clone());
                    }
                    (ImportedName::Named(imported), ImportQuery::Named(name))
                        if imported == name =>
                    {
                        seeds.push(binding.local.clone());
                    }
                    (ImportedName::Namespace | ImportedName::Module, ImportQuery::Named(name)) => {
                        found.extend(member_tokens(candidate, &binding.local, name));
                    }
                    _ => {}
                }
            }
        }
    }

    for seed in seeds {
        let cursor = Cursor::new(seed.file.clone(), seed.byte_start);
        match resolve_in(candidate, &cursor)? {
            Some(local) => found.extend(local.locations),
            None => found.push(seed),
        }
    }

    if !found.is_empty() {
        log::debug!(
            "{}: {} reference(s) through imports of {}",
            candidate.path.display(),
            found.len(),
            origin.display()
        );
    }
    Ok(sort_dedup(found))
}

/// Correlate every candidate on the pool.
///
/// # Errors
/// `PartialFileFailure` naming every candidate that could not be read or
/// parsed.
pub fn correlate_all(
    pool: &TaskPool,
    graph: &dyn ModuleGraph,
    sources: &Sources,
    origin: &Path,
    queries: &[ImportQuery],
    candidates: &[PathBuf],
) -> Result<Vec<Location>> {
    let found = pool.map_reduce(
        candidates,
        |candidate| correlate(graph, sources, origin, queries, candidate),
        |mut acc, part| {
            acc.extend(part);
            acc
        },
        Vec::new(),
    )?;
    Ok(sort_dedup(found))
}

/// `ns.name` property tokens over the uses of a namespace-like local.
fn member_tokens(candidate: &ParsedFile, local: &Location, name: &str) -> Vec<Location> {
    let Some(occurrence) = candidate
        .scopes
        .occurrence_at_span(local.byte_start, local.byte_end)
    else {
        return Vec::new();
    };

    let mut tokens = Vec::new();
    for used in candidate.scopes.uses_of(occurrence.binding) {
        let Some(node) = candidate.node_at(&used) else {
            continue;
        };
        let Some(parent) = node.parent().filter(|p| p.kind() == "member_expression") else {
            continue;
        };
        if parent.child_by_field_name("object") != Some(node) {
            continue;
        }
        if let Some(property) = parent.child_by_field_name("property") {
            if candidate.text(property) == name {
                tokens.push(candidate.location(property));
            }
        }
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::error::SleuthError;
    use crate::graph::WorkspaceGraph;

    fn workspace(files: &[(&str, &str)]) -> (tempfile::TempDir, WorkspaceGraph) {
        let dir = tempfile::tempdir().unwrap();
        for (name, text) in files {
            let path = dir.path().join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(path, text).unwrap();
        }
        let graph = WorkspaceGraph::open(dir.path(), &EngineConfig::default()).unwrap();
        (dir, graph)
    }

    fn positions(locations: &[Location]) -> Vec<(usize, usize)> {
        locations.iter().map(|l| (l.line, l.column)).collect()
    }

    #[test]
    fn test_renamed_named_import_expands_to_uses() {
        let (_dir, graph) = workspace(&[
            ("a.ts", "export const foo = 1;\n"),
            ("b.ts", "import { foo as bar } from './a';\nbar + bar;\n"),
        ]);
        let origin = graph.root().join("a.ts");
        let found = correlate(
            &graph,
            &Sources::new(),
            &origin,
            &[ImportQuery::Named("foo".to_string())],
            &graph.root().join("b.ts"),
        )
        .unwrap();
        assert_eq!(positions(&found), vec![(1, 16), (2, 0), (2, 6)]);
    }

    #[test]
    fn test_namespace_and_require_members() {
        let (_dir, graph) = workspace(&[
            ("lib.js", "exports.run = () => 1;\n"),
            (
                "main.js",
                "const lib = require('./lib');\nimport * as ns from './lib';\nlib.run();\nns.run();\nns.stop();\n",
            ),
        ]);
        let origin = graph.root().join("lib.js");
        let found = correlate(
            &graph,
            &Sources::new(),
            &origin,
            &[ImportQuery::Named("run".to_string())],
            &graph.root().join("main.js"),
        )
        .unwrap();
        assert_eq!(positions(&found), vec![(3, 4), (4, 3)]);
    }

    #[test]
    fn test_whole_module_matches_default_and_require() {
        let (_dir, graph) = workspace(&[
            ("a.js", "module.exports = function () {};\n"),
            ("b.js", "const a = require('./a');\na();\n"),
            ("c.ts", "import x from './a';\nimport { y } from './a';\nx(y);\n"),
        ]);
        let origin = graph.root().join("a.js");
        let candidates = vec![graph.root().join("b.js"), graph.root().join("c.ts")];
        let found = correlate_all(
            &TaskPool::new(2),
            &graph,
            &Sources::new(),
            &origin,
            &[ImportQuery::WholeModule],
            &candidates,
        )
        .unwrap();
        let files: Vec<_> = found
            .iter()
            .map(|l| l.file.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(files, vec!["b.js", "b.js", "c.ts", "c.ts"]);
    }

    #[test]
    fn test_unrelated_imports_are_ignored() {
        let (_dir, graph) = workspace(&[
            ("a.ts", "export const foo = 1;\n"),
            ("other.ts", "export const foo = 2;\n"),
            ("b.ts", "import { foo } from './other';\nfoo;\n"),
        ]);
        let found = correlate(
            &graph,
            &Sources::new(),
            &graph.root().join("a.ts"),
            &[ImportQuery::Named("foo".to_string())],
            &graph.root().join("b.ts"),
        )
        .unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn test_unparsable_candidate_fails_the_batch() {
        let (_dir, graph) = workspace(&[
            ("a.ts", "export const foo = 1;\n"),
            ("b.ts", "import { foo } from './a';\nfoo;\n"),
            ("c.ts", "import { foo } from './a';\nfoo(;\n"),
        ]);
        let candidates = vec![graph.root().join("b.ts"), graph.root().join("c.ts")];
        let result = correlate_all(
            &TaskPool::new(2),
            &graph,
            &Sources::new(),
            &graph.root().join("a.ts"),
            &[ImportQuery::Named("foo".to_string())],
            &candidates,
        );
        match result {
            Err(SleuthError::PartialFileFailure { failures }) => {
                assert_eq!(failures.len(), 1);
                assert!(failures[0].0.ends_with("c.ts"));
            }
            other => panic!("expected partial failure, got {:?}", other),
        }
    }
}
