//! Driving the engine with an inference oracle defined outside the crate.

use sleuth::graph::WorkspaceGraph;
use sleuth::infer::{
    CheckHooks, InferenceOracle, MemberDecl, MemberType, ObjectInfo, ObjectOrigin, TypeForm,
    TypeHandle, TypedFile,
};
use sleuth::ingest::{ParsedFile, Sources};
use sleuth::pool::TaskPool;
use sleuth::symbol::Location;
use sleuth::{Engine, QueryText};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Treats every receiver of `k` as one object whose key is the first `k`
/// property token in the file.
#[derive(Default)]
struct UniformOracle {
    checked: AtomicUsize,
}

impl InferenceOracle for UniformOracle {
    fn check_file(
        &self,
        parsed: &ParsedFile,
        _sources: &Sources,
        hooks: &mut dyn CheckHooks,
    ) -> sleuth::Result<TypedFile> {
        self.checked.fetch_add(1, Ordering::SeqCst);

        let tokens: Vec<Location> = parsed
            .source
            .match_indices('k')
            .filter_map(|(start, _)| {
                parsed
                    .root()
                    .named_descendant_for_byte_range(start, start + 1)
            })
            .filter(|node| node.kind() == "property_identifier")
            .map(|node| parsed.location(node))
            .collect();
        let Some((key, uses)) = tokens.split_first() else {
            return Ok(TypedFile::new(parsed.path.clone(), Vec::new()));
        };

        let object = ObjectInfo {
            decl: key.clone(),
            origin: ObjectOrigin::Declared,
            properties: BTreeMap::from([(
                "k".to_string(),
                MemberDecl {
                    location: key.clone(),
                    ty: MemberType::Unknown,
                },
            )]),
        };
        hooks.object_key(TypeHandle(0), "k", key);
        for site in uses {
            hooks.member_use(TypeHandle(0), "k", site);
        }
        Ok(TypedFile::new(
            parsed.path.clone(),
            vec![TypeForm::Object(Arc::new(object))],
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sleuth::config::EngineConfig;
    use tempfile::TempDir;

    fn engine(source: &str) -> (TempDir, Arc<UniformOracle>, Engine) {
        let dir = TempDir::new().expect("Failed to create temp dir");
        std::fs::write(dir.path().join("a.ts"), source).expect("Failed to write a.ts");
        let graph = Arc::new(
            WorkspaceGraph::open(dir.path(), &EngineConfig::default())
                .expect("Failed to open workspace"),
        );
        let oracle = Arc::new(UniformOracle::default());
        let engine = Engine::new(graph.clone(), graph, oracle.clone(), TaskPool::new(1));
        (dir, oracle, engine)
    }

    #[test]
    fn test_property_query_uses_the_supplied_oracle() {
        let (dir, oracle, engine) = engine("const o = { k: 1 };\no.k;\nother.k;\n");

        let (result, _) =
            engine.find_references(&dir.path().join("a.ts"), 1, 12, QueryText::Disk, false);
        let info = result
            .expect("query should succeed")
            .expect("key should resolve");

        // `other` is untyped for the built-in checker; this oracle says otherwise.
        let positions: Vec<(usize, usize)> =
            info.locations.iter().map(|l| (l.line, l.column)).collect();
        assert_eq!(info.name, "k");
        assert_eq!(positions, vec![(1, 12), (2, 2), (3, 6)]);
        assert_eq!(oracle.checked.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_identifier_query_never_checks() {
        let (dir, oracle, engine) = engine("const o = { k: 1 };\no.k;\n");

        let (result, _) =
            engine.find_references(&dir.path().join("a.ts"), 2, 0, QueryText::Disk, false);
        let info = result
            .expect("query should succeed")
            .expect("identifier should resolve");

        assert_eq!(info.name, "o");
        assert_eq!(info.locations.len(), 2);
        assert_eq!(oracle.checked.load(Ordering::SeqCst), 0);
    }
}
