//! End-to-end find-references tests over on-disk workspaces.

#[cfg(test)]
mod tests {
    use sleuth::config::EngineConfig;
    use sleuth::query::QueryOutcome;
    use sleuth::symbol::ReferenceInfo;
    use sleuth::{Engine, QueryText, SleuthError};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn workspace(files: &[(&str, &str)]) -> (TempDir, Engine) {
        let dir = TempDir::new().expect("Failed to create temp dir");
        for (name, text) in files {
            std::fs::write(dir.path().join(name), text).expect("Failed to write file");
        }
        let engine = Engine::for_workspace(dir.path(), &EngineConfig::default())
            .expect("Failed to build engine");
        (dir, engine)
    }

    fn query(
        dir: &TempDir,
        engine: &Engine,
        file: &str,
        line: usize,
        column: usize,
        global: bool,
    ) -> ReferenceInfo {
        let (result, telemetry) =
            engine.find_references(&dir.path().join(file), line, column, QueryText::Disk, global);
        assert_eq!(telemetry.result, QueryOutcome::Success);
        result
            .expect("query should succeed")
            .expect("cursor should be on a resolvable entity")
    }

    /// `(file name, line, column)` for each location, in result order.
    fn positions(info: &ReferenceInfo) -> Vec<(String, usize, usize)> {
        info.locations
            .iter()
            .map(|l| {
                let name = l
                    .file
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                (name, l.line, l.column)
            })
            .collect()
    }

    fn at(file: &str, line: usize, column: usize) -> (String, usize, usize) {
        (file.to_string(), line, column)
    }

    #[test]
    fn test_every_occurrence_of_a_local_binding() {
        let (dir, engine) = workspace(&[("a.ts", "export const x = 1; console.log(x + x);\n")]);

        for column in [13, 32, 36] {
            let info = query(&dir, &engine, "a.ts", 1, column, false);
            assert_eq!(info.name, "x");
            assert_eq!(
                positions(&info),
                vec![at("a.ts", 1, 13), at("a.ts", 1, 32), at("a.ts", 1, 36)]
            );
            assert_eq!(info.dependent_files, None);
        }
    }

    #[test]
    fn test_whitespace_resolves_to_nothing() {
        let (dir, engine) = workspace(&[("a.ts", "let a = 1;\n\n")]);
        let (result, telemetry) =
            engine.find_references(&dir.path().join("a.ts"), 2, 0, QueryText::Disk, false);
        assert!(result.expect("query should succeed").is_none());
        assert_eq!(telemetry.result, QueryOutcome::Success);
    }

    #[test]
    fn test_exported_function_keeps_its_name_across_aliases() {
        let (dir, engine) = workspace(&[
            ("a.ts", "export function foo() {}\nfoo();\n"),
            ("b.ts", "import { foo as bar } from './a';\nbar();\nbar();\n"),
        ]);

        let info = query(&dir, &engine, "a.ts", 1, 16, true);
        assert_eq!(info.name, "foo");
        assert_eq!(
            positions(&info),
            vec![
                at("a.ts", 1, 16),
                at("a.ts", 2, 0),
                at("b.ts", 1, 16),
                at("b.ts", 2, 0),
                at("b.ts", 3, 0),
            ]
        );
        assert_eq!(info.dependent_files, Some(1));
    }

    #[test]
    fn test_local_mode_ignores_importers() {
        let (dir, engine) = workspace(&[
            ("a.ts", "export function foo() {}\nfoo();\n"),
            ("b.ts", "import { foo } from './a';\nfoo();\n"),
        ]);

        let info = query(&dir, &engine, "a.ts", 2, 0, false);
        assert_eq!(positions(&info), vec![at("a.ts", 1, 16), at("a.ts", 2, 0)]);
        assert_eq!(info.dependent_files, None);
    }

    #[test]
    fn test_commonjs_export_reaches_destructured_require() {
        let (dir, engine) = workspace(&[
            ("lib.js", "function helper() {}\nmodule.exports = { helper };\n"),
            ("main.js", "const { helper } = require('./lib');\nhelper();\n"),
        ]);

        let info = query(&dir, &engine, "lib.js", 1, 9, true);
        assert_eq!(info.name, "helper");
        assert_eq!(
            positions(&info),
            vec![
                at("lib.js", 1, 9),
                at("lib.js", 2, 19),
                at("main.js", 1, 8),
                at("main.js", 2, 0),
            ]
        );
        assert_eq!(info.dependent_files, Some(1));
    }

    #[test]
    fn test_inherited_method_follows_subclasses_but_not_lookalikes() {
        let (dir, engine) = workspace(&[
            ("base.ts", "export class Base { m() {} }\n"),
            (
                "derived.ts",
                "import { Base } from './base';\nexport class Derived extends Base {}\n",
            ),
            (
                "use.ts",
                "import { Base } from './base';\n\
                 import { Derived } from './derived';\n\
                 class Other { m() {} }\n\
                 new Base().m();\n\
                 new Derived().m();\n\
                 new Other().m();\n",
            ),
        ]);

        let info = query(&dir, &engine, "base.ts", 1, 20, true);
        assert_eq!(info.name, "m");
        assert_eq!(
            positions(&info),
            vec![at("base.ts", 1, 20), at("use.ts", 4, 11), at("use.ts", 5, 14)]
        );
        assert_eq!(info.dependent_files, Some(2));
    }

    #[test]
    fn test_literal_flowing_into_two_interfaces_unions_them() {
        let (dir, engine) = workspace(&[
            (
                "types.ts",
                "export interface A { x: number }\nexport interface B { x: number }\n",
            ),
            (
                "main.ts",
                "import { A, B } from './types';\n\
                 const lit = { x: 1 };\n\
                 const a: A = lit;\n\
                 const b: B = lit;\n\
                 function readA(p: A) { return p.x; }\n\
                 function readB(p: B) { return p.x; }\n",
            ),
        ]);

        let info = query(&dir, &engine, "main.ts", 2, 14, true);
        assert_eq!(info.name, "x");
        assert_eq!(
            positions(&info),
            vec![
                at("main.ts", 2, 14),
                at("main.ts", 5, 32),
                at("main.ts", 6, 32),
                at("types.ts", 1, 21),
                at("types.ts", 2, 21),
            ]
        );
    }

    #[test]
    fn test_repeated_queries_are_identical() {
        let (dir, engine) = workspace(&[
            ("a.ts", "export class K { run() {} }\n"),
            ("b.ts", "import { K } from './a';\nconst k = new K();\nk.run();\n"),
        ]);

        let first = query(&dir, &engine, "a.ts", 1, 17, true);
        let second = query(&dir, &engine, "a.ts", 1, 17, true);
        assert_eq!(first, second);
        assert_eq!(positions(&first), vec![at("a.ts", 1, 17), at("b.ts", 3, 2)]);
    }

    #[test]
    fn test_unparsable_dependent_fails_the_whole_query() {
        let (dir, engine) = workspace(&[
            ("a.ts", "export function foo() {}\n"),
            ("b.ts", "import { foo } from './a';\nfoo();\n"),
            ("c.ts", "import { foo } from './a';\nfoo(;\n"),
        ]);

        let (result, telemetry) =
            engine.find_references(&dir.path().join("a.ts"), 1, 16, QueryText::Disk, true);
        match result {
            Err(SleuthError::PartialFileFailure { failures }) => {
                let failed: Vec<PathBuf> = failures.into_iter().map(|(path, _)| path).collect();
                assert_eq!(failed.len(), 1);
                assert!(failed[0].ends_with("c.ts"));
            }
            other => panic!("expected PartialFileFailure, got {:?}", other),
        }
        assert_eq!(telemetry.result, QueryOutcome::Failure);
        assert!(telemetry.global);
    }

    #[test]
    fn test_buffer_text_is_used_for_the_query_file() {
        let (dir, engine) = workspace(&[
            ("a.ts", "export function foo() {}\n"),
            ("b.ts", "import { foo } from './a';\nfoo();\n"),
        ]);

        let buffer = "export function foo() {}\nfoo();\nfoo();\n".to_string();
        let (result, _) =
            engine.find_references(&dir.path().join("a.ts"), 3, 0, QueryText::Buffer(buffer), true);
        let info = result.unwrap().unwrap();
        assert_eq!(
            positions(&info),
            vec![
                at("a.ts", 1, 16),
                at("a.ts", 2, 0),
                at("a.ts", 3, 0),
                at("b.ts", 1, 9),
                at("b.ts", 2, 0),
            ]
        );
    }

    #[test]
    fn test_dependents_are_transitive() {
        let (dir, engine) = workspace(&[
            ("a.ts", "export const v = 1;\n"),
            ("b.ts", "export { v } from './a';\n"),
            ("c.ts", "import { v } from './b';\n"),
            ("d.ts", "const lone = 1;\n"),
        ]);

        let dependents = engine
            .dependents_of(&dir.path().join("a.ts"))
            .expect("dependents should resolve");
        let names: Vec<String> = dependents
            .iter()
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
            .collect();
        assert_eq!(names, vec!["b.ts".to_string(), "c.ts".to_string()]);
    }
}
