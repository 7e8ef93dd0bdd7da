//! Find-references orchestration.
//!
//! [`Engine::find_references`] runs one query through three stages:
//!
//! 1. **Local identifier**: lexical resolution in the origin file. Local
//!    queries stop here. Global queries on an exported binding pivot to
//!    the import correlator over the dependent files.
//! 2. **Property path**: classify the property under the cursor, derive its
//!    definition identity and scan the origin file.
//! 3. **Global expansion**: focus the identity's files, ask the module graph
//!    for their dependents and scan roots ∪ dependents on the worker pool.
//!
//! Every query is independent: nothing computed for one query is reused by
//! the next.

use crate::config::EngineConfig;
use crate::error::{Result, SleuthError};
use crate::graph::{Focus, ModuleGraph, WorkspaceGraph};
use crate::infer::{InferenceOracle, StructuralChecker};
use crate::ingest::exports::{ExportEntry, ExportKind, ExportName};
use crate::ingest::{parse_source, ParsedFile, Sources};
use crate::pool::TaskPool;
use crate::resolve::cross_file::{correlate_all, ImportQuery};
use crate::resolve::identifier::{resolve_in, IdentifierMatch, MatchOrigin};
use crate::resolve::references::classify::classify;
use crate::resolve::references::property::scan;
use crate::resolve::references::{identity_of, DefinitionIdentity};
use crate::symbol::{Cursor, FileSet, Location, ReferenceInfo};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where the origin file's text comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryText {
    /// Read the file from disk.
    Disk,
    /// Use this buffer (unsaved editor content) instead of the file on disk.
    Buffer(String),
}

/// Outcome recorded in telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryOutcome {
    /// The query returned a result (possibly `None`).
    Success,
    /// The query failed.
    Failure,
}

/// Per-query observability record.
#[derive(Debug, Clone, Serialize)]
pub struct Telemetry {
    /// Random id of the query.
    pub query_id: String,
    /// RFC 3339 UTC start time.
    pub started_at: String,
    /// Success or failure.
    pub result: QueryOutcome,
    /// Whether the query was global.
    pub global: bool,
    /// Number of dependent files consulted, for global expansions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deps: Option<usize>,
}

/// What a worker needs to scan one file for a property.
struct ScanSnapshot {
    oracle: Arc<dyn InferenceOracle>,
    sources: Sources,
    identity: DefinitionIdentity,
    name: String,
}

impl ScanSnapshot {
    fn scan_file(&self, path: &Path) -> Result<Vec<Location>> {
        let parsed = self.sources.parse(path)?;
        scan(&parsed, self.oracle.as_ref(), &self.sources, &self.identity, &self.name)
    }
}

/// The find-references engine.
pub struct Engine {
    graph: Arc<dyn ModuleGraph>,
    focus: Arc<dyn Focus>,
    oracle: Arc<dyn InferenceOracle>,
    pool: TaskPool,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").field("pool", &self.pool).finish_non_exhaustive()
    }
}

impl Engine {
    /// Assemble an engine from its collaborators.
    pub fn new(
        graph: Arc<dyn ModuleGraph>,
        focus: Arc<dyn Focus>,
        oracle: Arc<dyn InferenceOracle>,
        pool: TaskPool,
    ) -> Self {
        Self {
            graph,
            focus,
            oracle,
            pool,
        }
    }

    /// Engine over the workspace rooted at `root`: a [`WorkspaceGraph`] as
    /// graph and focus, a [`StructuralChecker`] as oracle.
    ///
    /// # Errors
    /// Invalid configuration or an unreadable root.
    pub fn for_workspace(root: &Path, config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        let graph = Arc::new(WorkspaceGraph::open(root, config)?);
        let oracle = Arc::new(StructuralChecker::new(graph.clone()));
        let pool = TaskPool::new(config.worker_threads());
        log::debug!(
            "engine over {} ({} files, {} workers)",
            graph.root().display(),
            graph.files().len(),
            pool.threads()
        );
        Ok(Self::new(graph.clone(), graph, oracle, pool))
    }

    /// The module graph.
    pub fn graph(&self) -> &dyn ModuleGraph {
        self.graph.as_ref()
    }

    /// Files depending on `file`, transitively.
    pub fn dependents_of(&self, file: &Path) -> Result<FileSet> {
        let file = std::fs::canonicalize(file).map_err(|e| SleuthError::io(file, e))?;
        let roots = FileSet::from([file]);
        self.focus.ensure_focused(&roots)?;
        Ok(self.dependents(&roots))
    }

    /// Find every reference to the entity at `line`:`column` of `path`.
    ///
    /// `line` is 1-based, `column` 0-based in bytes. `Ok(None)` means there
    /// is nothing to resolve under the cursor. The telemetry record is
    /// returned (and logged) whether or not the query succeeded.
    pub fn find_references(
        &self,
        path: &Path,
        line: usize,
        column: usize,
        text: QueryText,
        global: bool,
    ) -> (Result<Option<ReferenceInfo>>, Telemetry) {
        let query_id = uuid::Uuid::new_v4().to_string();
        let started_at = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        let mut deps = None;

        let result = self.run(path, line, column, text, global, &mut deps);
        if let Err(err) = &result {
            log::warn!("query {} failed: {}", query_id, err);
        }

        let telemetry = Telemetry {
            query_id,
            started_at,
            result: if result.is_ok() {
                QueryOutcome::Success
            } else {
                QueryOutcome::Failure
            },
            global,
            deps,
        };
        match serde_json::to_string(&telemetry) {
            Ok(line) => log::info!("{}", line),
            Err(err) => log::warn!("telemetry not serializable: {}", err),
        }
        (result, telemetry)
    }

    fn run(
        &self,
        path: &Path,
        line: usize,
        column: usize,
        text: QueryText,
        global: bool,
        deps: &mut Option<usize>,
    ) -> Result<Option<ReferenceInfo>> {
        let (file, sources) = match text {
            QueryText::Disk => {
                let file = std::fs::canonicalize(path).map_err(|e| SleuthError::io(path, e))?;
                (file, Sources::new())
            }
            QueryText::Buffer(buffer) => {
                let file = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
                let sources = Sources::new().with_overlay(file.clone(), buffer);
                (file, sources)
            }
        };
        let source = sources.read(&file)?;
        let cursor = Cursor::from_line_column(&file, &source, line, column)?;
        let parsed = parse_source(&file, &source)?;

        if let Some(found) = resolve_in(&parsed, &cursor)? {
            if !global {
                return Ok(Some(ReferenceInfo::new(found.name, found.locations, None)));
            }
            return self.expand_variable(&parsed, &sources, found, deps).map(Some);
        }

        let Some(classification) =
            classify(&parsed, self.oracle.as_ref(), &sources, &cursor)?
        else {
            return Ok(None);
        };
        let Some(identity) = identity_of(
            self.oracle.as_ref(),
            &classification.typed,
            &classification.evidence,
        )?
        else {
            log::debug!("'{}' has no declaration to follow", classification.evidence.name());
            return Ok(None);
        };
        let name = classification.evidence.name().to_string();

        let local = scan(&parsed, self.oracle.as_ref(), &sources, &identity, &name)?;
        if !global {
            return Ok(Some(ReferenceInfo::new(name, local, None)));
        }
        self.expand_property(&parsed.path, sources, identity, name, local, deps)
            .map(Some)
    }

    /// Global stage of a variable query.
    fn expand_variable(
        &self,
        parsed: &ParsedFile,
        sources: &Sources,
        found: IdentifierMatch,
        deps: &mut Option<usize>,
    ) -> Result<ReferenceInfo> {
        let exports = exports_of(parsed, &found);
        if exports.is_empty() {
            log::debug!("'{}' is not exported; local results only", found.name);
            return Ok(ReferenceInfo::new(found.name, found.locations, None));
        }

        let mut queries: Vec<ImportQuery> = exports.iter().copied().map(import_query).collect();
        queries.sort_by_key(|q| match q {
            ImportQuery::WholeModule => String::new(),
            ImportQuery::Named(name) => name.clone(),
        });
        queries.dedup();

        let mut locations = found.locations;
        for entry in &exports {
            locations.extend(
                parsed
                    .signature
                    .pseudo_uses
                    .iter()
                    .filter(|(name, _)| ExportName::Named(name.clone()) == entry.name)
                    .map(|(_, loc)| loc.clone()),
            );
        }

        let roots = FileSet::from([parsed.path.clone()]);
        self.focus.ensure_focused(&roots)?;
        let dependents = self.dependents(&roots);
        *deps = Some(dependents.len());

        let candidates: Vec<PathBuf> = roots.union(&dependents).cloned().collect();
        log::debug!(
            "'{}' exported as {:?}; correlating {} file(s)",
            found.name,
            queries,
            candidates.len()
        );
        locations.extend(correlate_all(
            &self.pool,
            self.graph.as_ref(),
            sources,
            &parsed.path,
            &queries,
            &candidates,
        )?);

        Ok(ReferenceInfo::new(found.name, locations, Some(dependents.len())))
    }

    /// Global stage of a property query.
    fn expand_property(
        &self,
        origin: &Path,
        sources: Sources,
        identity: DefinitionIdentity,
        name: String,
        local: Vec<Location>,
        deps: &mut Option<usize>,
    ) -> Result<ReferenceInfo> {
        let roots = identity.files();
        self.focus.ensure_focused(&roots)?;
        let dependents = self.dependents(&roots);
        *deps = Some(dependents.len());

        let candidates: Vec<PathBuf> = roots
            .union(&dependents)
            .filter(|f| f.as_path() != origin)
            .cloned()
            .collect();
        log::debug!(
            "scanning {} file(s) for '{}' ({} root(s))",
            candidates.len(),
            name,
            roots.len()
        );

        let snapshot = ScanSnapshot {
            oracle: self.oracle.clone(),
            sources,
            identity,
            name,
        };
        let mut locations = local;
        locations.extend(self.pool.map_reduce(
            &candidates,
            |file| snapshot.scan_file(file),
            |mut acc, part| {
                acc.extend(part);
                acc
            },
            Vec::new(),
        )?);

        Ok(ReferenceInfo::new(snapshot.name, locations, Some(dependents.len())))
    }

    fn dependents(&self, roots: &FileSet) -> FileSet {
        let unchanged: FileSet = self.graph.files().difference(roots).cloned().collect();
        let modules: BTreeSet<String> = roots
            .iter()
            .filter_map(|f| self.graph.module_name(f))
            .collect();
        self.graph.dependent_files(&unchanged, roots, &modules)
    }
}

/// Export entries that export the matched entity.
fn exports_of<'p>(parsed: &'p ParsedFile, found: &IdentifierMatch) -> Vec<&'p ExportEntry> {
    let exports = &parsed.signature.exports;
    match found.origin {
        MatchOrigin::Binding(_) => exports
            .iter()
            .filter(|e| {
                e.local.as_ref().is_some_and(|l| found.locations.contains(l))
                    && !matches!(e.kind, ExportKind::Reexport { .. })
            })
            .collect(),
        MatchOrigin::ExportToken => exports
            .iter()
            .filter(|e| e.name == ExportName::Named(found.name.clone()))
            .collect(),
    }
}

fn import_query(entry: &ExportEntry) -> ImportQuery {
    match (&entry.kind, &entry.name) {
        (ExportKind::CommonJsModule, _) | (_, ExportName::Default) => ImportQuery::WholeModule,
        (_, ExportName::Named(name)) => ImportQuery::Named(name.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(files: &[(&str, &str)]) -> (tempfile::TempDir, Engine) {
        let dir = tempfile::tempdir().unwrap();
        for (name, text) in files {
            std::fs::write(dir.path().join(name), text).unwrap();
        }
        let engine = Engine::for_workspace(dir.path(), &EngineConfig::default()).unwrap();
        (dir, engine)
    }

    #[test]
    fn test_local_query_has_no_dependents() {
        let (dir, engine) = engine(&[("a.ts", "let a = 1;\na;\n")]);
        let (result, telemetry) =
            engine.find_references(&dir.path().join("a.ts"), 2, 0, QueryText::Disk, false);
        let info = result.unwrap().unwrap();
        assert_eq!(info.name, "a");
        assert_eq!(info.locations.len(), 2);
        assert_eq!(info.dependent_files, None);
        assert_eq!(telemetry.result, QueryOutcome::Success);
        assert!(!telemetry.global);
    }

    #[test]
    fn test_buffer_shadows_disk() {
        let (dir, engine) = engine(&[("a.ts", "let a = 1;\n")]);
        let buffer = "let b = 1;\nb; b;\n".to_string();
        let (result, _) = engine.find_references(
            &dir.path().join("a.ts"),
            1,
            4,
            QueryText::Buffer(buffer),
            false,
        );
        let info = result.unwrap().unwrap();
        assert_eq!(info.name, "b");
        assert_eq!(info.locations.len(), 3);
    }

    #[test]
    fn test_invalid_position_is_a_failure() {
        let (dir, engine) = engine(&[("a.ts", "let a = 1;\n")]);
        let (result, telemetry) =
            engine.find_references(&dir.path().join("a.ts"), 9, 0, QueryText::Disk, true);
        assert!(matches!(result, Err(SleuthError::InvalidPosition { .. })));
        assert_eq!(telemetry.result, QueryOutcome::Failure);
        assert_eq!(telemetry.deps, None);
    }

    #[test]
    fn test_unexported_binding_stays_local_in_global_mode() {
        let (dir, engine) = engine(&[
            ("a.ts", "const hidden = 1;\nhidden;\n"),
            ("b.ts", "import './a';\n"),
        ]);
        let (result, telemetry) =
            engine.find_references(&dir.path().join("a.ts"), 1, 6, QueryText::Disk, true);
        let info = result.unwrap().unwrap();
        assert_eq!(info.locations.len(), 2);
        assert_eq!(info.dependent_files, None);
        assert_eq!(telemetry.deps, None);
    }

    #[test]
    fn test_telemetry_serializes_outcome_in_caps() {
        let telemetry = Telemetry {
            query_id: "q".to_string(),
            started_at: "t".to_string(),
            result: QueryOutcome::Success,
            global: true,
            deps: Some(2),
        };
        let json = serde_json::to_value(&telemetry).unwrap();
        assert_eq!(json["result"], "SUCCESS");
        assert_eq!(json["deps"], 2);
    }
}
