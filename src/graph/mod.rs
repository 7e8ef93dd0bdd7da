//! Module dependency graph.
//!
//! The engine consults the graph through [`ModuleGraph`] (who depends on a
//! file, where does a specifier point) and [`Focus`] (make sure the edges of
//! some files are current before scanning). [`WorkspaceGraph`] implements
//! both over a directory tree discovered with glob patterns.

use crate::config::EngineConfig;
use crate::error::{Result, SleuthError};
use crate::ingest::{imports::extract_imports, parse_tree, Sources};
use crate::resolve::module_resolver::{resolve_module_path, ModulePathIndex};
use crate::symbol::FileSet;
use rayon::prelude::*;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// What an import specifier names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ModuleHandle {
    /// A file of the workspace.
    File(PathBuf),
    /// A package or path outside the workspace, by specifier.
    External(String),
}

/// Read access to module dependency edges.
pub trait ModuleGraph: Send + Sync {
    /// Files that depend, transitively, on any file of `changed` or on any
    /// module named in `changed_modules`.
    ///
    /// The result only contains files of `unchanged ∪ changed` and never a
    /// member of `changed`.
    fn dependent_files(
        &self,
        unchanged: &FileSet,
        changed: &FileSet,
        changed_modules: &BTreeSet<String>,
    ) -> FileSet;

    /// Resolve an import specifier written in `from`.
    fn resolve_module(&self, from: &Path, specifier: &str) -> ModuleHandle;

    /// File behind a module handle, if it is part of the workspace.
    fn file_of_module(&self, module: &ModuleHandle) -> Option<PathBuf>;

    /// Module name of a workspace file.
    fn module_name(&self, file: &Path) -> Option<String>;

    /// Every file known to the graph.
    fn files(&self) -> FileSet;
}

/// Lazy-loading hook: bring files up to date before they are scanned.
pub trait Focus: Send + Sync {
    /// Ensure the given files are parsed and their edges current.
    fn ensure_focused(&self, files: &FileSet) -> Result<()>;
}

#[derive(Debug, Clone)]
struct Edge {
    specifier: String,
    target: ModuleHandle,
}

/// Import graph of a directory tree.
#[derive(Debug)]
pub struct WorkspaceGraph {
    root: PathBuf,
    index: ModulePathIndex,
    edges: RwLock<HashMap<PathBuf, Vec<Edge>>>,
}

impl WorkspaceGraph {
    /// Discover and index every source file under `root`.
    ///
    /// Files whose imports cannot be read are indexed without edges and a
    /// warning is logged; reference scans still visit them and fail there.
    pub fn open(root: &Path, config: &EngineConfig) -> Result<Self> {
        let root = root.canonicalize().map_err(|e| SleuthError::io(root, e))?;
        let files = discover_files(&root, config)?;
        log::info!("indexing {} files under {}", files.len(), root.display());

        let mut index = ModulePathIndex::new(&root);
        for file in &files {
            index.insert(file.clone());
        }

        let graph = Self {
            root,
            index,
            edges: RwLock::new(HashMap::new()),
        };

        let sources = Sources::new();
        let edges: HashMap<PathBuf, Vec<Edge>> = files
            .par_iter()
            .map(|file| {
                let edges = graph.read_edges(&sources, file).unwrap_or_else(|err| {
                    log::warn!("no import edges for {}: {}", file.display(), err);
                    Vec::new()
                });
                (file.clone(), edges)
            })
            .collect();
        graph.store(edges);
        Ok(graph)
    }

    /// Workspace root (canonical).
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read_edges(&self, sources: &Sources, file: &Path) -> Result<Vec<Edge>> {
        let text = sources.read(file)?;
        let (_, tree) = parse_tree(file, &text)?;
        let imports = extract_imports(file, tree.root_node(), text.as_bytes());
        Ok(imports
            .into_iter()
            .map(|import| Edge {
                target: self.resolve_module(file, &import.specifier),
                specifier: import.specifier,
            })
            .collect())
    }

    fn store(&self, edges: HashMap<PathBuf, Vec<Edge>>) {
        match self.edges.write() {
            Ok(mut guard) => guard.extend(edges),
            Err(poisoned) => poisoned.into_inner().extend(edges),
        }
    }

    /// Importers of every file and every external specifier.
    fn reverse_edges(&self) -> HashMap<ModuleHandle, Vec<PathBuf>> {
        let guard = match self.edges.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut reverse: HashMap<ModuleHandle, Vec<PathBuf>> = HashMap::new();
        for (importer, edges) in guard.iter() {
            for edge in edges {
                reverse
                    .entry(edge.target.clone())
                    .or_default()
                    .push(importer.clone());
            }
        }
        reverse
    }

    /// Specifiers imported by a file, in source order.
    pub fn imports_of(&self, file: &Path) -> Vec<String> {
        let guard = match self.edges.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard
            .get(file)
            .map(|edges| edges.iter().map(|e| e.specifier.clone()).collect())
            .unwrap_or_default()
    }
}

impl ModuleGraph for WorkspaceGraph {
    fn dependent_files(
        &self,
        unchanged: &FileSet,
        changed: &FileSet,
        changed_modules: &BTreeSet<String>,
    ) -> FileSet {
        let reverse = self.reverse_edges();
        let mut seen: FileSet = changed.clone();
        let mut queue: VecDeque<ModuleHandle> =
            changed.iter().cloned().map(ModuleHandle::File).collect();
        for name in changed_modules {
            queue.push_back(ModuleHandle::External(name.clone()));
            if let Some(file) = self.index.resolve(name) {
                queue.push_back(ModuleHandle::File(file));
            }
        }

        let mut dependents = FileSet::new();
        while let Some(module) = queue.pop_front() {
            let Some(importers) = reverse.get(&module) else {
                continue;
            };
            for importer in importers {
                if !unchanged.contains(importer) && !changed.contains(importer) {
                    continue;
                }
                if seen.insert(importer.clone()) {
                    dependents.insert(importer.clone());
                    queue.push_back(ModuleHandle::File(importer.clone()));
                }
            }
        }
        log::debug!(
            "{} dependent file(s) of {} changed file(s)",
            dependents.len(),
            changed.len()
        );
        dependents
    }

    fn resolve_module(&self, from: &Path, specifier: &str) -> ModuleHandle {
        match resolve_module_path(&self.index, from, specifier) {
            Some(file) => ModuleHandle::File(file),
            None => ModuleHandle::External(specifier.to_string()),
        }
    }

    fn file_of_module(&self, module: &ModuleHandle) -> Option<PathBuf> {
        match module {
            ModuleHandle::File(file) if self.index.contains(file) => Some(file.clone()),
            _ => None,
        }
    }

    fn module_name(&self, file: &Path) -> Option<String> {
        self.index.module_name(file)
    }

    fn files(&self) -> FileSet {
        self.index.files().cloned().collect()
    }
}

impl Focus for WorkspaceGraph {
    fn ensure_focused(&self, files: &FileSet) -> Result<()> {
        let sources = Sources::new();
        let mut refreshed = HashMap::new();
        for file in files {
            if !self.index.contains(file) {
                log::debug!("focus skipped {}: not part of the workspace", file.display());
                continue;
            }
            refreshed.insert(file.clone(), self.read_edges(&sources, file)?);
        }
        log::debug!("focused {} file(s)", refreshed.len());
        self.store(refreshed);
        Ok(())
    }
}

/// Find workspace files with glob, skipping `node_modules` and excluded
/// patterns. Returned sorted.
fn discover_files(root: &Path, config: &EngineConfig) -> Result<Vec<PathBuf>> {
    let excludes = config
        .exclude
        .iter()
        .map(|p| {
            glob::Pattern::new(p).map_err(|e| {
                SleuthError::Config(format!("bad exclude pattern {:?}: {}", p, e))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut files = BTreeSet::new();
    for extension in &config.extensions {
        let pattern = format!(
            "{}/**/*.{}",
            glob::Pattern::escape(&root.to_string_lossy()),
            extension
        );
        let entries = glob::glob(&pattern)
            .map_err(|e| SleuthError::Config(format!("bad glob {}: {}", pattern, e)))?;
        for entry in entries {
            let path = match entry {
                Ok(path) => path,
                Err(err) => {
                    log::warn!("skipping unreadable path: {}", err);
                    continue;
                }
            };
            let relative = path.strip_prefix(root).unwrap_or(&path);
            if relative.components().any(|c| c.as_os_str() == "node_modules") {
                continue;
            }
            if excludes.iter().any(|p| p.matches_path(relative)) {
                continue;
            }
            if path.is_file() {
                files.insert(path);
            }
        }
    }
    Ok(files.into_iter().collect())
}
