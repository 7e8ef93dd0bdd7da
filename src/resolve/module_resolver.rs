//! Module specifier resolution.
//!
//! This module provides module name → file path indexing and resolution of
//! relative specifiers (`./a`, `../lib/b.js`) against the indexed files.
//! Bare specifiers (`react`, `node:fs`) name packages outside the workspace
//! and never resolve to an indexed file.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

/// Extensions tried, in order, when a specifier omits one.
pub const RESOLVE_EXTENSIONS: &[&str] = &["ts", "tsx", "mts", "cts", "js", "jsx", "mjs", "cjs"];

/// Index mapping module names to file paths.
///
/// A module name is the file path relative to the workspace root, without
/// extension and with `/` separators (`src/util/strings`).
///
/// # Example
/// ```
/// # use sleuth::resolve::module_resolver::ModulePathIndex;
/// # use std::path::{Path, PathBuf};
/// let mut index = ModulePathIndex::new("/w");
/// index.insert(PathBuf::from("/w/src/foo.ts"));
///
/// assert_eq!(index.module_name(Path::new("/w/src/foo.ts")), Some("src/foo".to_string()));
/// assert_eq!(index.resolve("src/foo"), Some(PathBuf::from("/w/src/foo.ts")));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ModulePathIndex {
    root: PathBuf,

    /// Maps module name → file path
    module_to_file: HashMap<String, PathBuf>,

    /// Reverse maps file path → module name
    file_to_module: HashMap<PathBuf, String>,
}

impl ModulePathIndex {
    /// Create a new empty index rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Index a file.
    pub fn insert(&mut self, file: PathBuf) {
        let name = module_name_for(&self.root, &file);
        // TypeScript sources win a module name over their JavaScript siblings.
        let replace = match self.module_to_file.get(&name) {
            Some(existing) => extension_rank(&file) < extension_rank(existing),
            None => true,
        };
        if replace {
            self.module_to_file.insert(name.clone(), file.clone());
        }
        self.file_to_module.insert(file, name);
    }

    /// Whether the file is indexed.
    pub fn contains(&self, file: &Path) -> bool {
        self.file_to_module.contains_key(file)
    }

    /// Resolve a module name to its file path.
    ///
    /// Returns `None` if the module name is not in the index.
    pub fn resolve(&self, module_name: &str) -> Option<PathBuf> {
        self.module_to_file.get(module_name).cloned()
    }

    /// Get the module name for a given file path.
    pub fn module_name(&self, file: &Path) -> Option<String> {
        self.file_to_module.get(file).cloned()
    }

    /// All indexed files.
    pub fn files(&self) -> impl Iterator<Item = &PathBuf> {
        self.file_to_module.keys()
    }
}

fn extension_rank(file: &Path) -> usize {
    let extension = file.extension().and_then(|e| e.to_str()).unwrap_or("");
    RESOLVE_EXTENSIONS
        .iter()
        .position(|e| *e == extension)
        .unwrap_or(RESOLVE_EXTENSIONS.len())
}

/// Module name of `file` relative to `root`.
pub fn module_name_for(root: &Path, file: &Path) -> String {
    let relative = file.strip_prefix(root).unwrap_or(file).with_extension("");
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Whether a specifier is relative or absolute (as opposed to a package name).
pub fn is_path_specifier(specifier: &str) -> bool {
    specifier == "."
        || specifier == ".."
        || specifier.starts_with("./")
        || specifier.starts_with("../")
        || specifier.starts_with('/')
}

/// Resolve a specifier written in `current_file` to an indexed file.
///
/// Candidates are tried in order: the exact path, the path with each of
/// [`RESOLVE_EXTENSIONS`] appended, `<path>/index.<ext>`, and finally a `.js`
/// specifier rewritten to its `.ts`/`.tsx` source.
///
/// # Examples
/// ```
/// # use sleuth::resolve::module_resolver::{ModulePathIndex, resolve_module_path};
/// # use std::path::{Path, PathBuf};
/// let mut index = ModulePathIndex::new("/w");
/// index.insert(PathBuf::from("/w/src/a.ts"));
/// index.insert(PathBuf::from("/w/src/lib/index.js"));
///
/// let from = Path::new("/w/src/b.ts");
/// assert_eq!(resolve_module_path(&index, from, "./a"), Some(PathBuf::from("/w/src/a.ts")));
/// assert_eq!(resolve_module_path(&index, from, "./a.js"), Some(PathBuf::from("/w/src/a.ts")));
/// assert_eq!(resolve_module_path(&index, from, "./lib"), Some(PathBuf::from("/w/src/lib/index.js")));
/// assert_eq!(resolve_module_path(&index, from, "react"), None);
/// ```
pub fn resolve_module_path(
    index: &ModulePathIndex,
    current_file: &Path,
    specifier: &str,
) -> Option<PathBuf> {
    if !is_path_specifier(specifier) {
        return None;
    }

    let base = current_file.parent().unwrap_or_else(|| Path::new("/"));
    let target = normalize(&base.join(specifier));

    if index.contains(&target) {
        return Some(target);
    }

    let display = target.to_string_lossy().into_owned();
    for extension in RESOLVE_EXTENSIONS {
        let candidate = PathBuf::from(format!("{}.{}", display, extension));
        if index.contains(&candidate) {
            return Some(candidate);
        }
    }

    for extension in RESOLVE_EXTENSIONS {
        let candidate = target.join(format!("index.{}", extension));
        if index.contains(&candidate) {
            return Some(candidate);
        }
    }

    // `./a.js` written against `a.ts` sources
    let rewrites: &[(&str, &[&str])] = &[
        ("js", &["ts", "tsx"]),
        ("mjs", &["mts"]),
        ("cjs", &["cts"]),
        ("jsx", &["tsx"]),
    ];
    let extension = target.extension().and_then(|e| e.to_str())?;
    for (from, to) in rewrites {
        if *from != extension {
            continue;
        }
        for replacement in *to {
            let candidate = target.with_extension(replacement);
            if index.contains(&candidate) {
                return Some(candidate);
            }
        }
    }

    None
}

/// Lexically normalise `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_name_strips_root_and_extension() {
        assert_eq!(module_name_for(Path::new("/w"), Path::new("/w/src/a.ts")), "src/a");
        assert_eq!(module_name_for(Path::new("/w"), Path::new("/w/index.js")), "index");
    }

    #[test]
    fn test_normalize_parent_components() {
        assert_eq!(normalize(Path::new("/w/src/../lib/./a")), PathBuf::from("/w/lib/a"));
    }

    #[test]
    fn test_resolve_parent_relative() {
        let mut index = ModulePathIndex::new("/w");
        index.insert(PathBuf::from("/w/shared/util.js"));
        assert_eq!(
            resolve_module_path(&index, Path::new("/w/src/deep/b.js"), "../../shared/util"),
            Some(PathBuf::from("/w/shared/util.js"))
        );
        assert_eq!(resolve_module_path(&index, Path::new("/w/src/b.js"), "./missing"), None);
    }

    #[test]
    fn test_typescript_source_wins_module_name() {
        let mut index = ModulePathIndex::new("/w");
        index.insert(PathBuf::from("/w/a.js"));
        index.insert(PathBuf::from("/w/a.ts"));
        assert_eq!(index.resolve("a"), Some(PathBuf::from("/w/a.ts")));
        assert_eq!(index.module_name(Path::new("/w/a.js")), Some("a".to_string()));
    }
}
