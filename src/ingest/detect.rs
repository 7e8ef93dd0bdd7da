//! Language detection from file extensions.
//!
//! Table-driven language detection. No heuristics, no guessing.
//! Unknown extensions return None, never infer from content.

use std::path::Path;

/// Source dialects understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    /// JavaScript, including JSX (.js, .mjs, .cjs, .jsx)
    JavaScript,
    /// TypeScript (.ts, .mts, .cts)
    TypeScript,
    /// TypeScript with JSX (.tsx)
    Tsx,
}

impl Language {
    /// Convert language to string identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Tsx => "tsx",
        }
    }

    /// The tree-sitter grammar for this dialect.
    pub fn grammar(&self) -> tree_sitter::Language {
        match self {
            Language::JavaScript => tree_sitter_javascript::language(),
            Language::TypeScript => tree_sitter_typescript::language_typescript(),
            Language::Tsx => tree_sitter_typescript::language_tsx(),
        }
    }
}

/// Map a bare extension (no dot) to a dialect.
pub fn language_for_extension(extension: &str) -> Option<Language> {
    // Table-driven mapping (case-sensitive)
    let language = match extension {
        "js" | "mjs" | "cjs" | "jsx" => Language::JavaScript,
        "ts" | "mts" | "cts" => Language::TypeScript,
        "tsx" => Language::Tsx,
        _ => return None,
    };
    Some(language)
}

/// Detect the dialect of a file from its path.
///
/// # Examples
///
/// ```
/// # use sleuth::ingest::detect::{detect_language, Language};
/// # use std::path::Path;
/// assert_eq!(detect_language(Path::new("main.ts")), Some(Language::TypeScript));
/// assert_eq!(detect_language(Path::new("view.jsx")), Some(Language::JavaScript));
/// assert_eq!(detect_language(Path::new("file.txt")), None);
/// ```
pub fn detect_language(path: &Path) -> Option<Language> {
    let extension = path.extension()?.to_str()?;
    language_for_extension(extension)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_javascript_family() {
        for name in ["a.js", "a.mjs", "a.cjs", "a.jsx"] {
            assert_eq!(detect_language(Path::new(name)), Some(Language::JavaScript));
        }
    }

    #[test]
    fn test_detect_typescript_family() {
        assert_eq!(detect_language(Path::new("a.ts")), Some(Language::TypeScript));
        assert_eq!(detect_language(Path::new("a.mts")), Some(Language::TypeScript));
        assert_eq!(detect_language(Path::new("a.tsx")), Some(Language::Tsx));
    }

    #[test]
    fn test_unknown_extension() {
        assert_eq!(detect_language(Path::new("a.rs")), None);
        assert_eq!(detect_language(Path::new("Makefile")), None);
        // Case-sensitive
        assert_eq!(detect_language(Path::new("A.TS")), None);
    }
}
