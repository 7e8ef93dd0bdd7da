//! Source text → tree-sitter AST → scope tree + module signature.
//!
//! [`parse_source`] is the single parsing entry point. It is a pure function
//! of its inputs: the same path and text always produce the same
//! [`ParsedFile`], and nothing is cached between calls.

pub mod detect;
pub mod exports;
pub mod imports;
pub mod scope;

use crate::error::{Result, SleuthError};
use crate::symbol::Location;
use detect::{detect_language, Language};
use exports::ExportEntry;
use imports::ImportFact;
use scope::ScopeTree;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A parsed and scope-analysed source file.
#[derive(Clone)]
pub struct ParsedFile {
    /// Path of the file.
    pub path: PathBuf,

    /// Full source text.
    pub source: String,

    /// Dialect the file was parsed as.
    pub language: Language,

    /// The concrete syntax tree.
    pub tree: tree_sitter::Tree,

    /// Lexical scopes, bindings and identifier occurrences.
    pub scopes: ScopeTree,

    /// Imports and exports of the module.
    pub signature: ModuleSignature,

    /// Pragmas from the leading comment block.
    pub header: DocHeader,
}

impl ParsedFile {
    /// Root node of the tree.
    pub fn root(&self) -> tree_sitter::Node<'_> {
        self.tree.root_node()
    }

    /// Source text covered by a node.
    pub fn text(&self, node: tree_sitter::Node) -> &str {
        node_text(node, self.source.as_bytes())
    }

    /// Location of a node in this file.
    pub fn location(&self, node: tree_sitter::Node) -> Location {
        Location::from_node(&self.path, node)
    }

    /// Smallest named node spanning exactly `location`, if any.
    pub fn node_at(&self, location: &Location) -> Option<tree_sitter::Node<'_>> {
        self.root()
            .named_descendant_for_byte_range(location.byte_start, location.byte_end)
            .filter(|n| n.start_byte() == location.byte_start && n.end_byte() == location.byte_end)
    }
}

impl std::fmt::Debug for ParsedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParsedFile")
            .field("path", &self.path)
            .field("language", &self.language)
            .field("imports", &self.signature.imports.len())
            .field("exports", &self.signature.exports.len())
            .finish()
    }
}

/// What a module imports and exports.
#[derive(Debug, Clone, Default)]
pub struct ModuleSignature {
    /// Import and require statements, in source order.
    pub imports: Vec<ImportFact>,

    /// Export table, in source order.
    pub exports: Vec<ExportEntry>,

    /// Export names used through `exports.x` / `module.exports.x` member
    /// expressions that are not identifier occurrences.
    pub pseudo_uses: Vec<(String, Location)>,
}

/// Pragmas found in the comments at the top of a file (`@ts-nocheck`,
/// `@flow`, ...), without the leading `@`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocHeader {
    /// Pragma words in source order.
    pub pragmas: Vec<String>,
}

impl DocHeader {
    /// Whether the header carries a pragma.
    pub fn has(&self, pragma: &str) -> bool {
        self.pragmas.iter().any(|p| p == pragma)
    }

    /// Whether type information in this file must be treated as dynamic.
    pub fn is_unchecked(&self) -> bool {
        self.has("ts-nocheck") || self.has("noflow")
    }

    fn from_tree(root: tree_sitter::Node, source: &[u8]) -> Self {
        let mut pragmas = Vec::new();
        let mut cursor = root.walk();
        for child in root.children(&mut cursor) {
            if child.kind() != "comment" && child.kind() != "hashbang_comment" {
                break;
            }
            let text = node_text(child, source);
            for word in text.split(|c: char| c.is_whitespace() || c == '*' || c == '/') {
                if let Some(pragma) = word.strip_prefix('@') {
                    if !pragma.is_empty() {
                        pragmas.push(pragma.to_string());
                    }
                }
            }
        }
        Self { pragmas }
    }
}

/// Parse a JavaScript or TypeScript file.
///
/// # Errors
/// * `UnsupportedFile` - the extension is not a known dialect
/// * `Parse` - tree-sitter failed, or the tree contains syntax errors
pub fn parse_source(path: &Path, source: &str) -> Result<ParsedFile> {
    let (language, tree) = parse_tree(path, source)?;

    let root = tree.root_node();
    if root.has_error() {
        let position = first_error(root)
            .map(|n| {
                let p = n.start_position();
                format!("{}:{}", p.row + 1, p.column)
            })
            .unwrap_or_else(|| "<unknown>".to_string());
        return Err(SleuthError::Parse {
            file: path.to_path_buf(),
            message: format!("syntax error at {}", position),
        });
    }

    let bytes = source.as_bytes();
    let header = DocHeader::from_tree(root, bytes);
    let scopes = ScopeTree::build(path, root, bytes);
    let imports = imports::extract_imports(path, root, bytes);
    let (exports, pseudo_uses) = exports::extract_exports(path, root, bytes);

    log::debug!(
        "parsed {} ({} bindings, {} imports, {} exports)",
        path.display(),
        scopes.bindings().len(),
        imports.len(),
        exports.len()
    );

    Ok(ParsedFile {
        path: path.to_path_buf(),
        source: source.to_string(),
        language,
        tree,
        scopes,
        signature: ModuleSignature {
            imports,
            exports,
            pseudo_uses,
        },
        header,
    })
}

/// Parse a file into a syntax tree, keeping error nodes.
///
/// Used where a best-effort tree is enough (import discovery); everything
/// that resolves references goes through [`parse_source`].
pub fn parse_tree(path: &Path, source: &str) -> Result<(Language, tree_sitter::Tree)> {
    let language =
        detect_language(path).ok_or_else(|| SleuthError::UnsupportedFile(path.to_path_buf()))?;

    let mut parser = tree_sitter::Parser::new();
    parser
        .set_language(&language.grammar())
        .map_err(|e| SleuthError::Parse {
            file: path.to_path_buf(),
            message: format!("Failed to set {} language: {:?}", language.as_str(), e),
        })?;

    let tree = parser
        .parse(source, None)
        .ok_or_else(|| SleuthError::Parse {
            file: path.to_path_buf(),
            message: "Parse failed - no tree returned".to_string(),
        })?;

    Ok((language, tree))
}

/// Source text for files, with optional in-memory overlays for unsaved
/// buffers. Files without an overlay are read from disk on every call.
#[derive(Debug, Clone, Default)]
pub struct Sources {
    overlays: HashMap<PathBuf, Arc<str>>,
}

impl Sources {
    /// Sources backed by the filesystem only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an overlay that shadows the on-disk content of `path`.
    pub fn with_overlay(mut self, path: impl Into<PathBuf>, text: impl Into<Arc<str>>) -> Self {
        self.overlays.insert(path.into(), text.into());
        self
    }

    /// Read the text of a file.
    ///
    /// # Errors
    /// `Io` when the file cannot be read, `Utf8` when it is not UTF-8.
    pub fn read(&self, path: &Path) -> Result<String> {
        if let Some(text) = self.overlays.get(path) {
            return Ok(text.to_string());
        }
        let bytes = std::fs::read(path).map_err(|e| SleuthError::io(path, e))?;
        Ok(std::str::from_utf8(&bytes)?.to_string())
    }

    /// Read and parse a file.
    pub fn parse(&self, path: &Path) -> Result<ParsedFile> {
        let source = self.read(path)?;
        parse_source(path, &source)
    }
}

/// Text of a node; empty on invalid UTF-8 boundaries.
pub fn node_text<'a>(node: tree_sitter::Node, source: &'a [u8]) -> &'a str {
    node.utf8_text(source).unwrap_or("")
}

/// Content of a string literal node, without quotes.
pub fn string_content(node: tree_sitter::Node, source: &[u8]) -> Option<String> {
    if node.kind() != "string" {
        return None;
    }
    let mut content = String::new();
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if child.kind() == "string_fragment" {
            content.push_str(node_text(child, source));
        }
    }
    Some(content)
}

fn first_error(node: tree_sitter::Node) -> Option<tree_sitter::Node> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    let mut cursor = node.walk();
    let children: Vec<_> = node.children(&mut cursor).collect();
    children
        .into_iter()
        .filter(|c| c.has_error() || c.is_missing())
        .find_map(first_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reports_syntax_errors() {
        let result = parse_source(Path::new("/w/broken.ts"), "const = ;\nclass {");
        match result {
            Err(SleuthError::Parse { file, message }) => {
                assert_eq!(file, PathBuf::from("/w/broken.ts"));
                assert!(message.starts_with("syntax error at"));
            }
            other => panic!("expected parse error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_parse_rejects_unknown_extension() {
        let result = parse_source(Path::new("/w/notes.md"), "# hi");
        assert!(matches!(result, Err(SleuthError::UnsupportedFile(_))));
    }

    #[test]
    fn test_doc_header_pragmas() {
        let parsed = parse_source(
            Path::new("/w/a.ts"),
            "// @ts-nocheck\n/* @flow strict */\nconst a = 1;\n// @late\n",
        )
        .unwrap();
        assert!(parsed.header.has("ts-nocheck"));
        assert!(parsed.header.has("flow"));
        assert!(!parsed.header.has("late"));
        assert!(parsed.header.is_unchecked());
    }

    #[test]
    fn test_overlay_shadows_disk() {
        let sources = Sources::new().with_overlay("/definitely/missing.ts", "let x = 1;");
        assert_eq!(sources.read(Path::new("/definitely/missing.ts")).unwrap(), "let x = 1;");
        assert!(matches!(
            sources.read(Path::new("/definitely/absent.ts")),
            Err(SleuthError::Io { .. })
        ));
    }
}
