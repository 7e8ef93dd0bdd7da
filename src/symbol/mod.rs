//! Location and reference value types shared by every component.
//!
//! A [`Location`] names a byte span in one file. Locations are totally
//! ordered by file, then by byte position, which is the order every
//! reference list leaves the engine in.

use ropey::Rope;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::error::{Result, SleuthError};

/// Deterministically ordered set of files.
pub type FileSet = BTreeSet<PathBuf>;

/// A span of source text in one file.
///
/// Field order matters: the derived ordering compares `file`, then
/// `byte_start`, then `byte_end`. `line` and `column` are derived from
/// `byte_start` and never disagree with it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Location {
    /// File containing the span.
    pub file: PathBuf,

    /// Start byte offset (inclusive).
    pub byte_start: usize,

    /// End byte offset (exclusive).
    pub byte_end: usize,

    /// Start line (1-based).
    pub line: usize,

    /// Start column (0-based, in bytes).
    pub column: usize,
}

impl Location {
    /// Build a location from a tree-sitter node.
    pub fn from_node(file: &Path, node: tree_sitter::Node) -> Self {
        let start = node.start_position();
        Self {
            file: file.to_path_buf(),
            byte_start: node.start_byte(),
            byte_end: node.end_byte(),
            line: start.row + 1,
            column: start.column,
        }
    }

    /// Whether the half-open span `[byte_start, byte_end)` covers the cursor.
    pub fn contains(&self, cursor: &Cursor) -> bool {
        self.file == cursor.file
            && self.byte_start <= cursor.offset
            && cursor.offset < self.byte_end
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.file.display(), self.line, self.column)
    }
}

/// A query position: one byte offset in one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    /// File the cursor is in.
    pub file: PathBuf,

    /// Byte offset of the cursor.
    pub offset: usize,
}

impl Cursor {
    /// Create a cursor at a byte offset.
    pub fn new(file: impl Into<PathBuf>, offset: usize) -> Self {
        Self {
            file: file.into(),
            offset,
        }
    }

    /// Convert a `line` (1-based) / `column` (0-based, bytes) pair into a cursor.
    ///
    /// # Errors
    /// `InvalidPosition` when the line does not exist or the column runs past
    /// the end of the line.
    pub fn from_line_column(file: &Path, source: &str, line: usize, column: usize) -> Result<Self> {
        let invalid = || SleuthError::InvalidPosition {
            file: file.to_path_buf(),
            line,
            column,
        };

        let rope = Rope::from_str(source);
        if line == 0 || line > rope.len_lines() {
            return Err(invalid());
        }
        let line_start = rope.line_to_byte(line - 1);
        let line_len = rope.line(line - 1).len_bytes();
        if column > line_len {
            return Err(invalid());
        }

        Ok(Self::new(file, line_start + column))
    }
}

/// The answer to a find-references query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceInfo {
    /// Canonical name of the entity (the declared or exported name, never an
    /// importer's alias).
    pub name: String,

    /// Every reference, sorted and deduplicated.
    pub locations: Vec<Location>,

    /// Number of dependent files consulted (global queries only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependent_files: Option<usize>,
}

impl ReferenceInfo {
    /// Build a result, normalising the location list.
    pub fn new(
        name: impl Into<String>,
        locations: Vec<Location>,
        dependent_files: Option<usize>,
    ) -> Self {
        Self {
            name: name.into(),
            locations: sort_dedup(locations),
            dependent_files,
        }
    }
}

/// Sort by the total location order and drop duplicates.
pub fn sort_dedup(mut locations: Vec<Location>) -> Vec<Location> {
    locations.sort();
    locations.dedup();
    locations
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(file: &str, start: usize, end: usize) -> Location {
        Location {
            file: PathBuf::from(file),
            byte_start: start,
            byte_end: end,
            line: 1,
            column: start,
        }
    }

    #[test]
    fn test_locations_order_by_file_then_position() {
        let sorted = sort_dedup(vec![
            loc("/b.ts", 0, 1),
            loc("/a.ts", 9, 10),
            loc("/a.ts", 2, 3),
            loc("/a.ts", 2, 3),
        ]);
        assert_eq!(
            sorted,
            vec![loc("/a.ts", 2, 3), loc("/a.ts", 9, 10), loc("/b.ts", 0, 1)]
        );
    }

    #[test]
    fn test_cursor_from_line_column() {
        let source = "let a = 1;\nlet bb = 2;\n";
        let cursor = Cursor::from_line_column(Path::new("/x.js"), source, 2, 5).unwrap();
        assert_eq!(cursor.offset, 16);
        assert_eq!(&source[cursor.offset..cursor.offset + 1], "b");
    }

    #[test]
    fn test_cursor_rejects_missing_line() {
        let result = Cursor::from_line_column(Path::new("/x.js"), "a\n", 7, 0);
        assert!(matches!(result, Err(SleuthError::InvalidPosition { .. })));
    }

    #[test]
    fn test_contains_is_half_open() {
        let span = loc("/a.ts", 4, 7);
        assert!(span.contains(&Cursor::new("/a.ts", 4)));
        assert!(span.contains(&Cursor::new("/a.ts", 6)));
        assert!(!span.contains(&Cursor::new("/a.ts", 7)));
        assert!(!span.contains(&Cursor::new("/b.ts", 5)));
    }
}
