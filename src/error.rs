//! Sleuth error types.
//!
//! All errors are typed and provide root cause information. Conditions that
//! are part of normal control flow ("nothing under the cursor", "receiver type
//! is dynamic") are never errors; they surface as `Ok(None)` or as an omitted
//! location.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Sleuth operations.
#[derive(Error, Debug)]
pub enum SleuthError {
    /// I/O error during file operations.
    #[error("I/O error for path {path}: {source}")]
    Io {
        /// The file path that caused the I/O error.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Tree-sitter parsing error.
    #[error("Parse error in {file}: {message}")]
    Parse {
        /// The file that failed to parse.
        file: PathBuf,
        /// The parse error message.
        message: String,
    },

    /// The file extension is not a JavaScript or TypeScript extension.
    #[error("Unsupported file type: {0}")]
    UnsupportedFile(PathBuf),

    /// A line/column pair that does not exist in the file.
    #[error("Invalid position {line}:{column} in {file}")]
    InvalidPosition {
        /// The file queried.
        file: PathBuf,
        /// Line (1-based).
        line: usize,
        /// Column (0-based, in bytes).
        column: usize,
    },

    /// More than one identifier occurrence covers the cursor.
    #[error("Ambiguous identifier match at {file}:{offset}: {candidates:?}")]
    AmbiguousMatch {
        /// File containing the cursor.
        file: PathBuf,
        /// Cursor byte offset.
        offset: usize,
        /// Names of the competing bindings.
        candidates: Vec<String>,
    },

    /// Two incompatible kinds of evidence were recorded for one site.
    #[error("Mismatched evidence kinds at {file}:{offset}: {first} vs {second}")]
    MismatchedEvidenceKinds {
        /// File containing the cursor.
        file: PathBuf,
        /// Cursor byte offset.
        offset: usize,
        /// Kind recorded first.
        first: &'static str,
        /// Kind recorded afterwards.
        second: &'static str,
    },

    /// A class-member identity met an object-property identity (or two
    /// unrelated class chains) where a single identity was expected.
    #[error("Definition identity shape mismatch: {0}")]
    IdentityShapeMismatch(String),

    /// One or more files failed during global expansion.
    #[error("{} file(s) failed during reference expansion: {}", .failures.len(), describe_failures(.failures))]
    PartialFileFailure {
        /// Each failing file with its error message.
        failures: Vec<(PathBuf, String)>,
    },

    /// Invalid configuration file or value.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// UTF-8 validation error.
    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// Generic error with context.
    #[error("{0}")]
    Other(String),
}

fn describe_failures(failures: &[(PathBuf, String)]) -> String {
    failures
        .iter()
        .map(|(path, message)| format!("{}: {}", path.display(), message))
        .collect::<Vec<_>>()
        .join("; ")
}

impl SleuthError {
    /// Build an I/O error carrying the offending path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SleuthError::Io {
            path: path.into(),
            source,
        }
    }

    /// Stable identifier of the error variant, for JSON payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            SleuthError::Io { .. } => "Io",
            SleuthError::Parse { .. } => "Parse",
            SleuthError::UnsupportedFile(_) => "UnsupportedFile",
            SleuthError::InvalidPosition { .. } => "InvalidPosition",
            SleuthError::AmbiguousMatch { .. } => "AmbiguousMatch",
            SleuthError::MismatchedEvidenceKinds { .. } => "MismatchedEvidenceKinds",
            SleuthError::IdentityShapeMismatch(_) => "IdentityShapeMismatch",
            SleuthError::PartialFileFailure { .. } => "PartialFileFailure",
            SleuthError::Config(_) => "Config",
            SleuthError::Json(_) => "Json",
            SleuthError::Utf8(_) => "Utf8",
            SleuthError::Other(_) => "Other",
        }
    }

    /// File the error is about, when there is exactly one.
    pub fn file_path(&self) -> Option<&std::path::Path> {
        match self {
            SleuthError::Io { path, .. } => Some(path),
            SleuthError::Parse { file, .. }
            | SleuthError::InvalidPosition { file, .. }
            | SleuthError::AmbiguousMatch { file, .. }
            | SleuthError::MismatchedEvidenceKinds { file, .. } => Some(file),
            SleuthError::UnsupportedFile(path) => Some(path),
            _ => None,
        }
    }

    /// Whether this error signals a broken internal assumption rather than
    /// bad input.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            SleuthError::AmbiguousMatch { .. }
                | SleuthError::MismatchedEvidenceKinds { .. }
                | SleuthError::IdentityShapeMismatch(_)
        )
    }
}

impl From<std::io::Error> for SleuthError {
    fn from(err: std::io::Error) -> Self {
        SleuthError::Io {
            path: PathBuf::from("<unknown>"),
            source: err,
        }
    }
}

/// Result type alias for Sleuth operations.
pub type Result<T> = std::result::Result<T, SleuthError>;
