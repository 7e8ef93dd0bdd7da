//! Command-line interface for Sleuth.
//!
//! This module handles argument parsing and output payloads only.
//! Query logic lives in [`crate::query`].

use clap::Parser;
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;

/// Sleuth: cross-file find-references for JavaScript and TypeScript.
#[derive(Parser, Debug)]
#[command(name = "sleuth")]
#[command(author, version, about, long_about = None)]
#[command(subcommand_required = true)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available Sleuth commands.
#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Find every reference to the entity at a position.
    Refs {
        /// Source file containing the cursor.
        #[arg(short, long)]
        file: PathBuf,

        /// Line of the cursor (1-based).
        #[arg(short, long)]
        line: usize,

        /// Column of the cursor (0-based, in bytes).
        #[arg(short, long)]
        column: usize,

        /// Search dependent files too.
        #[arg(short, long)]
        global: bool,

        /// Workspace root (defaults to the current directory).
        #[arg(long, value_name = "DIR")]
        root: Option<PathBuf>,

        /// Worker threads for global queries (overrides the config file).
        #[arg(long)]
        threads: Option<usize>,

        /// JSON engine configuration file.
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Print a JSON payload instead of plain text.
        #[arg(long)]
        json: bool,
    },

    /// List the files that depend on a file, transitively.
    Deps {
        /// File whose dependents to list.
        #[arg(short, long)]
        file: PathBuf,

        /// Workspace root (defaults to the current directory).
        #[arg(long, value_name = "DIR")]
        root: Option<PathBuf>,

        /// JSON engine configuration file.
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
}

/// Parse command-line arguments.
///
/// This function is the entry point for CLI argument parsing.
/// It returns the parsed Cli struct or exits on error.
pub fn parse_args() -> Cli {
    Cli::parse()
}

/// JSON success payload for CLI responses.
#[derive(Serialize)]
pub struct CliSuccessPayload {
    /// Status indicator ("ok").
    pub status: &'static str,
    /// Human-readable message.
    pub message: String,
    /// Optional structured data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl CliSuccessPayload {
    /// Construct a payload with structured data.
    pub fn with_data(message: String, data: Value) -> Self {
        Self {
            status: "ok",
            message,
            data: Some(data),
        }
    }
}

/// JSON error payload for CLI responses.
#[derive(Serialize)]
pub struct CliErrorPayload {
    /// Status indicator ("error").
    pub status: &'static str,
    /// Structured error details.
    pub error: ErrorDetails,
}

/// Details for a CLI error payload.
#[derive(Serialize)]
pub struct ErrorDetails {
    /// Error kind identifier (Parse, PartialFileFailure, etc.).
    pub kind: &'static str,
    /// Human-readable message.
    pub message: String,
    /// Optional file context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Files that failed during global expansion.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_files: Vec<String>,
    /// Whether the error is a broken internal assumption.
    pub internal: bool,
}

impl CliErrorPayload {
    /// Build payload from a SleuthError instance.
    pub fn from_error(error: &crate::SleuthError) -> Self {
        let failed_files = match error {
            crate::SleuthError::PartialFileFailure { failures } => failures
                .iter()
                .map(|(path, _)| path.to_string_lossy().to_string())
                .collect(),
            _ => Vec::new(),
        };

        CliErrorPayload {
            status: "error",
            error: ErrorDetails {
                kind: error.kind(),
                message: error.to_string(),
                file: error
                    .file_path()
                    .map(|path| path.to_string_lossy().to_string()),
                failed_files,
                internal: error.is_invariant_violation(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SleuthError;

    #[test]
    fn test_refs_arguments() {
        let cli = Cli::try_parse_from([
            "sleuth", "refs", "--file", "src/a.ts", "--line", "3", "--column", "7", "--global",
            "--threads", "2",
        ])
        .unwrap();
        match cli.command {
            Commands::Refs {
                file,
                line,
                column,
                global,
                threads,
                json,
                ..
            } => {
                assert_eq!(file, PathBuf::from("src/a.ts"));
                assert_eq!((line, column), (3, 7));
                assert!(global);
                assert_eq!(threads, Some(2));
                assert!(!json);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_subcommand_is_required() {
        assert!(Cli::try_parse_from(["sleuth"]).is_err());
    }

    #[test]
    fn test_error_payload_lists_failed_files() {
        let err = SleuthError::PartialFileFailure {
            failures: vec![(PathBuf::from("/w/b.ts"), "Parse error".to_string())],
        };
        let payload = serde_json::to_value(CliErrorPayload::from_error(&err)).unwrap();
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error"]["kind"], "PartialFileFailure");
        assert_eq!(payload["error"]["failed_files"][0], "/w/b.ts");
        assert_eq!(payload["error"]["internal"], false);
    }
}
