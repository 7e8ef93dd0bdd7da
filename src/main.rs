//! Sleuth CLI binary
//!
//! This is the main entry point for the sleuth command-line interface.
//! The CLI is a thin adapter over the library; no resolution logic lives here.

use sleuth::cli::{CliErrorPayload, CliSuccessPayload, Commands};
use sleuth::config::EngineConfig;
use sleuth::query::{Engine, QueryText};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = sleuth::cli::parse_args();

    if cli.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    }

    let (result, json) = match cli.command {
        Commands::Refs {
            file,
            line,
            column,
            global,
            root,
            threads,
            config,
            json,
        } => (
            execute_refs(&file, line, column, global, root, threads, config.as_deref(), json),
            json,
        ),
        Commands::Deps { file, root, config } => {
            (execute_deps(&file, root, config.as_deref()), false)
        }
    };

    match result {
        Ok(output) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            if json {
                let payload = CliErrorPayload::from_error(&e);
                match serde_json::to_string_pretty(&payload) {
                    Ok(text) => println!("{}", text),
                    Err(_) => eprintln!("Error: {}", e),
                }
            } else {
                eprintln!("Error: {}", e);
            }
            ExitCode::from(1)
        }
    }
}

fn load_config(
    path: Option<&Path>,
    threads: Option<usize>,
) -> Result<EngineConfig, sleuth::SleuthError> {
    let mut config = match path {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(threads) = threads {
        config.threads = threads;
    }
    Ok(config)
}

fn workspace_root(root: Option<PathBuf>) -> Result<PathBuf, sleuth::SleuthError> {
    match root {
        Some(root) => Ok(root),
        None => std::env::current_dir().map_err(|e| sleuth::SleuthError::io(".", e)),
    }
}

/// Execute the refs command.
#[allow(clippy::too_many_arguments)]
fn execute_refs(
    file: &Path,
    line: usize,
    column: usize,
    global: bool,
    root: Option<PathBuf>,
    threads: Option<usize>,
    config: Option<&Path>,
    json: bool,
) -> Result<String, sleuth::SleuthError> {
    let config = load_config(config, threads)?;
    let engine = Engine::for_workspace(&workspace_root(root)?, &config)?;

    let (result, telemetry) = engine.find_references(file, line, column, QueryText::Disk, global);
    let reference = result?;

    if json {
        let data = serde_json::json!({
            "reference": reference,
            "telemetry": telemetry,
        });
        let message = match &reference {
            Some(info) => format!("{} reference(s) to {}", info.locations.len(), info.name),
            None => "nothing to resolve at this position".to_string(),
        };
        return Ok(serde_json::to_string_pretty(&CliSuccessPayload::with_data(message, data))?);
    }

    let Some(info) = reference else {
        return Ok("No references: nothing to resolve at this position".to_string());
    };
    let mut lines = vec![info.name.clone()];
    lines.extend(info.locations.iter().map(|l| l.to_string()));
    if let Some(deps) = info.dependent_files {
        lines.push(format!("({} dependent file(s) searched)", deps));
    }
    Ok(lines.join("\n"))
}

/// Execute the deps command.
fn execute_deps(
    file: &Path,
    root: Option<PathBuf>,
    config: Option<&Path>,
) -> Result<String, sleuth::SleuthError> {
    let config = load_config(config, None)?;
    let engine = Engine::for_workspace(&workspace_root(root)?, &config)?;
    let dependents = engine.dependents_of(file)?;
    if dependents.is_empty() {
        return Ok("No dependent files".to_string());
    }
    Ok(dependents
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join("\n"))
}
