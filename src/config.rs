//! Engine configuration.
//!
//! Settings come from an optional JSON file; command-line flags override
//! individual fields afterwards.

use crate::error::{Result, SleuthError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings of one [`crate::query::Engine`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Worker threads used for global expansion (0 = one per CPU).
    pub threads: usize,

    /// File extensions (without dot) that belong to the workspace.
    pub extensions: Vec<String>,

    /// Glob patterns, relative to the workspace root, excluded from
    /// discovery. `node_modules` is always excluded.
    pub exclude: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            extensions: ["ts", "tsx", "mts", "cts", "js", "jsx", "mjs", "cjs"]
                .iter()
                .map(|e| e.to_string())
                .collect(),
            exclude: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Load a JSON configuration file.
    ///
    /// Missing fields take their default values; unknown fields are rejected.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| SleuthError::io(path, e))?;
        let config: EngineConfig = serde_json::from_str(&text)
            .map_err(|e| SleuthError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        log::debug!("loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Check the configuration for values the engine cannot use.
    pub fn validate(&self) -> Result<()> {
        if self.extensions.is_empty() {
            return Err(SleuthError::Config("no file extensions configured".to_string()));
        }
        if let Some(bad) = self
            .extensions
            .iter()
            .find(|e| crate::ingest::detect::language_for_extension(e).is_none())
        {
            return Err(SleuthError::Config(format!("unsupported extension: {}", bad)));
        }
        for pattern in &self.exclude {
            glob::Pattern::new(pattern).map_err(|e| {
                SleuthError::Config(format!("bad exclude pattern {:?}: {}", pattern, e))
            })?;
        }
        Ok(())
    }

    /// Effective worker count.
    pub fn worker_threads(&self) -> usize {
        if self.threads == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            self.threads
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_partial_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "threads": 3, "exclude": ["dist/**"] }}"#).unwrap();
        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.threads, 3);
        assert_eq!(config.exclude, vec!["dist/**"]);
        assert_eq!(config.extensions, EngineConfig::default().extensions);
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "thread": 3 }}"#).unwrap();
        assert!(matches!(
            EngineConfig::load(file.path()),
            Err(SleuthError::Config(_))
        ));
    }

    #[test]
    fn test_validate_rejects_unknown_extension() {
        let config = EngineConfig {
            extensions: vec!["rs".to_string()],
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_threads_means_available_parallelism() {
        assert!(EngineConfig::default().worker_threads() >= 1);
    }
}
