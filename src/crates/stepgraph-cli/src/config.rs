//! CLI configuration
//!
//! Loaded from an optional TOML file; every field has a default, so a missing
//! file or a partial one is fine. Command-line flags are applied on top.
//!
//! ```toml
//! checkpoint_dir = "/var/lib/stepgraph"
//! namespace = "para"
//! max_steps = 25
//! log_level = "info"
//!
//! [search]
//! max_results = 3
//! documents = ["Ada Lovelace wrote the first published algorithm."]
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use stepgraph_core::DEFAULT_MAX_STEPS;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Root directory of the file checkpointer
    pub checkpoint_dir: PathBuf,
    /// Checkpoint namespace used for every thread
    pub namespace: String,
    pub max_steps: usize,
    /// Filter used when `RUST_LOG` is unset
    pub log_level: String,
    pub search: SearchConfig,
    /// File the values were read from, `None` when running on defaults
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            checkpoint_dir: default_checkpoint_dir(),
            namespace: "para".to_string(),
            max_steps: DEFAULT_MAX_STEPS,
            log_level: "warn".to_string(),
            search: SearchConfig::default(),
            source: None,
        }
    }
}

/// Offline document set served to the research workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub max_results: usize,
    pub documents: Vec<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_results: 3,
            documents: vec![
                "Ada Lovelace published the first algorithm intended for a machine.".to_string(),
                "Charles Babbage designed the Analytical Engine.".to_string(),
                "Ada Lovelace was the daughter of Lord Byron.".to_string(),
            ],
        }
    }
}

fn default_checkpoint_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("stepgraph"))
        .unwrap_or_else(|| PathBuf::from(".stepgraph"))
        .join("checkpoints")
}

impl CliConfig {
    /// Load `path`, falling back to defaults when the file does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let mut config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    pub fn with_checkpoint_dir(mut self, dir: Option<PathBuf>) -> Self {
        if let Some(dir) = dir {
            self.checkpoint_dir = dir;
        }
        self
    }

    pub fn with_namespace(mut self, namespace: Option<String>) -> Self {
        if let Some(namespace) = namespace {
            self.namespace = namespace;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = CliConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, CliConfig::default());
        assert_eq!(config.namespace, "para");
        assert_eq!(config.max_steps, 25);
        assert!(config.source.is_none());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stepgraph.toml");
        std::fs::write(
            &path,
            "max_steps = 10\n\n[search]\ndocuments = [\"only one\"]\n",
        )
        .unwrap();

        let config = CliConfig::load(&path).unwrap();
        assert_eq!(config.max_steps, 10);
        assert_eq!(config.search.documents, vec!["only one"]);
        assert_eq!(config.search.max_results, 3);
        assert_eq!(config.namespace, "para");
        assert_eq!(config.source, Some(path));
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stepgraph.toml");
        std::fs::write(&path, "max_steps = \"many\"").unwrap();
        let err = CliConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }

    #[test]
    fn test_flag_overrides() {
        let config = CliConfig::default()
            .with_checkpoint_dir(Some(PathBuf::from("/tmp/cp")))
            .with_namespace(None);
        assert_eq!(config.checkpoint_dir, PathBuf::from("/tmp/cp"));
        assert_eq!(config.namespace, "para");
    }
}
