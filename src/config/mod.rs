//! Configuration management for the state reflector
//!
//! Handles loading, parsing, and validation of the YAML bridge configuration.

use crate::state::SyncStrategy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use tokio::fs;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct BridgeConfig {
    /// How values under one key are reconciled
    #[serde(default)]
    pub strategy: SyncStrategy,
    /// Call the host liveness entry point once when the listener is installed
    #[serde(default = "default_announce_on_install")]
    pub announce_on_install: bool,
    /// Bindings created at startup
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub seed: Vec<SeedBinding>,
}

/// A binding created by the harness before any input is read
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct SeedBinding {
    pub key: String,
    #[serde(default)]
    pub initial: Value,
}

fn default_announce_on_install() -> bool {
    true
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            strategy: SyncStrategy::default(),
            announce_on_install: default_announce_on_install(),
            seed: Vec::new(),
        }
    }
}

impl BridgeConfig {
    /// Load configuration from a YAML file
    pub async fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path))?;

        Self::from_yaml_str(&contents)
            .with_context(|| format!("Failed to load config: {}", path))
    }

    /// Parse and validate configuration from YAML text
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        // An empty document means all defaults
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: BridgeConfig =
            serde_yaml::from_str(contents).context("Failed to parse YAML config")?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self, path: &str) -> Result<()> {
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config to YAML")?;

        fs::write(path, yaml)
            .await
            .with_context(|| format!("Failed to write config file: {}", path))?;

        Ok(())
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for (idx, seed) in self.seed.iter().enumerate() {
            if seed.key.is_empty() {
                anyhow::bail!("Seed binding {} key cannot be empty", idx);
            }
            if !seen.insert(seed.key.as_str()) {
                anyhow::bail!("Seed key '{}' is defined more than once", seed.key);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::from_yaml_str("").unwrap();
        assert_eq!(config.strategy, SyncStrategy::Broadcast);
        assert!(config.announce_on_install);
        assert!(config.seed.is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
strategy: reconciled
announce_on_install: false
seed:
  - key: cart
    initial:
      items: []
  - key: counter
"#;
        let config = BridgeConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.strategy, SyncStrategy::Reconciled);
        assert!(!config.announce_on_install);
        assert_eq!(config.seed[0].initial, json!({"items": []}));
        assert_eq!(config.seed[1].initial, Value::Null);
    }

    #[test]
    fn test_validate_rejects_bad_seeds() {
        let duplicate = "seed:\n  - key: a\n  - key: a\n";
        let err = BridgeConfig::from_yaml_str(duplicate).unwrap_err();
        assert!(format!("{:#}", err).contains("more than once"));

        let empty = "seed:\n  - key: \"\"\n";
        assert!(BridgeConfig::from_yaml_str(empty).is_err());
    }

    #[test]
    fn test_unknown_strategy_is_rejected() {
        assert!(BridgeConfig::from_yaml_str("strategy: gossip\n").is_err());
    }

    #[tokio::test]
    async fn test_load_and_save_roundtrip() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "strategy: reconciled\nseed:\n  - key: theme\n    initial: dark").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let config = BridgeConfig::load(&path).await.unwrap();
        assert_eq!(config.seed[0].initial, json!("dark"));

        let out = tempfile::NamedTempFile::new().unwrap();
        let out_path = out.path().to_str().unwrap().to_string();
        config.save(&out_path).await.unwrap();
        assert_eq!(BridgeConfig::load(&out_path).await.unwrap(), config);
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let err = BridgeConfig::load("/nonexistent/state-reflector.yaml")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
