use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Complete Memoflow configuration (loaded from `memoflow.toml`)
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct MemoflowConfig {
    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Environment variables visible to jobs as `$env.NAME`
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// Task output cache
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Existing local directory, or http(s) URL of a blob container.
    /// Caching is disabled when unset.
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Seed the task RNG is reset to before every task
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
        }
    }
}

fn default_seed() -> u64 {
    0
}

impl MemoflowConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: MemoflowConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if let Some(url) = &self.cache.url {
            if url.trim().is_empty() {
                anyhow::bail!("cache.url must not be empty");
            }
        }

        for name in self.env.keys() {
            if name.is_empty() || name.chars().any(|c| c.is_ascii_lowercase()) {
                anyhow::bail!("env keys must be upper-case: {:?}", name);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = MemoflowConfig::default();
        assert_eq!(config.cache.url, None);
        assert_eq!(config.runtime.seed, 0);
        assert!(config.env.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("memoflow.toml");
        fs::write(
            &path,
            r#"
[cache]
url = "/var/cache/memoflow"

[runtime]
seed = 42

[env]
DATASET = "mnist"
"#,
        )
        .unwrap();

        let config = MemoflowConfig::from_file(&path).unwrap();
        assert_eq!(config.cache.url.as_deref(), Some("/var/cache/memoflow"));
        assert_eq!(config.runtime.seed, 42);
        assert_eq!(config.env["DATASET"], "mnist");
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: MemoflowConfig = toml::from_str("[env]\nA = \"1\"\n").unwrap();
        assert_eq!(config.runtime.seed, 0);
        assert_eq!(config.cache.url, None);
    }

    #[test]
    fn test_unknown_section_is_rejected() {
        assert!(toml::from_str::<MemoflowConfig>("[upstream]\nurl = \"x\"\n").is_err());
    }

    #[test]
    fn test_invalid_values() {
        let mut config = MemoflowConfig::default();
        config.cache.url = Some("  ".to_string());
        assert!(config.validate().is_err());

        let mut config = MemoflowConfig::default();
        config.env.insert("lower".to_string(), "x".to_string());
        assert!(config.validate().is_err());
    }
}
