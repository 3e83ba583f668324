use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::MemoflowConfig;

pub const CONFIG_FILE_NAME: &str = "memoflow.toml";

/// Discovers Memoflow configuration by traversing up the directory tree
pub fn discover_config(start_dir: &Path) -> Result<Option<PathBuf>> {
    if let Some(found) = find_in_ancestors(start_dir) {
        return Ok(Some(found));
    }

    // Fallback to global config
    if let Some(global_config) = global_config_path() {
        if global_config.exists() {
            return Ok(Some(global_config));
        }
    }

    Ok(None)
}

fn find_in_ancestors(start_dir: &Path) -> Option<PathBuf> {
    start_dir
        .ancestors()
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .find(|path| path.exists())
}

/// `~/.config/memoflow/config.toml`
pub fn global_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".config/memoflow/config.toml"))
}

/// Loads configuration with auto-discovery support
///
/// If `explicit_path` is provided, loads config from that path.
/// Otherwise, auto-discovers config by traversing up directory tree from cwd.
///
/// Returns Ok(None) if no config is found (neither explicit nor discovered).
pub fn load_config_with_discovery(explicit_path: Option<&str>) -> Result<Option<MemoflowConfig>> {
    let config = if let Some(config_path) = explicit_path {
        Some(MemoflowConfig::from_file(config_path)?)
    } else {
        let current_dir = std::env::current_dir()
            .context("Failed to get current directory for config discovery")?;

        match discover_config(&current_dir)? {
            Some(discovered_path) => {
                tracing::debug!("Using config {}", discovered_path.display());
                Some(MemoflowConfig::from_file(&discovered_path)?)
            }
            None => None,
        }
    };

    if let Some(config) = &config {
        config.validate()?;
    }
    Ok(config)
}
