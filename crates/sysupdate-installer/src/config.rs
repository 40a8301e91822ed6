use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::SYSTEM_SETTINGS_CACHE_REGION;

/// `sysupdate.toml`. Relative paths resolve against the application root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct UpdaterConfig {
    pub settings_path: PathBuf,
    pub cache_dir: PathBuf,
    pub settings_cache_region: String,
    pub migrate_command: Vec<String>,
    pub seed_command: Vec<String>,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            settings_path: PathBuf::from("storage/app/settings.toml"),
            cache_dir: PathBuf::from("storage/framework/cache"),
            settings_cache_region: SYSTEM_SETTINGS_CACHE_REGION.to_string(),
            migrate_command: ["php", "artisan", "migrate", "--force"]
                .map(String::from)
                .to_vec(),
            seed_command: [
                "php",
                "artisan",
                "db:seed",
                "--class=InstallationSeeder",
                "--force",
            ]
            .map(String::from)
            .to_vec(),
        }
    }
}

impl UpdaterConfig {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: Self = toml::from_str(input).context("failed to parse sysupdate config")?;
        if config.settings_cache_region.trim().is_empty() {
            anyhow::bail!("settings_cache_region must not be empty");
        }
        if config.migrate_command.is_empty() {
            anyhow::bail!("migrate_command must not be empty");
        }
        if config.seed_command.is_empty() {
            anyhow::bail!("seed_command must not be empty");
        }
        Ok(config)
    }

    /// Loads the file at `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(raw) => Self::from_toml_str(&raw)
                .with_context(|| format!("invalid config file: {}", path.display())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => {
                Err(err).with_context(|| format!("failed to read config file: {}", path.display()))
            }
        }
    }

    pub fn resolved_settings_path(&self, app_root: &Path) -> PathBuf {
        app_root.join(&self.settings_path)
    }

    pub fn resolved_cache_dir(&self, app_root: &Path) -> PathBuf {
        app_root.join(&self.cache_dir)
    }
}
