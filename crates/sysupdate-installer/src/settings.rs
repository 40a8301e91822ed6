use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::{Setting, SYSTEM_VERSION_SETTING};

const SETTINGS_FILE_VERSION: u32 = 1;

/// Key/value settings table, keyed by `name`.
pub trait SettingsStore {
    fn get(&self, name: &str) -> Result<Option<Setting>>;

    /// Rewrites `data` of an existing row. Returns `false` when no row matched.
    fn update_data(&self, name: &str, data: &str) -> Result<bool>;

    /// Inserts missing rows and overwrites `data` and `type` of existing ones.
    fn upsert(&self, settings: &[Setting]) -> Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SettingsFile {
    #[serde(default = "settings_file_version")]
    version: u32,
    #[serde(default)]
    settings: Vec<Setting>,
}

impl Default for SettingsFile {
    fn default() -> Self {
        Self {
            version: settings_file_version(),
            settings: Vec::new(),
        }
    }
}

fn settings_file_version() -> u32 {
    SETTINGS_FILE_VERSION
}

/// Settings table persisted as a TOML document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSettingsStore {
    path: PathBuf,
}

impl FileSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn all(&self) -> Result<Vec<Setting>> {
        Ok(self.load()?.settings)
    }

    fn load(&self) -> Result<SettingsFile> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(SettingsFile::default()),
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("failed to read settings file: {}", self.path.display())
                });
            }
        };
        parse_settings_file(&raw)
            .with_context(|| format!("failed to parse settings file: {}", self.path.display()))
    }

    fn save(&self, file: &SettingsFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let rendered = toml::to_string_pretty(file).context("failed to serialize settings")?;
        let tmp_path = self.path.with_extension("toml.tmp");
        fs::write(&tmp_path, rendered.as_bytes())
            .with_context(|| format!("failed to write settings file: {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &self.path).with_context(|| {
            format!(
                "failed to replace settings file {} with {}",
                self.path.display(),
                tmp_path.display()
            )
        })
    }
}

impl SettingsStore for FileSettingsStore {
    fn get(&self, name: &str) -> Result<Option<Setting>> {
        Ok(self
            .load()?
            .settings
            .into_iter()
            .find(|setting| setting.name == name))
    }

    fn update_data(&self, name: &str, data: &str) -> Result<bool> {
        let mut file = self.load()?;
        let mut matched = false;
        for setting in file.settings.iter_mut().filter(|setting| setting.name == name) {
            setting.data = data.to_string();
            matched = true;
        }
        if matched {
            self.save(&file)?;
        }
        Ok(matched)
    }

    fn upsert(&self, settings: &[Setting]) -> Result<()> {
        let mut file = self.load()?;
        for incoming in settings {
            match file
                .settings
                .iter_mut()
                .find(|existing| existing.name == incoming.name)
            {
                Some(existing) => {
                    existing.data = incoming.data.clone();
                    existing.kind = incoming.kind.clone();
                }
                None => file.settings.push(incoming.clone()),
            }
        }
        self.save(&file)
    }
}

/// Creates the `system_version` row if the table has none. Returns whether a row was written.
pub fn seed_system_version(store: &dyn SettingsStore, version: &str) -> Result<bool> {
    if store.get(SYSTEM_VERSION_SETTING)?.is_some() {
        return Ok(false);
    }
    store.upsert(&[Setting::new(SYSTEM_VERSION_SETTING, version, "string")])?;
    Ok(true)
}

fn parse_settings_file(content: &str) -> Result<SettingsFile> {
    let file: SettingsFile = toml::from_str(content)?;
    if file.version != SETTINGS_FILE_VERSION {
        anyhow::bail!(
            "unsupported settings file version {} (expected {})",
            file.version,
            SETTINGS_FILE_VERSION
        );
    }
    Ok(file)
}
