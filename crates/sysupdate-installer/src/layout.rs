use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use sysupdate_core::{MANIFEST_FILE_NAME, PAYLOAD_FILE_NAME};

/// Paths the installer touches, all derived from the application root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppLayout {
    root: PathBuf,
}

impl AppLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn update_dir(&self) -> PathBuf {
        self.root.join("update")
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.update_dir().join("tmp")
    }

    pub fn staged_upload_path(&self, file_name: &str) -> PathBuf {
        self.staging_dir().join(file_name)
    }

    pub fn staged_manifest_path(&self) -> PathBuf {
        self.staging_dir().join(MANIFEST_FILE_NAME)
    }

    pub fn staged_payload_path(&self) -> PathBuf {
        self.staging_dir().join(PAYLOAD_FILE_NAME)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE_NAME)
    }

    pub fn payload_path(&self) -> PathBuf {
        self.root.join(PAYLOAD_FILE_NAME)
    }

    pub fn shadow_root(&self) -> PathBuf {
        self.update_dir().join("shadow")
    }

    pub fn shadow_dir(&self, txid: &str) -> PathBuf {
        self.shadow_root().join(txid)
    }

    pub fn backup_root(&self) -> PathBuf {
        self.update_dir().join("backup")
    }

    pub fn backup_dir(&self, txid: &str) -> PathBuf {
        self.backup_root().join(txid)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.update_dir().join("update.lock")
    }

    pub fn journal_dir(&self) -> PathBuf {
        self.update_dir().join("journal")
    }

    pub fn update_metadata_path(&self, txid: &str) -> PathBuf {
        self.journal_dir().join(format!("{txid}.json"))
    }

    pub fn update_journal_path(&self, txid: &str) -> PathBuf {
        self.journal_dir().join(format!("{txid}.journal"))
    }

    pub fn history_dir(&self) -> PathBuf {
        self.update_dir().join("history")
    }

    pub fn receipt_path(&self, installed_at_unix: u64, version: &str) -> PathBuf {
        let version: String = version
            .chars()
            .map(|ch| {
                if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '_') {
                    ch
                } else {
                    '_'
                }
            })
            .collect();
        self.history_dir()
            .join(format!("{installed_at_unix}-{version}.receipt"))
    }

    pub fn default_config_path(&self) -> PathBuf {
        self.root.join("sysupdate.toml")
    }

    pub fn ensure_state_dirs(&self) -> Result<()> {
        for dir in [
            self.update_dir(),
            self.shadow_root(),
            self.backup_root(),
            self.journal_dir(),
            self.history_dir(),
        ] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        Ok(())
    }
}
