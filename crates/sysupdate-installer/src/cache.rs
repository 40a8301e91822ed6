use anyhow::{Context, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const SYSTEM_SETTINGS_CACHE_REGION: &str = "systemSettings";

pub trait CacheInvalidator {
    fn invalidate(&self, region: &str) -> Result<()>;
}

/// File cache where each region is a file or directory named after its key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCacheInvalidator {
    cache_dir: PathBuf,
}

impl FileCacheInvalidator {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn region_path(&self, region: &str) -> PathBuf {
        self.cache_dir.join(region)
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }
}

impl CacheInvalidator for FileCacheInvalidator {
    fn invalidate(&self, region: &str) -> Result<()> {
        if region.is_empty() || region.contains(['/', '\\']) || region == ".." {
            anyhow::bail!("invalid cache region key '{region}'");
        }

        let path = self.region_path(region);
        let metadata = match fs::symlink_metadata(&path) {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to stat cache region: {}", path.display()));
            }
        };
        let removed = if metadata.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        removed.with_context(|| format!("failed to invalidate cache region: {}", path.display()))
    }
}
