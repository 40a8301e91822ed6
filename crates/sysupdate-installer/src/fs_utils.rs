use anyhow::{Context, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::warn;

pub(crate) fn remove_file_if_exists(path: &Path) -> io::Result<()> {
    if path.exists() {
        fs::remove_file(path)?;
    }
    Ok(())
}

/// Moves a file, copying when a rename is not possible (e.g. across filesystems).
pub(crate) fn move_file_or_copy(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    match fs::rename(src, dst) {
        Ok(_) => Ok(()),
        Err(_) => {
            fs::copy(src, dst).with_context(|| {
                format!("failed to copy {} to {}", src.display(), dst.display())
            })?;
            fs::remove_file(src)
                .with_context(|| format!("failed to remove {}", src.display()))?;
            Ok(())
        }
    }
}

pub(crate) fn create_dir_all_permissive(path: &Path) -> io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o777);
    }
    builder.create(path)
}

/// The manifest and payload once they sit in the application root.
///
/// Tracked files are deleted when the guard drops, whatever path the update took.
#[derive(Debug, Default)]
pub(crate) struct RelocatedFiles {
    paths: Vec<PathBuf>,
}

impl RelocatedFiles {
    pub(crate) fn track(&mut self, path: PathBuf) {
        self.paths.push(path);
    }

    pub(crate) fn remove(&mut self) -> Result<()> {
        for path in self.paths.drain(..) {
            remove_file_if_exists(&path)
                .with_context(|| format!("failed to remove {}", path.display()))?;
        }
        Ok(())
    }
}

impl Drop for RelocatedFiles {
    fn drop(&mut self) {
        for path in self.paths.drain(..) {
            if let Err(err) = remove_file_if_exists(&path) {
                warn!(path = %path.display(), error = %err, "failed to remove relocated update file");
            }
        }
    }
}

/// Directory owned by a single update run and removed with it.
#[derive(Debug)]
pub(crate) struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if !self.path.exists() {
            return;
        }
        if let Err(err) = fs::remove_dir_all(&self.path) {
            warn!(path = %self.path.display(), error = %err, "failed to remove scratch directory");
        }
    }
}
