use anyhow::{anyhow, Context, Result};
use std::collections::VecDeque;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::fs_utils::{move_file_or_copy, remove_file_if_exists};

#[derive(Debug)]
enum OverlayChange {
    CreatedDir(PathBuf),
    Created(PathBuf),
    Replaced(PathBuf),
}

#[derive(Debug, Default)]
struct ShadowEntries {
    dirs: Vec<PathBuf>,
    files: Vec<PathBuf>,
}

/// Moves every entry of a fully extracted shadow tree over the live tree.
///
/// Directories are created first, parents before children. Each file is then
/// staged under a sibling temp name and renamed into place, so readers see
/// either the old or the new content. Replaced files are copied to
/// `backup_root` first. If any entry fails, every change is undone in reverse
/// order, leaving the live tree as it was.
pub(crate) fn overlay_tree(shadow_root: &Path, live_root: &Path, backup_root: &Path) -> Result<usize> {
    let entries = collect_entries(shadow_root)?;
    let mut changes = Vec::with_capacity(entries.dirs.len() + entries.files.len());

    for rel in &entries.dirs {
        if let Err(err) = overlay_dir(live_root, rel, &mut changes) {
            rollback(live_root, backup_root, changes);
            return Err(err).with_context(|| restored_message(rel, live_root));
        }
    }
    for rel in &entries.files {
        if let Err(err) = overlay_file(shadow_root, live_root, backup_root, rel, &mut changes) {
            rollback(live_root, backup_root, changes);
            return Err(err).with_context(|| restored_message(rel, live_root));
        }
    }

    Ok(entries.files.len())
}

fn restored_message(rel: &Path, live_root: &Path) -> String {
    format!(
        "failed to overlay {} onto {}; live tree restored",
        rel.display(),
        live_root.display()
    )
}

fn overlay_dir(live_root: &Path, rel: &Path, changes: &mut Vec<OverlayChange>) -> Result<()> {
    let dst = live_root.join(rel);
    match fs::symlink_metadata(&dst) {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(anyhow!(
            "cannot replace file with directory: {}",
            dst.display()
        )),
        Err(_) => {
            fs::create_dir(&dst).with_context(|| format!("failed to create {}", dst.display()))?;
            debug!(path = %rel.display(), "created update directory");
            changes.push(OverlayChange::CreatedDir(rel.to_path_buf()));
            Ok(())
        }
    }
}

fn overlay_file(
    shadow_root: &Path,
    live_root: &Path,
    backup_root: &Path,
    rel: &Path,
    changes: &mut Vec<OverlayChange>,
) -> Result<()> {
    let src = shadow_root.join(rel);
    let dst = live_root.join(rel);

    let replaced = match fs::symlink_metadata(&dst) {
        Ok(metadata) if metadata.is_dir() => {
            return Err(anyhow!(
                "cannot replace directory with file: {}",
                dst.display()
            ));
        }
        Ok(_) => {
            let backup = backup_root.join(rel);
            if let Some(parent) = backup.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            fs::copy(&dst, &backup).with_context(|| {
                format!("failed to back up {} to {}", dst.display(), backup.display())
            })?;
            true
        }
        Err(_) => false,
    };

    let tmp = sibling_temp_path(&dst)?;
    move_file_or_copy(&src, &tmp)?;
    if let Err(err) = fs::rename(&tmp, &dst) {
        if let Err(cleanup) = remove_file_if_exists(&tmp) {
            warn!(path = %tmp.display(), error = %cleanup, "failed to remove staged update file");
        }
        return Err(err).with_context(|| {
            format!("failed to rename {} to {}", tmp.display(), dst.display())
        });
    }

    debug!(path = %rel.display(), replaced, "overlaid update file");
    changes.push(if replaced {
        OverlayChange::Replaced(rel.to_path_buf())
    } else {
        OverlayChange::Created(rel.to_path_buf())
    });
    Ok(())
}

fn sibling_temp_path(dst: &Path) -> Result<PathBuf> {
    let name = dst
        .file_name()
        .ok_or_else(|| anyhow!("overlay target has no file name: {}", dst.display()))?;
    let mut tmp_name = OsString::from(".");
    tmp_name.push(name);
    tmp_name.push(".sysupdate-tmp");
    Ok(dst.with_file_name(tmp_name))
}

fn rollback(live_root: &Path, backup_root: &Path, changes: Vec<OverlayChange>) {
    for change in changes.into_iter().rev() {
        let restored = match &change {
            OverlayChange::CreatedDir(rel) => fs::remove_dir(live_root.join(rel)),
            OverlayChange::Created(rel) => fs::remove_file(live_root.join(rel)),
            OverlayChange::Replaced(rel) => {
                fs::rename(backup_root.join(rel), live_root.join(rel))
            }
        };
        if let Err(err) = restored {
            warn!(change = ?change, error = %err, "failed to restore live tree during overlay rollback");
        }
    }
}

fn collect_entries(root: &Path) -> Result<ShadowEntries> {
    let mut entries = ShadowEntries::default();
    let mut queue: VecDeque<PathBuf> = VecDeque::new();
    queue.push_back(root.to_path_buf());

    while let Some(dir) = queue.pop_front() {
        let mut listing = fs::read_dir(&dir)
            .with_context(|| format!("failed to read {}", dir.display()))?
            .collect::<std::io::Result<Vec<_>>>()
            .with_context(|| format!("failed to list {}", dir.display()))?;
        listing.sort_by_key(|entry| entry.file_name());

        for entry in listing {
            let path = entry.path();
            let file_type = entry
                .file_type()
                .with_context(|| format!("failed to stat {}", path.display()))?;
            let rel = path
                .strip_prefix(root)
                .with_context(|| format!("failed to relativize {}", path.display()))?
                .to_path_buf();
            if file_type.is_dir() {
                entries.dirs.push(rel);
                queue.push_back(path);
            } else {
                entries.files.push(rel);
            }
        }
    }

    Ok(entries)
}
