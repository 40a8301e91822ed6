use anyhow::{anyhow, Context, Result};
use std::fs;
use std::io;
use std::path::Path;

use zip::ZipArchive;

pub(crate) type PackageArchive = ZipArchive<fs::File>;

pub(crate) fn open_zip(path: &Path) -> Result<PackageArchive> {
    let file = fs::File::open(path)
        .with_context(|| format!("failed to open archive: {}", path.display()))?;
    ZipArchive::new(file).with_context(|| format!("failed to read zip archive: {}", path.display()))
}

/// Extracts every entry below `dst`. Entries whose names would land outside
/// `dst` fail the whole extraction.
pub(crate) fn extract_zip(archive: &mut PackageArchive, dst: &Path) -> Result<usize> {
    fs::create_dir_all(dst).with_context(|| format!("failed to create {}", dst.display()))?;

    let mut written = 0_usize;
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .with_context(|| format!("failed to read zip entry #{index}"))?;
        let rel = entry
            .enclosed_name()
            .map(Path::to_path_buf)
            .ok_or_else(|| anyhow!("zip entry '{}' escapes the extraction root", entry.name()))?;
        let out_path = dst.join(&rel);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)
                .with_context(|| format!("failed to create {}", out_path.display()))?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let mut out = fs::File::create(&out_path)
            .with_context(|| format!("failed to create {}", out_path.display()))?;
        io::copy(&mut entry, &mut out)
            .with_context(|| format!("failed to extract zip entry to {}", out_path.display()))?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode().filter(|mode| mode & 0o777 != 0) {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&out_path, fs::Permissions::from_mode(mode & 0o777))
                .with_context(|| format!("failed to set permissions on {}", out_path.display()))?;
        }
        written += 1;
    }

    Ok(written)
}
