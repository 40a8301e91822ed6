use anyhow::{anyhow, Context, Result};
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::warn;

use crate::{AppLayout, UpdateJournalEntry, UpdateMetadata};

const UPDATE_METADATA_VERSION: u32 = 1;

static TXID_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Exclusive claim on the application root for one update.
///
/// The lock file is created with create-new semantics so a second installer,
/// in this process or another, fails to acquire it. Dropping releases it.
#[derive(Debug)]
pub struct UpdateLock {
    path: PathBuf,
}

#[derive(Debug)]
pub enum LockAcquire {
    Acquired(UpdateLock),
    Held { txid: Option<String> },
}

impl UpdateLock {
    pub fn acquire(layout: &AppLayout, txid: &str) -> Result<LockAcquire> {
        let path = layout.lock_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                let txid = read_update_lock(layout).ok().flatten();
                return Ok(LockAcquire::Held { txid });
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to claim update lock: {}", path.display()));
            }
        };

        let lock = Self { path };
        file.write_all(format!("{txid}\n").as_bytes())
            .with_context(|| format!("failed to write update lock: {}", lock.path.display()))?;
        file.flush()
            .with_context(|| format!("failed to flush update lock: {}", lock.path.display()))?;
        Ok(LockAcquire::Acquired(lock))
    }
}

impl Drop for UpdateLock {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            if err.kind() != io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %err, "failed to release update lock");
            }
        }
    }
}

pub fn read_update_lock(layout: &AppLayout) -> Result<Option<String>> {
    let path = layout.lock_path();
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read update lock: {}", path.display()));
        }
    };

    let txid = raw.trim();
    if txid.is_empty() {
        return Ok(None);
    }
    Ok(Some(txid.to_string()))
}

/// Removes a lock left behind by an installer that did not exit cleanly.
pub fn clear_update_lock(layout: &AppLayout) -> Result<bool> {
    let path = layout.lock_path();
    if !path.exists() {
        return Ok(false);
    }
    fs::remove_file(&path)
        .with_context(|| format!("failed to clear update lock: {}", path.display()))?;
    Ok(true)
}

pub fn new_update_txid(started_at_unix: u64) -> String {
    let sequence = TXID_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("update-{started_at_unix}-{}-{sequence}", std::process::id())
}

pub fn begin_update(
    layout: &AppLayout,
    txid: &str,
    package: &str,
    started_at_unix: u64,
) -> Result<UpdateMetadata> {
    let metadata = UpdateMetadata {
        version: UPDATE_METADATA_VERSION,
        txid: txid.to_string(),
        package: package.to_string(),
        status: "applying".to_string(),
        started_at_unix,
        from_version: None,
        to_version: None,
    };
    write_update_metadata(layout, &metadata)?;
    Ok(metadata)
}

pub fn write_update_metadata(layout: &AppLayout, metadata: &UpdateMetadata) -> Result<PathBuf> {
    let path = layout.update_metadata_path(&metadata.txid);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let rendered =
        serde_json::to_string_pretty(metadata).context("failed to serialize update metadata")?;
    fs::write(&path, rendered.as_bytes())
        .with_context(|| format!("failed to write update metadata file: {}", path.display()))?;
    Ok(path)
}

pub fn read_update_metadata(layout: &AppLayout, txid: &str) -> Result<Option<UpdateMetadata>> {
    let path = layout.update_metadata_path(txid);
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| {
                format!("failed to read update metadata file: {}", path.display())
            });
        }
    };

    let metadata: UpdateMetadata = serde_json::from_str(&raw)
        .with_context(|| format!("failed parsing update metadata file: {}", path.display()))?;
    if metadata.version != UPDATE_METADATA_VERSION {
        return Err(anyhow!(
            "unsupported update metadata version {} in {}",
            metadata.version,
            path.display()
        ));
    }
    Ok(Some(metadata))
}

pub fn update_status(layout: &AppLayout, txid: &str, status: &str) -> Result<()> {
    let mut metadata = read_update_metadata(layout, txid)?
        .ok_or_else(|| anyhow!("update metadata not found for '{txid}'"))?;
    metadata.status = status.to_string();
    write_update_metadata(layout, &metadata)?;
    Ok(())
}

pub fn append_update_journal_entry(
    layout: &AppLayout,
    txid: &str,
    entry: &UpdateJournalEntry,
) -> Result<PathBuf> {
    let path = layout.update_journal_path(txid);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let line = serde_json::to_string(entry).context("failed to serialize journal entry")?;
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open update journal: {}", path.display()))?;
    file.write_all(line.as_bytes())
        .with_context(|| format!("failed to append update journal: {}", path.display()))?;
    file.write_all(b"\n").with_context(|| {
        format!("failed to append update journal newline: {}", path.display())
    })?;
    file.flush()
        .with_context(|| format!("failed to flush update journal: {}", path.display()))?;
    Ok(path)
}

pub fn read_update_journal(layout: &AppLayout, txid: &str) -> Result<Vec<UpdateJournalEntry>> {
    let path = layout.update_journal_path(txid);
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read update journal: {}", path.display()));
        }
    };

    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            serde_json::from_str::<UpdateJournalEntry>(line)
                .with_context(|| format!("invalid update journal line in {}", path.display()))
        })
        .collect()
}

pub fn current_unix_timestamp() -> Result<u64> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system time is before unix epoch")?
        .as_secs())
}
