use anyhow::{anyhow, Context};
use std::fs;
use std::path::Path;

use sysupdate_core::{
    sha256_file_hex, Requester, UpdateResponse, UploadRule, UploadedFile, VersionManifest,
    MANIFEST_FILE_NAME, PAYLOAD_FILE_NAME,
};
use tracing::{debug, error, info, warn};

use crate::archive::{extract_zip, open_zip};
use crate::fs_utils::{create_dir_all_permissive, move_file_or_copy, RelocatedFiles, ScratchDir};
use crate::overlay::overlay_tree;
use crate::{
    append_update_journal_entry, begin_update, current_unix_timestamp, new_update_txid,
    read_update_metadata, update_status, wizard_checkmark_settings, write_update_metadata,
    write_update_receipt, AppLayout, CacheInvalidator, LockAcquire, SchemaMigrator,
    SettingsStore, UpdateError, UpdateJournalEntry, UpdateLock, UpdateReceipt,
    INTERNAL_FAULT_MESSAGE, SYSTEM_SETTINGS_CACHE_REGION, SYSTEM_VERSION_SETTING,
    UPDATE_SUCCESS_MESSAGE,
};

/// Applies uploaded update packages to one application root.
#[derive(Debug)]
pub struct UpdateInstaller<S, M, C> {
    layout: AppLayout,
    settings: S,
    migrator: M,
    cache: C,
    cache_region: String,
}

struct UpdateRun<'a> {
    layout: &'a AppLayout,
    txid: String,
    seq: u64,
}

impl UpdateRun<'_> {
    fn record(&mut self, step: &str, path: Option<&Path>) -> anyhow::Result<()> {
        self.seq += 1;
        append_update_journal_entry(
            self.layout,
            &self.txid,
            &UpdateJournalEntry {
                seq: self.seq,
                step: step.to_string(),
                state: "done".to_string(),
                path: path.map(|path| path.display().to_string()),
            },
        )?;
        debug!(txid = %self.txid, step, "update step done");
        Ok(())
    }

    fn record_versions(&self, from_version: &str, to_version: &str) -> anyhow::Result<()> {
        let mut metadata = read_update_metadata(self.layout, &self.txid)?
            .with_context(|| format!("update metadata not found for '{}'", self.txid))?;
        metadata.from_version = Some(from_version.to_string());
        metadata.to_version = Some(to_version.to_string());
        write_update_metadata(self.layout, &metadata)?;
        Ok(())
    }
}

impl<S, M, C> UpdateInstaller<S, M, C>
where
    S: SettingsStore,
    M: SchemaMigrator,
    C: CacheInvalidator,
{
    pub fn new(layout: AppLayout, settings: S, migrator: M, cache: C) -> Self {
        Self {
            layout,
            settings,
            migrator,
            cache,
            cache_region: SYSTEM_SETTINGS_CACHE_REGION.to_string(),
        }
    }

    pub fn with_cache_region(mut self, region: impl Into<String>) -> Self {
        self.cache_region = region.into();
        self
    }

    pub fn layout(&self) -> &AppLayout {
        &self.layout
    }

    pub fn settings(&self) -> &S {
        &self.settings
    }

    pub fn migrator(&self) -> &M {
        &self.migrator
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// Stored version for the update screen, visible to super admins only.
    pub fn current_version(&self, requester: &Requester) -> Result<Option<String>, UpdateError> {
        if !requester.is_super_admin() {
            return Err(UpdateError::PermissionDenied);
        }
        Ok(self
            .settings
            .get(SYSTEM_VERSION_SETTING)?
            .map(|setting| setting.data))
    }

    /// Runs an install and shapes the outcome into the response body. Internal
    /// faults are logged in full and answered with a generic message.
    pub fn handle(&self, requester: &Requester, upload: &UploadedFile) -> UpdateResponse {
        match self.install(requester, upload) {
            Ok(message) => UpdateResponse::success(message),
            Err(UpdateError::Internal(err)) => {
                error!(error = ?err, package = %upload.original_name, "update failed");
                UpdateResponse::failure(INTERNAL_FAULT_MESSAGE)
            }
            Err(err) => {
                warn!(kind = err.kind(), message = %err, package = %upload.original_name, "update rejected");
                UpdateResponse::failure(err.public_message())
            }
        }
    }

    pub fn install(
        &self,
        requester: &Requester,
        upload: &UploadedFile,
    ) -> Result<String, UpdateError> {
        if !requester.is_super_admin() {
            return Err(UpdateError::PermissionDenied);
        }
        if let Some(rule) = upload.first_failed_rule() {
            return Err(UpdateError::Validation(rule.message()));
        }
        let file_name = staged_upload_name(upload)?;

        let update_dir = self.layout.update_dir();
        if create_dir_all_permissive(&update_dir).is_err() && !update_dir.is_dir() {
            return Err(UpdateError::TempDirectory);
        }

        let started_at_unix = current_unix_timestamp()?;
        let txid = new_update_txid(started_at_unix);
        let _lock = match UpdateLock::acquire(&self.layout, &txid)? {
            LockAcquire::Acquired(lock) => lock,
            LockAcquire::Held { txid: holder } => {
                warn!(holder = holder.as_deref().unwrap_or("unknown"), "update lock is held");
                return Err(UpdateError::UpdateInProgress);
            }
        };

        begin_update(&self.layout, &txid, &file_name, started_at_unix)?;
        info!(%txid, package = %file_name, "starting update");

        let mut run = UpdateRun {
            layout: &self.layout,
            txid: txid.clone(),
            seq: 0,
        };
        let result = self.run_update(&mut run, upload, &file_name, started_at_unix);

        let status = if result.is_ok() { "committed" } else { "failed" };
        if let Err(err) = update_status(&self.layout, &txid, status) {
            warn!(%txid, status, error = %err, "failed to record update status");
        }
        result
    }

    fn run_update(
        &self,
        run: &mut UpdateRun<'_>,
        upload: &UploadedFile,
        file_name: &str,
        started_at_unix: u64,
    ) -> Result<String, UpdateError> {
        let staging = self.layout.staging_dir();
        if let Err(err) = reset_staging_dir(&staging) {
            warn!(path = %staging.display(), error = %format!("{err:#}"), "staging directory unavailable");
            return Err(UpdateError::TempDirectory);
        }
        let staging = ScratchDir::new(staging);

        let staged_upload = self.layout.staged_upload_path(file_name);
        move_file_or_copy(&upload.path, &staged_upload)?;
        let package_sha256 = sha256_file_hex(&staged_upload)?;
        run.record("stage_upload", Some(&staged_upload))?;

        let mut package = open_zip(&staged_upload).map_err(|err| {
            warn!(error = %format!("{err:#}"), "uploaded package is not a readable zip");
            UpdateError::ArchiveOpen
        })?;
        let extracted = extract_zip(&mut package, staging.path())?;
        drop(package);
        fs::remove_file(&staged_upload).with_context(|| {
            format!("failed to remove uploaded package: {}", staged_upload.display())
        })?;
        run.record("extract_package", Some(staging.path()))?;
        debug!(entries = extracted, "extracted update package");

        let staged_manifest = self.layout.staged_manifest_path();
        let staged_payload = self.layout.staged_payload_path();
        if !staged_manifest.is_file() || !staged_payload.is_file() {
            return Err(UpdateError::MalformedPackage);
        }

        let manifest_path = self.layout.manifest_path();
        let payload_path = self.layout.payload_path();
        let mut relocated = RelocatedFiles::default();
        for (src, dst) in [
            (&staged_manifest, &manifest_path),
            (&staged_payload, &payload_path),
        ] {
            if let Err(err) = move_file_or_copy(src, dst) {
                warn!(from = %src.display(), to = %dst.display(), error = %format!("{err:#}"), "failed to relocate update file");
                return Err(UpdateError::Move);
            }
            relocated.track(dst.clone());
        }
        run.record("relocate_files", Some(self.layout.root()))?;

        let manifest = VersionManifest::load(&manifest_path)?;

        let installed = self
            .settings
            .get(SYSTEM_VERSION_SETTING)?
            .ok_or(UpdateError::VersionRecordMissing)?
            .data;
        if installed == manifest.update_version {
            info!(version = %installed, "system already at package target version; re-applying");
        } else if installed != manifest.current_version {
            return Err(UpdateError::VersionMismatch { installed });
        }
        run.record_versions(&installed, &manifest.update_version)?;
        run.record("version_gate", None)?;

        let shadow = ScratchDir::new(self.layout.shadow_dir(&run.txid));
        let mut payload = open_zip(&payload_path).map_err(|err| {
            warn!(error = %format!("{err:#}"), "source code archive could not be opened");
            UpdateError::PayloadExtraction
        })?;
        extract_zip(&mut payload, shadow.path()).map_err(|err| {
            warn!(error = %format!("{err:#}"), "source code archive could not be extracted");
            UpdateError::PayloadExtraction
        })?;
        drop(payload);
        run.record("extract_payload", Some(shadow.path()))?;

        let backup = ScratchDir::new(self.layout.backup_dir(&run.txid));
        let overlaid = overlay_tree(shadow.path(), self.layout.root(), backup.path())?;
        run.record("overlay_payload", Some(self.layout.root()))?;
        info!(files = overlaid, "applied source code to application root");

        self.migrator.apply_pending_changes(self.layout.root())?;
        self.migrator
            .seed_installation_defaults(self.layout.root())?;
        run.record("migrate", None)?;

        relocated.remove()?;

        if !self
            .settings
            .update_data(SYSTEM_VERSION_SETTING, &manifest.update_version)?
        {
            return Err(anyhow!(
                "system version record disappeared before '{}' could be stored",
                manifest.update_version
            )
            .into());
        }
        run.record("persist_version", None)?;

        self.settings.upsert(&wizard_checkmark_settings())?;
        run.record("wizard_checkmarks", None)?;

        self.cache.invalidate(&self.cache_region)?;
        run.record("invalidate_cache", None)?;

        let receipt_path = write_update_receipt(
            &self.layout,
            &UpdateReceipt {
                txid: run.txid.clone(),
                package: file_name.to_string(),
                package_sha256: Some(package_sha256),
                from_version: installed.clone(),
                to_version: manifest.update_version.clone(),
                installed_at_unix: started_at_unix,
            },
        )?;
        info!(
            from = %installed,
            to = %manifest.update_version,
            receipt = %receipt_path.display(),
            "system updated"
        );

        Ok(UPDATE_SUCCESS_MESSAGE.to_string())
    }
}

/// Name the upload is staged under. Names that collide with package contents
/// get a prefix so extraction cannot overwrite the archive being read.
fn staged_upload_name(upload: &UploadedFile) -> Result<String, UpdateError> {
    let name = upload
        .file_name()
        .ok_or_else(|| UpdateError::Validation(UploadRule::File.message()))?;
    if name == MANIFEST_FILE_NAME || name == PAYLOAD_FILE_NAME {
        return Ok(format!("upload-{name}"));
    }
    Ok(name.to_string())
}

fn reset_staging_dir(staging: &Path) -> anyhow::Result<()> {
    if staging.exists() {
        fs::remove_dir_all(staging).with_context(|| {
            format!("failed to clear stale staging dir: {}", staging.display())
        })?;
    }
    if let Err(err) = create_dir_all_permissive(staging) {
        if !staging.is_dir() {
            return Err(err)
                .with_context(|| format!("failed to create staging dir: {}", staging.display()));
        }
    }
    Ok(())
}
