use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use serde_json::json;
use sysupdate_core::{Requester, UpdateResponse, UploadedFile};
use sysupdate_installer::{
    clear_update_lock, current_unix_timestamp, new_update_txid, read_update_lock,
    read_update_receipts, seed_system_version, AppLayout, CommandMigrator, FileCacheInvalidator,
    FileSettingsStore, UpdateInstaller, UpdaterConfig,
};
use tracing::{debug, info, warn};

use crate::render::{OutputStyle, TerminalRenderer};
use crate::{Cli, Commands};

const UPLOAD_COPY_FILE_NAME: &str = "package.zip";

type CliInstaller = UpdateInstaller<FileSettingsStore, CommandMigrator, FileCacheInvalidator>;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum CommandStatus {
    Success,
    Failure,
}

impl From<CommandStatus> for ExitCode {
    fn from(status: CommandStatus) -> Self {
        match status {
            CommandStatus::Success => ExitCode::SUCCESS,
            CommandStatus::Failure => ExitCode::FAILURE,
        }
    }
}

pub(crate) fn run_cli(cli: Cli) -> Result<CommandStatus> {
    let app_root = match cli.app_root {
        Some(root) => root,
        None => std::env::current_dir().context("failed to resolve current directory")?,
    };
    let layout = AppLayout::new(app_root);
    let config_path = cli
        .config
        .unwrap_or_else(|| layout.default_config_path());
    let config = UpdaterConfig::load(&config_path)?;
    debug!(config = %config_path.display(), root = %layout.root().display(), "loaded updater config");

    let renderer = if cli.json {
        TerminalRenderer::from_style(OutputStyle::Plain)
    } else {
        TerminalRenderer::current()
    };

    match cli.command {
        Commands::Install { file, name, roles } => {
            let original_name = match name {
                Some(name) => name,
                None => UploadedFile::from_path(&file).original_name,
            };
            let upload_copy = UploadCopy::create(&file)?;
            let upload_path = upload_copy
                .as_ref()
                .map_or_else(|| file.clone(), |copy| copy.file().to_path_buf());
            let upload = UploadedFile::new(original_name, upload_path);
            let installer = build_installer(layout, &config);
            let spinner = renderer.start_spinner(&format!("installing {}", upload.original_name));
            let response = installer.handle(&Requester::new(roles), &upload);
            spinner.finish();
            print_response(renderer, cli.json, &response)
        }
        Commands::Status { roles } => {
            let installer = build_installer(layout, &config);
            let version = match installer.current_version(&Requester::new(roles)) {
                Ok(version) => version,
                Err(err) => {
                    return print_response(
                        renderer,
                        cli.json,
                        &UpdateResponse::failure(err.public_message()),
                    );
                }
            };
            let lock_holder = read_update_lock(installer.layout())?;

            if cli.json {
                let rendered = serde_json::to_string(&json!({
                    "system_version": version,
                    "update_in_progress": lock_holder,
                }))
                .context("failed to serialize status")?;
                println!("{rendered}");
                return Ok(CommandStatus::Success);
            }

            match &version {
                Some(version) => renderer.print_status("ok", &format!("system version {version}")),
                None => renderer.print_status("warn", "system version is not recorded"),
            }
            if let Some(txid) = lock_holder {
                renderer.print_status("warn", &format!("update in progress (txid={txid})"));
            }
            Ok(CommandStatus::Success)
        }
        Commands::History => {
            let receipts = read_update_receipts(&layout)?;
            if cli.json {
                let entries = receipts
                    .iter()
                    .map(|receipt| {
                        json!({
                            "txid": receipt.txid,
                            "package": receipt.package,
                            "package_sha256": receipt.package_sha256,
                            "from_version": receipt.from_version,
                            "to_version": receipt.to_version,
                            "installed_at_unix": receipt.installed_at_unix,
                        })
                    })
                    .collect::<Vec<_>>();
                let rendered =
                    serde_json::to_string(&entries).context("failed to serialize history")?;
                println!("{rendered}");
                return Ok(CommandStatus::Success);
            }

            if receipts.is_empty() {
                renderer.print_status("warn", "no updates applied yet");
                return Ok(CommandStatus::Success);
            }
            renderer.print_section("Update history");
            let lines = receipts
                .iter()
                .map(|receipt| {
                    format!(
                        "{} {} -> {} package={} txid={}",
                        receipt.installed_at_unix,
                        receipt.from_version,
                        receipt.to_version,
                        receipt.package,
                        receipt.txid
                    )
                })
                .collect::<Vec<_>>();
            renderer.print_lines(&lines);
            Ok(CommandStatus::Success)
        }
        Commands::InitVersion { version } => {
            let version = version.trim();
            if version.is_empty() {
                return print_response(
                    renderer,
                    cli.json,
                    &UpdateResponse::failure("version must not be empty"),
                );
            }
            layout.ensure_state_dirs()?;
            let settings = FileSettingsStore::new(config.resolved_settings_path(layout.root()));
            let response = if seed_system_version(&settings, version)? {
                info!(%version, "recorded system version");
                UpdateResponse::success(format!("recorded system version {version}"))
            } else {
                UpdateResponse::failure("system version is already recorded")
            };
            print_response(renderer, cli.json, &response)
        }
        Commands::Unlock => {
            let holder = read_update_lock(&layout)?;
            let response = if clear_update_lock(&layout)? {
                info!(txid = holder.as_deref().unwrap_or("unknown"), "cleared update lock");
                UpdateResponse::success(format!(
                    "cleared update lock (txid={})",
                    holder.as_deref().unwrap_or("unknown")
                ))
            } else {
                UpdateResponse::success("no update lock present")
            };
            print_response(renderer, cli.json, &response)
        }
    }
}

/// Private copy of an operator's package. The installer consumes the file it
/// is given, so the operator's original is never handed over.
pub(crate) struct UploadCopy {
    dir: PathBuf,
    file: PathBuf,
}

impl UploadCopy {
    /// Copies `source` into a per-run scratch directory. Returns `None` for
    /// paths that are not regular files so validation can report them as given.
    pub(crate) fn create(source: &Path) -> Result<Option<Self>> {
        if !source.is_file() {
            return Ok(None);
        }

        let started_at_unix = current_unix_timestamp()?;
        let dir = std::env::temp_dir().join(format!(
            "sysupdate-{}",
            new_update_txid(started_at_unix)
        ));
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create upload dir: {}", dir.display()))?;
        let copy = Self {
            file: dir.join(UPLOAD_COPY_FILE_NAME),
            dir,
        };
        fs::copy(source, &copy.file).with_context(|| {
            format!("failed to copy {} to {}", source.display(), copy.file.display())
        })?;
        debug!(from = %source.display(), to = %copy.file.display(), "copied update package");
        Ok(Some(copy))
    }

    pub(crate) fn file(&self) -> &Path {
        &self.file
    }
}

impl Drop for UploadCopy {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_dir_all(&self.dir) {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.dir.display(), error = %err, "failed to remove upload copy");
            }
        }
    }
}

pub(crate) fn build_installer(layout: AppLayout, config: &UpdaterConfig) -> CliInstaller {
    let settings = FileSettingsStore::new(config.resolved_settings_path(layout.root()));
    let migrator = CommandMigrator::new(
        config.migrate_command.clone(),
        config.seed_command.clone(),
    );
    let cache = FileCacheInvalidator::new(config.resolved_cache_dir(layout.root()));
    UpdateInstaller::new(layout, settings, migrator, cache)
        .with_cache_region(config.settings_cache_region.clone())
}

fn print_response(
    renderer: TerminalRenderer,
    json: bool,
    response: &UpdateResponse,
) -> Result<CommandStatus> {
    if json {
        println!("{}", response.to_json()?);
    } else {
        let status = if response.error { "error" } else { "ok" };
        renderer.print_status(status, &response.message);
    }
    Ok(command_status(response))
}

pub(crate) fn command_status(response: &UpdateResponse) -> CommandStatus {
    if response.error {
        CommandStatus::Failure
    } else {
        CommandStatus::Success
    }
}
