use anyhow::{anyhow, Context, Result};
use std::path::Path;
use std::process::Command;

/// Applies schema changes shipped with an update.
pub trait SchemaMigrator {
    fn apply_pending_changes(&self, app_root: &Path) -> Result<()>;

    fn seed_installation_defaults(&self, app_root: &Path) -> Result<()>;
}

/// Runs the migrate and seed steps as external commands inside the application root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandMigrator {
    migrate: Vec<String>,
    seed: Vec<String>,
}

impl CommandMigrator {
    pub fn new(migrate: Vec<String>, seed: Vec<String>) -> Self {
        Self { migrate, seed }
    }

    pub fn migrate_command(&self) -> &[String] {
        &self.migrate
    }

    pub fn seed_command(&self) -> &[String] {
        &self.seed
    }
}

impl SchemaMigrator for CommandMigrator {
    fn apply_pending_changes(&self, app_root: &Path) -> Result<()> {
        let mut command = build_command(&self.migrate, app_root)
            .context("migrate command is not configured")?;
        run_command(&mut command, "failed to apply pending migrations")
    }

    fn seed_installation_defaults(&self, app_root: &Path) -> Result<()> {
        let mut command =
            build_command(&self.seed, app_root).context("seed command is not configured")?;
        run_command(&mut command, "failed to seed installation defaults")
    }
}

fn build_command(argv: &[String], app_root: &Path) -> Result<Command> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| anyhow!("command must not be empty"))?;
    let mut command = Command::new(program);
    command.args(args).current_dir(app_root);
    Ok(command)
}

pub(crate) fn run_command(command: &mut Command, context_message: &str) -> Result<()> {
    let output = command
        .output()
        .with_context(|| format!("{context_message}: command failed to start"))?;
    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    Err(anyhow!(
        "{context_message}: status={} stdout='{}' stderr='{}'",
        output.status,
        stdout.trim(),
        stderr.trim()
    ))
}
