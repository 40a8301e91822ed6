use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use sysupdate_core::SUPER_ADMIN_ROLE;
use tracing_subscriber::EnvFilter;

mod dispatch;
mod render;

use dispatch::run_cli;

#[derive(Parser, Debug)]
#[command(name = "sysupdate")]
#[command(about = "Applies uploaded update packages to an application root", long_about = None)]
struct Cli {
    /// Application root; defaults to the current directory.
    #[arg(long, global = true)]
    app_root: Option<PathBuf>,
    /// Config file; defaults to `<app-root>/sysupdate.toml`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Print machine-readable JSON instead of status lines.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Install an update package.
    Install {
        file: PathBuf,
        /// Client file name to validate against; defaults to the file's own name.
        #[arg(long)]
        name: Option<String>,
        #[arg(long = "role", default_value = SUPER_ADMIN_ROLE)]
        roles: Vec<String>,
    },
    /// Show the recorded system version.
    Status {
        #[arg(long = "role", default_value = SUPER_ADMIN_ROLE)]
        roles: Vec<String>,
    },
    /// List applied updates.
    History,
    /// Record the installed version on a fresh application root.
    InitVersion { version: String },
    /// Remove an update lock left behind by an interrupted run.
    Unlock,
}

fn main() -> Result<ExitCode> {
    init_tracing();
    let cli = Cli::parse();
    Ok(run_cli(cli)?.into())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
