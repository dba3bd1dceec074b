//! Backend supervisor binary
//!
//! Loads a configuration file, prepares the user data directory, starts and
//! supervises the backend, and serves the shell bridge until Ctrl-C.

use anyhow::{Context, Result};
use backend_supervisor::Launcher;
use backend_supervisor::storage::MigrationOutcome;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "backend-supervisor")]
#[command(about = "Launches and supervises a desktop application's local web backend")]
#[command(version)]
struct Args {
    /// Configuration file (JSON, or YAML by extension)
    #[arg(short, long, default_value = "supervisor.json")]
    config: PathBuf,

    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(long)]
    dev: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start and supervise the backend (default)
    Run,
    /// Back up the database and prune old backups
    Backup {
        /// Suffix added to the backup file name
        #[arg(long)]
        suffix: Option<String>,
    },
    /// Create data directories and migrate a legacy database
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.dev);

    let mut launcher = Launcher::from_config_file(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config.display()))?;

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run(&mut launcher).await,
        Command::Backup { suffix } => {
            launcher.layout().initialize()?;
            match launcher.backup(suffix.as_deref())? {
                Some(path) => println!("{}", path.display()),
                None => tracing::warn!("No database found, nothing backed up"),
            }
            Ok(())
        }
        Command::Migrate => {
            report_migration(launcher.prepare_data()?);
            Ok(())
        }
    }
}

async fn run(launcher: &mut Launcher) -> Result<()> {
    report_migration(launcher.prepare_data()?);

    launcher.start().await.context("Failed to start backend supervision")?;
    if let Some(bridge) = launcher.bridge() {
        tracing::info!(address = %bridge.local_addr(), "Shell bridge listening");
    }

    tracing::info!("Press Ctrl+C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    tracing::info!("Shutting down");
    launcher.shutdown().await?;
    Ok(())
}

fn report_migration(outcome: Option<MigrationOutcome>) {
    match outcome {
        Some(MigrationOutcome::Migrated { backup }) => {
            tracing::info!(backup = ?backup, "Legacy database migrated")
        }
        Some(MigrationOutcome::AlreadyMigrated) => tracing::debug!("Database already migrated"),
        Some(MigrationOutcome::NoLegacyDatabase) | None => {}
    }
}

fn init_tracing(dev: bool) {
    use tracing_subscriber::{EnvFilter, fmt};

    let default = if dev {
        "backend_supervisor=debug,backend=debug,info"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt().with_env_filter(filter).with_target(true).init();
}
