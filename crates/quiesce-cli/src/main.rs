//! Quiesce CLI - run backup statement scripts and inspect DDL audit logs

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use quiesce::BackupConfig;
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(name = "quiesce")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Data directory; the DDL log defaults to <data-dir>/ddl.log
    #[arg(short, long, global = true, default_value = "./data")]
    data_dir: PathBuf,

    /// Override the lock wait timeout (milliseconds). Without a config file
    /// it defaults to 1000 so blocked script statements fail quickly.
    #[arg(long, global = true)]
    lock_wait_timeout_ms: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a script of `<session>: <statement>` lines in order
    Run {
        /// Script file
        script: PathBuf,

        /// Exit with an error if any statement failed
        #[arg(long)]
        strict: bool,
    },

    /// Decode a DDL audit log into JSON lines
    DdlLog {
        /// Log file
        file: PathBuf,
    },
}

fn load_config(cli: &Cli) -> Result<BackupConfig> {
    let Some(path) = &cli.config else {
        return Ok(commands::run::script_config(
            &cli.data_dir,
            cli.lock_wait_timeout_ms,
        ));
    };
    let mut config = BackupConfig::from_json_file(path)
        .with_context(|| format!("Failed to load config {}", path.display()))?;
    if let Some(timeout_ms) = cli.lock_wait_timeout_ms {
        config = config.with_lock_wait_timeout(timeout_ms);
    }
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    match &cli.command {
        Commands::Run { script, strict } => {
            let config = load_config(&cli)?;
            commands::run::execute(config, script, *strict)?;
        }
        Commands::DdlLog { file } => {
            commands::ddl_log::execute(file)?;
        }
    }

    Ok(())
}
