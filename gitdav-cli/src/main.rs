//! gitdav CLI - back up git repositories to a WebDAV collection
//!
//! `gitdav serve` accepts backup requests over HTTP and processes them one at
//! a time; `gitdav backup` backs up a single repository in the foreground.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use gitdav_core::{Config, Secrets};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::{BackupArgs, HashTokenArgs, ServeArgs};

/// gitdav: repository backups to WebDAV
#[derive(Parser, Debug)]
#[command(name = "gitdav")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ~/.config/gitdav/config.toml)
    #[arg(long, global = true, env = "GITDAV_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the scheduler and HTTP intake
    Serve(ServeArgs),

    /// Back up one repository now
    #[command(visible_alias = "b")]
    Backup(BackupArgs),

    /// Print the SHA-256 digest of an intake token
    HashToken(HashTokenArgs),

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "gitdav=debug,tower_http=debug"
    } else {
        "gitdav=info,tower_http=info"
    };
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .init();

    let bind = match &cli.command {
        Some(Commands::Serve(args)) => args.bind.clone(),
        _ => None,
    };
    let config = Config::load_with_overrides(cli.config.as_deref(), bind)?;

    if cli.verbose {
        tracing::info!(
            local_root = ?config.storage.local_root,
            webdav_url = ?config.webdav.url,
            tick_interval = ?config.scheduler.tick_interval,
            "Configuration loaded"
        );
    }

    match cli.command {
        Some(Commands::Serve(args)) => {
            args.execute(&config).await?;
        }
        Some(Commands::Backup(args)) => {
            args.execute(&config).await?;
        }
        Some(Commands::HashToken(args)) => {
            args.execute()?;
        }
        Some(Commands::Config) => print_config(&config, cli.config.as_deref()),
        None => {
            println!("gitdav - repository backups to WebDAV");
            println!();
            println!("Use --help for usage information");
        }
    }

    Ok(())
}

fn print_config(config: &Config, explicit: Option<&std::path::Path>) {
    println!("gitdav Configuration");
    println!("====================");
    println!();
    println!("Storage:");
    println!(
        "  local_root: {}",
        config
            .storage
            .local_root
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(not set)".to_string())
    );
    println!("  webdav.url: {}", config.webdav.url.as_deref().unwrap_or("(not set)"));
    println!();
    println!("Scheduler:");
    println!("  tick_interval: {:?}", config.scheduler.tick_interval);
    println!("  report_history: {}", config.scheduler.report_history);
    println!();
    println!("Server:");
    println!("  bind: {}", config.server.bind);
    println!();
    println!("Retry:");
    println!("  max_retries: {}", config.retry.max_retries);
    println!("  initial_delay: {:?}", config.retry.initial_delay);
    println!("  max_delay: {:?}", config.retry.max_delay);
    println!();

    let config_path = explicit.map(PathBuf::from).or_else(Config::default_config_path);
    if let Some(path) = config_path {
        println!("Config file: {}", path.display());
        if path.exists() {
            println!("  (exists)");
        } else {
            println!("  (not found - using defaults)");
        }
    }
    if let Some(path) = Secrets::default_secrets_path() {
        println!("Secrets file: {}", path.display());
        if path.exists() {
            println!("  (exists)");
        } else {
            println!("  (not found - using environment only)");
        }
    }
    if let Err(e) = config.validate() {
        println!();
        println!("Warning: {}", e);
    }
}
