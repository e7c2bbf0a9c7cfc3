//! repocache CLI entry point

use clap::Parser;
use console::style;
use repocache::cli::{Cli, Commands};
use repocache::config::{Config, ConfigManager};
use repocache::error::RepoCacheResult;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let Some((stdout, stderr)) = e.partial_output() {
                print!("{}", stdout);
                eprint!("{}", stderr);
            }
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> RepoCacheResult<()> {
    let cli = Cli::parse();

    let manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = manager.load().await?;
    init_logging(cli.verbose, &config);

    // Config commands must work even when the storage dirs are not writable
    if let Commands::Config(args) = cli.command {
        return repocache::cli::commands::config(args, &manager, &config).await;
    }

    ConfigManager::ensure_state_dirs(&config).await?;

    let caller = cli.caller.as_str();
    match cli.command {
        Commands::Config(_) => Ok(()),
        Commands::Prepare(args) => repocache::cli::commands::prepare(args, caller, &config).await,
        Commands::Analyze(args) => repocache::cli::commands::analyze(args, caller, &config).await,
        Commands::Run(args) => repocache::cli::commands::run(args, caller, &config).await,
        Commands::Result(args) => repocache::cli::commands::result(args, caller, &config).await,
        Commands::List(args) => repocache::cli::commands::list(args, caller, &config).await,
        Commands::Sweep(args) => repocache::cli::commands::sweep(args, &config).await,
        Commands::Serve(args) => repocache::cli::commands::serve(args, &config).await,
    }
}

/// 0 = warn, 1 = info, 2+ = debug; logs go to stderr so stdout stays parseable
fn init_logging(verbose: u8, config: &Config) {
    let filter = match verbose {
        0 => EnvFilter::new("repocache=warn"),
        1 => EnvFilter::new("repocache=info"),
        _ => EnvFilter::new("repocache=debug"),
    };

    if config.general.log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .without_time()
            .init();
    }
}
