// ABOUTME: Entry point for the templify CLI application.
// ABOUTME: Parses arguments, wires Ctrl-C to cancellation, and dispatches commands.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use std::env;
use templify::config::{self, Config};
use templify::error::{Error, Result};
use templify::output::{Output, OutputMode};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

const EXIT_INTERRUPTED: i32 = 130;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let mode = if cli.json {
        OutputMode::Json
    } else if cli.quiet {
        OutputMode::Quiet
    } else {
        OutputMode::Normal
    };
    let output = Output::new(mode);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if forward_interrupts(&on_interrupt, tokio::signal::ctrl_c).await {
            std::process::exit(EXIT_INTERRUPTED);
        }
    });

    if let Err(e) = run(cli, &output, &cancel).await {
        output.error(&e.to_string());
        let code = match &e {
            Error::Publish(e) if e.is_cancelled() => EXIT_INTERRUPTED,
            _ => 1,
        };
        std::process::exit(code);
    }
}

/// Cancel on the first interrupt. Returns `true` once a second one arrives,
/// `false` if signals can no longer be received.
async fn forward_interrupts<F, Fut>(cancel: &CancellationToken, mut interrupt: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    while interrupt().await.is_ok() {
        if cancel.is_cancelled() {
            tracing::warn!("second interrupt received, exiting without cleanup");
            return true;
        }
        tracing::warn!("interrupt received, cancelling");
        cancel.cancel();
    }
    false
}

async fn run(cli: Cli, output: &Output, cancel: &CancellationToken) -> Result<()> {
    let cwd = env::current_dir()?;
    let load_config = || match &cli.config {
        Some(path) => Config::load(path),
        None => Config::discover(&cwd),
    };

    match cli.command {
        Commands::Init { force } => {
            config::init_config(&cwd, force)?;
            output.success(&format!("Wrote {}", config::CONFIG_FILENAME));
            Ok(())
        }
        Commands::Publish {
            files,
            builder_id,
            manifest,
            dry_run,
            debug,
        } => {
            let config = load_config()?;
            let request = commands::PublishRequest {
                builder_id,
                files,
                manifest,
                dry_run,
                debug,
            };
            commands::publish(&config, request, Output::new(output.mode()), cancel).await
        }
        Commands::Destroy { manifest, dry_run } => {
            let config = if dry_run { None } else { Some(load_config()?) };
            commands::destroy(config.as_ref(), &manifest, output).await
        }
    }
}
