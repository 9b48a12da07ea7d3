//! netflashd - Netinstall flasher daemon
//!
//! Waits for router boards booting into netinstall on one interface and
//! flashes each with the firmware and configuration its file provider picks.
//!
//! Usage:
//!   netflashd [OPTIONS] [netflash.toml]
//!
//! Exit status: 0 when interrupted or after a successful `--once`, 1 when the
//! flasher cannot run, 2 when the `--once` session was aborted.

mod progress;

use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use netflash_core::{FatalError, FlashError};
use netflash_proto::{
    config::NetflashConfig, progress::LogProgress, serve, transport::create_transport,
    ProgressObserver, ProviderRegistry, RunMode, RunOutcome,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::progress::BarProgress;

#[derive(Parser)]
#[command(name = "netflashd")]
#[command(author, version, about = "Netinstall flasher for router boards")]
struct Args {
    /// Configuration file (TOML)
    #[arg(env = "NETFLASH_CONFIG", default_value = "netflash.toml")]
    config: PathBuf,

    /// Network interface the boards are attached to
    #[arg(short, long)]
    interface: Option<String>,

    /// File provider to use (e.g. "simple", "arch")
    #[arg(short, long)]
    provider: Option<String>,

    /// Flash a single board, then exit
    #[arg(long)]
    once: bool,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log line format
    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,

    /// Log progress lines instead of drawing a progress bar
    #[arg(long)]
    no_progress: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

const EXIT_FATAL: u8 = 1;
const EXIT_ABORTED: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose, args.log_format);

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(EXIT_FATAL)
        }
    }
}

fn init_logging(verbose: u8, format: LogFormat) {
    let default = match verbose {
        0 => "netflashd=info,netflash_proto=info",
        1 => "netflashd=debug,netflash_proto=debug",
        _ => "netflashd=trace,netflash_proto=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(fmt::layer().with_target(false)).init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }
}

async fn run(args: Args) -> Result<ExitCode> {
    let mut config = NetflashConfig::load(&args.config)
        .map_err(FatalError::from)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;

    if let Some(interface) = args.interface {
        config.interface = interface;
    }
    if let Some(provider) = args.provider {
        config.provider.kind = provider;
    }
    config
        .validate()
        .map_err(FatalError::from)
        .context("Invalid command-line override")?;

    info!(
        interface = %config.interface,
        provider = %config.provider.kind,
        "Starting netflashd"
    );

    let transport = create_transport(&config.transport, &config.interface)
        .await
        .map_err(FatalError::from)
        .with_context(|| format!("Cannot open interface {}", config.interface))?;

    let mut observer: Box<dyn ProgressObserver> =
        if !args.no_progress && std::io::stderr().is_terminal() {
            Box::new(BarProgress::new())
        } else {
            Box::new(LogProgress::default())
        };

    let mode = if args.once {
        RunMode::Once
    } else {
        RunMode::Forever
    };
    let registry = ProviderRegistry::with_builtin();

    let outcome = serve(
        &config,
        transport,
        &registry,
        mode,
        observer.as_mut(),
        shutdown_signal(),
    )
    .await;

    match outcome {
        Ok(RunOutcome::Flashed(report)) => {
            info!(
                board = %report.board,
                files = report.files.len(),
                seconds = (report.finished_at - report.started_at).num_seconds(),
                "Done"
            );
            Ok(ExitCode::SUCCESS)
        }
        Ok(RunOutcome::Stopped(summary)) => {
            info!(
                succeeded = summary.succeeded,
                aborted = summary.aborted,
                skipped = summary.skipped,
                "Stopped"
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(FlashError::Aborted(e)) => {
            error!("{}", e);
            Ok(ExitCode::from(EXIT_ABORTED))
        }
        Err(FlashError::Fatal(e)) => Err(e.into()),
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Interrupted, shutting down"),
        Err(e) => {
            warn!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
