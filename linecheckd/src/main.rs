//! linecheck daemon
//!
//! Runs the board test once, then holds the final display until SIGINT or
//! SIGTERM. A signal during the run halts it like the emergency stop.

use anyhow::Result;
use clap::Parser;
use colored::*;
use linecheck_core::default_config_path;
use linecheck_hardware::{open_input_device, InputEvent};
use linecheckd::api::{create_router, AppState};
use linecheckd::capabilities::Capabilities;
use linecheckd::reporter::{ConsoleReporter, MultiReporter, StatusBoard};
use linecheckd::runner::{Inputs, LineTest};
use linecheckd::shutdown::shutdown_signal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

/// linecheck board test daemon
#[derive(Parser, Debug)]
#[command(name = "linecheckd")]
#[command(version, about = "Production-line board test daemon", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Status API port (overrides the config file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Do not start the status API
    #[arg(long)]
    no_api: bool,

    /// Do not render the board table on stdout
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_tracing(args.verbose);

    info!("linecheck daemon starting...");

    // Determine config path: CLI flag > env var > default
    let config_path = args.config.unwrap_or_else(|| {
        std::env::var("LINECHECK_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_config_path())
    });
    info!("Configuration file: {}", config_path.display());

    let config = linecheckd::config::load(&config_path).await?;
    let caps = Capabilities::linux(&config)?;

    let board = Arc::new(StatusBoard::new());
    let mut reporter = MultiReporter::new().with(board.clone());
    if !args.quiet {
        reporter = reporter.with(Arc::new(ConsoleReporter::new()));
    }

    let inputs = Inputs {
        ir: open_input(&config.events.ir_device, "IR"),
        jack: open_input(&config.events.jack_device, "Headphone jack"),
    };
    let api = config.api.clone();
    let test = LineTest::new(config, caps, Arc::new(reporter)).with_inputs(inputs);

    // Signals halt the run, then end the park state
    let (signalled_tx, signalled) = watch::channel(false);
    {
        let latch = test.latch();
        tokio::spawn(async move {
            shutdown_signal().await;
            if latch.emergency_stop() {
                warn!("Run halted by signal");
            }
            signalled_tx.send_replace(true);
        });
    }

    if api.enabled && !args.no_api {
        let state = AppState::new(test.table(), test.run_state(), board);
        let app = create_router(state);
        let bind_addr = format!("{}:{}", api.hostname, args.port.unwrap_or(api.port));
        let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
        info!("Status API listening on {}", bind_addr);

        let until = signalled.clone();
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(wait_signalled(until))
                .await
            {
                error!("Status API failed: {}", e);
            }
        });
    }

    let mut completed = test.run().await?;
    let summary = &completed.summary;
    info!(
        "Run {} (failing: [{}])",
        summary.status,
        summary.error_tags().join(",")
    );
    if !args.quiet {
        let verdict = if summary.passed() {
            "PASS".green().bold()
        } else {
            "FAIL".red().bold()
        };
        println!("{} {}", "Verdict:".bold(), verdict);
    }

    completed.wind_down().await;
    completed.supervisor.park(wait_signalled(signalled)).await;

    info!("linecheck daemon stopped");
    Ok(())
}

async fn wait_signalled(mut signalled: watch::Receiver<bool>) {
    // a dropped sender means the signal task is gone; nothing left to wait for
    let _ = signalled.wait_for(|signalled| *signalled).await;
}

fn open_input(path: &Path, name: &str) -> Option<mpsc::Receiver<InputEvent>> {
    match open_input_device(path) {
        Ok(events) => {
            info!("{} input: {}", name, path.display());
            Some(events)
        }
        Err(e) => {
            warn!("{} input {} unavailable: {}", name, path.display(), e);
            None
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
