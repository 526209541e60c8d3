//! simbridge command-line entry point.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use simbridge::{Bridge, BridgeConfig, BridgeError, SinkKind, SourceKind};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_DIRECTIVE: &str = "simbridge=info";

#[derive(Debug, Parser)]
#[command(name = "simbridge", version, about = "Publish simulator telemetry into a shared region")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Poll the source and publish until interrupted
    Run(RunArgs),
    /// Print the message currently held in the file-backed region
    Inspect(InspectArgs),
}

#[derive(Debug, Args)]
struct RunArgs {
    /// YAML configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Seconds between poll cycles
    #[arg(long, value_name = "SECS")]
    interval: Option<u64>,

    /// Telemetry source: fsuipc or snapshot
    #[arg(long)]
    source: Option<SourceKind>,

    /// Snapshot file for the snapshot source
    #[arg(long, value_name = "FILE")]
    snapshot: Option<PathBuf>,

    /// Sink: shared-memory or console
    #[arg(long)]
    sink: Option<SinkKind>,

    /// Stop after this many published messages
    #[arg(long, value_name = "N")]
    cycles: Option<u64>,

    /// Directory for the file-backed region (non-Windows)
    #[arg(long, value_name = "DIR")]
    shm_dir: Option<PathBuf>,

    /// Log filter directive, overrides RUST_LOG
    #[arg(long, value_name = "FILTER")]
    log_level: Option<String>,
}

#[derive(Debug, Args)]
struct InspectArgs {
    /// Directory holding the region file
    #[arg(long, value_name = "DIR")]
    shm_dir: Option<PathBuf>,

    /// Region name
    #[arg(long, default_value = simbridge::publisher::DEFAULT_REGION_NAME)]
    region: String,
}

fn init_tracing(directive: Option<&str>) {
    let filter = match directive {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_DIRECTIVE)),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn build_config(args: &RunArgs) -> anyhow::Result<BridgeConfig> {
    let mut config = match &args.config {
        Some(path) => BridgeConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => BridgeConfig::default(),
    };

    if let Some(secs) = args.interval {
        config = config.with_poll_interval_secs(secs);
    }
    if let Some(source) = args.source {
        config = config.with_source(source);
    }
    if let Some(path) = &args.snapshot {
        config = config.with_snapshot_path(path);
    }
    if let Some(sink) = args.sink {
        config = config.with_sink(sink);
    }
    if let Some(dir) = &args.shm_dir {
        config = config.with_shm_dir(dir);
    }
    Ok(config)
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    let config = build_config(&args)?;
    let mut bridge = Bridge::new(config)?;
    if let Some(cycles) = args.cycles {
        bridge = bridge.with_max_cycles(cycles);
    }

    let config = bridge.config();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        source = %config.source,
        sink = %config.sink,
        interval_secs = config.poll_interval_secs,
        "Starting simbridge"
    );

    let cancel = CancellationToken::new();
    forward_shutdown_signals(cancel.clone()).context("cannot listen for shutdown signals")?;

    let summary = bridge.run(&cancel).await?;
    info!(cycles = summary.cycles, "simbridge stopped");
    Ok(())
}

/// Cancel `cancel` on Ctrl-C, or on SIGTERM where the platform has it.
///
/// The SIGTERM listener is installed before this returns, so a service
/// manager stopping the process always goes through the poll loop's release.
fn forward_shutdown_signals(
    cancel: CancellationToken,
) -> std::io::Result<tokio::task::JoinHandle<()>> {
    #[cfg(unix)]
    let mut terminate =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    Ok(tokio::spawn(async move {
        #[cfg(unix)]
        let terminated = async move {
            terminate.recv().await;
        };
        #[cfg(not(unix))]
        let terminated = std::future::pending::<()>();
        tokio::pin!(terminated);

        tokio::select! {
            interrupted = tokio::signal::ctrl_c() => match interrupted {
                Ok(()) => info!("Interrupt received, shutting down"),
                Err(e) => {
                    warn!("Cannot listen for Ctrl-C: {}", e);
                    (&mut terminated).await;
                    info!("Termination requested, shutting down");
                }
            },
            _ = &mut terminated => info!("Termination requested, shutting down"),
        }
        cancel.cancel();
    }))
}

#[cfg(not(windows))]
fn inspect(args: InspectArgs) -> anyhow::Result<()> {
    let dir = args.shm_dir.unwrap_or_else(simbridge::publisher::default_region_dir);
    let json = simbridge::publisher::inspect_region(&dir, &args.region)?;
    if json.is_empty() {
        println!("(region is empty)");
    } else {
        let value: serde_json::Value =
            serde_json::from_str(&json).context("region does not hold JSON")?;
        println!("{}", serde_json::to_string_pretty(&value)?);
    }
    Ok(())
}

#[cfg(windows)]
fn inspect(_args: InspectArgs) -> anyhow::Result<()> {
    Err(BridgeError::unsupported_platform("Region inspection", "non-Windows (file-backed region)")
        .into())
}

fn report(err: &anyhow::Error) {
    error!("{:#}", err);
    if let Some(bridge_err) = err.downcast_ref::<BridgeError>() {
        for suggestion in bridge_err.recovery_suggestions() {
            error!("  - {}", suggestion);
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Run(args) => {
            init_tracing(args.log_level.as_deref());
            run(args).await
        }
        Command::Inspect(args) => {
            init_tracing(None);
            inspect(args)
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn run_arguments_parse() {
        let cli = Cli::try_parse_from([
            "simbridge", "run", "--source", "snapshot", "--snapshot", "cruise.yaml", "--cycles", "0",
        ])
        .unwrap();
        let Command::Run(args) = cli.command else { panic!("expected run") };
        assert_eq!(args.cycles, Some(0));
        assert_eq!(args.snapshot, Some(PathBuf::from("cruise.yaml")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn sigterm_cancels_the_bridge() {
        let cancel = CancellationToken::new();
        let forwarder = forward_shutdown_signals(cancel.clone()).unwrap();

        let status = std::process::Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        tokio::time::timeout(Duration::from_secs(5), forwarder).await.unwrap().unwrap();
        assert!(cancel.is_cancelled());
    }
}
