//! qbald: PBS queue balancing daemon.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};

use qbal_balancer::{logging, Cli, Daemon, PbsTools, ProcessRunner};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let config = match Cli::parse().into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("qbald: {e:#}");
            return ExitCode::from(2);
        }
    };

    if let Err(e) = logging::init(config.log_level, config.log_json) {
        eprintln!("qbald: failed to initialize logging: {e:#}");
        return ExitCode::FAILURE;
    }

    info!(version = env!("CARGO_PKG_VERSION"), "starting qbald");

    let tools = PbsTools::resolve(&config.tool_paths);
    tools.log_missing();
    if config.dry_run {
        info!("dry run: moves will be logged, not executed");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received interrupt, stopping after the current cycle");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => warn!(error = %e, "cannot listen for interrupts"),
        }
    });

    let daemon = Daemon::new(config, tools, Arc::new(ProcessRunner));
    let code = match daemon.run(shutdown_rx).await {
        Ok(exit) => {
            info!(reason = ?exit, "balancing loop ended");
            ExitCode::SUCCESS
        }
        // Already logged by the loop.
        Err(_) => ExitCode::FAILURE,
    };

    info!("shutdown complete");
    code
}
