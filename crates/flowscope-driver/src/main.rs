//! Driver binary for the Flowscope traffic frontend.
//!
//! This is the main entry point that launches (or attaches to) the
//! stepwise traffic engine, loads the static network topology, and runs
//! the paced control loop until a shutdown signal arrives or the engine
//! fails. The collected statistics history is exported to CSV on the way
//! out.
//!
//! # Startup Sequence
//!
//! 1. Initialize structured logging (tracing)
//! 2. Load configuration from `flowscope.yaml` (or the path in argv)
//! 3. Launch the engine process and connect the gateway
//! 4. Load the static network topology
//! 5. Assemble the control loop and snapshot sink
//! 6. Run the loop as a background task
//! 7. Wait for Ctrl-C or loop exit
//! 8. Export the stats history to CSV
//! 9. Log the result

mod error;
mod remote;
mod sink;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use flowscope_core::config::FlowConfig;
use flowscope_core::export::export_stats_csv;
use flowscope_core::runner::{FrameSink, LoopHandle, RunEnd, RunSummary, SimulationLoop};
use flowscope_core::topology::NetworkTopology;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::DriverError;
use crate::remote::RemoteGateway;
use crate::sink::SnapshotSink;

/// Application entry point for the driver.
///
/// Initializes all subsystems and runs the control loop until shutdown.
///
/// # Errors
///
/// Returns an error if any startup step fails, if the loop ends with an
/// engine failure, or if the final export cannot be written.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("flowscope-driver starting");

    // 2. Load configuration.
    let config = load_config()?;
    info!(
        host = %config.engine.host,
        port = config.engine.port,
        step_length_s = config.engine.step_length_s,
        interval_ms = config.pacing.interval_ms,
        "Configuration loaded"
    );

    // 3. Launch the engine process and connect the gateway.
    let mut gateway = RemoteGateway::launch_and_connect(&config.engine)
        .await
        .map_err(DriverError::from)?;

    // 4. Load the static network topology.
    let topology = Arc::new(NetworkTopology::load(&mut gateway).map_err(DriverError::from)?);

    // 5. Assemble the control loop and snapshot sink.
    let handle = LoopHandle::new(Arc::clone(&topology), &config.stress);
    let sink = Arc::new(SnapshotSink::new());
    let frame_sink: Arc<dyn FrameSink> = Arc::<SnapshotSink>::clone(&sink);
    let interval = Duration::from_millis(config.pacing.interval_ms);
    let simulation = SimulationLoop::new(Box::new(gateway), frame_sink, handle.clone(), interval);

    // 6. Run the loop as a background task.
    let mut loop_task = tokio::spawn(simulation.run());
    info!("Control loop started");

    // 7. Wait for Ctrl-C or loop exit.
    let summary = tokio::select! {
        joined = &mut loop_task => join_summary(joined)?,
        signal = tokio::signal::ctrl_c() => {
            if let Err(error) = signal {
                warn!(error = %error, "Failed to listen for the shutdown signal");
            }
            info!("Shutdown signal received, stopping the loop");
            handle.request_stop();
            join_summary((&mut loop_task).await)?
        }
    };

    // 8. Export the stats history to CSV.
    let history = sink.stats_history();
    let exported = export_stats_csv(&history, Path::new(&config.export.directory))
        .map_err(DriverError::from)?;
    info!(
        path = %exported.display(),
        rows = history.len(),
        "Stats history exported"
    );

    // 9. Log the result.
    info!(
        steps_executed = summary.steps_executed,
        end = ?summary.end,
        "flowscope-driver shutdown complete"
    );

    match summary.end {
        RunEnd::Stopped => Ok(()),
        RunEnd::EngineFailure { error } => Err(DriverError::Loop {
            message: format!(
                "engine failed after {} steps: {error}",
                summary.steps_executed
            ),
        }
        .into()),
    }
}

/// Load the driver configuration.
///
/// The first command-line argument may name a config file; otherwise
/// `flowscope.yaml` in the working directory is used. A missing file
/// falls back to built-in defaults.
fn load_config() -> Result<FlowConfig, DriverError> {
    let path_arg = std::env::args()
        .nth(1)
        .unwrap_or_else(|| String::from("flowscope.yaml"));
    let config_path = Path::new(&path_arg);
    if config_path.exists() {
        let config = FlowConfig::from_file(config_path)?;
        info!(path = %config_path.display(), "Configuration file loaded");
        Ok(config)
    } else {
        info!(path = %config_path.display(), "Config file not found, using defaults");
        Ok(FlowConfig::default())
    }
}

/// Unwrap the loop task's join result into a run summary.
fn join_summary(
    joined: Result<RunSummary, tokio::task::JoinError>,
) -> Result<RunSummary, DriverError> {
    joined.map_err(|e| DriverError::Loop {
        message: format!("loop task failed: {e}"),
    })
}
