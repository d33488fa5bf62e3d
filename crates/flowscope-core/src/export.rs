//! CSV export of collected statistics.
//!
//! One row per snapshot, semicolon separated, written to a timestamped file
//! so repeated exports never clobber each other. Fields are pre-formatted,
//! the writer itself never quotes; the time column carries its own quotes
//! to match the files downstream tooling already ingests.

use std::path::{Path, PathBuf};

use chrono::Local;
use csv::{QuoteStyle, WriterBuilder};
use flowscope_types::StatsSnapshot;
use thiserror::Error;
use tracing::info;

const HEADER: [&str; 10] = [
    "simulationTimeSec",
    "globalAvgSpeedMs",
    "totalVehicles",
    "stoppedVehicles",
    "totalCo2Kg",
    "totalFuelL",
    "arrivedVehiclesTotal",
    "avgDensityVehPerKm",
    "avgOccupancyPercent",
    "edgeCount",
];

/// Errors raised while exporting statistics.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Could not create the export directory or file.
    #[error("failed to write export file: {source}")]
    Io {
        /// Underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Could not encode a CSV record.
    #[error("failed to encode csv: {source}")]
    Csv {
        /// Underlying encoder error.
        #[from]
        source: csv::Error,
    },
}

/// Writes the snapshot history as CSV into `writer`.
pub fn write_stats_csv<W: std::io::Write>(
    history: &[StatsSnapshot],
    writer: W,
) -> Result<(), ExportError> {
    let mut csv_writer = WriterBuilder::new()
        .delimiter(b';')
        .quote_style(QuoteStyle::Never)
        .from_writer(writer);
    csv_writer.write_record(HEADER)?;
    for snapshot in history {
        csv_writer.write_record(record(snapshot))?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Writes the snapshot history into a timestamped file under `directory`.
///
/// The directory is created when missing. Returns the path of the written
/// file.
pub fn export_stats_csv(
    history: &[StatsSnapshot],
    directory: &Path,
) -> Result<PathBuf, ExportError> {
    std::fs::create_dir_all(directory)?;
    let file_name = format!(
        "stats_global_{}.csv",
        Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let path = directory.join(file_name);
    let file = std::fs::File::create(&path)?;
    write_stats_csv(history, file)?;
    info!(path = %path.display(), rows = history.len(), "Statistics exported");
    Ok(path)
}

fn record(snapshot: &StatsSnapshot) -> Vec<String> {
    vec![
        format!("\"{:.2}\"", snapshot.sim_time_s),
        format!("{:.3}", snapshot.global_avg_speed),
        snapshot.total_vehicles.to_string(),
        snapshot.stopped_vehicles.to_string(),
        format!("{:.6}", snapshot.total_co2_kg),
        format!("{:.6}", snapshot.total_fuel_l),
        snapshot.arrived_total.to_string(),
        format!("{:.3}", snapshot.avg_density_per_km),
        format!("{:.3}", snapshot.avg_occupancy_percent),
        snapshot.segments.len().to_string(),
    ]
}
