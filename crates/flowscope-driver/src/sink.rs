//! Frame sink that keeps the freshest snapshots for consumers.
//!
//! The control loop publishes a [`FrameSnapshot`] and a [`StatsSnapshot`]
//! after every step. [`SnapshotSink`] stores the latest of each behind
//! read-write locks so any rendering or inspection surface can pull state
//! at its own pace, and appends every stats snapshot to a history that is
//! exported to CSV at shutdown.

use std::sync::{Mutex, RwLock};

use flowscope_core::runner::FrameSink;
use flowscope_types::{FrameSnapshot, StatsSnapshot};
use tracing::debug;

/// Upper bound on retained stats history.
///
/// At the default cadence of 30 frames per second this covers close to an
/// hour of simulation; older rows are dropped oldest-first.
const MAX_STATS_HISTORY: usize = 100_000;

/// Shared landing spot for the per-step snapshots.
#[derive(Debug)]
pub struct SnapshotSink {
    /// Most recent frame, replaced wholesale every step.
    latest_frame: RwLock<Option<FrameSnapshot>>,
    /// Most recent stats together with the filtered visible count.
    latest_stats: RwLock<Option<(StatsSnapshot, u32)>>,
    /// Every stats snapshot seen so far, for the shutdown export.
    history: Mutex<Vec<StatsSnapshot>>,
}

impl SnapshotSink {
    /// Create an empty sink.
    pub const fn new() -> Self {
        Self {
            latest_frame: RwLock::new(None),
            latest_stats: RwLock::new(None),
            history: Mutex::new(Vec::new()),
        }
    }

    /// The most recently published frame, if any step has completed yet.
    pub fn latest_frame(&self) -> Option<FrameSnapshot> {
        self.latest_frame.read().ok().and_then(|slot| slot.clone())
    }

    /// The most recently published stats and visible vehicle count.
    pub fn latest_stats(&self) -> Option<(StatsSnapshot, u32)> {
        self.latest_stats.read().ok().and_then(|slot| slot.clone())
    }

    /// A copy of the collected stats history, oldest first.
    pub fn stats_history(&self) -> Vec<StatsSnapshot> {
        self.history
            .lock()
            .map(|history| history.clone())
            .unwrap_or_default()
    }
}

impl Default for SnapshotSink {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSink for SnapshotSink {
    fn on_frame(&self, frame: FrameSnapshot) {
        // Use try_write to avoid blocking the control loop: if a consumer
        // holds the read lock, skip this update and let the next frame
        // catch up.
        if let Ok(mut slot) = self.latest_frame.try_write() {
            *slot = Some(frame);
        }
    }

    fn on_stats(&self, stats: StatsSnapshot, visible_count: u32) {
        debug!(
            sim_time_s = stats.sim_time_s,
            vehicles = stats.total_vehicles,
            visible = visible_count,
            "Stats snapshot published"
        );

        if let Ok(mut history) = self.history.lock() {
            history.push(stats.clone());
            if history.len() > MAX_STATS_HISTORY {
                let drain_count = history.len().saturating_sub(MAX_STATS_HISTORY);
                history.drain(..drain_count);
            }
        }

        if let Ok(mut slot) = self.latest_stats.try_write() {
            *slot = Some((stats, visible_count));
        }
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
