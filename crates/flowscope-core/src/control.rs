//! Run, pause, and stop control shared between the loop and its callers.

use std::sync::atomic::{AtomicBool, Ordering};

/// Shared control flags for one simulation loop.
///
/// Callers flip intents here from any thread; the loop polls them once per
/// iteration. Each transition has exactly one method, so rules like
/// "single-step only while paused" are enforced in one place instead of at
/// every call site.
#[derive(Debug, Default)]
pub struct ControlState {
    running: AtomicBool,
    stop_requested: AtomicBool,
    paused: AtomicBool,
    step_requested: AtomicBool,
}

impl ControlState {
    /// Creates a fresh control state with no run active.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the right to run the loop.
    ///
    /// Returns `true` for exactly one caller while no run is active, and
    /// clears any stale pause, stop, or step intents left over from the
    /// previous run. Returns `false` while a run is already active.
    pub fn begin_run(&self) -> bool {
        let claimed = self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if claimed {
            self.stop_requested.store(false, Ordering::Release);
            self.paused.store(false, Ordering::Release);
            self.step_requested.store(false, Ordering::Release);
        }
        claimed
    }

    /// Marks the run as finished, allowing a later [`ControlState::begin_run`].
    pub fn end_run(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Whether a run is currently active.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Asks the active run to terminate after its current iteration.
    ///
    /// Also lifts any pause and drops a pending single step, so a paused
    /// loop winds down instead of idling against the stop flag.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
        self.paused.store(false, Ordering::Release);
        self.step_requested.store(false, Ordering::Release);
    }

    /// Whether a stop has been requested.
    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Pauses or resumes stepping. The loop keeps polling while paused.
    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Release);
    }

    /// Whether the loop is currently paused.
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Requests a single step while paused.
    ///
    /// Ignored, returning `false`, unless the loop is paused. The request is
    /// consumed by exactly one later [`ControlState::take_step_request`].
    pub fn request_single_step(&self) -> bool {
        if !self.paused.load(Ordering::Acquire) {
            return false;
        }
        self.step_requested.store(true, Ordering::Release);
        true
    }

    /// Consumes a pending single-step request, if any.
    pub fn take_step_request(&self) -> bool {
        self.step_requested.swap(false, Ordering::AcqRel)
    }
}
