//! Stress-injection campaigns.
//!
//! A campaign trickles vehicles into the scenario at one per loop iteration
//! until its quota is spent. Injection pressure therefore scales with loop
//! cadence instead of flooding the engine in a single burst.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{info, warn};

use crate::gateway::{EngineGateway, EntitySpec};

/// Campaign state plus the id sequence for injected vehicles.
///
/// The sequence never resets, so vehicle ids stay unique across campaigns
/// within one engine session.
#[derive(Debug)]
pub struct StressInjector {
    remaining: Mutex<Option<u32>>,
    seq: AtomicU64,
    vehicle_type: String,
}

impl StressInjector {
    /// Creates an idle injector using the given vehicle type for injections.
    #[must_use]
    pub fn new(vehicle_type: impl Into<String>) -> Self {
        Self {
            remaining: Mutex::new(None),
            seq: AtomicU64::new(0),
            vehicle_type: vehicle_type.into(),
        }
    }

    /// Starts a campaign with the given quota.
    ///
    /// A no-op returning `false` while a campaign is already active; the
    /// running campaign keeps its remaining quota.
    pub fn start(&self, quota: u32) -> bool {
        let Ok(mut remaining) = self.remaining.lock() else {
            return false;
        };
        if remaining.is_some() {
            return false;
        }
        *remaining = Some(quota);
        info!(quota, "Stress campaign started");
        true
    }

    /// Stops the active campaign, discarding any remaining quota.
    pub fn stop(&self) {
        if let Ok(mut remaining) = self.remaining.lock() {
            if remaining.take().is_some() {
                info!("Stress campaign stopped");
            }
        }
    }

    /// Whether a campaign is currently active.
    pub fn is_active(&self) -> bool {
        self.remaining
            .lock()
            .map(|remaining| remaining.is_some())
            .unwrap_or(false)
    }

    /// Quota left in the active campaign, `0` when idle.
    pub fn remaining(&self) -> u32 {
        self.remaining
            .lock()
            .map(|remaining| (*remaining).unwrap_or(0))
            .unwrap_or(0)
    }

    /// Runs the per-iteration injection, at most one vehicle.
    ///
    /// Does nothing while idle. An exhausted quota or a failed injection
    /// returns the campaign to idle; a failure never retries.
    pub fn inject_step(&self, gateway: &mut dyn EngineGateway, routes: &[String]) {
        let Ok(mut remaining) = self.remaining.lock() else {
            return;
        };
        let Some(left) = *remaining else {
            return;
        };

        let Some(route_id) = routes.first() else {
            warn!("Stress campaign stopped, no routes available");
            *remaining = None;
            return;
        };

        let id = format!("stress_{}", self.seq.fetch_add(1, Ordering::Relaxed));
        let spec = EntitySpec {
            id,
            route_id: route_id.clone(),
            type_id: self.vehicle_type.clone(),
        };
        match gateway.add_entity(&spec) {
            Ok(()) => {
                let left = left.saturating_sub(1);
                if left == 0 {
                    info!("Stress campaign finished");
                    *remaining = None;
                } else {
                    *remaining = Some(left);
                }
            }
            Err(error) => {
                warn!(error = %error, vehicle = %spec.id, "Stress injection failed, campaign stopped");
                *remaining = None;
            }
        }
    }
}
