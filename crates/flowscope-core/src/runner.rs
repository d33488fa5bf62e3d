//! The near-real-time control loop.
//!
//! [`SimulationLoop::run`] owns the engine gateway for the life of one run:
//! it drains queued commands, feeds stress injections, advances the engine
//! one step, reads the frame back, and publishes snapshots to the
//! [`FrameSink`], then sleeps one pacing interval. Pausing keeps the loop
//! polling at the same cadence without stepping. The paired [`LoopHandle`]
//! is the only way other threads influence a running loop.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use flowscope_types::{
    FrameSnapshot, PhaseSpec, SignalState, StatsSnapshot, VehicleFilter, VehicleState,
};
use tracing::{debug, info, warn};

use crate::config::StressConfig;
use crate::control::ControlState;
use crate::gateway::{EngineGateway, EntityKind, Field, GatewayError};
use crate::queue::{CommandError, CommandQueue, InjectionRequest, SimCommand, validate_program};
use crate::stats::StatsAggregator;
use crate::stress::StressInjector;
use crate::topology::NetworkTopology;

/// Receives the published snapshots once per completed step.
///
/// Implementations are called from the loop task and must hand the data off
/// quickly; anything slow belongs on the consumer's side of the sink.
pub trait FrameSink: Send + Sync {
    /// Called with the full dynamic frame of the step just completed.
    fn on_frame(&self, frame: FrameSnapshot);

    /// Called with the aggregate statistics of the step just completed and
    /// the number of vehicles passing the current display filter.
    fn on_stats(&self, stats: StatsSnapshot, visible_count: u32);
}

/// A [`FrameSink`] that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl FrameSink for NullSink {
    fn on_frame(&self, _frame: FrameSnapshot) {}

    fn on_stats(&self, _stats: StatsSnapshot, _visible_count: u32) {}
}

/// Why a run ended.
#[derive(Debug)]
pub enum RunEnd {
    /// The loop wound down after a stop request.
    Stopped,
    /// The engine became unusable mid-run.
    EngineFailure {
        /// The failure that ended the run.
        error: GatewayError,
    },
}

/// What one call to [`SimulationLoop::run`] did.
#[derive(Debug)]
pub struct RunSummary {
    /// Number of engine steps that completed, including their publication.
    pub steps_executed: u64,
    /// Why the run ended.
    pub end: RunEnd,
}

/// Thread-safe handle for steering a [`SimulationLoop`].
///
/// Cheap to clone; every clone talks to the same loop. Submission methods
/// validate against the loaded topology and reject bad requests before they
/// ever reach the queue.
#[derive(Debug, Clone)]
pub struct LoopHandle {
    control: Arc<ControlState>,
    queue: Arc<CommandQueue>,
    injector: Arc<StressInjector>,
    filter: Arc<RwLock<VehicleFilter>>,
    topology: Arc<NetworkTopology>,
    stress_quota: u32,
}

impl LoopHandle {
    /// Creates a handle over the given topology with stress defaults from
    /// configuration.
    #[must_use]
    pub fn new(topology: Arc<NetworkTopology>, stress: &StressConfig) -> Self {
        Self {
            control: Arc::new(ControlState::new()),
            queue: Arc::new(CommandQueue::new()),
            injector: Arc::new(StressInjector::new(stress.vehicle_type.clone())),
            filter: Arc::new(RwLock::new(VehicleFilter::default())),
            topology,
            stress_quota: stress.default_quota,
        }
    }

    /// The topology the loop was built around.
    #[must_use]
    pub fn topology(&self) -> &NetworkTopology {
        &self.topology
    }

    /// Whether a loop run is currently active.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.control.is_running()
    }

    /// Asks the running loop to terminate.
    ///
    /// Any active stress campaign is stopped along with it; a session being
    /// wound down never keeps injecting.
    pub fn request_stop(&self) {
        self.injector.stop();
        self.control.request_stop();
    }

    /// Pauses or resumes stepping.
    pub fn set_paused(&self, paused: bool) {
        self.control.set_paused(paused);
    }

    /// Whether stepping is currently paused.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.control.is_paused()
    }

    /// Requests one step while paused; ignored otherwise.
    pub fn request_single_step(&self) -> bool {
        self.control.request_single_step()
    }

    /// Enqueues a command without further checks.
    pub fn enqueue_command(&self, command: SimCommand) {
        self.queue.submit(command);
    }

    /// Asks the engine to cut the current phase of `signal_id` short.
    pub fn request_signal_switch(&self, signal_id: &str) -> Result<(), CommandError> {
        if self.topology.required_state_len(signal_id).is_none() {
            return Err(CommandError::UnknownSignal {
                signal_id: signal_id.to_owned(),
            });
        }
        self.queue.submit(SimCommand::SwitchSignal {
            signal_id: signal_id.to_owned(),
        });
        Ok(())
    }

    /// Validates and enqueues a replacement program for `signal_id`.
    pub fn request_custom_program(
        &self,
        signal_id: &str,
        phases: Vec<PhaseSpec>,
    ) -> Result<(), CommandError> {
        let required = self.topology.required_state_len(signal_id).ok_or_else(|| {
            CommandError::UnknownSignal {
                signal_id: signal_id.to_owned(),
            }
        })?;
        validate_program(signal_id, &phases, required)?;
        self.queue.submit(SimCommand::ApplyProgram {
            signal_id: signal_id.to_owned(),
            phases,
        });
        Ok(())
    }

    /// Validates and enqueues a manual vehicle injection.
    pub fn request_vehicle_injection(
        &self,
        request: InjectionRequest,
    ) -> Result<(), CommandError> {
        if !self.topology.routes.contains(&request.route_id) {
            return Err(CommandError::UnknownRoute {
                route_id: request.route_id,
            });
        }
        self.queue.submit(SimCommand::InjectVehicle { request });
        Ok(())
    }

    /// Starts a stress campaign, falling back to the configured quota.
    ///
    /// Returns `false` while a campaign is already active; the running
    /// campaign is left untouched.
    pub fn start_stress(&self, quota: Option<u32>) -> bool {
        self.injector.start(quota.unwrap_or(self.stress_quota))
    }

    /// Stops the active stress campaign.
    pub fn stop_stress(&self) {
        self.injector.stop();
    }

    /// Whether a stress campaign is currently active.
    #[must_use]
    pub fn stress_active(&self) -> bool {
        self.injector.is_active()
    }

    /// Replaces the display filter used for the visible count.
    pub fn set_vehicle_filter(&self, filter: VehicleFilter) {
        if let Ok(mut slot) = self.filter.write() {
            *slot = filter;
        }
    }

    fn current_filter(&self) -> VehicleFilter {
        self.filter
            .read()
            .map(|filter| filter.clone())
            .unwrap_or_default()
    }
}

/// One engine session's control loop.
pub struct SimulationLoop {
    gateway: Box<dyn EngineGateway>,
    sink: Arc<dyn FrameSink>,
    handle: LoopHandle,
    interval: Duration,
    aggregator: StatsAggregator,
    arrived_total: u64,
    steps_executed: u64,
}

impl SimulationLoop {
    /// Builds a loop over an already connected gateway.
    #[must_use]
    pub fn new(
        gateway: Box<dyn EngineGateway>,
        sink: Arc<dyn FrameSink>,
        handle: LoopHandle,
        interval: Duration,
    ) -> Self {
        Self {
            gateway,
            sink,
            handle,
            interval,
            aggregator: StatsAggregator::new(),
            arrived_total: 0,
            steps_executed: 0,
        }
    }

    /// Runs the loop until stopped or the engine fails.
    ///
    /// Claims the run slot on its [`LoopHandle`] first; when another run is
    /// already active this returns immediately without stepping. The gateway
    /// is closed exactly once on every exit path.
    pub async fn run(mut self) -> RunSummary {
        if !self.handle.control.begin_run() {
            warn!("Run already active, refusing to start another loop");
            self.teardown();
            return RunSummary {
                steps_executed: 0,
                end: RunEnd::Stopped,
            };
        }
        info!(
            interval_ms = u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX),
            "Simulation loop started"
        );

        let end = loop {
            if self.handle.control.is_stop_requested() {
                break RunEnd::Stopped;
            }
            let step_now = self.handle.control.take_step_request();
            if !self.handle.control.is_paused() || step_now {
                if let Err(error) = self.iteration() {
                    warn!(error = %error, "Engine unusable, ending run");
                    break RunEnd::EngineFailure { error };
                }
            }
            // Paused or not, the loop keeps its cadence.
            tokio::time::sleep(self.interval).await;
        };

        // No campaign outlives its run, whichever way the run ended.
        self.handle.injector.stop();
        self.teardown();
        self.handle.control.end_run();
        let summary = RunSummary {
            steps_executed: self.steps_executed,
            end,
        };
        info!(steps = summary.steps_executed, end = ?summary.end, "Simulation loop finished");
        summary
    }

    /// One full step: commands, stress, advance, read back, publish.
    fn iteration(&mut self) -> Result<(), GatewayError> {
        self.handle.queue.drain_and_execute(self.gateway.as_mut());

        // The route and type catalogs can grow while the scenario runs, so
        // both are re-read every iteration; a failed read falls back to the
        // lists captured at load time.
        let available_routes = match self.gateway.list_entities(EntityKind::Route) {
            Ok(routes) => routes,
            Err(error) => {
                debug!(error = %error, "Route list unavailable this frame");
                self.handle.topology.routes.clone()
            }
        };
        let available_types = match self.gateway.list_entities(EntityKind::VehicleType) {
            Ok(types) => types,
            Err(error) => {
                debug!(error = %error, "Vehicle type list unavailable this frame");
                self.handle.topology.vehicle_types.clone()
            }
        };

        self.handle
            .injector
            .inject_step(self.gateway.as_mut(), &available_routes);

        self.gateway.step()?;
        let sim_time_s = self.gateway.current_time()?;
        match self.gateway.arrived_last_step() {
            Ok(arrived) => self.arrived_total = self.arrived_total.saturating_add(arrived),
            Err(error) => warn!(error = %error, "Arrival count unavailable this step"),
        }

        let vehicles = read_vehicles(self.gateway.as_mut());
        let signals = read_signals(self.gateway.as_mut(), &self.handle.topology);
        let stats = self.aggregator.collect(
            self.gateway.as_mut(),
            &self.handle.topology,
            sim_time_s,
            &vehicles,
            self.arrived_total,
        );

        let filter = self.handle.current_filter();
        let visible = vehicles.iter().filter(|v| filter.matches(v)).count();
        let visible_count = u32::try_from(visible).unwrap_or(u32::MAX);

        let frame = FrameSnapshot {
            sim_time_s,
            vehicles,
            signals,
            available_routes,
            available_types,
        };
        self.sink.on_frame(frame);
        self.sink.on_stats(stats, visible_count);

        self.steps_executed = self.steps_executed.saturating_add(1);
        Ok(())
    }

    fn teardown(&mut self) {
        if let Err(error) = self.gateway.close() {
            warn!(error = %error, "Engine close failed");
        }
    }
}

fn read_vehicles(gateway: &mut dyn EngineGateway) -> Vec<VehicleState> {
    let ids = match gateway.list_entities(EntityKind::Vehicle) {
        Ok(ids) => ids,
        Err(error) => {
            warn!(error = %error, "Vehicle list unavailable this frame");
            return Vec::new();
        }
    };
    let mut vehicles = Vec::with_capacity(ids.len());
    for id in ids {
        match read_vehicle(gateway, &id) {
            Ok(vehicle) => vehicles.push(vehicle),
            Err(error) => debug!(error = %error, vehicle = %id, "Skipping vehicle this frame"),
        }
    }
    vehicles
}

fn read_vehicle(gateway: &mut dyn EngineGateway, id: &str) -> Result<VehicleState, GatewayError> {
    let position = decode(
        gateway
            .get_field(EntityKind::Vehicle, id, Field::Position)?
            .as_position(),
        "vehicle position",
    )?;
    let angle_deg = decode(
        gateway
            .get_field(EntityKind::Vehicle, id, Field::Angle)?
            .as_float(),
        "vehicle angle",
    )?;
    let speed = decode(
        gateway
            .get_field(EntityKind::Vehicle, id, Field::Speed)?
            .as_float(),
        "vehicle speed",
    )?;
    let length = decode(
        gateway
            .get_field(EntityKind::Vehicle, id, Field::Length)?
            .as_float(),
        "vehicle length",
    )?;
    let route_id = decode(
        gateway
            .get_field(EntityKind::Vehicle, id, Field::RouteId)?
            .as_text()
            .map(str::to_owned),
        "vehicle route",
    )?;
    let color = decode(
        gateway
            .get_field(EntityKind::Vehicle, id, Field::Color)?
            .as_color(),
        "vehicle color",
    )?;
    let co2_mg = decode(
        gateway
            .get_field(EntityKind::Vehicle, id, Field::Co2)?
            .as_float(),
        "vehicle co2",
    )?;
    let fuel_ul = decode(
        gateway
            .get_field(EntityKind::Vehicle, id, Field::Fuel)?
            .as_float(),
        "vehicle fuel",
    )?;
    Ok(VehicleState {
        id: id.to_owned(),
        position,
        angle_deg,
        speed,
        length,
        route_id,
        color,
        co2_mg,
        fuel_ul,
    })
}

fn read_signals(gateway: &mut dyn EngineGateway, topology: &NetworkTopology) -> Vec<SignalState> {
    let mut signals = Vec::new();
    for signal_id in topology.signals.keys() {
        match gateway.get_field(EntityKind::Signal, signal_id, Field::StateString) {
            Ok(value) => {
                if let Some(state) = value.as_text() {
                    signals.extend(topology.signal_states(signal_id, state));
                }
            }
            Err(error) => {
                debug!(error = %error, signal = %signal_id, "Skipping signal this frame");
            }
        }
    }
    signals
}

fn decode<T>(value: Option<T>, what: &str) -> Result<T, GatewayError> {
    value.ok_or_else(|| GatewayError::Protocol {
        message: format!("unexpected value type for {what}"),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::gateway::{EntitySpec, FieldValue, GatewayCall, ScriptedGateway, ScriptedVehicle};
    use std::sync::Mutex;

    /// Scripted gateway behind a shared lock so tests keep a view into the
    /// journal after the loop has consumed its own copy.
    #[derive(Debug, Clone)]
    struct SharedGateway(Arc<Mutex<ScriptedGateway>>);

    impl SharedGateway {
        fn new(inner: ScriptedGateway) -> Self {
            Self(Arc::new(Mutex::new(inner)))
        }

        fn calls(&self) -> Vec<GatewayCall> {
            self.0.lock().unwrap().calls().to_vec()
        }

        fn is_closed(&self) -> bool {
            self.0.lock().unwrap().is_closed()
        }
    }

    impl EngineGateway for SharedGateway {
        fn list_entities(&mut self, kind: EntityKind) -> Result<Vec<String>, GatewayError> {
            self.0.lock().unwrap().list_entities(kind)
        }

        fn get_field(
            &mut self,
            kind: EntityKind,
            id: &str,
            field: Field,
        ) -> Result<FieldValue, GatewayError> {
            self.0.lock().unwrap().get_field(kind, id, field)
        }

        fn set_field(
            &mut self,
            kind: EntityKind,
            id: &str,
            field: Field,
            value: FieldValue,
        ) -> Result<(), GatewayError> {
            self.0.lock().unwrap().set_field(kind, id, field, value)
        }

        fn add_entity(&mut self, spec: &EntitySpec) -> Result<(), GatewayError> {
            self.0.lock().unwrap().add_entity(spec)
        }

        fn step(&mut self) -> Result<(), GatewayError> {
            self.0.lock().unwrap().step()
        }

        fn current_time(&mut self) -> Result<f64, GatewayError> {
            self.0.lock().unwrap().current_time()
        }

        fn arrived_last_step(&mut self) -> Result<u64, GatewayError> {
            self.0.lock().unwrap().arrived_last_step()
        }

        fn close(&mut self) -> Result<(), GatewayError> {
            self.0.lock().unwrap().close()
        }
    }

    #[derive(Debug, Default)]
    struct RecordingSink {
        frames: Mutex<Vec<FrameSnapshot>>,
        stats: Mutex<Vec<(StatsSnapshot, u32)>>,
    }

    impl RecordingSink {
        fn frames(&self) -> Vec<FrameSnapshot> {
            self.frames.lock().unwrap().clone()
        }

        fn stats(&self) -> Vec<(StatsSnapshot, u32)> {
            self.stats.lock().unwrap().clone()
        }
    }

    impl FrameSink for RecordingSink {
        fn on_frame(&self, frame: FrameSnapshot) {
            self.frames.lock().unwrap().push(frame);
        }

        fn on_stats(&self, stats: StatsSnapshot, visible_count: u32) {
            self.stats.lock().unwrap().push((stats, visible_count));
        }
    }

    fn scripted() -> ScriptedGateway {
        ScriptedGateway::new(0.1)
            .with_route("r_main")
            .with_vehicle_type("car")
            .with_lane(
                "e1_0",
                vec![
                    flowscope_types::Position::new(0.0, 0.0),
                    flowscope_types::Position::new(100.0, 0.0),
                ],
                3.2,
                100.0,
            )
            .with_signal("tl", "G", &["e1_0"])
    }

    fn build_loop(
        gateway: SharedGateway,
        sink: Arc<RecordingSink>,
    ) -> (SimulationLoop, LoopHandle) {
        let mut topo_gateway = gateway.clone();
        let topology = Arc::new(NetworkTopology::load(&mut topo_gateway).unwrap());
        let handle = LoopHandle::new(topology, &StressConfig::default());
        let sim = SimulationLoop::new(
            Box::new(gateway),
            sink,
            handle.clone(),
            Duration::from_millis(1),
        );
        (sim, handle)
    }

    async fn wait_for_stats(sink: &RecordingSink, min: usize) -> bool {
        for _ in 0_u32..200 {
            if sink.stats.lock().unwrap().len() >= min {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }

    #[tokio::test]
    async fn engine_failure_ends_the_run_after_completed_steps() {
        let gateway = SharedGateway::new(scripted().with_step_failure_after(3));
        let sink = Arc::new(RecordingSink::default());
        let (sim, _handle) = build_loop(gateway.clone(), Arc::clone(&sink));

        let summary = sim.run().await;
        assert_eq!(summary.steps_executed, 3);
        assert!(matches!(summary.end, RunEnd::EngineFailure { .. }));

        // Teardown closed the gateway exactly once, after the last step.
        assert!(gateway.is_closed());
        let closes = gateway
            .calls()
            .iter()
            .filter(|call| matches!(call, GatewayCall::Close))
            .count();
        assert_eq!(closes, 1);
        assert_eq!(sink.frames().len(), 3);
    }

    #[tokio::test]
    async fn queued_commands_run_before_the_step() {
        let gateway = SharedGateway::new(scripted().with_step_failure_after(1));
        let sink = Arc::new(RecordingSink::default());
        let (sim, handle) = build_loop(gateway.clone(), Arc::clone(&sink));

        handle.request_signal_switch("tl").unwrap();
        let summary = sim.run().await;
        assert_eq!(summary.steps_executed, 1);

        assert_eq!(
            gateway.calls(),
            vec![
                GatewayCall::Set {
                    kind: EntityKind::Signal,
                    id: "tl".to_owned(),
                    field: Field::PhaseDuration,
                    value: FieldValue::Float(0.0),
                },
                GatewayCall::Step,
                GatewayCall::Close,
            ]
        );
    }

    #[tokio::test]
    async fn stress_and_arrivals_flow_into_frames_and_stats() {
        let gateway = SharedGateway::new(
            scripted()
                .with_arrivals(vec![1, 2, 0, 0])
                .with_step_failure_after(4),
        );
        let sink = Arc::new(RecordingSink::default());
        let (sim, handle) = build_loop(gateway.clone(), Arc::clone(&sink));

        assert!(handle.start_stress(Some(2)));
        let summary = sim.run().await;
        assert_eq!(summary.steps_executed, 4);

        let frames = sink.frames();
        let last = frames.last().unwrap();
        let ids: Vec<_> = last.vehicles.iter().map(|v| v.id.clone()).collect();
        assert!(ids.contains(&"stress_0".to_owned()));
        assert!(ids.contains(&"stress_1".to_owned()));
        assert_eq!(last.available_routes, vec!["r_main".to_owned()]);

        let stats = sink.stats();
        assert_eq!(stats.last().unwrap().0.arrived_total, 3);
        assert!(!handle.stress_active());
    }

    #[tokio::test]
    async fn routes_defined_mid_run_reach_the_next_frame() {
        let gateway = SharedGateway::new(scripted());
        let sink = Arc::new(RecordingSink::default());
        let (sim, handle) = build_loop(gateway.clone(), Arc::clone(&sink));

        let task = tokio::spawn(sim.run());
        assert!(wait_for_stats(&sink, 1).await);

        gateway.0.lock().unwrap().define_route("r_late");
        // Two more published steps guarantee a full iteration started after
        // the route appeared.
        let seen = sink.stats().len();
        assert!(wait_for_stats(&sink, seen.saturating_add(2)).await);

        handle.request_stop();
        task.await.unwrap();

        let frames = sink.frames();
        let last = frames.last().unwrap();
        assert!(last.available_routes.contains(&"r_late".to_owned()));
        assert!(last.available_routes.contains(&"r_main".to_owned()));
    }

    #[tokio::test]
    async fn pause_holds_stepping_and_single_step_advances_once() {
        let gateway = SharedGateway::new(scripted());
        let sink = Arc::new(RecordingSink::default());
        let (sim, handle) = build_loop(gateway, Arc::clone(&sink));

        let task = tokio::spawn(sim.run());
        assert!(wait_for_stats(&sink, 1).await);

        handle.set_paused(true);
        tokio::time::sleep(Duration::from_millis(50)).await;
        let settled = sink.stats().len();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(sink.stats().len(), settled);

        // Commands wait in the queue while paused and run with the manual step.
        handle.request_signal_switch("tl").unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(handle.queue.pending(), 1);

        assert!(handle.request_single_step());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(sink.stats().len(), settled + 1);
        assert_eq!(handle.queue.pending(), 0);

        handle.request_stop();
        let summary = task.await.unwrap();
        assert!(matches!(summary.end, RunEnd::Stopped));
        assert!(!handle.is_running());
    }

    #[tokio::test]
    async fn second_run_is_refused_while_first_is_active() {
        let first_gateway = SharedGateway::new(scripted());
        let second_gateway = SharedGateway::new(scripted());
        let sink = Arc::new(RecordingSink::default());
        let (first, handle) = build_loop(first_gateway, Arc::clone(&sink));

        let second = SimulationLoop::new(
            Box::new(second_gateway.clone()),
            Arc::new(NullSink),
            handle.clone(),
            Duration::from_millis(1),
        );

        let task = tokio::spawn(first.run());
        assert!(wait_for_stats(&sink, 1).await);

        let refused = second.run().await;
        assert_eq!(refused.steps_executed, 0);
        assert!(second_gateway.is_closed());
        assert!(handle.is_running());

        handle.request_stop();
        let summary = task.await.unwrap();
        assert!(matches!(summary.end, RunEnd::Stopped));
    }

    #[test]
    fn handle_rejects_invalid_submissions() {
        let mut gateway = scripted();
        let topology = Arc::new(NetworkTopology::load(&mut gateway).unwrap());
        let handle = LoopHandle::new(topology, &StressConfig::default());

        assert!(matches!(
            handle.request_signal_switch("ghost"),
            Err(CommandError::UnknownSignal { .. })
        ));
        assert!(matches!(
            handle.request_custom_program("tl", vec![PhaseSpec::new("GG".to_owned(), 10.0)]),
            Err(CommandError::WrongStateLength { .. })
        ));
        assert!(matches!(
            handle.request_vehicle_injection(InjectionRequest {
                route_id: "r_ghost".to_owned(),
                type_id: "car".to_owned(),
                color: None,
                length_m: None,
                max_speed: None,
            }),
            Err(CommandError::UnknownRoute { .. })
        ));
        assert_eq!(handle.queue.pending(), 0);

        handle
            .request_custom_program("tl", vec![PhaseSpec::new("G".to_owned(), 10.0)])
            .unwrap();
        handle.request_signal_switch("tl").unwrap();
        assert_eq!(handle.queue.pending(), 2);
    }

    #[tokio::test]
    async fn display_filter_drives_the_visible_count() {
        let moving = ScriptedVehicle {
            speed: 13.9,
            route_id: "r_main".to_owned(),
            type_id: "car".to_owned(),
            ..ScriptedVehicle::default()
        };
        let stopped = ScriptedVehicle {
            speed: 0.0,
            ..moving.clone()
        };
        let gateway = SharedGateway::new(
            scripted()
                .with_vehicle("veh_moving", moving)
                .with_vehicle("veh_stopped", stopped)
                .with_step_failure_after(1),
        );
        let sink = Arc::new(RecordingSink::default());
        let (sim, handle) = build_loop(gateway, Arc::clone(&sink));

        handle.set_vehicle_filter(VehicleFilter {
            enabled: true,
            stopped_only: true,
            ..VehicleFilter::default()
        });

        let summary = sim.run().await;
        assert_eq!(summary.steps_executed, 1);

        let stats = sink.stats();
        let (last, visible) = stats.last().unwrap();
        assert_eq!(last.total_vehicles, 2);
        assert_eq!(*visible, 1);
    }
}
