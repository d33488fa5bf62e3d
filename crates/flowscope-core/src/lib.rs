//! Control loop, topology, statistics, and command pipeline for the
//! Flowscope traffic frontend.
//!
//! This crate owns everything between the rendering boundary and the wire:
//! the engine is abstracted behind [`gateway::EngineGateway`], the loop in
//! [`runner`] drives it step by step, and all interaction from other threads
//! funnels through [`runner::LoopHandle`].
//!
//! # Modules
//!
//! - [`gateway`] -- typed engine access plus the scripted test double
//! - [`config`] -- YAML configuration with defaults
//! - [`control`] -- run/pause/stop flags shared with the loop
//! - [`queue`] -- deferred engine commands and their executor
//! - [`stress`] -- one-vehicle-per-step injection campaigns
//! - [`topology`] -- static network geometry loaded at startup
//! - [`stats`] -- per-frame aggregate statistics
//! - [`runner`] -- the control loop and its handle
//! - [`export`] -- CSV export of collected statistics

pub mod config;
pub mod control;
pub mod export;
pub mod gateway;
pub mod queue;
pub mod runner;
pub mod stats;
pub mod stress;
pub mod topology;

pub use config::{ConfigError, FlowConfig};
pub use control::ControlState;
pub use export::{ExportError, export_stats_csv, write_stats_csv};
pub use gateway::{
    EngineGateway, EntityKind, EntitySpec, Field, FieldValue, GatewayError, ScriptedGateway,
};
pub use queue::{CommandError, CommandQueue, InjectionRequest, SimCommand};
pub use runner::{FrameSink, LoopHandle, NullSink, RunEnd, RunSummary, SimulationLoop};
pub use stats::StatsAggregator;
pub use stress::StressInjector;
pub use topology::NetworkTopology;
