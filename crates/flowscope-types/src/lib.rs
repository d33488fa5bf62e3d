//! Shared type definitions for the Flowscope traffic frontend.
//!
//! This crate is the single source of truth for the data model shared by
//! the control loop, the engine gateway, and the rendering boundary. All
//! types here are plain values: no I/O, no engine knowledge, rebuilt or
//! copied freely between threads.
//!
//! # Modules
//!
//! - [`geometry`] -- 2D positions in engine world coordinates
//! - [`color`] -- RGB values and the four-aspect signal color
//! - [`entities`] -- Per-step vehicle and signal state records
//! - [`snapshot`] -- Immutable per-step frame and statistics bundles
//! - [`filter`] -- Display filter applied to vehicles at the UI boundary

pub mod color;
pub mod entities;
pub mod filter;
pub mod geometry;
pub mod snapshot;

// Re-export all public types at crate root for convenience.
pub use color::{Rgb, SignalColor};
pub use entities::{PhaseSpec, SignalState, VehicleState};
pub use filter::VehicleFilter;
pub use geometry::Position;
pub use snapshot::{FrameSnapshot, SegmentSnapshot, StatsSnapshot};
