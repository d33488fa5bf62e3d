//! Error types for the driver binary.
//!
//! [`DriverError`] is the top-level error type that wraps all possible
//! failure modes during startup, the control loop, and shutdown export.

/// Top-level error for the driver binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: flowscope_core::config::ConfigError,
    },

    /// Engine launch, connection, or wire traffic failed.
    #[error("gateway error: {source}")]
    Gateway {
        /// The underlying gateway error.
        #[from]
        source: flowscope_core::gateway::GatewayError,
    },

    /// Statistics export failed.
    #[error("export error: {source}")]
    Export {
        /// The underlying export error.
        #[from]
        source: flowscope_core::export::ExportError,
    },

    /// The control loop ended abnormally.
    #[error("loop error: {message}")]
    Loop {
        /// Description of the loop failure.
        message: String,
    },
}
