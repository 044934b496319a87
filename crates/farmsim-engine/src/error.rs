//! Error types for the engine binary.
//!
//! [`EngineError`] wraps every failure mode of startup and shutdown so
//! that `main` can propagate with `?`.

use std::path::PathBuf;

/// Top-level error for the engine binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: farmsim_core::config::ConfigError,
    },

    /// The simulation could not be built.
    #[error("simulation error: {source}")]
    Simulation {
        /// The underlying simulation error.
        #[from]
        source: farmsim_core::SimulationError,
    },

    /// The world-state log could not be written.
    #[error("tick log error at {}: {source}", path.display())]
    TickLog {
        /// Path of the log file.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The event pump task failed to complete.
    #[error("event pump error: {message}")]
    Pump {
        /// Description of the failure.
        message: String,
    },
}
