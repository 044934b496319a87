//! Error types shared across the simulation core.
//!
//! [`Cancelled`] is the only error an agent ever sees: it marks cooperative
//! shutdown, not a failure. Every suspension point returns it once the
//! simulation is stopping, so agents unwind with `?` and release any field
//! they hold on the way out.

/// The simulation is shutting down; the caller should unwind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("simulation is shutting down")]
pub struct Cancelled;

/// Errors that can occur while building or running a simulation.
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    /// The configuration was rejected.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: crate::config::ConfigError,
    },

    /// No tokio runtime to spawn agents onto.
    #[error("simulation must be created inside a tokio runtime")]
    NoRuntime,
}
