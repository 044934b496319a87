//! Engine binary for the farm simulation.
//!
//! Wires the simulation core to its collaborators: configuration, logging,
//! the world-state log, and the operator console.
//!
//! # Startup Sequence
//!
//! 1. Load configuration (first CLI argument, else `farmsim-config.yaml`)
//! 2. Initialize structured logging (tracing)
//! 3. Build the simulation with a channel observer
//! 4. Start the event pump feeding the world-state log
//! 5. Start the stdin console and the Ctrl-C handler
//! 6. Run until the tick limit or an operator stop
//! 7. Drain the event pump and log the result

mod console;
mod error;
mod world_log;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use farmsim_core::Simulation;
use farmsim_core::config::{LoggingConfig, SimulationConfig};
use farmsim_core::observer::ChannelObserver;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;
use crate::world_log::{TickLog, WorldState};

const DEFAULT_CONFIG_PATH: &str = "farmsim-config.yaml";

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration, the simulation, or the tick log
/// cannot be set up.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let config_path = std::env::args_os()
        .nth(1)
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    let config = load_config(&config_path)?;

    // 2. Initialize structured logging.
    init_tracing(&config.logging);
    info!(
        path = %config_path.display(),
        seed = config.world.seed,
        tick_interval_ms = config.world.tick_interval_ms,
        max_ticks = config.simulation.max_ticks,
        fields = config.farm.fields.len(),
        "farmsim-engine starting"
    );

    // 3. Build the simulation.
    let (observer, events) = ChannelObserver::new();
    let sim = Arc::new(Simulation::new(config, Arc::new(observer))?);

    // 4. Start the event pump.
    let logging = &sim.config().logging;
    let tick_log = if logging.tick_log_path.is_empty() {
        None
    } else {
        let path = Path::new(&logging.tick_log_path);
        let log = TickLog::create(path, logging.tick_log_format)?;
        info!(path = %path.display(), format = ?logging.tick_log_format, "Tick log opened");
        Some(log)
    };
    let world = WorldState::from_snapshot(&sim.snapshot());
    let pump = tokio::task::spawn_blocking(move || world_log::pump(events, world, tick_log));

    // 5. Operator controls.
    console::spawn(Arc::downgrade(&sim));
    let ctrl_c = tokio::spawn(stop_on_ctrl_c(Arc::downgrade(&sim)));

    // 6. Run.
    let result = sim.run().await;
    ctrl_c.abort();

    // 7. Dropping the simulation drops the observer, which ends the pump.
    drop(sim);
    let processed = pump.await.map_err(|err| EngineError::Pump {
        message: err.to_string(),
    })?;

    info!(
        end_reason = ?result.end_reason,
        final_tick = result.final_tick,
        events = processed,
        "farmsim-engine shutdown complete"
    );
    Ok(())
}

/// Load configuration from `path`, falling back to defaults when the file
/// does not exist.
fn load_config(path: &Path) -> Result<SimulationConfig, EngineError> {
    if path.exists() {
        Ok(SimulationConfig::from_file(path)?)
    } else {
        let mut config = SimulationConfig::default();
        config.world.apply_env_overrides();
        Ok(config)
    }
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn stop_on_ctrl_c(sim: Weak<Simulation>) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("Ctrl-C received, stopping");
            if let Some(sim) = sim.upgrade() {
                sim.stop();
            }
        }
        Err(err) => warn!(error = %err, "Ctrl-C handler unavailable"),
    }
}
