//! Simulation runner with operator controls.
//!
//! [`Simulation`] wires the clock, the farm, the delivery manager, and the
//! configured farmers and buyers together, and exposes the thread-safe
//! controls an operator needs at runtime:
//!
//! - **Bounded run**: [`Simulation::run`] stops after `max_ticks`
//!   (0 = unlimited) or when [`Simulation::stop`] is called
//! - **Pause/resume**: freezes and restarts the tick counter
//! - **Variable tick speed**: period adjustable while running
//! - **Spawning**: add farmers and buyers while running
//! - **Clean shutdown**: stops the clock, closes the farm, and joins every
//!   agent task

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use farmsim_types::{Animal, AnimalCounts, BuyerId, FarmerId};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::agent::{AgentRole, agent_rng, drive};
use crate::buyer::Buyer;
use crate::clock::Clock;
use crate::config::SimulationConfig;
use crate::delivery::DeliveryManager;
use crate::enclosure::EnclosureTotals;
use crate::error::SimulationError;
use crate::farm::Farm;
use crate::farmer::Farmer;
use crate::field::FieldSnapshot;
use crate::observer::SharedObserver;

/// Reason why the simulation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SimulationEndReason {
    /// Reached the configured `max_ticks` limit.
    MaxTicksReached,
    /// An operator issued a stop command.
    OperatorStop,
}

/// Result of a simulation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SimulationResult {
    /// The reason the simulation ended.
    pub end_reason: SimulationEndReason,
    /// Tick current when the run ended.
    pub final_tick: u64,
}

/// Point-in-time view of the whole farm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FarmSnapshot {
    /// Current tick.
    pub tick: u64,
    /// Whether the clock is paused.
    pub paused: bool,
    /// Every field, in category order.
    pub fields: Vec<FieldSnapshot>,
    /// Animals waiting in the enclosure.
    pub enclosure: AnimalCounts,
    /// Enclosure conservation counters.
    pub totals: EnclosureTotals,
    /// Buyers waiting per field.
    pub waiting: BTreeMap<Animal, u32>,
    /// Animals dropped for lack of a field.
    pub discarded: u64,
    /// Farmers spawned so far.
    pub farmers: u32,
    /// Buyers spawned so far.
    pub buyers: u32,
}

/// A running farm simulation.
///
/// Share it behind an [`Arc`] so operator controls can be called while
/// [`Simulation::run`] is in progress.
#[derive(Debug)]
pub struct Simulation {
    config: SimulationConfig,
    farm: Arc<Farm>,
    farmers: AtomicU32,
    buyers: AtomicU32,
    /// Every agent task, spawned onto `runtime`.
    tasks: Mutex<JoinSet<()>>,
    runtime: Handle,
}

impl Simulation {
    /// Validate `config` and build the clock and farm.
    ///
    /// Must be called inside a tokio runtime. Agents are always spawned
    /// onto that runtime, so the spawning controls work from any thread.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::Config`] if the configuration is unusable
    /// and [`SimulationError::NoRuntime`] outside a tokio runtime.
    pub fn new(config: SimulationConfig, observer: SharedObserver) -> Result<Self, SimulationError> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_err| SimulationError::NoRuntime)?;
        let clock = Arc::new(Clock::new(config.world.tick_interval_ms, observer));
        let farm = Arc::new(Farm::new(clock, &config.farm.fields));
        Ok(Self {
            config,
            farm,
            farmers: AtomicU32::new(0),
            buyers: AtomicU32::new(0),
            tasks: Mutex::new(JoinSet::new()),
            runtime,
        })
    }

    /// The shared farm.
    pub const fn farm(&self) -> &Arc<Farm> {
        &self.farm
    }

    /// The simulation clock.
    pub fn clock(&self) -> &Arc<Clock> {
        self.farm.clock()
    }

    /// The configuration the simulation was built from.
    pub const fn config(&self) -> &SimulationConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Run
    // -----------------------------------------------------------------------

    /// Spawn the delivery manager, farmers, and buyers, then drive the
    /// clock until the tick limit or an operator stop.
    ///
    /// Every agent task has been joined when this returns.
    pub async fn run(&self) -> SimulationResult {
        let max_ticks = self.config.simulation.max_ticks;
        info!(
            max_ticks,
            tick_interval_ms = self.clock().tick_interval_ms(),
            farmers = self.config.farmers.count,
            buyers = self.config.buyers.count,
            "Simulation starting"
        );
        self.start();

        let clock = self.clock();
        tokio::select! {
            () = clock.run() => {}
            () = Self::tick_limit(clock, max_ticks) => {}
        }

        let final_tick = clock.current_tick();
        let end_reason = if max_ticks > 0 && final_tick >= max_ticks {
            info!(tick = final_tick, max_ticks, "Tick limit reached");
            SimulationEndReason::MaxTicksReached
        } else {
            info!(tick = final_tick, "Operator stop requested");
            SimulationEndReason::OperatorStop
        };
        self.shutdown().await;

        let result = SimulationResult {
            end_reason,
            final_tick,
        };
        log_simulation_end(&result, &self.snapshot());
        result
    }

    async fn tick_limit(clock: &Clock, max_ticks: u64) {
        if max_ticks == 0 {
            std::future::pending::<()>().await;
        }
        // Returns early on stop; `run` tells the two apart afterwards.
        let _ = clock.wait_until(max_ticks).await;
    }

    fn start(&self) {
        let delivery = DeliveryManager::new(
            Arc::clone(&self.farm),
            self.config.delivery.clone(),
            agent_rng(self.config.world.seed, AgentRole::Delivery, 0),
        );
        self.tasks.lock().spawn_on(drive(delivery), &self.runtime);

        for _ in 0..self.config.farmers.count {
            self.spawn_farmer();
        }
        for _ in 0..self.config.buyers.count {
            self.spawn_buyer();
        }
    }

    // -----------------------------------------------------------------------
    // Spawning
    // -----------------------------------------------------------------------

    /// Add a farmer. Returns `None` once the simulation is stopping.
    ///
    /// Callable from any thread.
    pub fn spawn_farmer(&self) -> Option<FarmerId> {
        let mut tasks = self.tasks.lock();
        // Checked under the task lock so `shutdown` cannot miss the task.
        if self.clock().is_stopped() {
            warn!("Cannot spawn a farmer after shutdown");
            return None;
        }
        let number = self.farmers.fetch_add(1, Ordering::AcqRel).saturating_add(1);
        let id = FarmerId::new(number);
        let farmer = Farmer::new(
            id,
            Arc::clone(&self.farm),
            self.config.farmers,
            agent_rng(self.config.world.seed, AgentRole::Farmer, number),
        );
        tasks.spawn_on(drive(farmer), &self.runtime);
        info!(farmer = %id, "Farmer joined");
        Some(id)
    }

    /// Add a buyer. Returns `None` once the simulation is stopping.
    ///
    /// Callable from any thread.
    pub fn spawn_buyer(&self) -> Option<BuyerId> {
        let mut tasks = self.tasks.lock();
        if self.clock().is_stopped() {
            warn!("Cannot spawn a buyer after shutdown");
            return None;
        }
        let number = self.buyers.fetch_add(1, Ordering::AcqRel).saturating_add(1);
        let id = BuyerId::new(number);
        let buyer = Buyer::new(
            id,
            Arc::clone(&self.farm),
            self.config.buyers,
            agent_rng(self.config.world.seed, AgentRole::Buyer, number),
        );
        tasks.spawn_on(drive(buyer), &self.runtime);
        info!(buyer = %id, "Buyer joined");
        Some(id)
    }

    // -----------------------------------------------------------------------
    // Controls
    // -----------------------------------------------------------------------

    /// Freeze the tick counter.
    pub fn pause(&self) {
        self.clock().pause();
    }

    /// Unfreeze the tick counter.
    pub fn resume(&self) {
        self.clock().resume();
    }

    /// Whether the clock is paused.
    pub fn is_paused(&self) -> bool {
        self.clock().is_paused()
    }

    /// Change the tick period. Returns the previous period, or `None` if
    /// `ms` is zero.
    pub fn set_tick_interval_ms(&self, ms: u64) -> Option<u64> {
        let previous = self.clock().set_tick_interval_ms(ms)?;
        info!(previous_ms = previous, tick_interval_ms = ms, "Tick speed changed");
        Some(previous)
    }

    /// Request a stop. [`Simulation::run`] returns once every agent has
    /// unwound. Idempotent.
    pub fn stop(&self) {
        self.clock().stop();
        self.farm.close();
    }

    /// Stop and wait for every agent task to finish.
    ///
    /// The clock is stopped before the task set is taken, so no spawn can
    /// land in the set after it has been drained.
    pub async fn shutdown(&self) {
        self.stop();
        let mut tasks = std::mem::take(&mut *self.tasks.lock());
        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                warn!(error = %err, "Agent task ended abnormally");
            }
        }
    }

    /// Consistent-enough view for status output.
    ///
    /// Each part is read under its own lock, so the parts may come from
    /// adjacent instants while agents are running.
    pub fn snapshot(&self) -> FarmSnapshot {
        FarmSnapshot {
            tick: self.clock().current_tick(),
            paused: self.clock().is_paused(),
            fields: self.farm.field_snapshots(),
            enclosure: self.farm.enclosure().counts(),
            totals: self.farm.enclosure().totals(),
            waiting: self.farm.waiting().snapshot(),
            discarded: self.farm.discarded(),
            farmers: self.farmers.load(Ordering::Acquire),
            buyers: self.buyers.load(Ordering::Acquire),
        }
    }
}

/// Log the outcome of a run.
pub fn log_simulation_end(result: &SimulationResult, snapshot: &FarmSnapshot) {
    info!(
        reason = ?result.end_reason,
        final_tick = result.final_tick,
        enclosure = %snapshot.enclosure,
        discarded = snapshot.discarded,
        conserved = snapshot.totals.is_conserved(),
        "Simulation ended"
    );
}
