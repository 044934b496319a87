//! Concurrency core of the farm simulation.
//!
//! A discrete-tick clock paces every agent. Deliveries drop animals into a
//! shared enclosure, farmers carry them to per-category fields, and buyers
//! take them out again one at a time.
//!
//! # Modules
//!
//! - [`clock`] -- Tick counter with pause/resume and shutdown release.
//! - [`field`] -- Bounded stock with exclusive, FIFO-fair replenishment.
//! - [`enclosure`] -- Unbounded FIFO staging area between deliveries and
//!   farmers.
//! - [`farm`] -- The context object shared by every agent.
//! - [`delivery`] -- Random batch supply.
//! - [`farmer`] -- Collection, prioritisation, and stocking.
//! - [`buyer`] -- Tick-paced purchase attempts with give-up.
//! - [`waiting`] -- Registry of buyers waiting on each field.
//! - [`agent`] -- The [`ClockedAgent`] capability and per-agent randomness.
//! - [`observer`] -- State-change notification hook.
//! - [`simulation`] -- Wiring, bounded runs, and operator controls.
//! - [`config`] -- Configuration loading from `farmsim-config.yaml`.
//! - [`error`] -- Cancellation and build errors.
//!
//! Locks are per field and per enclosure. No task ever holds two of them at
//! once, and none is held across an `.await`.
//!
//! [`ClockedAgent`]: agent::ClockedAgent

pub mod agent;
pub mod buyer;
pub mod clock;
pub mod config;
pub mod delivery;
pub mod enclosure;
pub mod error;
pub mod farm;
pub mod farmer;
pub mod field;
pub mod observer;
pub mod simulation;
pub mod waiting;

pub use error::{Cancelled, SimulationError};
pub use simulation::{FarmSnapshot, Simulation, SimulationEndReason, SimulationResult};
