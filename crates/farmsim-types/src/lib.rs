//! Shared type definitions for the farm simulation.
//!
//! # Modules
//!
//! - [`animal`] -- Animal categories and per-category tallies
//! - [`ids`] -- Numbered farmer and buyer identifiers
//! - [`events`] -- Observer event payloads emitted by the simulation core

pub mod animal;
pub mod events;
pub mod ids;

// Re-export all public types at crate root for convenience.
pub use animal::{Animal, AnimalCounts, UnknownAnimal};
pub use events::{EventKind, SimEvent, WaitReason};
pub use ids::{BuyerId, FarmerId};
