//! Observer event payloads.
//!
//! Every externally visible state change in the simulation core is reported
//! as a [`SimEvent`]: tick advances, clock pause/resume, enclosure and field
//! changes, and each step of a farmer's or buyer's activity. Events are
//! plain data so observers can forward, log, or serialize them freely.

use serde::{Deserialize, Serialize};

use crate::animal::{Animal, AnimalCounts};
use crate::ids::{BuyerId, FarmerId};

/// Why a buyer could not buy from its target field this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitReason {
    /// The field has no animals left.
    FieldEmpty,
    /// A farmer is currently stocking the field.
    BeingStocked,
}

impl core::fmt::Display for WaitReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::FieldEmpty => f.write_str("field_empty"),
            Self::BeingStocked => f.write_str("being_stocked"),
        }
    }
}

/// A single observable state change, stamped with the tick it happened in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimEvent {
    /// Clock tick current when the change happened.
    pub tick: u64,
    /// What changed.
    pub kind: EventKind,
}

impl SimEvent {
    /// Stamp an event kind with a tick.
    pub const fn new(tick: u64, kind: EventKind) -> Self {
        Self { tick, kind }
    }
}

/// The kinds of observable state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    // --- Clock ---
    /// The clock advanced to `SimEvent::tick`.
    Tick,
    /// The clock was paused.
    Paused,
    /// The clock was resumed.
    Resumed,

    // --- Shared entities ---
    /// The enclosure's contents changed.
    EnclosureChanged {
        /// Animals now resident, tallied by category.
        contents: AnimalCounts,
    },
    /// A field's stock or stocking flag changed.
    FieldChanged {
        /// The field's category.
        animal: Animal,
        /// Current head count.
        count: u32,
        /// Whether a farmer holds the field for stocking.
        being_replenished: bool,
    },

    // --- Delivery ---
    /// A delivery batch arrived in the enclosure.
    DeliveryArrived {
        /// Batch contents, sorted by category.
        summary: AnimalCounts,
    },

    // --- Farmers ---
    /// A farmer took animals from the enclosure.
    FarmerCollected {
        /// The farmer.
        farmer: FarmerId,
        /// What was taken.
        animals: AnimalCounts,
    },
    /// A farmer set off towards a field.
    FarmerMoving {
        /// The farmer.
        farmer: FarmerId,
        /// Destination field.
        animal: Animal,
        /// Travel time in ticks.
        travel_ticks: u64,
        /// Animals still being carried.
        carrying: u32,
    },
    /// A farmer acquired a field and began stocking it.
    FarmerBeganStocking {
        /// The farmer.
        farmer: FarmerId,
        /// The field.
        animal: Animal,
        /// Animals that will be placed.
        count: u32,
    },
    /// A farmer placed one animal into a field.
    FieldStocked {
        /// The farmer.
        farmer: FarmerId,
        /// The field.
        animal: Animal,
        /// Field head count after placing.
        count: u32,
    },
    /// A farmer finished stocking and released a field.
    FarmerFinishedStocking {
        /// The farmer.
        farmer: FarmerId,
        /// The field.
        animal: Animal,
        /// Animals actually placed.
        placed: u32,
        /// Animals that did not fit and are carried back.
        overflow: u32,
    },
    /// A farmer dropped animals that have no matching field.
    AnimalsDiscarded {
        /// The farmer.
        farmer: FarmerId,
        /// The unmapped category.
        animal: Animal,
        /// How many were dropped.
        count: u32,
    },
    /// A farmer is walking back to the enclosure.
    FarmerReturning {
        /// The farmer.
        farmer: FarmerId,
        /// Travel time in ticks.
        travel_ticks: u64,
        /// Overflow animals being carried back.
        carrying: u32,
    },
    /// A farmer started a break.
    FarmerBreakStarted {
        /// The farmer.
        farmer: FarmerId,
        /// Break length in ticks.
        duration_ticks: u64,
    },
    /// A farmer's break ended.
    FarmerBreakEnded {
        /// The farmer.
        farmer: FarmerId,
    },

    // --- Buyers ---
    /// A buyer bought one animal.
    BuyerBought {
        /// The buyer.
        buyer: BuyerId,
        /// The field bought from.
        animal: Animal,
        /// Ticks spent waiting before this purchase (0 if none).
        waited_ticks: u32,
    },
    /// A buyer failed to buy and keeps waiting on its target.
    BuyerWaiting {
        /// The buyer.
        buyer: BuyerId,
        /// The target field.
        animal: Animal,
        /// Why the purchase failed.
        reason: WaitReason,
        /// Ticks waited so far, including this one.
        waited_ticks: u32,
    },
    /// A buyer abandoned its target after waiting too long.
    BuyerGaveUp {
        /// The buyer.
        buyer: BuyerId,
        /// The abandoned field.
        animal: Animal,
        /// Ticks waited before giving up.
        waited_ticks: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_type_tag() {
        let event = SimEvent::new(
            7,
            EventKind::BuyerWaiting {
                buyer: BuyerId::new(1),
                animal: Animal::Cows,
                reason: WaitReason::BeingStocked,
                waited_ticks: 2,
            },
        );
        let json = serde_json::to_value(&event).unwrap_or_default();
        assert_eq!(json["tick"], 7);
        assert_eq!(json["kind"]["type"], "buyer_waiting");
        assert_eq!(json["kind"]["reason"], "being_stocked");
        assert_eq!(json["kind"]["animal"], "cows");
    }

    #[test]
    fn delivery_summary_serializes_as_map() {
        let summary: AnimalCounts = [Animal::Sheep, Animal::Sheep].into_iter().collect();
        let event = SimEvent::new(1, EventKind::DeliveryArrived { summary });
        let json = serde_json::to_value(&event).unwrap_or_default();
        assert_eq!(json["kind"]["summary"]["sheep"], 2);
    }
}
