//! The farm: the context object every agent shares.
//!
//! Built once at startup and passed to agents behind an [`Arc`]. It owns
//! the enclosure, one field per configured category, and the
//! waiting-buyer registry. Each of those carries its own synchronization;
//! the farm itself holds no lock.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use farmsim_types::Animal;

use crate::clock::Clock;
use crate::config::FieldConfig;
use crate::enclosure::Enclosure;
use crate::field::{Field, FieldSnapshot};
use crate::waiting::WaitingRegistry;

/// Shared simulation state.
#[derive(Debug)]
pub struct Farm {
    clock: Arc<Clock>,
    enclosure: Enclosure,
    fields: BTreeMap<Animal, Field>,
    waiting: WaitingRegistry,
    discarded: AtomicU64,
}

impl Farm {
    /// Build a farm with one field per entry of `fields`.
    ///
    /// Later duplicates of a category are ignored; configuration
    /// validation rejects them before this point.
    pub fn new(clock: Arc<Clock>, fields: &[FieldConfig]) -> Self {
        let mut built = BTreeMap::new();
        for config in fields {
            built.entry(config.animal).or_insert_with(|| {
                Field::new(
                    config.animal,
                    config.capacity,
                    config.initial_stock,
                    Arc::clone(&clock),
                )
            });
        }
        Self {
            enclosure: Enclosure::new(Arc::clone(&clock)),
            clock,
            fields: built,
            waiting: WaitingRegistry::new(),
            discarded: AtomicU64::new(0),
        }
    }

    /// The simulation clock.
    pub const fn clock(&self) -> &Arc<Clock> {
        &self.clock
    }

    /// The shared enclosure.
    pub const fn enclosure(&self) -> &Enclosure {
        &self.enclosure
    }

    /// The field holding `animal`, if any.
    pub fn field(&self, animal: Animal) -> Option<&Field> {
        self.fields.get(&animal)
    }

    /// Categories that have a field, in category order.
    pub fn animals(&self) -> Vec<Animal> {
        self.fields.keys().copied().collect()
    }

    /// Snapshot of every field, in category order.
    pub fn field_snapshots(&self) -> Vec<FieldSnapshot> {
        self.fields.values().map(Field::snapshot).collect()
    }

    /// The waiting-buyer registry.
    pub const fn waiting(&self) -> &WaitingRegistry {
        &self.waiting
    }

    /// Count animals dropped because their category has no field.
    pub fn record_discarded(&self, count: u32) {
        self.discarded.fetch_add(u64::from(count), Ordering::AcqRel);
    }

    /// Animals dropped so far for lack of a field.
    pub fn discarded(&self) -> u64 {
        self.discarded.load(Ordering::Acquire)
    }

    /// Release every farmer blocked on the enclosure or a field.
    pub fn close(&self) {
        self.enclosure.close();
        for field in self.fields.values() {
            field.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::NoOpObserver;

    #[test]
    fn builds_one_field_per_category() {
        let clock = Arc::new(Clock::new(100, Arc::new(NoOpObserver)));
        let farm = Farm::new(
            clock,
            &[
                FieldConfig::new(Animal::Sheep),
                FieldConfig::new(Animal::Pigs),
                FieldConfig {
                    animal: Animal::Pigs,
                    capacity: 1,
                    initial_stock: 0,
                },
            ],
        );
        assert_eq!(farm.animals(), vec![Animal::Pigs, Animal::Sheep]);
        assert_eq!(farm.field(Animal::Pigs).map(Field::capacity), Some(50));
        assert!(farm.field(Animal::Cows).is_none());
        assert_eq!(farm.field_snapshots().len(), 2);
    }
}
