//! Registry of buyers currently waiting on each field.
//!
//! A buyer registers once, on its first failed attempt against a target,
//! and deregisters when it buys or gives up. Farmers read the registry to
//! deliver first to fields that buyers are waiting on.

use std::collections::BTreeMap;

use farmsim_types::Animal;
use parking_lot::Mutex;

/// Per-category count of waiting buyers.
#[derive(Debug, Default)]
pub struct WaitingRegistry {
    waiting: Mutex<BTreeMap<Animal, u32>>,
}

impl WaitingRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one more buyer waiting on `animal`.
    pub fn register(&self, animal: Animal) {
        let mut waiting = self.waiting.lock();
        let count = waiting.entry(animal).or_insert(0);
        *count = count.saturating_add(1);
    }

    /// Record that a buyer stopped waiting on `animal`.
    pub fn unregister(&self, animal: Animal) {
        let mut waiting = self.waiting.lock();
        if let Some(count) = waiting.get_mut(&animal) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                waiting.remove(&animal);
            }
        }
    }

    /// Buyers waiting on `animal`.
    pub fn count(&self, animal: Animal) -> u32 {
        self.waiting.lock().get(&animal).copied().unwrap_or(0)
    }

    /// Whether any buyer is waiting on `animal`.
    pub fn has_waiting(&self, animal: Animal) -> bool {
        self.count(animal) > 0
    }

    /// Copy of all non-zero counts.
    pub fn snapshot(&self) -> BTreeMap<Animal, u32> {
        self.waiting.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_unregister_balance() {
        let registry = WaitingRegistry::new();
        registry.register(Animal::Cows);
        registry.register(Animal::Cows);
        registry.register(Animal::Pigs);
        assert_eq!(registry.count(Animal::Cows), 2);

        registry.unregister(Animal::Cows);
        registry.unregister(Animal::Pigs);
        assert!(registry.has_waiting(Animal::Cows));
        assert!(!registry.has_waiting(Animal::Pigs));
        assert_eq!(registry.snapshot().len(), 1);
    }

    #[test]
    fn unregister_without_register_is_harmless() {
        let registry = WaitingRegistry::new();
        registry.unregister(Animal::Sheep);
        assert_eq!(registry.count(Animal::Sheep), 0);
    }
}
