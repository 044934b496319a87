//! Delivery: the random supply that feeds the enclosure.
//!
//! On every tick the manager rolls once; with probability
//! `1 / frequency` it builds a batch of `size` animals, each drawn
//! uniformly from the configured categories, reports a category-sorted
//! summary, and adds the batch to the enclosure.

use std::sync::Arc;

use farmsim_types::{Animal, AnimalCounts, EventKind};
use rand::Rng;
use rand::rngs::SmallRng;
use rand::seq::IndexedRandom;
use tracing::info;

use crate::agent::ClockedAgent;
use crate::config::DeliveryConfig;
use crate::error::Cancelled;
use crate::farm::Farm;

/// Periodically pushes random batches into the enclosure.
#[derive(Debug)]
pub struct DeliveryManager {
    farm: Arc<Farm>,
    config: DeliveryConfig,
    rng: SmallRng,
}

impl DeliveryManager {
    /// Create a manager drawing from `rng`.
    pub const fn new(farm: Arc<Farm>, config: DeliveryConfig, rng: SmallRng) -> Self {
        Self { farm, config, rng }
    }

    /// Roll for a delivery this tick.
    ///
    /// Returns the batch summary if one arrived.
    pub fn on_tick(&mut self) -> Option<AnimalCounts> {
        if self.config.size == 0 || self.config.animals.is_empty() {
            return None;
        }
        if !self.rng.random_ratio(1, self.config.frequency.max(1)) {
            return None;
        }

        let batch = self.draw_batch();
        let summary: AnimalCounts = batch.iter().copied().collect();
        info!(tick = self.farm.clock().current_tick(), %summary, "Delivery arrived");
        self.farm.clock().report(EventKind::DeliveryArrived {
            summary: summary.clone(),
        });
        self.farm.enclosure().add(batch);
        Some(summary)
    }

    fn draw_batch(&mut self) -> Vec<Animal> {
        let categories = &self.config.animals;
        let rng = &mut self.rng;
        (0..self.config.size)
            .filter_map(|_| categories.choose(rng).copied())
            .collect()
    }
}

impl ClockedAgent for DeliveryManager {
    fn label(&self) -> String {
        "Delivery".to_owned()
    }

    async fn run(mut self) -> Result<(), Cancelled> {
        let clock = Arc::clone(self.farm.clock());
        let mut seen = clock.current_tick();
        loop {
            seen = clock.wait_for_next_tick(seen).await?;
            self.on_tick();
        }
    }
}
