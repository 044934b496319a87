//! Farmers: move animals from the enclosure into their fields.
//!
//! One cycle is `collect -> (travel -> stock)* -> return -> maybe rest`:
//!
//! 1. Block on the enclosure for up to `max_animals` animals.
//! 2. Group the haul by category in discovery order and put the groups in
//!    priority order (see [`prioritize`]).
//! 3. For each group, walk `base_travel_ticks + carrying` ticks, acquire
//!    the field (FIFO among farmers), place what fits one unit at a time,
//!    and release the field on every exit path through [`ReplenishGuard`].
//! 4. Walk back, put any overflow back into the enclosure, and possibly
//!    take a break.
//!
//! A farmer never holds the enclosure and a field at the same time.
//!
//! [`ReplenishGuard`]: crate::field::ReplenishGuard

use std::cmp::Ordering;
use std::sync::Arc;

use farmsim_types::{Animal, AnimalCounts, EventKind, FarmerId};
use rand::Rng;
use rand::rngs::SmallRng;
use tracing::{debug, info, warn};

use crate::agent::ClockedAgent;
use crate::config::FarmerConfig;
use crate::error::Cancelled;
use crate::farm::Farm;

/// One category of a farmer's haul, with the state used to rank it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedGroup {
    /// Category.
    pub animal: Animal,
    /// Animals of this category carried.
    pub count: u32,
    /// Whether any buyer was waiting on the field at planning time.
    pub buyers_waiting: bool,
    /// Field head count at planning time.
    pub stock: u32,
    /// Field capacity.
    pub capacity: u32,
}

/// Sort groups into delivery order, stably.
///
/// Fields with waiting buyers come first; then fields with the lowest
/// `stock / capacity` fill ratio. Remaining ties keep discovery order.
pub fn prioritize(groups: &mut [PlannedGroup]) {
    groups.sort_by(|a, b| {
        b.buyers_waiting
            .cmp(&a.buyers_waiting)
            .then_with(|| compare_fill(a, b))
    });
}

/// Compare `a.stock / a.capacity` with `b.stock / b.capacity` exactly.
fn compare_fill(a: &PlannedGroup, b: &PlannedGroup) -> Ordering {
    // u32 * u32 always fits in u64.
    let lhs = u64::from(a.stock).saturating_mul(u64::from(b.capacity));
    let rhs = u64::from(b.stock).saturating_mul(u64::from(a.capacity));
    lhs.cmp(&rhs)
}

/// Count a haul per category, keeping first-seen order.
pub fn group_in_discovery_order(batch: &[Animal]) -> Vec<(Animal, u32)> {
    let mut groups: Vec<(Animal, u32)> = Vec::new();
    for &animal in batch {
        if let Some((_, count)) = groups.iter_mut().find(|(seen, _)| *seen == animal) {
            *count = count.saturating_add(1);
            continue;
        }
        groups.push((animal, 1));
    }
    groups
}

/// A farmer agent.
#[derive(Debug)]
pub struct Farmer {
    id: FarmerId,
    farm: Arc<Farm>,
    config: FarmerConfig,
    rng: SmallRng,
}

impl Farmer {
    /// Create a farmer drawing break decisions from `rng`.
    pub const fn new(id: FarmerId, farm: Arc<Farm>, config: FarmerConfig, rng: SmallRng) -> Self {
        Self {
            id,
            farm,
            config,
            rng,
        }
    }

    /// This farmer's identifier.
    pub const fn id(&self) -> FarmerId {
        self.id
    }

    /// Run one full collection and distribution cycle.
    pub async fn cycle(&mut self) -> Result<(), Cancelled> {
        let max = usize::try_from(self.config.max_animals).unwrap_or(usize::MAX);
        let batch = self.farm.enclosure().take_up_to(max).await?;

        let collected: AnimalCounts = batch.iter().copied().collect();
        info!(farmer = %self.id, animals = %collected, "Collected from enclosure");
        self.farm.clock().report(EventKind::FarmerCollected {
            farmer: self.id,
            animals: collected,
        });

        let plan = self.plan(&batch);
        let mut carrying = plan
            .iter()
            .fold(0_u32, |total, group| total.saturating_add(group.count));
        let mut overflow: Vec<Animal> = Vec::new();
        for group in plan {
            let left = self.stock_group(group, carrying).await?;
            carrying = carrying.saturating_sub(group.count);
            let left = usize::try_from(left).unwrap_or(0);
            overflow.extend(std::iter::repeat_n(group.animal, left));
        }

        self.return_to_enclosure(overflow).await?;
        self.maybe_take_break().await
    }

    /// Group the haul, drop unmapped categories, and rank the rest.
    fn plan(&self, batch: &[Animal]) -> Vec<PlannedGroup> {
        let mut planned = Vec::new();
        for (animal, count) in group_in_discovery_order(batch) {
            let Some(field) = self.farm.field(animal) else {
                self.discard(animal, count);
                continue;
            };
            let snapshot = field.snapshot();
            planned.push(PlannedGroup {
                animal,
                count,
                buyers_waiting: self.farm.waiting().has_waiting(animal),
                stock: snapshot.count,
                capacity: snapshot.capacity,
            });
        }
        prioritize(&mut planned);
        planned
    }

    fn discard(&self, animal: Animal, count: u32) {
        warn!(farmer = %self.id, %animal, count, "No field for category, animals discarded");
        self.farm.record_discarded(count);
        self.farm.clock().report(EventKind::AnimalsDiscarded {
            farmer: self.id,
            animal,
            count,
        });
    }

    /// Walk to one field and stock it. Returns the animals that did not fit.
    async fn stock_group(&self, group: PlannedGroup, carrying: u32) -> Result<u32, Cancelled> {
        let clock = self.farm.clock();
        let travel_ticks = self
            .config
            .base_travel_ticks
            .saturating_add(u64::from(carrying));
        debug!(farmer = %self.id, animal = %group.animal, travel_ticks, carrying, "Moving to field");
        clock.report(EventKind::FarmerMoving {
            farmer: self.id,
            animal: group.animal,
            travel_ticks,
            carrying,
        });
        clock.sleep_ticks(travel_ticks).await?;

        let Some(field) = self.farm.field(group.animal) else {
            return Ok(group.count);
        };
        let guard = field.start_replenish().await?;
        let deliverable = group.count.min(guard.field().snapshot().free());
        clock.report(EventKind::FarmerBeganStocking {
            farmer: self.id,
            animal: group.animal,
            count: deliverable,
        });

        for _ in 0..deliverable {
            clock.sleep_ticks(self.config.stocking_ticks_per_unit).await?;
            let count = guard.add_units(1);
            clock.report(EventKind::FieldStocked {
                farmer: self.id,
                animal: group.animal,
                count,
            });
        }
        guard.finish();

        let overflow = group.count.saturating_sub(deliverable);
        info!(
            farmer = %self.id,
            animal = %group.animal,
            placed = deliverable,
            overflow,
            "Finished stocking"
        );
        clock.report(EventKind::FarmerFinishedStocking {
            farmer: self.id,
            animal: group.animal,
            placed: deliverable,
            overflow,
        });
        Ok(overflow)
    }

    async fn return_to_enclosure(&self, overflow: Vec<Animal>) -> Result<(), Cancelled> {
        let clock = self.farm.clock();
        let travel_ticks = self.config.return_travel_ticks;
        let carrying = u32::try_from(overflow.len()).unwrap_or(u32::MAX);
        debug!(farmer = %self.id, travel_ticks, carrying, "Returning to enclosure");
        clock.report(EventKind::FarmerReturning {
            farmer: self.id,
            travel_ticks,
            carrying,
        });
        clock.sleep_ticks(travel_ticks).await?;
        if !overflow.is_empty() {
            self.farm.enclosure().add(overflow);
        }
        Ok(())
    }

    async fn maybe_take_break(&mut self) -> Result<(), Cancelled> {
        let chance = self.config.break_chance;
        if chance == 0 || !self.rng.random_ratio(1, chance) {
            return Ok(());
        }
        let low = self.config.break_min_ticks.min(self.config.break_max_ticks);
        let high = self.config.break_max_ticks.max(low);
        let duration_ticks = self.rng.random_range(low..=high);

        info!(farmer = %self.id, duration_ticks, "Taking a break");
        let clock = self.farm.clock();
        clock.report(EventKind::FarmerBreakStarted {
            farmer: self.id,
            duration_ticks,
        });
        clock.sleep_ticks(duration_ticks).await?;
        clock.report(EventKind::FarmerBreakEnded { farmer: self.id });
        Ok(())
    }
}

impl ClockedAgent for Farmer {
    fn label(&self) -> String {
        self.id.to_string()
    }

    async fn run(mut self) -> Result<(), Cancelled> {
        loop {
            self.cycle().await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;
    use crate::clock::Clock;
    use crate::config::FieldConfig;
    use crate::field::Field;
    use crate::observer::{EventLog, SharedObserver};

    fn group(animal: Animal, stock: u32, capacity: u32, buyers_waiting: bool) -> PlannedGroup {
        PlannedGroup {
            animal,
            count: 1,
            buyers_waiting,
            stock,
            capacity,
        }
    }

    fn quick_config() -> FarmerConfig {
        FarmerConfig {
            count: 1,
            max_animals: 10,
            base_travel_ticks: 1,
            return_travel_ticks: 1,
            stocking_ticks_per_unit: 1,
            break_chance: 0,
            break_min_ticks: 0,
            break_max_ticks: 0,
        }
    }

    fn farm_with(fields: &[FieldConfig]) -> (Arc<Farm>, Arc<EventLog>) {
        let log = Arc::new(EventLog::new());
        let clock = Arc::new(Clock::new(100, Arc::clone(&log) as SharedObserver));
        (Arc::new(Farm::new(clock, fields)), log)
    }

    fn farmer(farm: &Arc<Farm>) -> Farmer {
        Farmer::new(
            FarmerId::new(1),
            Arc::clone(farm),
            quick_config(),
            SmallRng::seed_from_u64(1),
        )
    }

    fn spawn_clock(farm: &Arc<Farm>) -> tokio::task::JoinHandle<()> {
        let clock = Arc::clone(farm.clock());
        tokio::spawn(async move { clock.run().await })
    }

    #[test]
    fn groups_keep_discovery_order() {
        let batch = [
            Animal::Sheep,
            Animal::Cows,
            Animal::Sheep,
            Animal::Pigs,
            Animal::Cows,
        ];
        assert_eq!(
            group_in_discovery_order(&batch),
            vec![(Animal::Sheep, 2), (Animal::Cows, 2), (Animal::Pigs, 1)]
        );
    }

    #[test]
    fn waiting_buyers_outrank_fill_ratio() {
        let mut groups = vec![
            group(Animal::Cows, 0, 50, false),
            group(Animal::Pigs, 49, 50, true),
        ];
        prioritize(&mut groups);
        assert_eq!(groups.first().map(|g| g.animal), Some(Animal::Pigs));
    }

    #[test]
    fn lower_fill_ratio_goes_first_and_ties_stay_stable() {
        let mut groups = vec![
            group(Animal::Sheep, 5, 10, false),
            group(Animal::Cows, 1, 10, false),
            group(Animal::Llamas, 10, 20, false),
            group(Animal::Pigs, 2, 40, false),
        ];
        prioritize(&mut groups);
        let order: Vec<Animal> = groups.iter().map(|g| g.animal).collect();
        assert_eq!(
            order,
            vec![Animal::Pigs, Animal::Cows, Animal::Sheep, Animal::Llamas]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn one_cycle_stocks_the_field_and_empties_the_enclosure() {
        let (farm, _log) = farm_with(&[FieldConfig {
            animal: Animal::Pigs,
            capacity: 50,
            initial_stock: 5,
        }]);
        farm.enclosure().add([Animal::Pigs; 10]);
        let clock_task = spawn_clock(&farm);

        let mut farmer = farmer(&farm);
        assert_eq!(farmer.cycle().await, Ok(()));
        assert_eq!(
            farm.field(Animal::Pigs).map(Field::current_count),
            Some(15)
        );
        assert!(farm.enclosure().is_empty());

        farm.clock().stop();
        let _ = clock_task.await;
    }

    #[tokio::test(start_paused = true)]
    async fn overflow_returns_to_the_enclosure() {
        let (farm, log) = farm_with(&[FieldConfig {
            animal: Animal::Cows,
            capacity: 10,
            initial_stock: 8,
        }]);
        farm.enclosure().add([Animal::Cows; 5]);
        let clock_task = spawn_clock(&farm);

        let mut farmer = farmer(&farm);
        assert_eq!(farmer.cycle().await, Ok(()));
        assert_eq!(
            farm.field(Animal::Cows).map(Field::current_count),
            Some(10)
        );
        assert_eq!(farm.enclosure().counts().get(Animal::Cows), 3);
        assert!(farm.enclosure().totals().is_conserved());
        let finished = log.filter(|kind| {
            matches!(
                kind,
                EventKind::FarmerFinishedStocking {
                    placed: 2,
                    overflow: 3,
                    ..
                }
            )
        });
        assert_eq!(finished.len(), 1);

        farm.clock().stop();
        let _ = clock_task.await;
    }

    #[tokio::test(start_paused = true)]
    async fn unmapped_animals_are_discarded_and_reported() {
        let (farm, log) = farm_with(&[FieldConfig::new(Animal::Pigs)]);
        farm.enclosure().add([Animal::Llamas, Animal::Pigs, Animal::Llamas]);
        let clock_task = spawn_clock(&farm);

        let mut farmer = farmer(&farm);
        assert_eq!(farmer.cycle().await, Ok(()));
        assert_eq!(farm.discarded(), 2);
        let discarded = log.filter(|kind| {
            matches!(
                kind,
                EventKind::AnimalsDiscarded {
                    animal: Animal::Llamas,
                    count: 2,
                    ..
                }
            )
        });
        assert_eq!(discarded.len(), 1);
        assert_eq!(farm.field(Animal::Pigs).map(Field::current_count), Some(6));

        farm.clock().stop();
        let _ = clock_task.await;
    }

    #[tokio::test]
    async fn shutdown_mid_stocking_releases_the_field() {
        let (farm, _log) = farm_with(&[FieldConfig {
            animal: Animal::Sheep,
            capacity: 50,
            initial_stock: 0,
        }]);
        farm.enclosure().add([Animal::Sheep; 10]);
        let task = tokio::spawn(farmer(&farm).run());

        let field_busy = || {
            farm.field(Animal::Sheep)
                .is_some_and(Field::is_being_replenished)
        };
        for _ in 0..20 {
            tokio::task::yield_now().await;
            if field_busy() {
                break;
            }
            let _ = farm.clock().advance();
        }
        assert!(field_busy());

        farm.clock().stop();
        farm.close();
        assert_eq!(task.await.ok(), Some(Err(Cancelled)));
        assert!(!field_busy());
    }
}
