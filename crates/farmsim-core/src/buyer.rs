//! Buyers: consume animals one at a time, paced by the clock.
//!
//! A buyer never blocks inside a field. Each tick it makes at most one
//! [`Field::try_withdraw_one`] attempt against its current target and
//! decides for itself whether to keep waiting, give up, or rest.
//!
//! [`Field::try_withdraw_one`]: crate::field::Field::try_withdraw_one

use std::sync::Arc;

use farmsim_types::{Animal, BuyerId, EventKind, WaitReason};
use rand::Rng;
use rand::rngs::SmallRng;
use rand::seq::IndexedRandom;
use tracing::{debug, info};

use crate::agent::ClockedAgent;
use crate::config::BuyerConfig;
use crate::error::Cancelled;
use crate::farm::Farm;
use crate::field::Withdrawal;

/// What a buyer did on one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuyerOutcome {
    /// Pausing after a purchase.
    Resting,
    /// Bought one animal.
    Bought {
        /// The field bought from.
        animal: Animal,
    },
    /// Could not buy and keeps the same target.
    Waiting {
        /// The target field.
        animal: Animal,
        /// Why the attempt failed.
        reason: WaitReason,
    },
    /// Abandoned the target after waiting too long.
    GaveUp {
        /// The abandoned field.
        animal: Animal,
    },
    /// No field to buy from.
    Idle,
}

/// A buyer agent.
#[derive(Debug)]
pub struct Buyer {
    id: BuyerId,
    farm: Arc<Farm>,
    config: BuyerConfig,
    rng: SmallRng,
    animals: Vec<Animal>,
    target: Option<Animal>,
    waited: u32,
    registered: bool,
    cooldown: u64,
}

impl Buyer {
    /// Create an idle buyer choosing among the farm's fields.
    pub fn new(id: BuyerId, farm: Arc<Farm>, config: BuyerConfig, rng: SmallRng) -> Self {
        let animals = farm.animals();
        Self {
            id,
            farm,
            config,
            rng,
            animals,
            target: None,
            waited: 0,
            registered: false,
            cooldown: 0,
        }
    }

    /// This buyer's identifier.
    pub const fn id(&self) -> BuyerId {
        self.id
    }

    /// Current target field, if any.
    pub const fn target(&self) -> Option<Animal> {
        self.target
    }

    /// Failed attempts against the current target.
    pub const fn waited_ticks(&self) -> u32 {
        self.waited
    }

    /// Act once for the current tick.
    pub fn on_tick(&mut self) -> BuyerOutcome {
        if self.cooldown > 0 {
            self.cooldown = self.cooldown.saturating_sub(1);
            return BuyerOutcome::Resting;
        }

        let animal = match self.target {
            Some(animal) => animal,
            None => {
                let Some(&animal) = self.animals.choose(&mut self.rng) else {
                    return BuyerOutcome::Idle;
                };
                debug!(buyer = %self.id, %animal, "Picked target");
                self.target = Some(animal);
                animal
            }
        };
        let Some(field) = self.farm.field(animal) else {
            self.target = None;
            return BuyerOutcome::Idle;
        };

        match field.try_withdraw_one() {
            Withdrawal::Bought { remaining } => self.bought(animal, remaining),
            Withdrawal::BeingReplenished => self.failed(animal, WaitReason::BeingStocked),
            Withdrawal::Empty => self.failed(animal, WaitReason::FieldEmpty),
        }
    }

    fn bought(&mut self, animal: Animal, remaining: u32) -> BuyerOutcome {
        let waited_ticks = self.waited;
        self.stop_waiting();
        info!(buyer = %self.id, %animal, waited_ticks, remaining, "Bought");
        self.farm.clock().report(EventKind::BuyerBought {
            buyer: self.id,
            animal,
            waited_ticks,
        });

        let low = self.config.purchase_delay_min_ticks;
        let high = self.config.purchase_delay_max_ticks.max(low);
        self.cooldown = self.rng.random_range(low..=high);
        BuyerOutcome::Bought { animal }
    }

    fn failed(&mut self, animal: Animal, reason: WaitReason) -> BuyerOutcome {
        if !self.registered {
            self.farm.waiting().register(animal);
            self.registered = true;
        }
        self.waited = self.waited.saturating_add(1);

        if self.waited >= self.config.max_wait_ticks {
            let waited_ticks = self.waited;
            self.stop_waiting();
            info!(buyer = %self.id, %animal, waited_ticks, "Gave up waiting");
            self.farm.clock().report(EventKind::BuyerGaveUp {
                buyer: self.id,
                animal,
                waited_ticks,
            });
            return BuyerOutcome::GaveUp { animal };
        }

        self.farm.clock().report(EventKind::BuyerWaiting {
            buyer: self.id,
            animal,
            reason,
            waited_ticks: self.waited,
        });
        BuyerOutcome::Waiting { animal, reason }
    }

    /// Leave the waiting registry and return to idle.
    fn stop_waiting(&mut self) {
        if self.registered {
            if let Some(animal) = self.target {
                self.farm.waiting().unregister(animal);
            }
            self.registered = false;
        }
        self.target = None;
        self.waited = 0;
    }

    async fn pace(&mut self) -> Result<(), Cancelled> {
        let clock = Arc::clone(self.farm.clock());
        let mut seen = clock.current_tick();
        loop {
            seen = clock.wait_for_next_tick(seen).await?;
            self.on_tick();
        }
    }
}

impl ClockedAgent for Buyer {
    fn label(&self) -> String {
        self.id.to_string()
    }

    async fn run(mut self) -> Result<(), Cancelled> {
        let outcome = self.pace().await;
        self.stop_waiting();
        outcome
    }
}
