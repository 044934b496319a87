//! Fields: bounded per-category stock with exclusive, fair replenishment.
//!
//! A field is `Idle` or `BeingReplenished`. Farmers move it between the two
//! with [`Field::start_replenish`], which hands back a [`ReplenishGuard`];
//! dropping or finishing the guard returns the field to `Idle`. Grants are
//! first-requested, first-granted: the exclusion primitive is a one-permit
//! [`Semaphore`], whose waiters are served in FIFO order, so a farmer
//! contending on a busy field is never overtaken by a later arrival.
//!
//! Buyers never wait inside a field. [`Field::try_withdraw_one`] answers at
//! once and buyers own their own tick-paced retry policy.
//!
//! Lock scope: the stock is guarded by a short `parking_lot` mutex that is
//! never held across an `.await` and never nested with another lock.
//! Observer events are emitted after it is released.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use farmsim_types::{Animal, EventKind};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::error::Cancelled;

/// Point-in-time view of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldSnapshot {
    /// The field's category.
    pub animal: Animal,
    /// Current head count.
    pub count: u32,
    /// Maximum head count.
    pub capacity: u32,
    /// Whether a farmer holds the field for stocking.
    pub being_replenished: bool,
}

impl FieldSnapshot {
    /// Free places left.
    pub const fn free(&self) -> u32 {
        self.capacity.saturating_sub(self.count)
    }
}

/// Outcome of a single purchase attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Withdrawal {
    /// One animal was taken.
    Bought {
        /// Head count left after the purchase.
        remaining: u32,
    },
    /// A farmer is stocking the field.
    BeingReplenished,
    /// No animals left.
    Empty,
}

#[derive(Debug)]
struct FieldState {
    count: u32,
    being_replenished: bool,
}

/// One bounded stock of a single animal category.
pub struct Field {
    animal: Animal,
    capacity: u32,
    state: Mutex<FieldState>,
    /// Single permit; FIFO-fair among farmers waiting to stock.
    replenish: Semaphore,
    /// Farmers currently queued in [`Field::start_replenish`].
    queued: AtomicUsize,
    clock: Arc<Clock>,
}

impl core::fmt::Debug for Field {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Field")
            .field("snapshot", &self.snapshot())
            .field("queued", &self.pending_replenishers())
            .finish_non_exhaustive()
    }
}

impl Field {
    /// Create a field. `initial_stock` is clamped to `capacity`.
    pub fn new(animal: Animal, capacity: u32, initial_stock: u32, clock: Arc<Clock>) -> Self {
        Self {
            animal,
            capacity,
            state: Mutex::new(FieldState {
                count: initial_stock.min(capacity),
                being_replenished: false,
            }),
            replenish: Semaphore::new(1),
            queued: AtomicUsize::new(0),
            clock,
        }
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// The category this field holds.
    pub const fn animal(&self) -> Animal {
        self.animal
    }

    /// Maximum head count.
    pub const fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Current head count.
    pub fn current_count(&self) -> u32 {
        self.state.lock().count
    }

    /// Whether a farmer holds the field for stocking.
    pub fn is_being_replenished(&self) -> bool {
        self.state.lock().being_replenished
    }

    /// Consistent view of count and stocking flag.
    pub fn snapshot(&self) -> FieldSnapshot {
        let state = self.state.lock();
        FieldSnapshot {
            animal: self.animal,
            count: state.count,
            capacity: self.capacity,
            being_replenished: state.being_replenished,
        }
    }

    /// Farmers waiting for their turn to stock this field.
    pub fn pending_replenishers(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }

    // -----------------------------------------------------------------------
    // Buying
    // -----------------------------------------------------------------------

    /// Take one animal if the field is idle and non-empty. Never blocks.
    pub fn try_withdraw_one(&self) -> Withdrawal {
        let outcome = {
            let mut state = self.state.lock();
            if state.being_replenished {
                Withdrawal::BeingReplenished
            } else if state.count == 0 {
                Withdrawal::Empty
            } else {
                state.count = state.count.saturating_sub(1);
                Withdrawal::Bought {
                    remaining: state.count,
                }
            }
        };
        if let Withdrawal::Bought { remaining } = outcome {
            self.report(remaining, false);
        }
        outcome
    }

    // -----------------------------------------------------------------------
    // Stocking
    // -----------------------------------------------------------------------

    /// Acquire the field for stocking, waiting behind earlier requesters.
    ///
    /// Returns [`Cancelled`] if the field is closed while waiting.
    pub async fn start_replenish(&self) -> Result<ReplenishGuard<'_>, Cancelled> {
        self.queued.fetch_add(1, Ordering::AcqRel);
        let acquired = self.replenish.acquire().await;
        self.queued.fetch_sub(1, Ordering::AcqRel);
        let permit = acquired.map_err(|_err| Cancelled)?;

        let count = {
            let mut state = self.state.lock();
            state.being_replenished = true;
            state.count
        };
        debug!(field = %self.animal, count, "Stocking started");
        self.report(count, true);
        Ok(ReplenishGuard {
            field: self,
            _permit: permit,
        })
    }

    /// Reject all current and future stocking requests with [`Cancelled`].
    ///
    /// A farmer already holding the field keeps it until its guard drops.
    pub fn close(&self) {
        self.replenish.close();
    }

    fn add_units(&self, units: u32) -> u32 {
        let (count, clamped) = {
            let mut state = self.state.lock();
            let free = self.capacity.saturating_sub(state.count);
            let accepted = units.min(free);
            state.count = state.count.saturating_add(accepted);
            (state.count, accepted < units)
        };
        if clamped {
            warn!(field = %self.animal, units, capacity = self.capacity, "Stocking beyond capacity clamped");
        }
        self.report(count, true);
        count
    }

    fn finish_replenish(&self) {
        let count = {
            let mut state = self.state.lock();
            state.being_replenished = false;
            state.count
        };
        debug!(field = %self.animal, count, "Stocking finished");
        self.report(count, false);
    }

    fn report(&self, count: u32, being_replenished: bool) {
        self.clock.report(EventKind::FieldChanged {
            animal: self.animal,
            count,
            being_replenished,
        });
    }
}

/// Exclusive stocking rights over a field.
///
/// Dropping the guard (on any exit path, including cancellation) clears the
/// stocking flag and then hands the field to the next queued farmer.
#[must_use = "the field returns to idle as soon as the guard is dropped"]
pub struct ReplenishGuard<'a> {
    field: &'a Field,
    // Released after `Drop::drop` has cleared the flag.
    _permit: SemaphorePermit<'a>,
}

impl core::fmt::Debug for ReplenishGuard<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ReplenishGuard")
            .field("animal", &self.field.animal)
            .finish_non_exhaustive()
    }
}

impl ReplenishGuard<'_> {
    /// The field being stocked.
    pub const fn field(&self) -> &Field {
        self.field
    }

    /// Place `units` animals and return the new head count.
    ///
    /// Callers should place at most `capacity - count`; any excess is
    /// clamped so the count never exceeds capacity.
    pub fn add_units(&self, units: u32) -> u32 {
        self.field.add_units(units)
    }

    /// Release the field. Equivalent to dropping the guard.
    pub fn finish(self) {}
}

impl Drop for ReplenishGuard<'_> {
    fn drop(&mut self) {
        self.field.finish_replenish();
    }
}
