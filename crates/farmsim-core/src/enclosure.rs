//! The enclosure: an unbounded FIFO staging area between deliveries and
//! farmers.
//!
//! Deliveries [`add`](Enclosure::add) without ever blocking; farmers
//! [`take_up_to`](Enclosure::take_up_to) a batch and block only while the
//! enclosure is empty. A partial take never waits for more animals. Arrival
//! order is preserved exactly, with no grouping by category.
//!
//! The enclosure keeps running totals of animals ever added and ever
//! removed so that conservation (`added == removed + resident`) can be
//! checked at any quiescent point.

use std::collections::VecDeque;
use std::sync::Arc;

use farmsim_types::{Animal, AnimalCounts, EventKind};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Notify;

use crate::clock::Clock;
use crate::error::Cancelled;

/// Running totals for the conservation check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EnclosureTotals {
    /// Animals ever added.
    pub added: u64,
    /// Animals ever taken by farmers.
    pub removed: u64,
    /// Animals currently waiting.
    pub resident: u64,
}

impl EnclosureTotals {
    /// Whether every animal added is either removed or still resident.
    pub const fn is_conserved(&self) -> bool {
        match self.removed.checked_add(self.resident) {
            Some(accounted) => accounted == self.added,
            None => false,
        }
    }
}

#[derive(Debug, Default)]
struct EnclosureState {
    animals: VecDeque<Animal>,
    added: u64,
    removed: u64,
    closed: bool,
}

impl EnclosureState {
    fn tally(&self) -> AnimalCounts {
        self.animals.iter().copied().collect()
    }
}

/// The shared staging buffer.
pub struct Enclosure {
    state: Mutex<EnclosureState>,
    /// Signalled on every add and on close.
    arrivals: Notify,
    clock: Arc<Clock>,
}

impl core::fmt::Debug for Enclosure {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Enclosure")
            .field("totals", &self.totals())
            .finish_non_exhaustive()
    }
}

impl Enclosure {
    /// Create an empty enclosure.
    pub fn new(clock: Arc<Clock>) -> Self {
        Self {
            state: Mutex::new(EnclosureState::default()),
            arrivals: Notify::new(),
            clock,
        }
    }

    /// Append animals in order and wake every blocked taker.
    ///
    /// Returns the number of animals now resident.
    pub fn add(&self, animals: impl IntoIterator<Item = Animal>) -> usize {
        let (len, contents) = {
            let mut state = self.state.lock();
            let before = state.animals.len();
            state.animals.extend(animals);
            let len = state.animals.len();
            let added = u64::try_from(len.saturating_sub(before)).unwrap_or(u64::MAX);
            state.added = state.added.saturating_add(added);
            let contents = (len > before).then(|| state.tally());
            (len, contents)
        };
        if let Some(contents) = contents {
            self.arrivals.notify_waiters();
            self.clock.report(EventKind::EnclosureChanged { contents });
        }
        len
    }

    /// Remove up to `max` animals in arrival order, waiting while empty.
    ///
    /// Returns as soon as at least one animal is available, possibly with
    /// fewer than `max`. Returns [`Cancelled`] once the enclosure is closed.
    pub async fn take_up_to(&self, max: usize) -> Result<Vec<Animal>, Cancelled> {
        if max == 0 {
            return Ok(Vec::new());
        }
        loop {
            // Register for the wakeup before checking, so an add between
            // the check and the await is not lost.
            let arrived = self.arrivals.notified();
            tokio::pin!(arrived);
            arrived.as_mut().enable();

            if let Some(batch) = self.try_take(max)? {
                return Ok(batch);
            }
            arrived.await;
        }
    }

    fn try_take(&self, max: usize) -> Result<Option<Vec<Animal>>, Cancelled> {
        let (batch, contents) = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(Cancelled);
            }
            if state.animals.is_empty() {
                return Ok(None);
            }
            let take = max.min(state.animals.len());
            let batch: Vec<Animal> = state.animals.drain(..take).collect();
            let removed = u64::try_from(batch.len()).unwrap_or(u64::MAX);
            state.removed = state.removed.saturating_add(removed);
            (batch, state.tally())
        };
        self.clock.report(EventKind::EnclosureChanged { contents });
        Ok(Some(batch))
    }

    /// Whether any animal is waiting. Never blocks.
    pub fn has_items(&self) -> bool {
        !self.state.lock().animals.is_empty()
    }

    /// Animals currently waiting.
    pub fn len(&self) -> usize {
        self.state.lock().animals.len()
    }

    /// Whether the enclosure is empty.
    pub fn is_empty(&self) -> bool {
        !self.has_items()
    }

    /// Resident animals tallied by category.
    pub fn counts(&self) -> AnimalCounts {
        self.state.lock().tally()
    }

    /// Running totals for the conservation check.
    pub fn totals(&self) -> EnclosureTotals {
        let state = self.state.lock();
        EnclosureTotals {
            added: state.added,
            removed: state.removed,
            resident: u64::try_from(state.animals.len()).unwrap_or(u64::MAX),
        }
    }

    /// Release every blocked taker with [`Cancelled`]; later takes fail too.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.arrivals.notify_waiters();
    }
}
