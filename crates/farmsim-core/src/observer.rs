//! Observer hook for externally visible state changes.
//!
//! The core never renders, logs to files, or keeps history itself. Every
//! state change is handed to an [`Observer`] as a [`SimEvent`], always
//! after the lock guarding that state has been released, so an observer can
//! never stall a field or the enclosure.
//!
//! - [`ChannelObserver`] forwards events to an unbounded channel; the
//!   receiving side does the real work on its own task.
//! - [`EventLog`] keeps every event in memory.
//! - [`NoOpObserver`] discards everything.

use std::sync::Arc;

use farmsim_types::{EventKind, SimEvent};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::trace;

/// Receives simulation events. Called concurrently from any agent task.
pub trait Observer: Send + Sync {
    /// Handle one event. Must not block for long.
    fn notify(&self, event: &SimEvent);
}

/// An observer shared by the clock and every agent.
pub type SharedObserver = Arc<dyn Observer>;

/// An observer that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpObserver;

impl Observer for NoOpObserver {
    fn notify(&self, _event: &SimEvent) {}
}

/// Forwards events to an unbounded channel for asynchronous dispatch.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<SimEvent>,
}

impl ChannelObserver {
    /// Create the observer and the receiving end of its channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SimEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Observer for ChannelObserver {
    fn notify(&self, event: &SimEvent) {
        if self.tx.send(event.clone()).is_err() {
            trace!(tick = event.tick, "event receiver dropped, event discarded");
        }
    }
}

/// Records every event in arrival order.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<SimEvent>>,
}

impl EventLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every event recorded so far.
    pub fn events(&self) -> Vec<SimEvent> {
        self.events.lock().clone()
    }

    /// Events whose kind satisfies `pred`, in arrival order.
    pub fn filter(&self, pred: impl Fn(&EventKind) -> bool) -> Vec<SimEvent> {
        self.events
            .lock()
            .iter()
            .filter(|event| pred(&event.kind))
            .cloned()
            .collect()
    }

    /// Number of events recorded so far.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl Observer for EventLog {
    fn notify(&self, event: &SimEvent) {
        self.events.lock().push(event.clone());
    }
}
