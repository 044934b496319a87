//! Tick clock: the single timing authority of the simulation.
//!
//! The clock owns a monotonically increasing tick counter published through
//! a [`watch`] channel. Publishing a new tick and waking every waiter is
//! one atomic step: no task can observe tick `n + 1` while another is
//! still being released for tick `n`, and a waiter that arrives late sees
//! the current value immediately instead of missing a notification.
//!
//! # Design Principles
//!
//! - Agents pace themselves only through [`Clock::wait_for_next_tick`] and
//!   [`Clock::sleep_ticks`].
//! - Pausing gates the advancing loop ([`Clock::run`]), never the waiters:
//!   parked agents stay parked and [`Clock::resume`] wakes only the loop.
//! - [`Clock::stop`] is idempotent and releases every parked waiter with
//!   [`Cancelled`].
//! - Tick arithmetic is checked; the counter never wraps.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use farmsim_types::{EventKind, SimEvent};
use tokio::sync::{Notify, watch};
use tracing::{debug, info, warn};

use crate::error::Cancelled;
use crate::observer::SharedObserver;

/// Errors that can occur during clock operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ClockError {
    /// Tick counter would overflow.
    #[error("tick counter overflow: cannot advance beyond u64::MAX")]
    TickOverflow,

    /// The clock is paused; ticks are frozen.
    #[error("clock is paused")]
    Paused,

    /// The clock has been stopped.
    #[error("clock is stopped")]
    Stopped,
}

/// Value published to tick waiters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TickState {
    tick: u64,
    stopped: bool,
}

/// Discrete-tick clock shared by every agent.
pub struct Clock {
    /// Published tick counter and stop flag.
    state: watch::Sender<TickState>,

    /// Whether the advancing loop is gated.
    paused: AtomicBool,

    /// Wakes the advancing loop on resume or stop.
    resume_notify: Notify,

    /// Wall-clock period between ticks, in milliseconds.
    tick_interval_ms: AtomicU64,

    /// Receives every externally visible state change.
    observer: SharedObserver,
}

impl core::fmt::Debug for Clock {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Clock")
            .field("tick", &self.current_tick())
            .field("paused", &self.is_paused())
            .field("stopped", &self.is_stopped())
            .field("tick_interval_ms", &self.tick_interval_ms())
            .finish_non_exhaustive()
    }
}

impl Clock {
    /// Create a clock at tick 0 with the given period.
    pub fn new(tick_interval_ms: u64, observer: SharedObserver) -> Self {
        let (state, _rx) = watch::channel(TickState {
            tick: 0,
            stopped: false,
        });
        Self {
            state,
            paused: AtomicBool::new(false),
            resume_notify: Notify::new(),
            tick_interval_ms: AtomicU64::new(tick_interval_ms.max(1)),
            observer,
        }
    }

    // -----------------------------------------------------------------------
    // Ticks
    // -----------------------------------------------------------------------

    /// Advance the clock by one tick and wake every tick waiter.
    ///
    /// Returns the new tick number. Refused while paused or stopped.
    pub fn advance(&self) -> Result<u64, ClockError> {
        let mut outcome = Err(ClockError::Stopped);
        self.state.send_if_modified(|state| {
            if state.stopped {
                return false;
            }
            // Read under the watch lock; `pause` takes the same lock.
            if self.is_paused() {
                outcome = Err(ClockError::Paused);
                return false;
            }
            match state.tick.checked_add(1) {
                Some(next) => {
                    state.tick = next;
                    outcome = Ok(next);
                    true
                }
                None => {
                    outcome = Err(ClockError::TickOverflow);
                    false
                }
            }
        });
        let tick = outcome?;
        self.observer.notify(&SimEvent::new(tick, EventKind::Tick));
        Ok(tick)
    }

    /// Return the current tick number without blocking.
    pub fn current_tick(&self) -> u64 {
        self.state.borrow().tick
    }

    /// Suspend until the tick differs from `last_seen`; return the new tick.
    ///
    /// Returns immediately if the tick already moved on. Returns
    /// [`Cancelled`] once the clock is stopped.
    pub async fn wait_for_next_tick(&self, last_seen: u64) -> Result<u64, Cancelled> {
        self.wait_until_state(|state| state.tick != last_seen).await
    }

    /// Suspend until the tick reaches at least `target`.
    pub async fn wait_until(&self, target: u64) -> Result<u64, Cancelled> {
        self.wait_until_state(|state| state.tick >= target).await
    }

    /// Suspend for `ticks` clock periods, measured from the current tick.
    ///
    /// `sleep_ticks(0)` returns at once (unless stopped).
    pub async fn sleep_ticks(&self, ticks: u64) -> Result<u64, Cancelled> {
        let target = self.current_tick().saturating_add(ticks);
        self.wait_until(target).await
    }

    async fn wait_until_state(&self, ready: impl Fn(&TickState) -> bool) -> Result<u64, Cancelled> {
        let mut rx = self.state.subscribe();
        let state = *rx
            .wait_for(|state| state.stopped || ready(state))
            .await
            .map_err(|_err| Cancelled)?;
        if state.stopped {
            return Err(Cancelled);
        }
        Ok(state.tick)
    }

    // -----------------------------------------------------------------------
    // Pause / Resume
    // -----------------------------------------------------------------------

    /// Check whether the clock is paused.
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Freeze the tick counter. Tick waiters stay parked.
    ///
    /// No tick is published after this returns, until [`Clock::resume`].
    pub fn pause(&self) {
        let mut newly_paused = false;
        self.state.send_if_modified(|_state| {
            newly_paused = !self.paused.swap(true, Ordering::AcqRel);
            false
        });
        if newly_paused {
            let tick = self.current_tick();
            info!(tick, "Clock paused");
            self.observer.notify(&SimEvent::new(tick, EventKind::Paused));
        }
    }

    /// Unfreeze the tick counter and wake the advancing loop.
    pub fn resume(&self) {
        if self.paused.swap(false, Ordering::AcqRel) {
            let tick = self.current_tick();
            info!(tick, "Clock resumed");
            self.observer.notify(&SimEvent::new(tick, EventKind::Resumed));
        }
        self.resume_notify.notify_one();
    }

    async fn wait_if_paused(&self) {
        while self.is_paused() && !self.is_stopped() {
            self.resume_notify.notified().await;
        }
    }

    // -----------------------------------------------------------------------
    // Stop
    // -----------------------------------------------------------------------

    /// Stop the clock and release every tick waiter with [`Cancelled`].
    ///
    /// Returns `true` for the call that actually stopped the clock.
    pub fn stop(&self) -> bool {
        let stopped_now = self.state.send_if_modified(|state| {
            if state.stopped {
                false
            } else {
                state.stopped = true;
                true
            }
        });
        self.resume_notify.notify_one();
        if stopped_now {
            info!(tick = self.current_tick(), "Clock stopped");
        }
        stopped_now
    }

    /// Check whether the clock has been stopped.
    pub fn is_stopped(&self) -> bool {
        self.state.borrow().stopped
    }

    async fn stopped(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives in `self`, so the only exit is the stop flag.
        let _ = rx.wait_for(|state| state.stopped).await;
    }

    // -----------------------------------------------------------------------
    // Tick Speed
    // -----------------------------------------------------------------------

    /// Get the current tick period in milliseconds.
    pub fn tick_interval_ms(&self) -> u64 {
        self.tick_interval_ms.load(Ordering::Acquire)
    }

    /// Set the tick period. Returns the previous period, or `None` if
    /// `ms` is zero.
    pub fn set_tick_interval_ms(&self, ms: u64) -> Option<u64> {
        if ms == 0 {
            return None;
        }
        Some(self.tick_interval_ms.swap(ms, Ordering::AcqRel))
    }

    // -----------------------------------------------------------------------
    // Observer
    // -----------------------------------------------------------------------

    /// Report a state change stamped with the current tick.
    pub fn report(&self, kind: EventKind) {
        self.observer.notify(&SimEvent::new(self.current_tick(), kind));
    }

    // -----------------------------------------------------------------------
    // Advancing loop
    // -----------------------------------------------------------------------

    /// Advance the tick once per period until stopped.
    ///
    /// While paused the loop sleeps on the resume notification; a period
    /// that elapses during a pause does not produce a tick.
    pub async fn run(&self) {
        info!(tick_interval_ms = self.tick_interval_ms(), "Clock running");
        loop {
            self.wait_if_paused().await;
            if self.is_stopped() {
                break;
            }

            let period = Duration::from_millis(self.tick_interval_ms());
            tokio::select! {
                () = tokio::time::sleep(period) => {}
                () = self.stopped() => break,
            }

            match self.advance() {
                Ok(tick) => debug!(tick, "Tick"),
                Err(ClockError::Paused) => {}
                Err(ClockError::Stopped) => break,
                Err(err @ ClockError::TickOverflow) => {
                    warn!(error = %err, "Clock cannot advance further, stopping");
                    self.stop();
                    break;
                }
            }
        }
        debug!(tick = self.current_tick(), "Clock loop exited");
    }
}
