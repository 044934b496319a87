//! World-state log: folds simulation events into a per-tick picture.
//!
//! The simulation core only emits [`SimEvent`]s. This module keeps the
//! latest known state of every field, farmer, and buyer in a
//! [`WorldState`], writes one block per completed tick to the tick log,
//! and mirrors each agent event as a single `tracing` record.
//!
//! Text blocks look like:
//!
//! ```text
//! === TICK 12 ===
//! Enclosure: cows=2 pigs=3
//! Fields:
//!   pigs: Animal Count: 7, Being Stocked: true
//! Farmers:
//!   Farmer 1: stocking pigs (6 left)
//! Buyers:
//!   Buyer 1: waiting for pigs (being_stocked, 2 ticks)
//! ```

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Local};
use farmsim_core::FarmSnapshot;
use farmsim_core::config::TickLogFormat;
use farmsim_types::{Animal, AnimalCounts, BuyerId, EventKind, FarmerId, SimEvent};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

use crate::error::EngineError;

/// Last known state of one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldView {
    /// Head count.
    pub count: u32,
    /// Whether a farmer is stocking it.
    pub being_stocked: bool,
}

/// Everything the tick log shows, rebuilt from events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorldState {
    tick: u64,
    enclosure: AnimalCounts,
    fields: BTreeMap<Animal, FieldView>,
    farmers: BTreeMap<FarmerId, String>,
    buyers: BTreeMap<BuyerId, String>,
}

impl WorldState {
    /// Seed the fields and enclosure from a simulation snapshot.
    pub fn from_snapshot(snapshot: &FarmSnapshot) -> Self {
        Self {
            tick: snapshot.tick,
            enclosure: snapshot.enclosure.clone(),
            fields: snapshot
                .fields
                .iter()
                .map(|field| {
                    (
                        field.animal,
                        FieldView {
                            count: field.count,
                            being_stocked: field.being_replenished,
                        },
                    )
                })
                .collect(),
            farmers: BTreeMap::new(),
            buyers: BTreeMap::new(),
        }
    }

    /// Tick the state currently describes.
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Fold one event into the state.
    ///
    /// The state moves to the event's tick if it is later, whatever the
    /// event kind: agents released by a tick may report before the tick
    /// event itself arrives.
    #[allow(clippy::too_many_lines)]
    pub fn apply(&mut self, event: &SimEvent) {
        self.tick = self.tick.max(event.tick);
        match &event.kind {
            EventKind::Tick
            | EventKind::Paused
            | EventKind::Resumed
            | EventKind::DeliveryArrived { .. } => {}
            EventKind::EnclosureChanged { contents } => self.enclosure = contents.clone(),
            EventKind::FieldChanged {
                animal,
                count,
                being_replenished,
            } => {
                self.fields.insert(
                    *animal,
                    FieldView {
                        count: *count,
                        being_stocked: *being_replenished,
                    },
                );
            }
            EventKind::FarmerCollected { farmer, animals } => {
                self.farmer(*farmer, format!("collected {animals}"));
            }
            EventKind::FarmerMoving {
                farmer,
                animal,
                travel_ticks,
                carrying,
            } => self.farmer(
                *farmer,
                format!("moving to {animal} ({travel_ticks} ticks, carrying {carrying})"),
            ),
            EventKind::FarmerBeganStocking {
                farmer,
                animal,
                count,
            } => self.farmer(*farmer, format!("stocking {animal} ({count} to place)")),
            EventKind::FieldStocked {
                farmer,
                animal,
                count,
            } => self.farmer(*farmer, format!("stocking {animal} (field at {count})")),
            EventKind::FarmerFinishedStocking {
                farmer,
                animal,
                placed,
                overflow,
            } => self.farmer(
                *farmer,
                format!("finished {animal} (placed {placed}, overflow {overflow})"),
            ),
            EventKind::AnimalsDiscarded {
                farmer,
                animal,
                count,
            } => self.farmer(*farmer, format!("discarded {count} {animal}")),
            EventKind::FarmerReturning {
                farmer,
                travel_ticks,
                carrying,
            } => self.farmer(
                *farmer,
                format!("returning to enclosure ({travel_ticks} ticks, carrying {carrying})"),
            ),
            EventKind::FarmerBreakStarted {
                farmer,
                duration_ticks,
            } => self.farmer(*farmer, format!("on break ({duration_ticks} ticks)")),
            EventKind::FarmerBreakEnded { farmer } => {
                self.farmer(*farmer, String::from("waiting at enclosure"));
            }
            EventKind::BuyerBought {
                buyer,
                animal,
                waited_ticks,
            } => self.buyer(*buyer, format!("bought from {animal} (waited {waited_ticks} ticks)")),
            EventKind::BuyerWaiting {
                buyer,
                animal,
                reason,
                waited_ticks,
            } => self.buyer(
                *buyer,
                format!("waiting for {animal} ({reason}, {waited_ticks} ticks)"),
            ),
            EventKind::BuyerGaveUp {
                buyer,
                animal,
                waited_ticks,
            } => self.buyer(
                *buyer,
                format!("gave up on {animal} after {waited_ticks} ticks"),
            ),
        }
    }

    fn farmer(&mut self, farmer: FarmerId, activity: String) {
        self.farmers.insert(farmer, activity);
    }

    fn buyer(&mut self, buyer: BuyerId, activity: String) {
        self.buyers.insert(buyer, activity);
    }

    /// Render the state as a `=== TICK n ===` block.
    pub fn render(&self) -> String {
        let mut out = format!("\n=== TICK {} ===\n", self.tick);
        out.push_str(&format!("Enclosure: {}\n", self.enclosure));
        out.push_str("Fields:\n");
        for (animal, field) in &self.fields {
            out.push_str(&format!(
                "  {animal}: Animal Count: {}, Being Stocked: {}\n",
                field.count, field.being_stocked
            ));
        }
        out.push_str("Farmers:\n");
        for (farmer, activity) in &self.farmers {
            out.push_str(&format!("  {farmer}: {activity}\n"));
        }
        out.push_str("Buyers:\n");
        for (buyer, activity) in &self.buyers {
            out.push_str(&format!("  {buyer}: {activity}\n"));
        }
        out
    }
}

/// First line of a JSON tick log.
#[derive(Debug, Serialize)]
struct LogHeader {
    #[serde(rename = "type")]
    kind: &'static str,
    started_at: DateTime<Local>,
}

/// Writer for the world-state log.
#[derive(Debug)]
pub struct TickLog<W: Write> {
    out: W,
    format: TickLogFormat,
}

impl TickLog<BufWriter<File>> {
    /// Create (truncating) the log file at `path` and write its header.
    pub fn create(path: &Path, format: TickLogFormat) -> Result<Self, EngineError> {
        let to_engine = |source| EngineError::TickLog {
            path: path.to_path_buf(),
            source,
        };
        let file = File::create(path).map_err(to_engine)?;
        Self::new(BufWriter::new(file), format, Local::now()).map_err(to_engine)
    }
}

impl<W: Write> TickLog<W> {
    /// Wrap `out` and write the header stamped with `started_at`.
    pub fn new(mut out: W, format: TickLogFormat, started_at: DateTime<Local>) -> io::Result<Self> {
        match format {
            TickLogFormat::Text => writeln!(
                out,
                "Farm Simulation Log - Started at {}",
                started_at.format("%Y-%m-%dT%H:%M:%S%.f")
            )?,
            TickLogFormat::Json => {
                let header = LogHeader {
                    kind: "log_started",
                    started_at,
                };
                serde_json::to_writer(&mut out, &header)?;
                writeln!(out)?;
            }
        }
        Ok(Self { out, format })
    }

    /// Record one event. `state` must not yet include it.
    ///
    /// In text mode the first event stamped with a later tick closes the
    /// block of the tick `state` describes.
    pub fn record(&mut self, event: &SimEvent, state: &WorldState) -> io::Result<()> {
        match self.format {
            TickLogFormat::Text => {
                if event.tick > state.tick() {
                    self.out.write_all(state.render().as_bytes())?;
                }
            }
            TickLogFormat::Json => {
                serde_json::to_writer(&mut self.out, event)?;
                writeln!(self.out)?;
            }
        }
        Ok(())
    }

    /// Write the final block (text mode) and flush.
    pub fn finish(&mut self, state: &WorldState) -> io::Result<()> {
        if self.format == TickLogFormat::Text {
            self.out.write_all(state.render().as_bytes())?;
        }
        self.out.flush()
    }
}

/// Mirror one event as a `tracing` record.
#[allow(clippy::too_many_lines)]
pub fn trace_event(event: &SimEvent) {
    let tick = event.tick;
    match &event.kind {
        EventKind::Tick | EventKind::EnclosureChanged { .. } | EventKind::FieldChanged { .. } => {}
        EventKind::Paused => info!(tick, "Simulation paused"),
        EventKind::Resumed => info!(tick, "Simulation resumed"),
        EventKind::DeliveryArrived { summary } => info!(tick, %summary, "delivery_arrived"),
        EventKind::FarmerCollected { farmer, animals } => {
            info!(tick, %farmer, count = animals.total(), "took animals from the enclosure");
        }
        EventKind::FarmerMoving {
            farmer,
            animal,
            travel_ticks,
            carrying,
        } => info!(tick, %farmer, %animal, travel_ticks, carrying, "moving_to_field"),
        EventKind::FarmerBeganStocking {
            farmer,
            animal,
            count,
        } => info!(tick, %farmer, %animal, count, "began_stocking_field"),
        EventKind::FieldStocked {
            farmer,
            animal,
            count,
        } => debug!(tick, %farmer, %animal, count, "stocked_one"),
        EventKind::FarmerFinishedStocking {
            farmer,
            animal,
            placed,
            overflow,
        } => info!(tick, %farmer, %animal, placed, overflow, "finished_stocking_field"),
        EventKind::AnimalsDiscarded {
            farmer,
            animal,
            count,
        } => warn!(tick, %farmer, %animal, count, "animals_discarded"),
        EventKind::FarmerReturning {
            farmer,
            travel_ticks,
            carrying,
        } => info!(tick, %farmer, travel_ticks, carrying, "returning_to_enclosure"),
        EventKind::FarmerBreakStarted {
            farmer,
            duration_ticks,
        } => info!(tick, %farmer, duration_ticks, "taking_break"),
        EventKind::FarmerBreakEnded { farmer } => info!(tick, %farmer, "break_ended"),
        EventKind::BuyerBought {
            buyer,
            animal,
            waited_ticks,
        } => info!(tick, %buyer, %animal, waited_ticks, "bought 1 animal"),
        EventKind::BuyerWaiting {
            buyer,
            animal,
            reason,
            waited_ticks,
        } => debug!(tick, %buyer, %animal, %reason, waited_ticks, "waiting_for_field"),
        EventKind::BuyerGaveUp {
            buyer,
            animal,
            waited_ticks,
        } => info!(tick, %buyer, %animal, waited_ticks, "gave_up_waiting"),
    }
}

/// Drain `events` until every sender is gone.
///
/// Blocking: run it on `spawn_blocking`. Returns the number of events
/// processed. A write failure disables the tick log but keeps tracing.
pub fn pump<W: Write>(
    mut events: UnboundedReceiver<SimEvent>,
    mut state: WorldState,
    mut log: Option<TickLog<W>>,
) -> u64 {
    let mut processed: u64 = 0;
    while let Some(event) = events.blocking_recv() {
        trace_event(&event);
        if let Some(writer) = log.as_mut() {
            if let Err(err) = writer.record(&event, &state) {
                warn!(error = %err, "Tick log write failed, disabling tick log");
                log = None;
            }
        }
        state.apply(&event);
        processed = processed.saturating_add(1);
    }
    if let Some(mut writer) = log {
        if let Err(err) = writer.finish(&state) {
            warn!(error = %err, "Tick log flush failed");
        }
    }
    debug!(processed, final_tick = state.tick(), "Event pump finished");
    processed
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use farmsim_core::config::TickLogFormat;
    use farmsim_core::enclosure::EnclosureTotals;
    use farmsim_core::field::FieldSnapshot;

    use super::*;

    fn snapshot() -> FarmSnapshot {
        FarmSnapshot {
            tick: 0,
            paused: false,
            fields: vec![FieldSnapshot {
                animal: Animal::Pigs,
                count: 5,
                capacity: 50,
                being_replenished: false,
            }],
            enclosure: AnimalCounts::default(),
            totals: EnclosureTotals::default(),
            waiting: BTreeMap::new(),
            discarded: 0,
            farmers: 0,
            buyers: 0,
        }
    }

    fn started_at() -> DateTime<Local> {
        DateTime::from_timestamp(0, 0)
            .unwrap_or_default()
            .with_timezone(&Local)
    }

    #[test]
    fn events_update_fields_and_activities() {
        let mut state = WorldState::from_snapshot(&snapshot());
        let farmer = FarmerId::new(1);
        state.apply(&SimEvent::new(
            3,
            EventKind::FieldChanged {
                animal: Animal::Pigs,
                count: 6,
                being_replenished: true,
            },
        ));
        state.apply(&SimEvent::new(
            3,
            EventKind::FarmerBeganStocking {
                farmer,
                animal: Animal::Pigs,
                count: 4,
            },
        ));
        let block = state.render();
        assert!(block.contains("  pigs: Animal Count: 6, Being Stocked: true\n"));
        assert!(block.contains("  Farmer 1: stocking pigs (4 to place)\n"));
    }

    #[test]
    fn text_log_writes_header_and_one_block_per_tick() {
        let mut state = WorldState::from_snapshot(&snapshot());
        let mut buf = Vec::new();
        let mut log = TickLog::new(&mut buf, TickLogFormat::Text, started_at()).unwrap();
        let events = [
            SimEvent::new(1, EventKind::Tick),
            SimEvent::new(
                1,
                EventKind::BuyerBought {
                    buyer: BuyerId::new(2),
                    animal: Animal::Pigs,
                    waited_ticks: 0,
                },
            ),
            SimEvent::new(2, EventKind::Tick),
        ];
        for event in &events {
            assert!(log.record(event, &state).is_ok());
            state.apply(event);
        }
        assert!(log.finish(&state).is_ok());
        drop(log);

        let text = String::from_utf8(buf).unwrap_or_default();
        assert!(text.starts_with("Farm Simulation Log - Started at "));
        assert_eq!(text.matches("=== TICK").count(), 3);
        assert!(text.contains("=== TICK 1 ===\nEnclosure: \nFields:\n  pigs: Animal Count: 5, Being Stocked: false\n"));
        assert!(text.contains("  Buyer 2: bought from pigs (waited 0 ticks)\n"));
    }

    #[test]
    fn agent_events_land_in_their_own_tick_block() {
        let mut state = WorldState::from_snapshot(&snapshot());
        let mut buf = Vec::new();
        let mut log = TickLog::new(&mut buf, TickLogFormat::Text, started_at()).unwrap();
        let bought = |buyer| {
            SimEvent::new(
                2,
                EventKind::BuyerBought {
                    buyer: BuyerId::new(buyer),
                    animal: Animal::Pigs,
                    waited_ticks: 0,
                },
            )
        };
        // Tick 2 reaches the log after an agent already reported at tick 2.
        let events = [
            SimEvent::new(1, EventKind::Tick),
            bought(1),
            SimEvent::new(2, EventKind::Tick),
            bought(2),
        ];
        for event in &events {
            log.record(event, &state).unwrap();
            state.apply(event);
        }
        log.finish(&state).unwrap();
        drop(log);

        let text = String::from_utf8(buf).unwrap();
        let block = |tick: u64| {
            text.split("\n=== TICK ")
                .find(|candidate| candidate.starts_with(&format!("{tick} ===\n")))
                .unwrap()
        };
        assert_eq!(text.matches("=== TICK").count(), 3);
        assert!(!block(1).contains("Buyer 1"));
        assert!(block(2).contains("  Buyer 1: bought from pigs"));
        assert!(block(2).contains("  Buyer 2: bought from pigs"));
    }

    #[test]
    fn json_log_writes_one_line_per_event() {
        let state = WorldState::default();
        let mut buf = Vec::new();
        let mut log = TickLog::new(&mut buf, TickLogFormat::Json, started_at()).unwrap();
        assert!(log.record(&SimEvent::new(4, EventKind::Paused), &state).is_ok());
        assert!(log.finish(&state).is_ok());
        drop(log);

        let text = String::from_utf8(buf).unwrap_or_default();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines.first().is_some_and(|l| l.contains("\"log_started\"")));
        let parsed: Option<SimEvent> = lines.get(1).and_then(|l| serde_json::from_str(l).ok());
        assert_eq!(parsed, Some(SimEvent::new(4, EventKind::Paused)));
    }

    #[tokio::test]
    async fn pump_drains_until_senders_drop() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        for tick in 1..=3 {
            let _ = tx.send(SimEvent::new(tick, EventKind::Tick));
        }
        drop(tx);
        let state = WorldState::default();
        let processed =
            tokio::task::spawn_blocking(move || pump::<Vec<u8>>(rx, state, None)).await;
        assert_eq!(processed.ok(), Some(3));
    }
}
