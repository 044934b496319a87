//! Cross-component tests for the simulation core.
//!
//! These exercise the guarantees that only show up when several agents run
//! against the same clock, fields, and enclosure: FIFO stocking grants,
//! exclusive stocking windows, conservation of animals, tick monotonicity,
//! and shutdown releasing every suspended task.

#![allow(clippy::unwrap_used)]
#![allow(clippy::arithmetic_side_effects)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use farmsim_core::clock::Clock;
use farmsim_core::config::{FieldConfig, SimulationConfig};
use farmsim_core::field::Field;
use farmsim_core::observer::{EventLog, NoOpObserver, SharedObserver};
use farmsim_core::{Simulation, SimulationEndReason};
use farmsim_types::{Animal, EventKind};
use parking_lot::Mutex;

fn pigs_only(max_ticks: u64) -> SimulationConfig {
    let mut config = SimulationConfig::default();
    config.simulation.max_ticks = max_ticks;
    config.farm.fields = vec![FieldConfig {
        animal: Animal::Pigs,
        capacity: 50,
        initial_stock: 5,
    }];
    config.delivery.animals = vec![Animal::Pigs];
    config.delivery.size = 0;
    config.farmers.count = 1;
    config.farmers.break_chance = 0;
    config.buyers.count = 0;
    config
}

#[tokio::test]
async fn stocking_grants_follow_request_order() {
    let clock = Arc::new(Clock::new(100, Arc::new(NoOpObserver)));
    let field = Arc::new(Field::new(Animal::Cows, 100, 0, clock));
    let granted = Arc::new(Mutex::new(Vec::new()));

    let holder = field.start_replenish().await.unwrap();
    let mut contenders = Vec::new();
    for index in 0..5_usize {
        let field_ref = Arc::clone(&field);
        let granted = Arc::clone(&granted);
        contenders.push(tokio::spawn(async move {
            let guard = field_ref.start_replenish().await.unwrap();
            granted.lock().push(index);
            tokio::task::yield_now().await;
            guard.add_units(1);
        }));
        // Queue this contender before the next one asks.
        while field.pending_replenishers() < index + 1 {
            tokio::task::yield_now().await;
        }
    }

    holder.finish();
    for contender in contenders {
        contender.await.unwrap();
    }
    assert_eq!(*granted.lock(), vec![0, 1, 2, 3, 4]);
    assert_eq!(field.current_count(), 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stocking_windows_never_overlap() {
    let clock = Arc::new(Clock::new(100, Arc::new(NoOpObserver)));
    let field = Arc::new(Field::new(Animal::Sheep, 1_000, 0, clock));
    let inside = Arc::new(AtomicUsize::new(0));
    let overlapped = Arc::new(AtomicBool::new(false));

    let workers: Vec<_> = (0..8)
        .map(|_| {
            let field = Arc::clone(&field);
            let inside = Arc::clone(&inside);
            let overlapped = Arc::clone(&overlapped);
            tokio::spawn(async move {
                for _ in 0..25 {
                    let guard = field.start_replenish().await.unwrap();
                    if inside.fetch_add(1, Ordering::SeqCst) != 0 {
                        overlapped.store(true, Ordering::SeqCst);
                    }
                    tokio::task::yield_now().await;
                    guard.add_units(1);
                    inside.fetch_sub(1, Ordering::SeqCst);
                    guard.finish();
                }
            })
        })
        .collect();

    for worker in workers {
        worker.await.unwrap();
    }
    assert!(!overlapped.load(Ordering::SeqCst));
    assert_eq!(field.current_count(), 200);
    assert!(!field.is_being_replenished());
}

#[tokio::test(start_paused = true)]
async fn one_farmer_cycle_moves_a_delivery_into_its_field() {
    let sim = Simulation::new(pigs_only(100), Arc::new(NoOpObserver)).unwrap();
    sim.farm().enclosure().add([Animal::Pigs; 10]);

    let result = sim.run().await;
    assert_eq!(result.end_reason, SimulationEndReason::MaxTicksReached);
    let snapshot = sim.snapshot();
    assert_eq!(snapshot.fields.first().map(|f| f.count), Some(15));
    assert!(snapshot.enclosure.is_empty());
    assert!(snapshot.totals.is_conserved());
}

#[tokio::test(start_paused = true)]
async fn busy_farm_conserves_animals_and_respects_capacity() {
    let mut config = SimulationConfig::default();
    config.simulation.max_ticks = 400;
    config.delivery.frequency = 5;
    config.farmers.count = 4;
    config.buyers.count = 6;
    let log = Arc::new(EventLog::new());
    let sim = Simulation::new(config, Arc::clone(&log) as SharedObserver).unwrap();

    sim.run().await;

    let snapshot = sim.snapshot();
    assert!(snapshot.totals.is_conserved());
    assert!(snapshot.totals.added > 0);
    for field in &snapshot.fields {
        assert!(field.count <= field.capacity);
        assert!(!field.being_replenished);
    }
    let over_capacity = log.filter(|kind| {
        matches!(kind, EventKind::FieldChanged { count, .. } if *count > 50)
    });
    assert!(over_capacity.is_empty());
    assert!(snapshot.waiting.is_empty());
}

#[tokio::test(start_paused = true)]
async fn ticks_increase_by_one_and_freeze_while_paused() {
    let mut config = SimulationConfig::default();
    config.simulation.max_ticks = 0;
    let log = Arc::new(EventLog::new());
    let sim = Arc::new(Simulation::new(config, Arc::clone(&log) as SharedObserver).unwrap());
    let runner = {
        let sim = Arc::clone(&sim);
        tokio::spawn(async move { sim.run().await })
    };

    tokio::time::sleep(Duration::from_millis(1_050)).await;
    sim.pause();
    let frozen_at = sim.clock().current_tick();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(sim.clock().current_tick(), frozen_at);

    sim.resume();
    tokio::time::sleep(Duration::from_millis(1_050)).await;
    sim.stop();
    runner.await.unwrap();

    let ticks: Vec<u64> = log
        .filter(|kind| matches!(kind, EventKind::Tick))
        .iter()
        .map(|event| event.tick)
        .collect();
    assert!(ticks.len() > 10);
    for (expected, tick) in (1_u64..).zip(&ticks) {
        assert_eq!(*tick, expected);
    }
}

#[tokio::test(start_paused = true)]
async fn stop_releases_every_parked_agent() {
    let mut config = SimulationConfig::default();
    config.simulation.max_ticks = 0;
    config.farmers.count = 5;
    config.buyers.count = 5;
    let sim = Arc::new(Simulation::new(config, Arc::new(NoOpObserver)).unwrap());
    let runner = {
        let sim = Arc::clone(&sim);
        tokio::spawn(async move { sim.run().await })
    };

    tokio::time::sleep(Duration::from_millis(500)).await;
    sim.pause();
    sim.stop();

    let result = tokio::time::timeout(Duration::from_secs(5), runner)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(result.end_reason, SimulationEndReason::OperatorStop);
    assert_eq!(sim.spawn_buyer(), None);
    for field in sim.snapshot().fields {
        assert!(!field.being_replenished);
    }
}
