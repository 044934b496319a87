//! Operator console on stdin.
//!
//! One command per line: `pause`, `resume`, `farmer`, `buyer`, `status`,
//! `speed <ms>`, `help`, `quit`. Unknown input is reported and ignored.
//!
//! Stdin is read on a plain OS thread; a blocked tokio stdin read would
//! keep the runtime from shutting down. The thread only holds a [`Weak`]
//! handle, so it never keeps the simulation alive.

use std::io::BufRead;
use std::str::FromStr;
use std::sync::Weak;

use farmsim_core::Simulation;
use tracing::{info, warn};

/// A parsed console command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Freeze the clock.
    Pause,
    /// Unfreeze the clock.
    Resume,
    /// Spawn one farmer.
    Farmer,
    /// Spawn one buyer.
    Buyer,
    /// Print a snapshot.
    Status,
    /// Change the tick period.
    Speed(u64),
    /// List commands.
    Help,
    /// Stop the simulation.
    Quit,
}

/// Why a console line was not understood.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// The line was blank.
    #[error("empty command")]
    Empty,
    /// The command word is unknown.
    #[error("unknown command `{input}` (try `help`)")]
    Unknown {
        /// The offending word.
        input: String,
    },
    /// `speed` needs a positive millisecond value.
    #[error("`speed` expects a positive number of milliseconds, got `{value}`")]
    BadSpeed {
        /// What was given.
        value: String,
    },
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(word) = words.next() else {
            return Err(CommandError::Empty);
        };
        match word.to_ascii_lowercase().as_str() {
            "pause" | "p" => Ok(Self::Pause),
            "resume" | "r" => Ok(Self::Resume),
            "farmer" | "f" => Ok(Self::Farmer),
            "buyer" | "b" => Ok(Self::Buyer),
            "status" | "s" => Ok(Self::Status),
            "help" | "h" | "?" => Ok(Self::Help),
            "quit" | "q" | "exit" => Ok(Self::Quit),
            "speed" => {
                let value = words.next().unwrap_or_default();
                match value.parse::<u64>() {
                    Ok(ms) if ms > 0 => Ok(Self::Speed(ms)),
                    _ => Err(CommandError::BadSpeed {
                        value: value.to_owned(),
                    }),
                }
            }
            _ => Err(CommandError::Unknown {
                input: word.to_owned(),
            }),
        }
    }
}

const HELP: &str = "commands: pause | resume | farmer | buyer | status | speed <ms> | quit";

/// Apply a command. Returns `false` once the console should stop reading.
pub fn execute(sim: &Simulation, command: Command) -> bool {
    match command {
        Command::Pause => sim.pause(),
        Command::Resume => sim.resume(),
        Command::Farmer => {
            if let Some(id) = sim.spawn_farmer() {
                println!("{id} added");
            }
        }
        Command::Buyer => {
            if let Some(id) = sim.spawn_buyer() {
                println!("{id} added");
            }
        }
        Command::Status => match serde_json::to_string_pretty(&sim.snapshot()) {
            Ok(json) => println!("{json}"),
            Err(err) => warn!(error = %err, "Could not render status"),
        },
        Command::Speed(ms) => {
            if let Some(previous) = sim.set_tick_interval_ms(ms) {
                println!("tick period {previous} ms -> {ms} ms");
            }
        }
        Command::Help => println!("{HELP}"),
        Command::Quit => {
            info!("Quit requested from console");
            sim.stop();
            return false;
        }
    }
    true
}

/// Start reading commands from stdin on a background thread.
pub fn spawn(sim: Weak<Simulation>) {
    let spawned = std::thread::Builder::new()
        .name(String::from("farmsim-console"))
        .spawn(move || read_commands(&sim));
    if let Err(err) = spawned {
        warn!(error = %err, "Console unavailable");
    }
}

fn read_commands(sim: &Weak<Simulation>) {
    println!("{HELP}");
    for line in std::io::stdin().lock().lines() {
        let Ok(line) = line else {
            break;
        };
        let Some(sim) = sim.upgrade() else {
            break;
        };
        match line.parse::<Command>() {
            Ok(command) => {
                if !execute(&sim, command) {
                    break;
                }
            }
            Err(CommandError::Empty) => {}
            Err(err) => println!("{err}"),
        }
    }
}
