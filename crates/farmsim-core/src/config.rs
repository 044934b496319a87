//! Configuration loading and typed config structures for the farm simulation.
//!
//! The configuration lives in `farmsim-config.yaml` at the project root.
//! This module defines strongly-typed structs that mirror the YAML
//! structure, a loader, and [`SimulationConfig::validate`], which rejects
//! values the simulation core cannot run with. Every field has a default,
//! so an empty file (or no file at all) yields a runnable farm.

use std::collections::BTreeSet;
use std::path::Path;

use farmsim_types::Animal;
use serde::Deserialize;

/// Errors that can occur when loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value is outside the range the simulation can run with.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level simulation configuration.
///
/// Mirrors the structure of `farmsim-config.yaml`. Read-only once the
/// simulation has been constructed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SimulationConfig {
    /// World-level settings (seed, tick period).
    #[serde(default)]
    pub world: WorldConfig,

    /// Run boundaries.
    #[serde(default)]
    pub simulation: SimulationBoundsConfig,

    /// Fields and the unmapped-category policy.
    #[serde(default)]
    pub farm: FarmConfig,

    /// Delivery cadence and batch contents.
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Farmer population and costs.
    #[serde(default)]
    pub farmers: FarmerConfig,

    /// Buyer population and patience.
    #[serde(default)]
    pub buyers: BuyerConfig,

    /// Logging and tick-log output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SimulationConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// `FARMSIM_TICK_MS` overrides `world.tick_interval_ms` when set to a
    /// valid integer.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&contents)?;
        config.world.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yml::from_str(yaml)?;
        Ok(config)
    }

    /// Check that every value is usable by the simulation core.
    ///
    /// Under [`UnmappedPolicy::Reject`] a delivered category without a
    /// field is a configuration error rather than a runtime drop.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.world.tick_interval_ms == 0 {
            return invalid("world.tick_interval_ms must be at least 1");
        }
        if self.farm.fields.is_empty() {
            return invalid("farm.fields must contain at least one field");
        }

        let mut seen = BTreeSet::new();
        for field in &self.farm.fields {
            if !seen.insert(field.animal) {
                return invalid(&format!("duplicate field for {}", field.animal));
            }
            if field.capacity == 0 {
                return invalid(&format!("field {} has zero capacity", field.animal));
            }
            if field.initial_stock > field.capacity {
                return invalid(&format!(
                    "field {} starts with {} animals but holds only {}",
                    field.animal, field.initial_stock, field.capacity
                ));
            }
        }

        if self.delivery.frequency == 0 {
            return invalid("delivery.frequency must be at least 1");
        }
        if self.delivery.animals.is_empty() {
            return invalid("delivery.animals must list at least one category");
        }
        if self.farm.unmapped_policy == UnmappedPolicy::Reject {
            if let Some(orphan) = self.unmapped_animals().first() {
                return invalid(&format!(
                    "delivered category {orphan} has no field (set farm.unmapped_policy: discard to allow)"
                ));
            }
        }

        if self.farmers.max_animals == 0 {
            return invalid("farmers.max_animals must be at least 1");
        }
        if self.farmers.break_min_ticks > self.farmers.break_max_ticks {
            return invalid("farmers.break_min_ticks exceeds farmers.break_max_ticks");
        }
        if self.buyers.max_wait_ticks == 0 {
            return invalid("buyers.max_wait_ticks must be at least 1");
        }
        if self.buyers.purchase_delay_min_ticks > self.buyers.purchase_delay_max_ticks {
            return invalid("buyers.purchase_delay_min_ticks exceeds buyers.purchase_delay_max_ticks");
        }
        Ok(())
    }

    /// Delivered categories that have no field, in category order.
    pub fn unmapped_animals(&self) -> Vec<Animal> {
        let mapped: BTreeSet<Animal> = self.farm.fields.iter().map(|f| f.animal).collect();
        let delivered: BTreeSet<Animal> = self.delivery.animals.iter().copied().collect();
        delivered.difference(&mapped).copied().collect()
    }
}

fn invalid(reason: &str) -> Result<(), ConfigError> {
    Err(ConfigError::Invalid {
        reason: reason.to_owned(),
    })
}

/// World-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorldConfig {
    /// Random seed; each agent derives its own stream from it.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Real-time milliseconds per tick.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

impl WorldConfig {
    /// Override the tick period from `FARMSIM_TICK_MS` when it is set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("FARMSIM_TICK_MS") {
            if let Ok(ms) = val.trim().parse::<u64>() {
                self.tick_interval_ms = ms;
            }
        }
    }
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

/// Run boundary configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SimulationBoundsConfig {
    /// Stop after this many ticks (0 = run until stopped).
    #[serde(default = "default_max_ticks")]
    pub max_ticks: u64,
}

impl Default for SimulationBoundsConfig {
    fn default() -> Self {
        Self {
            max_ticks: default_max_ticks(),
        }
    }
}

/// What happens to delivered animals whose category has no field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmappedPolicy {
    /// Refuse to start: every delivered category must have a field.
    #[default]
    Reject,
    /// Start anyway; farmers drop unmapped animals and report each drop.
    Discard,
}

/// Farm layout configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FarmConfig {
    /// One entry per field.
    #[serde(default = "default_fields")]
    pub fields: Vec<FieldConfig>,

    /// Handling of categories without a field.
    #[serde(default)]
    pub unmapped_policy: UnmappedPolicy,
}

impl Default for FarmConfig {
    fn default() -> Self {
        Self {
            fields: default_fields(),
            unmapped_policy: UnmappedPolicy::default(),
        }
    }
}

/// A single field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct FieldConfig {
    /// The category this field holds.
    pub animal: Animal,

    /// Maximum head count.
    #[serde(default = "default_field_capacity")]
    pub capacity: u32,

    /// Head count at startup.
    #[serde(default = "default_initial_stock")]
    pub initial_stock: u32,
}

impl FieldConfig {
    /// A field with the default capacity and initial stock.
    pub const fn new(animal: Animal) -> Self {
        Self {
            animal,
            capacity: default_field_capacity(),
            initial_stock: default_initial_stock(),
        }
    }
}

/// Delivery configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeliveryConfig {
    /// A delivery arrives with probability `1 / frequency` each tick.
    #[serde(default = "default_delivery_frequency")]
    pub frequency: u32,

    /// Animals per delivery.
    #[serde(default = "default_delivery_size")]
    pub size: u32,

    /// Categories a delivery draws from, uniformly.
    #[serde(default = "default_delivery_animals")]
    pub animals: Vec<Animal>,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            frequency: default_delivery_frequency(),
            size: default_delivery_size(),
            animals: default_delivery_animals(),
        }
    }
}

/// Farmer configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct FarmerConfig {
    /// Farmers spawned at startup.
    #[serde(default = "default_farmer_count")]
    pub count: u32,

    /// Most animals a farmer takes from the enclosure per trip.
    #[serde(default = "default_farmer_max_animals")]
    pub max_animals: u32,

    /// Fixed part of the travel time to a field, in ticks.
    #[serde(default = "default_base_travel_ticks")]
    pub base_travel_ticks: u64,

    /// Travel time back to the enclosure, in ticks.
    #[serde(default = "default_return_travel_ticks")]
    pub return_travel_ticks: u64,

    /// Ticks spent placing each animal into a field.
    #[serde(default = "default_stocking_ticks_per_unit")]
    pub stocking_ticks_per_unit: u64,

    /// A break follows a trip with probability `1 / break_chance`
    /// (0 disables breaks).
    #[serde(default = "default_break_chance")]
    pub break_chance: u32,

    /// Shortest break, in ticks.
    #[serde(default = "default_break_min_ticks")]
    pub break_min_ticks: u64,

    /// Longest break, in ticks.
    #[serde(default = "default_break_max_ticks")]
    pub break_max_ticks: u64,
}

impl Default for FarmerConfig {
    fn default() -> Self {
        Self {
            count: default_farmer_count(),
            max_animals: default_farmer_max_animals(),
            base_travel_ticks: default_base_travel_ticks(),
            return_travel_ticks: default_return_travel_ticks(),
            stocking_ticks_per_unit: default_stocking_ticks_per_unit(),
            break_chance: default_break_chance(),
            break_min_ticks: default_break_min_ticks(),
            break_max_ticks: default_break_max_ticks(),
        }
    }
}

/// Buyer configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct BuyerConfig {
    /// Buyers spawned at startup.
    #[serde(default = "default_buyer_count")]
    pub count: u32,

    /// Failed ticks a buyer tolerates before abandoning its target.
    #[serde(default = "default_max_wait_ticks")]
    pub max_wait_ticks: u32,

    /// Shortest pause after a purchase, in ticks.
    #[serde(default = "default_purchase_delay_min_ticks")]
    pub purchase_delay_min_ticks: u64,

    /// Longest pause after a purchase, in ticks.
    #[serde(default = "default_purchase_delay_max_ticks")]
    pub purchase_delay_max_ticks: u64,
}

impl Default for BuyerConfig {
    fn default() -> Self {
        Self {
            count: default_buyer_count(),
            max_wait_ticks: default_max_wait_ticks(),
            purchase_delay_min_ticks: default_purchase_delay_min_ticks(),
            purchase_delay_max_ticks: default_purchase_delay_max_ticks(),
        }
    }
}

/// Output format of the per-tick world log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TickLogFormat {
    /// Human-readable `=== TICK n ===` blocks.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default `tracing` filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit `tracing` records as JSON.
    #[serde(default)]
    pub json: bool,

    /// Path of the world-state log (empty disables it).
    #[serde(default = "default_tick_log_path")]
    pub tick_log_path: String,

    /// Format of the world-state log.
    #[serde(default)]
    pub tick_log_format: TickLogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            tick_log_path: default_tick_log_path(),
            tick_log_format: TickLogFormat::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions
// ---------------------------------------------------------------------------

const fn default_seed() -> u64 {
    42
}

const fn default_tick_interval_ms() -> u64 {
    100
}

const fn default_max_ticks() -> u64 {
    10_000
}

fn default_fields() -> Vec<FieldConfig> {
    Animal::ALL.into_iter().map(FieldConfig::new).collect()
}

const fn default_field_capacity() -> u32 {
    50
}

const fn default_initial_stock() -> u32 {
    5
}

const fn default_delivery_frequency() -> u32 {
    100
}

const fn default_delivery_size() -> u32 {
    10
}

fn default_delivery_animals() -> Vec<Animal> {
    Animal::ALL.to_vec()
}

const fn default_farmer_count() -> u32 {
    3
}

const fn default_farmer_max_animals() -> u32 {
    10
}

const fn default_base_travel_ticks() -> u64 {
    10
}

const fn default_return_travel_ticks() -> u64 {
    10
}

const fn default_stocking_ticks_per_unit() -> u64 {
    1
}

const fn default_break_chance() -> u32 {
    5
}

const fn default_break_min_ticks() -> u64 {
    20
}

const fn default_break_max_ticks() -> u64 {
    40
}

const fn default_buyer_count() -> u32 {
    3
}

const fn default_max_wait_ticks() -> u32 {
    50
}

const fn default_purchase_delay_min_ticks() -> u64 {
    1
}

const fn default_purchase_delay_max_ticks() -> u64 {
    10
}

fn default_log_level() -> String {
    String::from("info")
}

fn default_tick_log_path() -> String {
    String::from("farm_simulation_log.txt")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = SimulationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.world.tick_interval_ms, 100);
        assert_eq!(config.farm.fields.len(), 5);
        assert_eq!(config.delivery.size, 10);
        assert_eq!(config.farmers.max_animals, 10);
        assert_eq!(config.buyers.max_wait_ticks, 50);
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r"
world:
  seed: 7
  tick_interval_ms: 20

simulation:
  max_ticks: 500

farm:
  unmapped_policy: discard
  fields:
    - animal: pigs
      capacity: 30
      initial_stock: 3
    - animal: cows

delivery:
  frequency: 4
  size: 6
  animals: [pigs, cows, llamas]

farmers:
  count: 2
  max_animals: 8
  base_travel_ticks: 5
  return_travel_ticks: 4
  stocking_ticks_per_unit: 2
  break_chance: 0

buyers:
  count: 6
  max_wait_ticks: 12
  purchase_delay_min_ticks: 2
  purchase_delay_max_ticks: 3

logging:
  level: debug
  json: true
  tick_log_path: ''
  tick_log_format: json
";
        let config = SimulationConfig::parse(yaml);
        assert!(config.is_ok(), "parse failed: {config:?}");
        let config = config.ok().unwrap_or_default();

        assert_eq!(config.world.seed, 7);
        assert_eq!(config.simulation.max_ticks, 500);
        assert_eq!(config.farm.unmapped_policy, UnmappedPolicy::Discard);
        assert_eq!(config.farm.fields.len(), 2);
        assert_eq!(config.farm.fields.first().map(|f| f.capacity), Some(30));
        assert_eq!(config.farm.fields.get(1).map(|f| f.capacity), Some(50));
        assert_eq!(config.delivery.animals, vec![Animal::Pigs, Animal::Cows, Animal::Llamas]);
        assert_eq!(config.farmers.stocking_ticks_per_unit, 2);
        assert_eq!(config.buyers.count, 6);
        assert!(config.logging.json);
        assert_eq!(config.logging.tick_log_format, TickLogFormat::Json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_minimal_yaml() {
        let config = SimulationConfig::parse("world:\n  seed: 9\n")
            .ok()
            .unwrap_or_default();
        assert_eq!(config.world.seed, 9);
        assert_eq!(config.farm.fields.len(), 5);
        assert_eq!(config.farmers.count, 3);
    }

    #[test]
    fn parse_empty_yaml() {
        assert!(SimulationConfig::parse("").is_ok());
    }

    #[test]
    fn reject_policy_refuses_unmapped_categories() {
        let mut config = SimulationConfig::default();
        config.farm.fields.retain(|f| f.animal != Animal::Llamas);
        assert_eq!(config.unmapped_animals(), vec![Animal::Llamas]);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));

        config.farm.unmapped_policy = UnmappedPolicy::Discard;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_overfull_field() {
        let mut config = SimulationConfig::default();
        config.farm.fields = vec![FieldConfig {
            animal: Animal::Pigs,
            capacity: 4,
            initial_stock: 5,
        }];
        config.farm.unmapped_policy = UnmappedPolicy::Discard;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_duplicate_fields() {
        let mut config = SimulationConfig::default();
        config.farm.fields.push(FieldConfig::new(Animal::Cows));
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_period_and_inverted_ranges() {
        let mut config = SimulationConfig::default();
        config.world.tick_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = SimulationConfig::default();
        config.farmers.break_min_ticks = 50;
        assert!(config.validate().is_err());

        let mut config = SimulationConfig::default();
        config.buyers.purchase_delay_min_ticks = 11;
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_project_config_file() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("farmsim-config.yaml");
        if path.exists() {
            let config = SimulationConfig::from_file(&path);
            assert!(config.is_ok(), "Failed to load project config: {config:?}");
        }
    }
}
