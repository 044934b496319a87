//! Animal categories and delivery summaries.
//!
//! An animal is an opaque token carrying only its category. Variants are
//! declared in ascending order of their lowercase names so that the derived
//! [`Ord`] sorts categories alphabetically, which is the order every
//! summary is reported in.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A category of animal. Each field holds exactly one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Animal {
    /// Chickens.
    Chickens,
    /// Cows.
    Cows,
    /// Llamas.
    Llamas,
    /// Pigs.
    Pigs,
    /// Sheep.
    Sheep,
}

impl Animal {
    /// Every category, in alphabetical order.
    pub const ALL: [Self; 5] = [
        Self::Chickens,
        Self::Cows,
        Self::Llamas,
        Self::Pigs,
        Self::Sheep,
    ];

    /// Lowercase plural name used in logs and configuration.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Chickens => "chickens",
            Self::Cows => "cows",
            Self::Llamas => "llamas",
            Self::Pigs => "pigs",
            Self::Sheep => "sheep",
        }
    }
}

impl core::fmt::Display for Animal {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when a string names no known animal category.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown animal category: {name}")]
pub struct UnknownAnimal {
    /// The string that failed to parse.
    pub name: String,
}

impl FromStr for Animal {
    type Err = UnknownAnimal;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|animal| animal.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownAnimal {
                name: s.to_owned(),
            })
    }
}

/// Per-category head counts of a batch, sorted by category name.
///
/// Displays as space-separated `category=count` pairs, omitting zero
/// counts, e.g. `cows=3 pigs=7`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnimalCounts(BTreeMap<Animal, u32>);

impl AnimalCounts {
    /// Create an empty tally.
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Count one more animal of the given category.
    pub fn record(&mut self, animal: Animal) {
        let entry = self.0.entry(animal).or_insert(0);
        *entry = entry.saturating_add(1);
    }

    /// Head count for one category (0 if absent).
    pub fn get(&self, animal: Animal) -> u32 {
        self.0.get(&animal).copied().unwrap_or(0)
    }

    /// Total head count across all categories.
    pub fn total(&self) -> u32 {
        self.0.values().fold(0_u32, |acc, n| acc.saturating_add(*n))
    }

    /// Iterate `(category, count)` pairs in ascending category order.
    pub fn iter(&self) -> impl Iterator<Item = (Animal, u32)> + '_ {
        self.0.iter().map(|(animal, count)| (*animal, *count))
    }

    /// Whether no animals have been counted.
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

impl FromIterator<Animal> for AnimalCounts {
    fn from_iter<I: IntoIterator<Item = Animal>>(iter: I) -> Self {
        let mut counts = Self::new();
        for animal in iter {
            counts.record(animal);
        }
        counts
    }
}

impl core::fmt::Display for AnimalCounts {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut first = true;
        for (animal, count) in self.iter().filter(|(_, count)| *count > 0) {
            if !first {
                f.write_str(" ")?;
            }
            write!(f, "{animal}={count}")?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_is_sorted_by_name() {
        let names: Vec<&str> = Animal::ALL.iter().map(|a| a.name()).collect();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("Pigs".parse::<Animal>(), Ok(Animal::Pigs));
        assert_eq!(" sheep ".parse::<Animal>(), Ok(Animal::Sheep));
        assert!("goats".parse::<Animal>().is_err());
    }

    #[test]
    fn counts_display_sorted_pairs() {
        let counts: AnimalCounts = [Animal::Pigs, Animal::Cows, Animal::Pigs, Animal::Chickens]
            .into_iter()
            .collect();
        assert_eq!(counts.to_string(), "chickens=1 cows=1 pigs=2");
        assert_eq!(counts.total(), 4);
        assert_eq!(counts.get(Animal::Llamas), 0);
    }

    #[test]
    fn empty_counts_display_nothing() {
        assert_eq!(AnimalCounts::new().to_string(), "");
        assert!(AnimalCounts::new().is_empty());
    }

    #[test]
    fn serde_uses_lowercase_names() {
        let json = serde_json::to_string(&Animal::Llamas).unwrap_or_default();
        assert_eq!(json, "\"llamas\"");
    }
}
