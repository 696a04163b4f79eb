//! Body-trait measurements.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Unit a measurement was taken in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TraitUnit {
    #[serde(rename = "cm")]
    Centimeters,
    #[serde(rename = "deg")]
    Degrees,
}

/// A single unit-tagged measurement.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TraitMeasurement {
    pub value: f64,
    pub unit: TraitUnit,
}

impl TraitMeasurement {
    pub fn centimeters(value: f64) -> Self {
        Self {
            value,
            unit: TraitUnit::Centimeters,
        }
    }

    pub fn degrees(value: f64) -> Self {
        Self {
            value,
            unit: TraitUnit::Degrees,
        }
    }
}

/// Trait name to measurement, ordered by name.
///
/// The order does not depend on the provider, so stored, listed and
/// submitted traits always read the same way.
pub type Traits = BTreeMap<String, TraitMeasurement>;

/// Returns the name of the first trait whose value is NaN or infinite.
pub fn first_non_finite(traits: &Traits) -> Option<&str> {
    traits
        .iter()
        .find(|(_, m)| !m.value.is_finite())
        .map(|(name, _)| name.as_str())
}
