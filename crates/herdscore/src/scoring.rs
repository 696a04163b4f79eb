//! Breed standards and classification scoring.
//!
//! A score says how closely an animal's measured traits match the ideal
//! conformation of its breed. Each trait contributes
//! `1 - |value - ideal| / tolerance` (floored at zero), weighted, and the
//! weighted mean is scaled to `[0, 100]` with one decimal.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::model::Traits;

fn default_weight() -> f64 {
    1.0
}

/// Ideal value and acceptable deviation for one trait.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraitStandard {
    pub ideal: f64,
    /// Deviation at which the trait contributes nothing.
    pub tolerance: f64,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

impl TraitStandard {
    /// Closeness of `value` to the ideal, in `[0, 1]`.
    fn closeness(&self, value: f64) -> f64 {
        if self.tolerance <= 0.0 {
            return if value == self.ideal { 1.0 } else { 0.0 };
        }
        (1.0 - (value - self.ideal).abs() / self.tolerance).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreedStandard {
    pub category: String,
    pub traits: BTreeMap<String, TraitStandard>,
}

impl BreedStandard {
    /// Scores `traits` against this standard. A trait the standard lists
    /// but the measurement lacks counts as a full miss.
    pub fn score(&self, traits: &Traits) -> f64 {
        let total_weight: f64 = self.traits.values().map(|t| t.weight.max(0.0)).sum();
        if total_weight <= 0.0 {
            return 0.0;
        }

        let earned: f64 = self
            .traits
            .iter()
            .map(|(name, standard)| {
                let closeness = traits
                    .get(name)
                    .filter(|m| m.value.is_finite())
                    .map(|m| standard.closeness(m.value))
                    .unwrap_or(0.0);
                closeness * standard.weight.max(0.0)
            })
            .sum();

        round_score(100.0 * earned / total_weight)
    }

    /// Checks tolerances and weights; returns a reason on failure.
    pub fn validate(&self) -> Result<(), String> {
        if self.category.trim().is_empty() {
            return Err("category is blank".to_string());
        }
        if self.traits.is_empty() {
            return Err("no traits defined".to_string());
        }
        for (name, standard) in &self.traits {
            if !standard.ideal.is_finite() {
                return Err(format!("trait '{}' has a non-finite ideal", name));
            }
            if !(standard.tolerance.is_finite() && standard.tolerance > 0.0) {
                return Err(format!("trait '{}' needs a positive tolerance", name));
            }
            if !(standard.weight.is_finite() && standard.weight >= 0.0) {
                return Err(format!("trait '{}' has a negative weight", name));
            }
        }
        if self.traits.values().all(|t| t.weight == 0.0) {
            return Err("all trait weights are zero".to_string());
        }
        Ok(())
    }
}

fn round_score(raw: f64) -> f64 {
    ((raw * 10.0).round() / 10.0).clamp(0.0, 100.0)
}

/// Display band for a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreGrade {
    Excellent,
    Good,
    NeedsReview,
}

impl ScoreGrade {
    pub fn from_score(score: f64) -> Self {
        if score >= 85.0 {
            ScoreGrade::Excellent
        } else if score >= 70.0 {
            ScoreGrade::Good
        } else {
            ScoreGrade::NeedsReview
        }
    }
}

/// All configured breed standards, looked up case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct BreedStandards {
    by_category: HashMap<String, BreedStandard>,
    fallback: Option<BreedStandard>,
}

impl BreedStandards {
    pub fn new(standards: Vec<BreedStandard>, fallback: Option<BreedStandard>) -> Self {
        let by_category = standards
            .into_iter()
            .map(|s| (s.category.trim().to_lowercase(), s))
            .collect();
        Self {
            by_category,
            fallback,
        }
    }

    pub fn standard_for(&self, category: &str) -> Option<&BreedStandard> {
        self.by_category
            .get(&category.trim().to_lowercase())
            .or(self.fallback.as_ref())
    }

    /// Scores `traits` as `category`. Unknown categories score 0.0 unless a
    /// fallback standard is configured.
    pub fn score(&self, traits: &Traits, category: &str) -> f64 {
        match self.standard_for(category) {
            Some(standard) => standard.score(traits),
            None => {
                log::debug!("No breed standard for '{}', scoring 0", category);
                0.0
            }
        }
    }

    /// Category names with a dedicated standard, sorted.
    pub fn categories(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .by_category
            .values()
            .map(|s| s.category.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.by_category.is_empty() && self.fallback.is_none()
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::example_standards;
    use super::*;
    use crate::model::TraitMeasurement;

    fn standard(category: &str, traits: &[(&str, f64, f64)]) -> BreedStandard {
        BreedStandard {
            category: category.to_string(),
            traits: traits
                .iter()
                .map(|(name, ideal, tolerance)| {
                    (
                        name.to_string(),
                        TraitStandard {
                            ideal: *ideal,
                            tolerance: *tolerance,
                            weight: 1.0,
                        },
                    )
                })
                .collect(),
        }
    }

    fn traits(values: &[(&str, f64)]) -> Traits {
        values
            .iter()
            .map(|(n, v)| (n.to_string(), TraitMeasurement::centimeters(*v)))
            .collect()
    }

    fn two_trait_standard() -> BreedStandard {
        standard("Test", &[("a", 100.0, 10.0), ("b", 50.0, 10.0)])
    }

    #[test]
    fn test_perfect_match_scores_100() {
        let s = two_trait_standard();
        assert_eq!(s.score(&traits(&[("a", 100.0), ("b", 50.0)])), 100.0);
    }

    #[test]
    fn test_partial_deviation() {
        let s = two_trait_standard();
        // a: 1 - 5/10 = 0.5, b: 1.0 -> mean 0.75
        assert_eq!(s.score(&traits(&[("a", 105.0), ("b", 50.0)])), 75.0);
    }

    #[test]
    fn test_deviation_beyond_tolerance_floors_at_zero() {
        let s = two_trait_standard();
        assert_eq!(s.score(&traits(&[("a", 200.0), ("b", 50.0)])), 50.0);
    }

    #[test]
    fn test_missing_trait_counts_as_miss() {
        let s = two_trait_standard();
        assert_eq!(s.score(&traits(&[("a", 100.0)])), 50.0);
    }

    #[test]
    fn test_weights_shift_the_mean() {
        let mut s = two_trait_standard();
        s.traits.get_mut("a").unwrap().weight = 3.0;
        // (3 * 1.0 + 1 * 0.0) / 4
        assert_eq!(s.score(&traits(&[("a", 100.0), ("b", 0.0)])), 75.0);
    }

    #[test]
    fn test_score_rounded_to_one_decimal() {
        let s = standard("Test", &[("a", 100.0, 3.0)]);
        // 1 - 1/3 = 0.6666.. -> 66.7
        assert_eq!(s.score(&traits(&[("a", 101.0)])), 66.7);
    }

    #[test]
    fn test_unknown_category_scores_zero_without_fallback() {
        let standards = example_standards();
        assert_eq!(standards.score(&traits(&[("bodyLength", 150.0)]), "Yak"), 0.0);
    }

    #[test]
    fn test_fallback_standard_used_for_unknown_category() {
        let standards = BreedStandards::new(vec![], Some(two_trait_standard()));
        assert_eq!(
            standards.score(&traits(&[("a", 100.0), ("b", 50.0)]), "Yak"),
            100.0
        );
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let standards = example_standards();
        assert!(standards.standard_for("sahiwal").is_some());
        assert!(standards.standard_for("  RED SINDHI ").is_some());
        assert_eq!(
            standards.categories(),
            ["Gir", "Kankrej", "Ongole", "Red Sindhi", "Sahiwal", "Tharparkar"]
        );
    }

    #[test]
    fn test_empty_table_scores_everything_zero() {
        let standards = BreedStandards::default();
        assert!(standards.is_empty());
        assert_eq!(standards.score(&traits(&[("bodyLength", 150.0)]), "Sahiwal"), 0.0);
    }

    #[test]
    fn test_sample_sahiwal_grades_well() {
        let measured = traits(&[
            ("bodyLength", 152.3),
            ("chestWidth", 68.7),
            ("heightAtWithers", 142.1),
            ("rumpAngle", 28.5),
            ("legLength", 71.2),
        ]);
        let score = example_standards().score(&measured, "Sahiwal");
        assert!(score >= 70.0, "score {score}");
        assert!(score <= 100.0);
    }

    #[test]
    fn test_validate_rejects_bad_tolerance() {
        let s = standard("Test", &[("a", 100.0, 0.0)]);
        assert!(s.validate().unwrap_err().contains("tolerance"));
    }

    #[test]
    fn test_grade_bands() {
        assert_eq!(ScoreGrade::from_score(85.0), ScoreGrade::Excellent);
        assert_eq!(ScoreGrade::from_score(84.9), ScoreGrade::Good);
        assert_eq!(ScoreGrade::from_score(70.0), ScoreGrade::Good);
        assert_eq!(ScoreGrade::from_score(69.9), ScoreGrade::NeedsReview);
    }
}
