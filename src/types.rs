//! Core types for workout ranking
//!
//! This module defines the data structures that flow through each stage:
//! raw telemetry samples, session summaries, feature vectors, and the
//! reference metrics and recommendations produced from a scored corpus.

use crate::error::RankError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Distance every session starts from, so efficiency never divides a zero distance
pub const DISTANCE_SEED_KM: f64 = 0.1;

/// The five canonical performance features, in canonical order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Feature {
    /// Age-predicted maximum heart rate
    #[serde(rename = "HRmax")]
    HrMax,
    /// Mean heart rate as a percentage of HRmax
    #[serde(rename = "HR%")]
    HrPercent,
    /// Training load index
    #[serde(rename = "TLI")]
    Tli,
    /// Metabolic-equivalent proxy
    #[serde(rename = "MET")]
    Met,
    /// Workout efficiency index
    #[serde(rename = "WEI")]
    Wei,
}

impl Feature {
    /// All features in canonical order
    pub const ALL: [Feature; 5] = [
        Feature::HrMax,
        Feature::HrPercent,
        Feature::Tli,
        Feature::Met,
        Feature::Wei,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::HrMax => "HRmax",
            Feature::HrPercent => "HR%",
            Feature::Tli => "TLI",
            Feature::Met => "MET",
            Feature::Wei => "WEI",
        }
    }

    /// Look up a feature by its external column name
    pub fn from_name(name: &str) -> Option<Self> {
        Feature::ALL.into_iter().find(|f| f.as_str() == name)
    }

    /// Position in the canonical order
    pub fn index(&self) -> usize {
        match self {
            Feature::HrMax => 0,
            Feature::HrPercent => 1,
            Feature::Tli => 2,
            Feature::Met => 3,
            Feature::Wei => 4,
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One telemetry tick, as seen by the decoder
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSample {
    /// Heart rate (bpm)
    pub heart_rate_bpm: Option<f64>,
    /// Steps since the previous tick
    pub steps: Option<u64>,
    /// Distance since the previous tick (meters)
    pub distance_m: Option<f64>,
    /// Sample time (UTC)
    pub timestamp: Option<DateTime<Utc>>,
}

/// Aggregated summary of one workout session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Age in years
    pub age: Option<f64>,
    /// Gender as reported by the device profile
    pub gender: Option<String>,
    /// Height (centimeters)
    pub height_cm: Option<f64>,
    /// Weight (kilograms)
    pub weight_kg: Option<f64>,
    /// Activity type tag, e.g. "Running"
    pub activity_type: String,
    /// Session duration (minutes)
    pub duration_minutes: f64,
    /// Total calories burned
    pub calories: f64,
    /// Mean heart rate over the session (bpm)
    pub mean_hr_bpm: f64,
    /// Lowest heart rate observed during the session (bpm)
    pub resting_hr_bpm: Option<f64>,
    /// Total steps
    pub total_steps: u64,
    /// Total distance (kilometers), starting from [`DISTANCE_SEED_KM`]
    pub distance_km: f64,
}

impl SessionSummary {
    /// An empty summary for the given activity type with every field at its default
    pub fn new(activity_type: impl Into<String>) -> Self {
        Self {
            age: None,
            gender: None,
            height_cm: None,
            weight_kg: None,
            activity_type: activity_type.into(),
            duration_minutes: 0.0,
            calories: 0.0,
            mean_hr_bpm: 0.0,
            resting_hr_bpm: None,
            total_steps: 0,
            distance_km: DISTANCE_SEED_KM,
        }
    }
}

/// Check that an activity type can name files inside a data directory.
///
/// Activity types become file-name prefixes, so empty names, path separators
/// and `..` are rejected.
pub fn validate_activity_type(activity_type: &str) -> Result<(), RankError> {
    let invalid = activity_type.trim().is_empty()
        || activity_type.contains(['/', '\\', '\0'])
        || activity_type.contains("..");
    if invalid {
        Err(RankError::InvalidActivityType(activity_type.to_string()))
    } else {
        Ok(())
    }
}

/// The five derived features of one workout
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    #[serde(rename = "HRmax")]
    pub hr_max: f64,
    #[serde(rename = "HR%")]
    pub hr_percent: f64,
    #[serde(rename = "TLI")]
    pub tli: f64,
    #[serde(rename = "MET")]
    pub met: f64,
    #[serde(rename = "WEI")]
    pub wei: f64,
}

impl FeatureVector {
    pub fn get(&self, feature: Feature) -> f64 {
        match feature {
            Feature::HrMax => self.hr_max,
            Feature::HrPercent => self.hr_percent,
            Feature::Tli => self.tli,
            Feature::Met => self.met,
            Feature::Wei => self.wei,
        }
    }

    /// Values in canonical feature order
    pub fn to_array(&self) -> [f64; 5] {
        [self.hr_max, self.hr_percent, self.tli, self.met, self.wei]
    }

    pub fn from_array(values: [f64; 5]) -> Self {
        Self {
            hr_max: values[0],
            hr_percent: values[1],
            tli: values[2],
            met: values[3],
            wei: values[4],
        }
    }

    /// Keyed view using the external feature names
    pub fn to_map(&self) -> BTreeMap<String, f64> {
        Feature::ALL
            .iter()
            .map(|f| (f.as_str().to_string(), self.get(*f)))
            .collect()
    }
}

/// Median feature values among the top decile of a scored corpus
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TopDecileReference {
    /// Per-feature medians
    pub medians: FeatureVector,
    /// Number of workouts the medians were taken over
    pub sample_size: usize,
}

impl TopDecileReference {
    pub fn target(&self, feature: Feature) -> f64 {
        self.medians.get(feature)
    }
}

/// Improvement guidance for one workout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendations {
    /// Messages for features that crossed their threshold
    pub per_feature: BTreeMap<Feature, String>,
    /// Tier-based general message
    pub general: String,
}

impl Recommendations {
    /// Flatten into the `feature name or "general" -> message` mapping
    pub fn to_map(&self) -> BTreeMap<String, String> {
        let mut map: BTreeMap<String, String> = self
            .per_feature
            .iter()
            .map(|(f, msg)| (f.as_str().to_string(), msg.clone()))
            .collect();
        map.insert("general".to_string(), self.general.clone());
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_activity_type_validation() {
        for valid in ["Running", "Cycling", "Strength Training", "HIIT-2"] {
            assert!(validate_activity_type(valid).is_ok(), "{valid}");
        }
        for invalid in ["", "  ", "../escaped", "a/b", "a\\b", "..", "nul\0"] {
            assert!(
                matches!(
                    validate_activity_type(invalid),
                    Err(RankError::InvalidActivityType(_))
                ),
                "{invalid:?}"
            );
        }
    }

    #[test]
    fn test_feature_names_round_trip() {
        for feature in Feature::ALL {
            assert_eq!(Feature::from_name(feature.as_str()), Some(feature));
            assert_eq!(Feature::ALL[feature.index()], feature);
        }
        assert_eq!(Feature::from_name("VO2max"), None);
    }

    #[test]
    fn test_feature_vector_serializes_with_external_names() {
        let v = FeatureVector::from_array([180.0, 80.0, 6000.0, 7.0, 1.2]);
        let json = serde_json::to_value(v).unwrap();
        assert_eq!(json["HRmax"], 180.0);
        assert_eq!(json["HR%"], 80.0);
        assert_eq!(json["WEI"], 1.2);
    }

    #[test]
    fn test_new_summary_defaults() {
        let summary = SessionSummary::new("Running");
        assert_eq!(summary.distance_km, DISTANCE_SEED_KM);
        assert_eq!(summary.mean_hr_bpm, 0.0);
        assert_eq!(summary.resting_hr_bpm, None);
        assert_eq!(summary.gender, None);
    }

    #[test]
    fn test_recommendations_map_includes_general() {
        let mut per_feature = BTreeMap::new();
        per_feature.insert(Feature::Met, "more vigorous".to_string());
        let recs = Recommendations {
            per_feature,
            general: "keep going".to_string(),
        };
        let map = recs.to_map();
        assert_eq!(map.len(), 2);
        assert_eq!(map["MET"], "more vigorous");
        assert_eq!(map["general"], "keep going");
    }
}
