//! Percentile inference
//!
//! Standardizes a feature input with the artifact's training-split transform,
//! runs the regressor and reports a 0-100 percentile rounded to 2 decimals.

use crate::artifact::ModelArtifact;
use crate::error::RankError;
use crate::stats::round_to;
use crate::types::{Feature, FeatureVector};
use std::collections::BTreeMap;

/// Feature values supplied by a caller
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureInput {
    /// Values keyed by external feature name ("HRmax", "HR%", ...)
    Keyed(BTreeMap<String, f64>),
    /// Values in the artifact's feature order
    Ordered(Vec<f64>),
}

impl From<FeatureVector> for FeatureInput {
    fn from(vector: FeatureVector) -> Self {
        FeatureInput::Keyed(vector.to_map())
    }
}

impl FeatureInput {
    /// Resolve into a feature vector using the artifact's feature order
    pub fn resolve(&self, order: &[Feature]) -> Result<FeatureVector, RankError> {
        let mut values = [0.0; 5];

        match self {
            FeatureInput::Keyed(map) => {
                for feature in order {
                    let value = map
                        .get(feature.as_str())
                        .ok_or_else(|| RankError::UnknownFeature(feature.to_string()))?;
                    values[feature.index()] = *value;
                }
            }
            FeatureInput::Ordered(list) => {
                if list.len() != order.len() {
                    return Err(RankError::UnknownFeature(format!(
                        "expected {} ordered values, got {}",
                        order.len(),
                        list.len()
                    )));
                }
                for (feature, value) in order.iter().zip(list) {
                    values[feature.index()] = *value;
                }
            }
        }

        if let Some(feature) = Feature::ALL.iter().find(|f| !values[f.index()].is_finite()) {
            return Err(RankError::UnknownFeature(format!("{feature} is not a finite number")));
        }

        Ok(FeatureVector::from_array(values))
    }
}

/// Predicted percentile (0-100, 2 decimals) of one workout
pub fn predict_percentile(input: &FeatureInput, artifact: &ModelArtifact) -> Result<f64, RankError> {
    let vector = input.resolve(&artifact.features)?;
    predict_vector(&vector, artifact)
}

/// Predicted percentile of an already-derived feature vector
pub fn predict_vector(vector: &FeatureVector, artifact: &ModelArtifact) -> Result<f64, RankError> {
    let standardized = artifact.transform.transform(vector);
    let row: Vec<f64> = artifact
        .features
        .iter()
        .map(|f| standardized[f.index()])
        .collect();

    let unit = artifact.regressor.predict(&row)?;
    Ok(round_to(unit * 100.0, 2))
}
