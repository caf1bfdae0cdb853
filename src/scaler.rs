//! Standardization transform
//!
//! Per-feature mean and population standard deviation, fitted once on a set of
//! feature vectors and then applied unchanged. A feature with zero variance is
//! scaled by 1 so it only gets centered.

use crate::error::RankError;
use crate::stats::{mean, population_std};
use crate::types::FeatureVector;
use serde::{Deserialize, Serialize};

/// Fitted standardization parameters, in canonical feature order
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub means: [f64; 5],
    pub scales: [f64; 5],
}

impl StandardScaler {
    /// Fit on a non-empty set of feature vectors
    pub fn fit(vectors: &[FeatureVector]) -> Result<Self, RankError> {
        if vectors.is_empty() {
            return Err(RankError::InsufficientData(
                "cannot fit a transform on zero workouts".to_string(),
            ));
        }

        let mut means = [0.0; 5];
        let mut scales = [1.0; 5];

        for column in 0..5 {
            let values: Vec<f64> = vectors.iter().map(|v| v.to_array()[column]).collect();
            // Both are Some: `values` is non-empty.
            means[column] = mean(&values).unwrap_or(0.0);
            let std = population_std(&values).unwrap_or(0.0);
            scales[column] = if std > 0.0 && std.is_finite() { std } else { 1.0 };
        }

        Ok(Self { means, scales })
    }

    /// Standardize one vector
    pub fn transform(&self, vector: &FeatureVector) -> [f64; 5] {
        self.transform_array(vector.to_array())
    }

    pub fn transform_array(&self, values: [f64; 5]) -> [f64; 5] {
        let mut out = [0.0; 5];
        for (i, value) in values.iter().enumerate() {
            out[i] = (value - self.means[i]) / self.scales[i];
        }
        out
    }

    /// Standardize every vector of a corpus
    pub fn transform_all(&self, vectors: &[FeatureVector]) -> Vec<[f64; 5]> {
        vectors.iter().map(|v| self.transform(v)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn vectors() -> Vec<FeatureVector> {
        vec![
            FeatureVector::from_array([180.0, 70.0, 5000.0, 6.0, 1.0]),
            FeatureVector::from_array([180.0, 80.0, 6000.0, 7.0, 1.5]),
            FeatureVector::from_array([180.0, 90.0, 7000.0, 8.0, 2.0]),
        ]
    }

    #[test]
    fn test_fit_means_and_population_std() {
        let scaler = StandardScaler::fit(&vectors()).unwrap();
        assert_eq!(scaler.means, [180.0, 80.0, 6000.0, 7.0, 1.5]);
        let expected_std = (200.0f64 / 3.0).sqrt();
        assert!((scaler.scales[1] - expected_std).abs() < 1e-12);
    }

    #[test]
    fn test_zero_variance_scale_is_one() {
        let scaler = StandardScaler::fit(&vectors()).unwrap();
        assert_eq!(scaler.scales[0], 1.0);
        let z = scaler.transform(&vectors()[0]);
        assert_eq!(z[0], 0.0);
    }

    #[test]
    fn test_transform_centers_and_scales() {
        let data = vectors();
        let scaler = StandardScaler::fit(&data).unwrap();
        let z = scaler.transform_all(&data);
        let column_mean: f64 = z.iter().map(|row| row[2]).sum::<f64>() / 3.0;
        assert!(column_mean.abs() < 1e-12);
        assert!(z[2][2] > 0.0 && z[0][2] < 0.0);
    }

    #[test]
    fn test_empty_is_insufficient_data() {
        assert!(matches!(
            StandardScaler::fit(&[]),
            Err(RankError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_serde_round_trip() {
        let scaler = StandardScaler::fit(&vectors()).unwrap();
        let json = serde_json::to_string(&scaler).unwrap();
        let restored: StandardScaler = serde_json::from_str(&json).unwrap();
        for i in 0..5 {
            assert!((restored.means[i] - scaler.means[i]).abs() < 1e-9);
            assert!((restored.scales[i] - scaler.scales[i]).abs() < 1e-9);
        }
    }
}
