//! Feature derivation
//!
//! This module derives the five performance features from a session summary:
//! - HRmax: `208 - 0.7 * age`
//! - HR%: `mean_hr / HRmax * 100`
//! - TLI: `mean_hr * duration`
//! - MET: `mean_hr / resting_hr * 3.5`
//! - WEI: `HR% * distance / duration`

use crate::error::RankError;
use crate::types::{FeatureVector, SessionSummary};

/// Feature deriver for computing the canonical feature vector
pub struct FeatureDeriver;

impl FeatureDeriver {
    /// Derive features from a session summary.
    ///
    /// Fails instead of producing infinities when duration or resting heart
    /// rate is zero.
    pub fn derive(summary: &SessionSummary) -> Result<FeatureVector, RankError> {
        let age = summary
            .age
            .ok_or_else(|| RankError::MissingField("age".to_string()))?;

        if summary.duration_minutes == 0.0 {
            return Err(RankError::DivisionByZero(
                "TLI/WEI: workout duration is zero".to_string(),
            ));
        }

        let resting_hr = match summary.resting_hr_bpm {
            Some(rhr) if rhr != 0.0 => rhr,
            _ => {
                return Err(RankError::DivisionByZero(
                    "MET: resting heart rate is zero or unknown".to_string(),
                ))
            }
        };

        let hr_max = compute_hr_max(age);
        if hr_max == 0.0 {
            return Err(RankError::DivisionByZero(
                "HR%: age-predicted HRmax is zero".to_string(),
            ));
        }

        let hr_percent = summary.mean_hr_bpm / hr_max * 100.0;
        let tli = summary.mean_hr_bpm * summary.duration_minutes;
        let met = summary.mean_hr_bpm / resting_hr * 3.5;
        let wei = (hr_percent * summary.distance_km) / summary.duration_minutes;

        Ok(FeatureVector {
            hr_max,
            hr_percent,
            tli,
            met,
            wei,
        })
    }
}

/// Age-predicted maximum heart rate (Tanaka)
fn compute_hr_max(age: f64) -> f64 {
    208.0 - 0.7 * age
}
