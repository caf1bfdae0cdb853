//! Recommendation engine
//!
//! Compares a workout's features to the top-decile reference of its activity
//! type. Each feature has a fixed set of rules in [`RULES`]; a rule fires when
//! the gap between target and current value crosses its threshold. A general
//! message is picked from the predicted percentile's tier.

use crate::artifact::ModelArtifact;
use crate::error::RankError;
use crate::inference::predict_vector;
use crate::types::{Feature, FeatureVector, Recommendations, TopDecileReference};

/// How the gap between target and current value is measured
#[derive(Debug, Clone, Copy, PartialEq)]
enum Gap {
    /// `target - current`
    Absolute,
    /// `(target - current) / target`
    RelativeToTarget,
}

/// When a rule fires
#[derive(Debug, Clone, Copy, PartialEq)]
enum Trigger {
    Above(f64),
    Below(f64),
}

impl Trigger {
    fn fires(&self, gap: f64) -> bool {
        match *self {
            Trigger::Above(threshold) => gap > threshold,
            Trigger::Below(threshold) => gap < threshold,
        }
    }
}

struct Rule {
    feature: Feature,
    gap: Gap,
    trigger: Trigger,
    message: fn(target: f64, gap: f64) -> String,
}

static RULES: [Rule; 7] = [
    Rule {
        feature: Feature::HrMax,
        gap: Gap::Absolute,
        trigger: Trigger::Above(5.0),
        message: |_, gap| {
            format!("Increase max heart rate by {gap:.1} bpm through more intense intervals")
        },
    },
    Rule {
        feature: Feature::HrMax,
        gap: Gap::Absolute,
        trigger: Trigger::Below(-5.0),
        message: |_, _| "Your HRmax is unusually high - consider consulting a doctor".to_string(),
    },
    Rule {
        feature: Feature::HrPercent,
        gap: Gap::Absolute,
        trigger: Trigger::Above(5.0),
        message: |target, _| {
            format!("Spend more time in higher heart rate zones (aim for {target:.1}% of max)")
        },
    },
    Rule {
        feature: Feature::Tli,
        gap: Gap::RelativeToTarget,
        trigger: Trigger::Above(0.2),
        message: |_, gap| {
            format!(
                "Increase total workout load by {:.1}% through longer duration or higher intensity",
                gap * 100.0
            )
        },
    },
    Rule {
        feature: Feature::Met,
        gap: Gap::Absolute,
        trigger: Trigger::Above(0.5),
        message: |_, gap| format!("Choose more vigorous activities to increase MET score by {gap:.1}"),
    },
    Rule {
        feature: Feature::Wei,
        gap: Gap::Absolute,
        trigger: Trigger::Above(0.2),
        message: |_, _| {
            "Increase workout efficiency by improving form or adding resistance".to_string()
        },
    },
    Rule {
        feature: Feature::Wei,
        gap: Gap::Absolute,
        trigger: Trigger::Below(-0.2),
        message: |_, _| "Your WEI is unusually high - ensure you're not overtraining".to_string(),
    },
];

/// Percentile tier driving the general message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Below 50
    Consistency,
    /// 50 up to 75
    Intensity,
    /// 75 and above
    Maintenance,
}

impl Tier {
    pub fn from_percentile(percentile: f64) -> Self {
        if percentile < 50.0 {
            Tier::Consistency
        } else if percentile < 75.0 {
            Tier::Intensity
        } else {
            Tier::Maintenance
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Tier::Consistency => {
                "Focus on consistency first - aim for regular workouts before increasing intensity"
            }
            Tier::Intensity => "Try incorporating interval training to boost your workout quality",
            Tier::Maintenance => "Maintain your excellent workout routine with proper recovery",
        }
    }
}

/// Predict a workout's percentile with an artifact and build its recommendations.
///
/// Returns the percentile alongside the recommendations it produced.
pub fn recommend_with_artifact(
    current: &FeatureVector,
    artifact: &ModelArtifact,
) -> Result<(f64, Recommendations), RankError> {
    let percentile = predict_vector(current, artifact)?;
    let recommendations = recommend(current, &artifact.reference, percentile)?;
    Ok((percentile, recommendations))
}

/// Build recommendations for one workout from an already predicted percentile
pub fn recommend(
    current: &FeatureVector,
    reference: &TopDecileReference,
    percentile: f64,
) -> Result<Recommendations, RankError> {
    if reference.target(Feature::Tli) == 0.0 {
        return Err(RankError::DivisionByZero(
            "TLI gap: reference TLI is zero".to_string(),
        ));
    }

    let mut recommendations = Recommendations {
        per_feature: Default::default(),
        general: Tier::from_percentile(percentile).message().to_string(),
    };

    for rule in &RULES {
        let target = reference.target(rule.feature);
        let difference = target - current.get(rule.feature);
        let gap = match rule.gap {
            Gap::Absolute => difference,
            Gap::RelativeToTarget => difference / target,
        };

        if rule.trigger.fires(gap) {
            recommendations
                .per_feature
                .entry(rule.feature)
                .or_insert_with(|| (rule.message)(target, gap));
        }
    }

    Ok(recommendations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrainingConfig;
    use crate::training::{synthetic_workouts, train_activity};
    use pretty_assertions::assert_eq;

    fn reference() -> TopDecileReference {
        TopDecileReference {
            medians: FeatureVector::from_array([170.0, 80.0, 8000.0, 7.0, 1.5]),
            sample_size: 10,
        }
    }

    fn at_reference() -> FeatureVector {
        reference().medians
    }

    #[test]
    fn test_hr_max_threshold() {
        let below = FeatureVector {
            hr_max: 160.0,
            ..at_reference()
        };
        let recs = recommend(&below, &reference(), 60.0).unwrap();
        assert_eq!(
            recs.per_feature[&Feature::HrMax],
            "Increase max heart rate by 10.0 bpm through more intense intervals"
        );

        let close = FeatureVector {
            hr_max: 168.0,
            ..at_reference()
        };
        let recs = recommend(&close, &reference(), 60.0).unwrap();
        assert!(!recs.per_feature.contains_key(&Feature::HrMax));
    }

    #[test]
    fn test_high_values_warn() {
        let high = FeatureVector {
            hr_max: 180.0,
            wei: 2.0,
            ..at_reference()
        };
        let recs = recommend(&high, &reference(), 80.0).unwrap();
        assert_eq!(
            recs.per_feature[&Feature::HrMax],
            "Your HRmax is unusually high - consider consulting a doctor"
        );
        assert_eq!(
            recs.per_feature[&Feature::Wei],
            "Your WEI is unusually high - ensure you're not overtraining"
        );
    }

    #[test]
    fn test_low_workout_gets_every_improvement() {
        let low = FeatureVector::from_array([160.0, 70.0, 6000.0, 6.0, 1.0]);
        let recs = recommend(&low, &reference(), 30.0).unwrap();

        assert_eq!(
            recs.per_feature[&Feature::HrPercent],
            "Spend more time in higher heart rate zones (aim for 80.0% of max)"
        );
        assert_eq!(
            recs.per_feature[&Feature::Tli],
            "Increase total workout load by 25.0% through longer duration or higher intensity"
        );
        assert_eq!(
            recs.per_feature[&Feature::Met],
            "Choose more vigorous activities to increase MET score by 1.0"
        );
        assert_eq!(
            recs.per_feature[&Feature::Wei],
            "Increase workout efficiency by improving form or adding resistance"
        );
        assert_eq!(recs.general, Tier::Consistency.message());
    }

    #[test]
    fn test_at_reference_only_general() {
        let recs = recommend(&at_reference(), &reference(), 90.0).unwrap();
        assert!(recs.per_feature.is_empty());
        assert_eq!(recs.to_map().len(), 1);
        assert_eq!(recs.general, Tier::Maintenance.message());
    }

    #[test]
    fn test_tiers() {
        assert_eq!(Tier::from_percentile(49.99), Tier::Consistency);
        assert_eq!(Tier::from_percentile(50.0), Tier::Intensity);
        assert_eq!(Tier::from_percentile(74.99), Tier::Intensity);
        assert_eq!(Tier::from_percentile(75.0), Tier::Maintenance);
    }

    #[test]
    fn test_artifact_percentile_drives_tier() {
        let corpus = synthetic_workouts(30, 5);
        let config = TrainingConfig::default().with_epochs(5);
        let artifact = train_activity("Running", &corpus, &config).unwrap();

        let (percentile, recs) = recommend_with_artifact(&corpus[0], &artifact).unwrap();
        assert_eq!(percentile, predict_vector(&corpus[0], &artifact).unwrap());
        assert_eq!(recs.general, Tier::from_percentile(percentile).message());
        assert_eq!(
            recs,
            recommend(&corpus[0], &artifact.reference, percentile).unwrap()
        );
    }

    #[test]
    fn test_zero_reference_tli() {
        let mut reference = reference();
        reference.medians.tli = 0.0;
        assert!(matches!(
            recommend(&at_reference(), &reference, 50.0),
            Err(RankError::DivisionByZero(_))
        ));
    }
}
