//! Pipeline orchestration
//!
//! This module provides the caller-facing API: a telemetry file, an activity
//! type and an age go in; a predicted percentile and recommendations come out.
//!
//! Pipeline stages:
//! 1. TelemetryDecoder - Parse the file and aggregate a session summary
//! 2. SummaryStore - Append the summary to its activity table
//! 3. FeatureDeriver - Compute the five features
//! 4. ArtifactStore - Load the activity's trained model
//! 5. Inference + recommendation - Percentile and guidance

use crate::artifact::{ArtifactStore, ModelArtifact};
use crate::config::RankConfig;
use crate::decoder::{decode_summary, DecoderDefaults, FitDecoder, TelemetryDecoder};
use crate::error::RankError;
use crate::features::FeatureDeriver;
use crate::recommend::recommend_with_artifact;
use crate::summary_store::SummaryStore;
use crate::types::{validate_activity_type, FeatureVector, Recommendations, SessionSummary};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Result of classifying one workout
#[derive(Debug, Clone, PartialEq)]
pub enum ClassificationOutcome {
    Ranked {
        /// Predicted percentile, 0-100 with 2 decimals
        percentile: f64,
        recommendations: Recommendations,
        summary: SessionSummary,
        features: FeatureVector,
    },
    /// No trained model exists for the activity type
    ModelUnavailable { activity_type: String },
    /// The workout's data cannot be ranked
    InvalidInput { reason: String },
}

impl ClassificationOutcome {
    pub fn percentile(&self) -> Option<f64> {
        match self {
            ClassificationOutcome::Ranked { percentile, .. } => Some(*percentile),
            _ => None,
        }
    }
}

/// Classify one telemetry file with a fresh classifier.
///
/// The decoded summary is appended to the activity's summary table. `age`
/// falls back to the configured default when `None`.
///
/// # Example
/// ```ignore
/// let outcome = classify_workout(Path::new("run.fit"), "Running", Some(31.0), &config)?;
/// if let Some(p) = outcome.percentile() {
///     println!("ranked at the {p} percentile");
/// }
/// ```
pub fn classify_workout(
    telemetry: &Path,
    activity_type: &str,
    age: Option<f64>,
    config: &RankConfig,
) -> Result<ClassificationOutcome, RankError> {
    let mut classifier = WorkoutClassifier::new(config);
    classifier.classify_file(telemetry, activity_type, age)
}

/// Rank an already-decoded summary against a loaded artifact.
///
/// User-data failures become [`ClassificationOutcome::InvalidInput`]; any
/// other error propagates.
pub fn rank_summary(
    summary: SessionSummary,
    artifact: &ModelArtifact,
) -> Result<ClassificationOutcome, RankError> {
    let features = match FeatureDeriver::derive(&summary) {
        Ok(features) => features,
        Err(e) => return invalid_or_err(e),
    };

    let (percentile, recommendations) = match recommend_with_artifact(&features, artifact) {
        Ok(ranked) => ranked,
        Err(e) => return invalid_or_err(e),
    };

    debug!(
        activity_type = %summary.activity_type,
        percentile,
        recommendations = recommendations.per_feature.len(),
        "ranked workout"
    );

    Ok(ClassificationOutcome::Ranked {
        percentile,
        recommendations,
        summary,
        features,
    })
}

fn invalid_or_err(error: RankError) -> Result<ClassificationOutcome, RankError> {
    match error {
        RankError::DivisionByZero(_)
        | RankError::MissingField(_)
        | RankError::UnknownFeature(_)
        | RankError::InvalidActivityType(_) => {
            Ok(ClassificationOutcome::InvalidInput {
                reason: error.to_string(),
            })
        }
        other => Err(other),
    }
}

/// Stateful classifier holding the stores and a read-only artifact cache.
///
/// Use this when classifying many workouts so each activity's artifact is
/// loaded from disk once.
pub struct WorkoutClassifier {
    summaries: SummaryStore,
    artifacts: ArtifactStore,
    default_age: f64,
    cache: HashMap<String, Arc<ModelArtifact>>,
}

impl WorkoutClassifier {
    /// Create a classifier from configuration
    pub fn new(config: &RankConfig) -> Self {
        Self::with_stores(
            SummaryStore::new(&config.summaries_dir),
            ArtifactStore::new(&config.models_dir),
            config.default_age,
        )
    }

    /// Create a classifier over explicit stores
    pub fn with_stores(summaries: SummaryStore, artifacts: ArtifactStore, default_age: f64) -> Self {
        Self {
            summaries,
            artifacts,
            default_age,
            cache: HashMap::new(),
        }
    }

    /// Decode a FIT file, record it and rank it
    pub fn classify_file(
        &mut self,
        telemetry: &Path,
        activity_type: &str,
        age: Option<f64>,
    ) -> Result<ClassificationOutcome, RankError> {
        let bytes = std::fs::read(telemetry)?;
        self.classify_bytes(&FitDecoder, &bytes, activity_type, age)
    }

    /// Decode telemetry bytes with any decoder, record the summary and rank it
    pub fn classify_bytes(
        &mut self,
        decoder: &dyn TelemetryDecoder,
        bytes: &[u8],
        activity_type: &str,
        age: Option<f64>,
    ) -> Result<ClassificationOutcome, RankError> {
        if let Err(e) = validate_activity_type(activity_type) {
            return invalid_or_err(e);
        }
        let defaults = DecoderDefaults::new(activity_type, age.unwrap_or(self.default_age));
        let summary = decode_summary(decoder, bytes, &defaults)?;
        self.summaries.append(&summary)?;
        self.classify_summary(summary)
    }

    /// Rank a summary without recording it
    pub fn classify_summary(
        &mut self,
        summary: SessionSummary,
    ) -> Result<ClassificationOutcome, RankError> {
        let artifact = match self.artifact(&summary.activity_type) {
            Ok(artifact) => artifact,
            Err(RankError::ArtifactNotFound(activity_type)) => {
                info!(%activity_type, "no trained model for activity type");
                return Ok(ClassificationOutcome::ModelUnavailable { activity_type });
            }
            Err(e) => return invalid_or_err(e),
        };
        rank_summary(summary, &artifact)
    }

    /// Loaded artifact for an activity type, from cache when possible
    pub fn artifact(&mut self, activity_type: &str) -> Result<Arc<ModelArtifact>, RankError> {
        if let Some(artifact) = self.cache.get(activity_type) {
            return Ok(Arc::clone(artifact));
        }
        let artifact = Arc::new(self.artifacts.load(activity_type)?);
        self.cache
            .insert(activity_type.to_string(), Arc::clone(&artifact));
        Ok(artifact)
    }
}
