//! Model artifacts
//!
//! A trained model for one activity type is persisted as two JSON documents
//! in the models directory:
//! - `<activity>.regressor.json`: the network weights
//! - `<activity>.attrs.json`: feature order, transform, reference, report
//!
//! Both carry the same artifact id so a half-replaced pair is detected on load.

use crate::error::RankError;
use crate::regressor::{PercentileRegressor, TrainingReport};
use crate::scaler::StandardScaler;
use crate::types::{validate_activity_type, Feature, TopDecileReference};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

const REGRESSOR_SUFFIX: &str = ".regressor.json";
const ATTRS_SUFFIX: &str = ".attrs.json";

/// Everything inference and recommendation need for one activity type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub artifact_id: Uuid,
    pub activity_type: String,
    pub trained_at: DateTime<Utc>,
    /// Order in which the regressor expects its inputs
    pub features: Vec<Feature>,
    /// Transform fitted on the training split
    pub transform: StandardScaler,
    pub reference: TopDecileReference,
    pub regressor: PercentileRegressor,
    pub report: TrainingReport,
}

impl ModelArtifact {
    /// Bundle a freshly trained model under a new artifact id
    pub fn new(
        activity_type: impl Into<String>,
        transform: StandardScaler,
        reference: TopDecileReference,
        regressor: PercentileRegressor,
        report: TrainingReport,
    ) -> Self {
        Self {
            artifact_id: Uuid::new_v4(),
            activity_type: activity_type.into(),
            trained_at: Utc::now(),
            features: Feature::ALL.to_vec(),
            transform,
            reference,
            regressor,
            report,
        }
    }

    fn split(&self) -> (RegressorDocument, AttrsDocument) {
        (
            RegressorDocument {
                artifact_id: self.artifact_id,
                regressor: self.regressor.clone(),
            },
            AttrsDocument {
                artifact_id: self.artifact_id,
                activity_type: self.activity_type.clone(),
                trained_at: self.trained_at,
                features: self.features.clone(),
                transform: self.transform,
                reference: self.reference,
                report: self.report.clone(),
            },
        )
    }
}

#[derive(Serialize, Deserialize)]
struct RegressorDocument {
    artifact_id: Uuid,
    regressor: PercentileRegressor,
}

#[derive(Serialize, Deserialize)]
struct AttrsDocument {
    artifact_id: Uuid,
    activity_type: String,
    trained_at: DateTime<Utc>,
    features: Vec<Feature>,
    transform: StandardScaler,
    reference: TopDecileReference,
    report: TrainingReport,
}

/// Directory of per-activity model artifacts
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Paths of the regressor and attributes documents for an activity type
    fn document_paths(&self, activity_type: &str) -> Result<(PathBuf, PathBuf), RankError> {
        validate_activity_type(activity_type)?;
        Ok((
            self.dir.join(format!("{activity_type}{REGRESSOR_SUFFIX}")),
            self.dir.join(format!("{activity_type}{ATTRS_SUFFIX}")),
        ))
    }

    /// Persist an artifact under its activity type, replacing any previous one
    pub fn save(&self, artifact: &ModelArtifact) -> Result<(), RankError> {
        let (regressor_path, attrs_path) = self.document_paths(&artifact.activity_type)?;
        fs::create_dir_all(&self.dir)?;
        let (regressor, attrs) = artifact.split();

        fs::write(regressor_path, serde_json::to_string(&regressor)?)?;
        fs::write(attrs_path, serde_json::to_string_pretty(&attrs)?)?;

        info!(
            activity_type = %artifact.activity_type,
            artifact_id = %artifact.artifact_id,
            "saved model artifact"
        );
        Ok(())
    }

    /// Load the artifact for an activity type
    pub fn load(&self, activity_type: &str) -> Result<ModelArtifact, RankError> {
        let (regressor_path, attrs_path) = self.document_paths(activity_type)?;
        let regressor_json = read_document(&regressor_path, activity_type)?;
        let attrs_json = read_document(&attrs_path, activity_type)?;

        let regressor: RegressorDocument = serde_json::from_str(&regressor_json)
            .map_err(|e| RankError::ArtifactCorrupt(format!("{activity_type} regressor: {e}")))?;
        let attrs: AttrsDocument = serde_json::from_str(&attrs_json)
            .map_err(|e| RankError::ArtifactCorrupt(format!("{activity_type} attributes: {e}")))?;

        if regressor.artifact_id != attrs.artifact_id {
            return Err(RankError::ArtifactCorrupt(format!(
                "{activity_type}: regressor {} does not match attributes {}",
                regressor.artifact_id, attrs.artifact_id
            )));
        }

        validate_features(&attrs.features, regressor.regressor.input_dim())
            .map_err(|reason| RankError::ArtifactCorrupt(format!("{activity_type}: {reason}")))?;
        if !regressor.regressor.is_finite() {
            return Err(RankError::ArtifactCorrupt(format!(
                "{activity_type}: regressor weights are not finite"
            )));
        }

        Ok(ModelArtifact {
            artifact_id: attrs.artifact_id,
            activity_type: attrs.activity_type,
            trained_at: attrs.trained_at,
            features: attrs.features,
            transform: attrs.transform,
            reference: attrs.reference,
            regressor: regressor.regressor,
            report: attrs.report,
        })
    }

    /// Activity types with a stored attributes document, sorted
    pub fn list(&self) -> Result<Vec<String>, RankError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut activities = Vec::new();
        for entry in entries {
            let name = entry?.file_name();
            if let Some(activity) = name.to_str().and_then(|n| n.strip_suffix(ATTRS_SUFFIX)) {
                activities.push(activity.to_string());
            }
        }
        activities.sort();
        Ok(activities)
    }
}

fn read_document(path: &Path, activity_type: &str) -> Result<String, RankError> {
    fs::read_to_string(path).map_err(|e| {
        if e.kind() == ErrorKind::NotFound {
            RankError::ArtifactNotFound(activity_type.to_string())
        } else {
            RankError::Io(e)
        }
    })
}

fn validate_features(features: &[Feature], input_dim: usize) -> Result<(), String> {
    if features.len() != input_dim {
        return Err(format!(
            "{} features listed for a {}-input regressor",
            features.len(),
            input_dim
        ));
    }
    for feature in Feature::ALL {
        if !features.contains(&feature) {
            return Err(format!("feature order is missing {feature}"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrainingConfig;
    use crate::regressor::MonitoredLoss;
    use crate::types::FeatureVector;
    use pretty_assertions::assert_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use tempfile::TempDir;

    fn make_artifact(activity: &str) -> ModelArtifact {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let vectors = vec![
            FeatureVector::from_array([187.0, 70.0, 5000.0, 6.0, 1.0]),
            FeatureVector::from_array([180.0, 85.0, 7000.0, 8.0, 1.6]),
        ];
        ModelArtifact::new(
            activity,
            StandardScaler::fit(&vectors).unwrap(),
            TopDecileReference {
                medians: vectors[1],
                sample_size: 1,
            },
            PercentileRegressor::new(5, &TrainingConfig::default(), &mut rng),
            TrainingReport {
                epochs_run: 12,
                best_epoch: 2,
                best_loss: 0.031,
                monitored: MonitoredLoss::Validation,
                train_size: 1,
                validation_size: 1,
            },
        )
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        let artifact = make_artifact("Running");

        store.save(&artifact).unwrap();
        let loaded = store.load("Running").unwrap();

        assert_eq!(loaded, artifact);
    }

    #[test]
    fn test_missing_artifact() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        let result = store.load("Yoga");
        assert!(matches!(result, Err(RankError::ArtifactNotFound(ref a)) if a == "Yoga"));
    }

    #[test]
    fn test_half_missing_pair_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        store.save(&make_artifact("Running")).unwrap();
        fs::remove_file(dir.path().join("Running.regressor.json")).unwrap();

        assert!(matches!(
            store.load("Running"),
            Err(RankError::ArtifactNotFound(_))
        ));
    }

    #[test]
    fn test_mismatched_ids_are_corrupt() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        store.save(&make_artifact("Running")).unwrap();

        // Replace only the attributes with those of a different training run.
        let other = make_artifact("Running");
        let (_, attrs) = other.split();
        fs::write(
            dir.path().join("Running.attrs.json"),
            serde_json::to_string(&attrs).unwrap(),
        )
        .unwrap();

        assert!(matches!(
            store.load("Running"),
            Err(RankError::ArtifactCorrupt(_))
        ));
    }

    #[test]
    fn test_activity_type_cannot_leave_store() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path().join("models"));

        let result = store.save(&make_artifact("../escaped"));
        assert!(matches!(result, Err(RankError::InvalidActivityType(_))));
        assert!(!dir.path().join("escaped.attrs.json").exists());

        assert!(matches!(
            store.load("../escaped"),
            Err(RankError::InvalidActivityType(_))
        ));
    }

    #[test]
    fn test_list() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path().join("models"));
        assert_eq!(store.list().unwrap(), Vec::<String>::new());

        store.save(&make_artifact("Running")).unwrap();
        store.save(&make_artifact("Cycling")).unwrap();
        assert_eq!(store.list().unwrap(), vec!["Cycling", "Running"]);
    }

    #[test]
    fn test_artifact_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ModelArtifact>();
    }
}
