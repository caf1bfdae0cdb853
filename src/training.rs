//! Offline training
//!
//! One-shot batch step per activity type: score the corpus, train the
//! percentile regressor on the ranks and persist the resulting artifact.

use crate::artifact::{ArtifactStore, ModelArtifact};
use crate::config::TrainingConfig;
use crate::corpus::{activity_from_path, load_corpus};
use crate::error::RankError;
use crate::inference::predict_vector;
use crate::regressor::PercentileRegressor;
use crate::scaler::StandardScaler;
use crate::scoring::CorpusScorer;
use crate::types::{Feature, FeatureVector};
use ndarray::{Array1, Array2};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

/// Canned workout scored after each model is trained
pub const SELF_CHECK_WORKOUT: FeatureVector = FeatureVector {
    hr_max: 160.0,
    hr_percent: 75.0,
    tli: 7000.0,
    met: 6.5,
    wei: 1.1,
};

/// Split `0..n` into `(train, validation)` with a seeded shuffle.
///
/// Validation takes the first `ceil(fraction * n)` shuffled indices, but
/// never every row: at least one row is always left for training.
pub fn split_indices(n: usize, fraction: f64, rng: &mut ChaCha8Rng) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(rng);

    let wanted = (fraction.clamp(0.0, 1.0) * n as f64).ceil() as usize;
    let validation_size = wanted.min(n.saturating_sub(1));
    let training = indices.split_off(validation_size);
    (training, indices)
}

fn to_matrix(vectors: &[&FeatureVector], transform: &StandardScaler) -> Array2<f64> {
    let mut matrix = Array2::zeros((vectors.len(), Feature::ALL.len()));
    for (mut row, vector) in matrix.rows_mut().into_iter().zip(vectors) {
        for (cell, value) in row.iter_mut().zip(transform.transform(vector)) {
            *cell = value;
        }
    }
    matrix
}

/// Score a corpus and train the regressor for one activity type
pub fn train_activity(
    activity_type: &str,
    corpus: &[FeatureVector],
    config: &TrainingConfig,
) -> Result<ModelArtifact, RankError> {
    let scored = CorpusScorer::score(corpus)?;
    let targets = scored.targets();

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let (train_idx, val_idx) = split_indices(corpus.len(), config.validation_fraction, &mut rng);

    let train_vectors: Vec<&FeatureVector> = train_idx.iter().map(|&i| &corpus[i]).collect();
    let val_vectors: Vec<&FeatureVector> = val_idx.iter().map(|&i| &corpus[i]).collect();

    let owned_train: Vec<FeatureVector> = train_vectors.iter().map(|v| **v).collect();
    let transform = StandardScaler::fit(&owned_train)?;

    let x_train = to_matrix(&train_vectors, &transform);
    let y_train: Array1<f64> = train_idx.iter().map(|&i| targets[i]).collect();
    let x_val = to_matrix(&val_vectors, &transform);
    let y_val: Array1<f64> = val_idx.iter().map(|&i| targets[i]).collect();

    let mut regressor = PercentileRegressor::new(Feature::ALL.len(), config, &mut rng);
    let report = regressor.fit((&x_train, &y_train), (&x_val, &y_val), config, &mut rng)?;

    info!(
        activity_type,
        workouts = corpus.len(),
        best_epoch = report.best_epoch,
        best_loss = report.best_loss,
        "trained activity model"
    );

    Ok(ModelArtifact::new(
        activity_type,
        transform,
        scored.reference,
        regressor,
        report,
    ))
}

/// One corpus file to train from
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingInput {
    pub activity_type: String,
    pub corpus_path: PathBuf,
}

impl TrainingInput {
    pub fn new(activity_type: impl Into<String>, corpus_path: impl Into<PathBuf>) -> Self {
        Self {
            activity_type: activity_type.into(),
            corpus_path: corpus_path.into(),
        }
    }

    /// Take the activity type from the file name (`Running_analysis.csv` -> `Running`)
    pub fn from_path(path: &Path) -> Option<Self> {
        activity_from_path(path).map(|activity| Self::new(activity, path))
    }
}

/// A successfully trained activity
#[derive(Debug, Clone, PartialEq)]
pub struct TrainedActivity {
    pub activity_type: String,
    pub artifact_id: Uuid,
    pub workouts: usize,
    /// Predicted percentile of [`SELF_CHECK_WORKOUT`]
    pub self_check_percentile: f64,
}

/// An activity that could not be trained
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedActivity {
    pub activity_type: String,
    pub reason: String,
}

/// Outcome of a batch training run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingSummary {
    pub trained: Vec<TrainedActivity>,
    pub skipped: Vec<SkippedActivity>,
}

/// Train and save a model for every input; failures are logged and skipped
pub fn train_corpora(
    inputs: &[TrainingInput],
    store: &ArtifactStore,
    config: &TrainingConfig,
) -> TrainingSummary {
    let mut summary = TrainingSummary::default();

    for input in inputs {
        match train_one(input, store, config) {
            Ok(trained) => {
                info!(
                    activity_type = %trained.activity_type,
                    self_check_percentile = trained.self_check_percentile,
                    "self-check workout scored"
                );
                summary.trained.push(trained);
            }
            Err(e) => {
                warn!(
                    activity_type = %input.activity_type,
                    corpus = %input.corpus_path.display(),
                    error = %e,
                    "skipping activity"
                );
                summary.skipped.push(SkippedActivity {
                    activity_type: input.activity_type.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    summary
}

fn train_one(
    input: &TrainingInput,
    store: &ArtifactStore,
    config: &TrainingConfig,
) -> Result<TrainedActivity, RankError> {
    let corpus = load_corpus(&input.corpus_path)?;
    let artifact = train_activity(&input.activity_type, &corpus, config)?;
    store.save(&artifact)?;

    Ok(TrainedActivity {
        activity_type: artifact.activity_type.clone(),
        artifact_id: artifact.artifact_id,
        workouts: corpus.len(),
        self_check_percentile: predict_vector(&SELF_CHECK_WORKOUT, &artifact)?,
    })
}

/// Seeded synthetic workouts for tests across the crate
#[cfg(test)]
pub(crate) fn synthetic_workouts(n: usize, seed: u64) -> Vec<FeatureVector> {
    use crate::features::FeatureDeriver;
    use crate::types::SessionSummary;
    use rand::Rng;

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            let effort: f64 = rng.gen_range(0.0..1.0);
            let duration = rng.gen_range(20.0..90.0);
            let summary = SessionSummary {
                age: Some(rng.gen_range(20.0..50.0)),
                mean_hr_bpm: 110.0 + 55.0 * effort + rng.gen_range(-5.0..5.0),
                resting_hr_bpm: Some(rng.gen_range(50.0..70.0)),
                duration_minutes: duration,
                distance_km: duration / 60.0 * (7.0 + 6.0 * effort),
                ..SessionSummary::new("Running")
            };
            FeatureDeriver::derive(&summary).unwrap()
        })
        .collect()
}
