//! Workout Rank - percentile ranking and improvement guidance for workouts
//!
//! Workout Rank turns exercise-session telemetry into a percentile rank within
//! same-activity workouts through a deterministic pipeline: telemetry decoding
//! → feature derivation → trained percentile regressor → rule-based guidance.
//!
//! ## Modules
//!
//! - **Ingestion**: Decode FIT telemetry and keep per-activity summary tables
//! - **Training**: Score a corpus, train the regressor, persist the artifact
//! - **Ranking**: Predict a workout's percentile and recommend improvements

pub mod artifact;
pub mod config;
pub mod corpus;
pub mod decoder;
pub mod error;
pub mod features;
pub mod inference;
pub mod pipeline;
pub mod recommend;
pub mod regressor;
pub mod scaler;
pub mod scoring;
pub mod stats;
pub mod summary_store;
pub mod training;
pub mod types;

pub use artifact::{ArtifactStore, ModelArtifact};
pub use config::{RankConfig, TrainingConfig};
pub use error::RankError;
pub use features::FeatureDeriver;
pub use inference::{predict_percentile, FeatureInput};
pub use pipeline::{classify_workout, ClassificationOutcome, WorkoutClassifier};
pub use recommend::recommend;
pub use scoring::CorpusScorer;
pub use summary_store::SummaryStore;
pub use training::{train_activity, train_corpora, TrainingInput, TrainingSummary};
pub use types::{Feature, FeatureVector, Recommendations, SessionSummary, TopDecileReference};

/// Crate version, recorded by the CLI's doctor report
pub const RANK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name
pub const PRODUCER_NAME: &str = "workout-rank";
