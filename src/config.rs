//! Configuration
//!
//! Everything that touches the filesystem or tunes training is passed in
//! explicitly through these structs. Nothing happens at module load time.

use crate::error::RankError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default age used when neither the caller nor the device profile supplies one
pub const DEFAULT_AGE: f64 = 23.0;

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankConfig {
    /// Directory holding one model artifact pair per activity type
    pub models_dir: PathBuf,
    /// Directory holding one summary table per activity type
    pub summaries_dir: PathBuf,
    /// Age assumed for telemetry without a user profile
    pub default_age: f64,
    /// Regressor training parameters
    pub training: TrainingConfig,
}

impl Default for RankConfig {
    fn default() -> Self {
        Self {
            models_dir: PathBuf::from("models"),
            summaries_dir: PathBuf::from("summaries"),
            default_age: DEFAULT_AGE,
            training: TrainingConfig::default(),
        }
    }
}

impl RankConfig {
    /// Parse configuration from a TOML string; missing keys take their defaults
    pub fn from_toml_str(content: &str) -> Result<Self, RankError> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from a TOML file
    pub fn from_toml_file(path: &Path) -> Result<Self, RankError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn with_models_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.models_dir = dir.into();
        self
    }

    pub fn with_summaries_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.summaries_dir = dir.into();
        self
    }

    pub fn with_training(mut self, training: TrainingConfig) -> Self {
        self.training = training;
        self
    }
}

/// Regressor hyper-parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Width of the two hidden layers
    pub hidden_units: [usize; 2],
    /// Dropout rate applied after the first hidden layer
    pub dropout: f64,
    /// Adam learning rate
    pub learning_rate: f64,
    /// Maximum number of epochs
    pub epochs: usize,
    /// Mini-batch size
    pub batch_size: usize,
    /// Epochs without validation improvement before stopping
    pub patience: usize,
    /// Share of the corpus held out for validation
    pub validation_fraction: f64,
    /// Seed for the split, initialization, shuffling and dropout
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            hidden_units: [64, 32],
            dropout: 0.2,
            learning_rate: 0.001,
            epochs: 100,
            batch_size: 32,
            patience: 10,
            validation_fraction: 0.2,
            seed: 42,
        }
    }
}

impl TrainingConfig {
    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_patience(mut self, patience: usize) -> Self {
        self.patience = patience;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = RankConfig::default();
        assert_eq!(config.training.hidden_units, [64, 32]);
        assert_eq!(config.training.patience, 10);
        assert_eq!(config.training.seed, 42);
        assert_eq!(config.default_age, DEFAULT_AGE);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = RankConfig::from_toml_str(
            r#"
            models_dir = "/var/lib/rank/models"

            [training]
            epochs = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.models_dir, PathBuf::from("/var/lib/rank/models"));
        assert_eq!(config.summaries_dir, PathBuf::from("summaries"));
        assert_eq!(config.training.epochs, 250);
        assert_eq!(config.training.batch_size, 32);
    }

    #[test]
    fn test_invalid_toml() {
        let result = RankConfig::from_toml_str("models_dir = [1, 2");
        assert!(matches!(result, Err(RankError::Config(_))));
    }
}
