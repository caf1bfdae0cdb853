//! Error types for workout ranking

use thiserror::Error;

/// Errors that can occur while ingesting, scoring, training or ranking
#[derive(Debug, Error)]
pub enum RankError {
    #[error("Failed to decode telemetry: {0}")]
    Decode(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Division by zero while computing {0}")]
    DivisionByZero(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Training did not converge: {0}")]
    Convergence(String),

    #[error("Unknown or missing feature: {0}")]
    UnknownFeature(String),

    #[error("Invalid activity type: {0:?}")]
    InvalidActivityType(String),

    #[error("No model artifact for activity type: {0}")]
    ArtifactNotFound(String),

    #[error("Corrupt model artifact: {0}")]
    ArtifactCorrupt(String),

    #[error("Invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl RankError {
    /// Whether a caller should report this as "unavailable" / "invalid input"
    /// rather than treat it as a failure of the system.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RankError::ArtifactNotFound(_)
                | RankError::UnknownFeature(_)
                | RankError::InvalidActivityType(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_errors() {
        assert!(RankError::ArtifactNotFound("Yoga".to_string()).is_recoverable());
        assert!(RankError::UnknownFeature("WEI".to_string()).is_recoverable());
        assert!(RankError::InvalidActivityType("../x".to_string()).is_recoverable());
        assert!(!RankError::Decode("bad header".to_string()).is_recoverable());
        assert!(!RankError::InsufficientData("empty".to_string()).is_recoverable());
    }

    #[test]
    fn test_display() {
        let err = RankError::DivisionByZero("TLI reference".to_string());
        assert_eq!(err.to_string(), "Division by zero while computing TLI reference");
    }
}
