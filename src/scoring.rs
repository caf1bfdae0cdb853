//! Corpus scoring
//!
//! Ranks every workout of a same-activity corpus:
//! 1. fit a standardization transform on the whole corpus
//! 2. composite score = mean of the five standardized features
//! 3. percentile rank of each composite among all composites
//! 4. top decile = rows ranked at or above the 90th percentile of the ranks
//! 5. reference = per-feature median over the top decile
//!
//! The ranks are the regressor's training target and the reference is the
//! recommendation engine's baseline.

use crate::error::RankError;
use crate::scaler::StandardScaler;
use crate::stats::{mean, median, percentile, percentile_of_score};
use crate::types::{Feature, FeatureVector, TopDecileReference};
use tracing::info;

/// Percentile of the rank distribution that opens the top decile
pub const TOP_DECILE_PERCENTILE: f64 = 90.0;

/// Result of scoring one corpus
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCorpus {
    /// Composite score per workout, in corpus order
    pub composites: Vec<f64>,
    /// Percentile rank (0-100) per workout, in corpus order
    pub percentile_ranks: Vec<f64>,
    pub reference: TopDecileReference,
    /// Transform fitted on the whole corpus; used for ranking only
    pub transform: StandardScaler,
}

impl ScoredCorpus {
    /// Ranks scaled to the regressor's 0-1 target range
    pub fn targets(&self) -> Vec<f64> {
        self.percentile_ranks.iter().map(|r| r / 100.0).collect()
    }
}

/// Corpus scorer
pub struct CorpusScorer;

impl CorpusScorer {
    pub fn score(corpus: &[FeatureVector]) -> Result<ScoredCorpus, RankError> {
        if corpus.is_empty() {
            return Err(RankError::InsufficientData(
                "corpus contains no workouts".to_string(),
            ));
        }

        let transform = StandardScaler::fit(corpus)?;
        let composites: Vec<f64> = transform
            .transform_all(corpus)
            .iter()
            .map(|z| mean(z).unwrap_or(0.0))
            .collect();

        let percentile_ranks: Vec<f64> = composites
            .iter()
            .map(|&c| percentile_of_score(&composites, c).unwrap_or(0.0))
            .collect();

        let reference = top_decile_reference(corpus, &percentile_ranks);

        info!(
            workouts = corpus.len(),
            top_decile = reference.sample_size,
            "scored corpus"
        );

        Ok(ScoredCorpus {
            composites,
            percentile_ranks,
            reference,
            transform,
        })
    }
}

fn top_decile_reference(corpus: &[FeatureVector], ranks: &[f64]) -> TopDecileReference {
    let threshold = percentile(ranks, TOP_DECILE_PERCENTILE).unwrap_or(100.0);
    let mut selected: Vec<&FeatureVector> = corpus
        .iter()
        .zip(ranks)
        .filter(|(_, &rank)| rank >= threshold)
        .map(|(v, _)| v)
        .collect();

    // Interpolation can land a hair above the best rank; keep the best rows then.
    if selected.is_empty() {
        let best = ranks.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        selected = corpus
            .iter()
            .zip(ranks)
            .filter(|(_, &rank)| rank == best)
            .map(|(v, _)| v)
            .collect();
    }

    let mut medians = [0.0; 5];
    for feature in Feature::ALL {
        let column: Vec<f64> = selected.iter().map(|v| v.get(feature)).collect();
        medians[feature.index()] = median(&column).unwrap_or(0.0);
    }

    TopDecileReference {
        medians: FeatureVector::from_array(medians),
        sample_size: selected.len(),
    }
}
