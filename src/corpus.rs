//! Corpus files
//!
//! Loading of per-activity corpus tables and partitioning of a mixed summary
//! dataset into one feature-annotated table per activity type.

use crate::error::RankError;
use crate::features::FeatureDeriver;
use crate::summary_store::read_rows;
use crate::types::{validate_activity_type, Feature, FeatureVector};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Feature columns of a corpus table; other columns are ignored
#[derive(Debug, Deserialize)]
struct CorpusRow {
    #[serde(rename = "HRmax", default)]
    hr_max: Option<f64>,
    #[serde(rename = "HR%", default)]
    hr_percent: Option<f64>,
    #[serde(rename = "TLI", default)]
    tli: Option<f64>,
    #[serde(rename = "MET", default)]
    met: Option<f64>,
    #[serde(rename = "WEI", default)]
    wei: Option<f64>,
}

impl CorpusRow {
    fn into_vector(self) -> Option<FeatureVector> {
        Some(FeatureVector {
            hr_max: self.hr_max?,
            hr_percent: self.hr_percent?,
            tli: self.tli?,
            met: self.met?,
            wei: self.wei?,
        })
    }
}

/// Load the feature vectors of a corpus table.
///
/// The table must carry all five feature columns. Rows with an empty or
/// non-finite feature cell are skipped.
pub fn load_corpus(path: &Path) -> Result<Vec<FeatureVector>, RankError> {
    let mut reader = csv::Reader::from_path(path)?;

    let headers = reader.headers()?.clone();
    for feature in Feature::ALL {
        if !headers.iter().any(|h| h.trim() == feature.as_str()) {
            return Err(RankError::MissingField(format!(
                "corpus {} has no {} column",
                path.display(),
                feature
            )));
        }
    }

    let mut vectors = Vec::new();
    let mut skipped = 0usize;
    for record in reader.deserialize::<CorpusRow>() {
        match record?.into_vector() {
            Some(v) if v.to_array().iter().all(|x| x.is_finite()) => vectors.push(v),
            _ => skipped += 1,
        }
    }

    if skipped > 0 {
        warn!(path = %path.display(), skipped, "skipped corpus rows with missing features");
    }
    info!(path = %path.display(), workouts = vectors.len(), "loaded corpus");

    Ok(vectors)
}

/// Activity type encoded in a corpus file name: the stem up to the first `_`
pub fn activity_from_path(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    let activity = stem.split('_').next().unwrap_or(stem);
    if activity.is_empty() {
        None
    } else {
        Some(activity.to_string())
    }
}

/// Path of the partitioned table for one activity type
pub fn analysis_path(out_dir: &Path, activity_type: &str) -> Result<PathBuf, RankError> {
    validate_activity_type(activity_type)?;
    Ok(out_dir.join(format!("{activity_type}_analysis.csv")))
}

/// Split a mixed summary dataset into `<type>_analysis.csv` tables with features.
///
/// Returns the number of rows written per activity type. Rows whose features
/// cannot be derived, or whose activity type cannot name a file, are skipped.
pub fn partition_by_activity(
    dataset: &Path,
    out_dir: &Path,
) -> Result<BTreeMap<String, usize>, RankError> {
    let rows = read_rows(dataset)?;
    fs::create_dir_all(out_dir)?;

    let mut writers: BTreeMap<String, csv::Writer<File>> = BTreeMap::new();
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();

    for (index, row) in rows.into_iter().enumerate() {
        let features = match FeatureDeriver::derive(&row.to_summary()) {
            Ok(features) => features,
            Err(e) => {
                warn!(row = index, error = %e, "skipping row without derivable features");
                continue;
            }
        };

        let activity = row.activity_type.trim().to_string();
        if !writers.contains_key(&activity) {
            let path = match analysis_path(out_dir, &activity) {
                Ok(path) => path,
                Err(e) => {
                    warn!(row = index, error = %e, "skipping row with unusable activity type");
                    continue;
                }
            };
            writers.insert(activity.clone(), csv::Writer::from_path(path)?);
        }
        if let Some(writer) = writers.get_mut(&activity) {
            writer.serialize(row.with_features(&features))?;
        }
        *counts.entry(activity).or_insert(0) += 1;
    }

    for writer in writers.values_mut() {
        writer.flush()?;
    }

    info!(
        dataset = %dataset.display(),
        activities = counts.len(),
        "partitioned dataset by activity type"
    );

    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summary_store::SummaryRow;
    use crate::types::SessionSummary;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_activity_from_path() {
        assert_eq!(
            activity_from_path(Path::new("data/Running_analysis.csv")),
            Some("Running".to_string())
        );
        assert_eq!(
            activity_from_path(Path::new("Cycling.csv")),
            Some("Cycling".to_string())
        );
        assert_eq!(activity_from_path(Path::new("_x.csv")), None);
    }

    #[test]
    fn test_load_corpus_ignores_extra_columns_and_skips_gaps() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Running_analysis.csv");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "Workout Type,HRmax,HR%,TLI,MET,WEI").unwrap();
        writeln!(file, "Running,187,80,6000,7,1.2").unwrap();
        writeln!(file, "Running,187,,6000,7,1.2").unwrap();
        writeln!(file, "Running,180,85,6500,7.5,1.4").unwrap();
        drop(file);

        let corpus = load_corpus(&path).unwrap();
        assert_eq!(corpus.len(), 2);
        assert_eq!(
            corpus[0],
            FeatureVector::from_array([187.0, 80.0, 6000.0, 7.0, 1.2])
        );
    }

    #[test]
    fn test_load_corpus_requires_feature_columns() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Bad.csv");
        fs::write(&path, "HRmax,HR%,TLI,MET\n180,80,6000,7\n").unwrap();

        assert!(matches!(
            load_corpus(&path),
            Err(RankError::MissingField(_))
        ));
    }

    #[test]
    fn test_partition_by_activity() {
        let dir = TempDir::new().unwrap();
        let dataset = dir.path().join("dataset.csv");

        let mut writer = csv::Writer::from_path(&dataset).unwrap();
        for (activity, rhr) in [
            ("Running", Some(60.0)),
            ("Cycling", Some(55.0)),
            ("Running", None),
            ("../Rowing", Some(58.0)),
        ] {
            let summary = SessionSummary {
                age: Some(30.0),
                duration_minutes: 45.0,
                mean_hr_bpm: 140.0,
                resting_hr_bpm: rhr,
                distance_km: 10.0,
                ..SessionSummary::new(activity)
            };
            writer.serialize(SummaryRow::from(&summary)).unwrap();
        }
        writer.flush().unwrap();
        drop(writer);

        let out = dir.path().join("out");
        let counts = partition_by_activity(&dataset, &out).unwrap();

        assert_eq!(counts.get("Running"), Some(&1));
        assert_eq!(counts.get("Cycling"), Some(&1));
        assert_eq!(counts.len(), 2);
        assert!(!dir.path().join("Rowing_analysis.csv").exists());

        let running = load_corpus(&analysis_path(&out, "Running").unwrap()).unwrap();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].tli, 140.0 * 45.0);
    }
}
