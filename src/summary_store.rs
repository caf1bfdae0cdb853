//! Append-only summary tables
//!
//! One CSV table per activity type, one row per workout. The header is written
//! when the table is first created; later appends only add rows. The five
//! feature columns are left empty on append and filled by
//! [`SummaryStore::export_with_features`].

use crate::error::RankError;
use crate::features::FeatureDeriver;
use crate::types::{validate_activity_type, FeatureVector, SessionSummary};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const UNKNOWN: &str = "unknown";

/// One row of a summary table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    #[serde(rename = "Age", default = "unknown_field")]
    pub age: String,
    #[serde(rename = "Gender", default = "unknown_field")]
    pub gender: String,
    #[serde(rename = "Height (cm)", default = "unknown_field")]
    pub height_cm: String,
    #[serde(rename = "Weight (kg)", default = "unknown_field")]
    pub weight_kg: String,
    #[serde(rename = "Workout Type")]
    pub activity_type: String,
    #[serde(rename = "Workout Duration (mins)")]
    pub duration_minutes: f64,
    #[serde(rename = "Calories Burned", default)]
    pub calories: f64,
    #[serde(rename = "Heart Rate (bpm)")]
    pub mean_hr_bpm: f64,
    #[serde(rename = "Resting Heart Rate (bpm)", default = "unknown_field")]
    pub resting_hr_bpm: String,
    #[serde(rename = "Steps Taken", default)]
    pub total_steps: u64,
    #[serde(rename = "Distance (km)")]
    pub distance_km: f64,
    #[serde(rename = "HRmax", default)]
    pub hr_max: Option<f64>,
    #[serde(rename = "HR%", default)]
    pub hr_percent: Option<f64>,
    #[serde(rename = "TLI", default)]
    pub tli: Option<f64>,
    #[serde(rename = "MET", default)]
    pub met: Option<f64>,
    #[serde(rename = "WEI", default)]
    pub wei: Option<f64>,
}

fn unknown_field() -> String {
    UNKNOWN.to_string()
}

fn format_optional(value: Option<f64>) -> String {
    value.map_or_else(unknown_field, |v| v.to_string())
}

fn parse_optional(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok()
}

impl From<&SessionSummary> for SummaryRow {
    fn from(summary: &SessionSummary) -> Self {
        Self {
            age: format_optional(summary.age),
            gender: summary.gender.clone().unwrap_or_else(unknown_field),
            height_cm: format_optional(summary.height_cm),
            weight_kg: format_optional(summary.weight_kg),
            activity_type: summary.activity_type.clone(),
            duration_minutes: summary.duration_minutes,
            calories: summary.calories,
            mean_hr_bpm: summary.mean_hr_bpm,
            resting_hr_bpm: format_optional(summary.resting_hr_bpm),
            total_steps: summary.total_steps,
            distance_km: summary.distance_km,
            hr_max: None,
            hr_percent: None,
            tli: None,
            met: None,
            wei: None,
        }
    }
}

impl SummaryRow {
    /// Convert back to a session summary; "unknown" cells become `None`
    pub fn to_summary(&self) -> SessionSummary {
        let gender = match self.gender.trim() {
            "" | UNKNOWN | "N/A" => None,
            g => Some(g.to_string()),
        };

        SessionSummary {
            age: parse_optional(&self.age),
            gender,
            height_cm: parse_optional(&self.height_cm),
            weight_kg: parse_optional(&self.weight_kg),
            activity_type: self.activity_type.clone(),
            duration_minutes: self.duration_minutes,
            calories: self.calories,
            mean_hr_bpm: self.mean_hr_bpm,
            resting_hr_bpm: parse_optional(&self.resting_hr_bpm),
            total_steps: self.total_steps,
            distance_km: self.distance_km,
        }
    }

    pub fn with_features(mut self, features: &FeatureVector) -> Self {
        self.hr_max = Some(features.hr_max);
        self.hr_percent = Some(features.hr_percent);
        self.tli = Some(features.tli);
        self.met = Some(features.met);
        self.wei = Some(features.wei);
        self
    }
}

/// Directory of per-activity summary tables
#[derive(Debug, Clone)]
pub struct SummaryStore {
    dir: PathBuf,
}

impl SummaryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the table for an activity type
    pub fn table_path(&self, activity_type: &str) -> Result<PathBuf, RankError> {
        validate_activity_type(activity_type)?;
        Ok(self.dir.join(format!("{activity_type}_summaries.csv")))
    }

    /// Append one summary as a new row, creating the table with a header if needed.
    ///
    /// Requires `&mut self`: a store instance is the single writer for its
    /// tables. Writers in other processes must be serialized by the caller.
    pub fn append(&mut self, summary: &SessionSummary) -> Result<PathBuf, RankError> {
        let path = self.table_path(&summary.activity_type)?;
        fs::create_dir_all(&self.dir)?;
        append_row(&path, &SummaryRow::from(summary))?;
        info!(
            activity_type = %summary.activity_type,
            path = %path.display(),
            "appended session summary"
        );
        Ok(path)
    }

    /// Read every row of an activity's table back as session summaries
    pub fn read_all(&self, activity_type: &str) -> Result<Vec<SessionSummary>, RankError> {
        let rows = read_rows(&self.table_path(activity_type)?)?;
        Ok(rows.iter().map(SummaryRow::to_summary).collect())
    }

    /// Write the whole table to `dest` with the feature columns filled.
    ///
    /// Rows whose features cannot be derived keep empty feature cells.
    /// Returns the number of rows with derived features.
    pub fn export_with_features(&self, activity_type: &str, dest: &Path) -> Result<usize, RankError> {
        let rows = read_rows(&self.table_path(activity_type)?)?;
        let mut writer = csv::Writer::from_path(dest)?;
        let mut derived = 0;

        for (index, row) in rows.into_iter().enumerate() {
            let row = match FeatureDeriver::derive(&row.to_summary()) {
                Ok(features) => {
                    derived += 1;
                    row.with_features(&features)
                }
                Err(e) => {
                    warn!(row = index, error = %e, "features not derivable; leaving cells empty");
                    row
                }
            };
            writer.serialize(row)?;
        }

        writer.flush()?;
        Ok(derived)
    }
}

/// Append a row to a CSV table, writing the header only into an empty file
pub fn append_row<T: Serialize>(path: &Path, row: &T) -> Result<(), RankError> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let is_empty = file.metadata()?.len() == 0;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(is_empty)
        .from_writer(file);
    writer.serialize(row)?;
    writer.flush()?;
    Ok(())
}

/// Read every row of a summary-shaped CSV table
pub fn read_rows(path: &Path) -> Result<Vec<SummaryRow>, RankError> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for record in reader.deserialize() {
        rows.push(record?);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn make_summary(mean_hr: f64) -> SessionSummary {
        SessionSummary {
            age: Some(30.0),
            gender: Some("Male".to_string()),
            mean_hr_bpm: mean_hr,
            resting_hr_bpm: Some(60.0),
            duration_minutes: 40.0,
            distance_km: 8.0,
            total_steps: 6000,
            calories: 450.0,
            ..SessionSummary::new("Running")
        }
    }

    #[test]
    fn test_header_written_once() {
        let dir = TempDir::new().unwrap();
        let mut store = SummaryStore::new(dir.path());

        let path = store.append(&make_summary(140.0)).unwrap();
        store.append(&make_summary(150.0)).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let header_lines = content
            .lines()
            .filter(|l| l.starts_with("Age,Gender"))
            .count();
        assert_eq!(header_lines, 1);
        assert_eq!(content.lines().count(), 3);
    }

    #[test]
    fn test_round_trip_with_unknowns() {
        let dir = TempDir::new().unwrap();
        let mut store = SummaryStore::new(dir.path());

        let sparse = SessionSummary::new("Running");
        store.append(&make_summary(140.0)).unwrap();
        store.append(&sparse).unwrap();

        let summaries = store.read_all("Running").unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0], make_summary(140.0));
        assert_eq!(summaries[1], sparse);
    }

    #[test]
    fn test_feature_columns_empty_on_append() {
        let dir = TempDir::new().unwrap();
        let mut store = SummaryStore::new(dir.path());
        let path = store.append(&make_summary(140.0)).unwrap();

        let rows = read_rows(&path).unwrap();
        assert_eq!(rows[0].hr_max, None);
        assert_eq!(rows[0].wei, None);
    }

    #[test]
    fn test_activity_type_cannot_leave_store() {
        let dir = TempDir::new().unwrap();
        let mut store = SummaryStore::new(dir.path().join("summaries"));

        let result = store.append(&SessionSummary::new("../escaped"));
        assert!(matches!(result, Err(RankError::InvalidActivityType(_))));
        assert!(!dir.path().join("escaped_summaries.csv").exists());
        assert!(!dir.path().join("summaries").exists());

        assert!(matches!(
            store.read_all("a/b"),
            Err(RankError::InvalidActivityType(_))
        ));
    }

    #[test]
    fn test_export_with_features() {
        let dir = TempDir::new().unwrap();
        let mut store = SummaryStore::new(dir.path());
        store.append(&make_summary(140.0)).unwrap();
        store.append(&SessionSummary::new("Running")).unwrap();

        let dest = dir.path().join("Running_class.csv");
        let derived = store.export_with_features("Running", &dest).unwrap();
        assert_eq!(derived, 1);

        let rows = read_rows(&dest).unwrap();
        let expected = FeatureDeriver::derive(&make_summary(140.0)).unwrap();
        assert_eq!(rows[0].tli, Some(expected.tli));
        assert_eq!(rows[1].tli, None);
    }
}
