//! Telemetry decoding
//!
//! This module turns a device telemetry stream into one [`SessionSummary`].
//! Decoding of the binary format is behind the [`TelemetryDecoder`] trait;
//! aggregation of the decoded messages lives in [`SessionAccumulator`] and
//! does not depend on any particular file format.

mod fit;

pub use fit::FitDecoder;

use crate::error::RankError;
use crate::stats::{mean, round_to};
use crate::types::{RawSample, SessionSummary, DISTANCE_SEED_KM};
use chrono::{DateTime, Utc};
use std::path::Path;
use tracing::debug;

/// One decoded message of a telemetry stream
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryMessage {
    /// Per-tick sample (`record` messages)
    Record(RawSample),
    /// Session-level metadata (`session`, `activity`, `file_id`, `user_profile`)
    Profile(ProfileFields),
    /// Any other message kind; counted but otherwise ignored
    Other,
}

/// Session or user-profile fields that override summary defaults
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileFields {
    pub total_calories: Option<f64>,
    pub gender: Option<String>,
    pub age: Option<f64>,
    pub weight_kg: Option<f64>,
    pub height_m: Option<f64>,
}

/// Values supplied by the caller for fields the telemetry may not carry
#[derive(Debug, Clone, PartialEq)]
pub struct DecoderDefaults {
    pub age: Option<f64>,
    pub activity_type: String,
}

impl DecoderDefaults {
    pub fn new(activity_type: impl Into<String>, age: f64) -> Self {
        Self {
            age: Some(age),
            activity_type: activity_type.into(),
        }
    }
}

/// Trait for telemetry format decoders
pub trait TelemetryDecoder {
    /// Decode raw bytes into a sequence of telemetry messages
    fn decode(&self, bytes: &[u8]) -> Result<Vec<TelemetryMessage>, RankError>;
}

/// Decode a FIT file on disk into a session summary
pub fn decode_file(path: &Path, defaults: &DecoderDefaults) -> Result<SessionSummary, RankError> {
    let bytes = std::fs::read(path)?;
    decode_summary(&FitDecoder, &bytes, defaults)
}

/// Decode bytes with the given decoder and aggregate them into a session summary
pub fn decode_summary(
    decoder: &dyn TelemetryDecoder,
    bytes: &[u8],
    defaults: &DecoderDefaults,
) -> Result<SessionSummary, RankError> {
    let messages = decoder.decode(bytes)?;
    SessionAccumulator::from_messages(&messages, defaults)
}

/// Running aggregation of telemetry messages into a session summary
#[derive(Debug, Clone)]
pub struct SessionAccumulator {
    heart_rates: Vec<f64>,
    total_steps: u64,
    distance_km: f64,
    first_timestamp: Option<DateTime<Utc>>,
    last_timestamp: Option<DateTime<Utc>>,
    overrides: ProfileFields,
    message_count: usize,
}

impl Default for SessionAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionAccumulator {
    pub fn new() -> Self {
        Self {
            heart_rates: Vec::new(),
            total_steps: 0,
            distance_km: DISTANCE_SEED_KM,
            first_timestamp: None,
            last_timestamp: None,
            overrides: ProfileFields::default(),
            message_count: 0,
        }
    }

    /// Aggregate a full message sequence
    pub fn from_messages(
        messages: &[TelemetryMessage],
        defaults: &DecoderDefaults,
    ) -> Result<SessionSummary, RankError> {
        let mut accumulator = Self::new();
        for message in messages {
            accumulator.add_message(message);
        }
        accumulator.finish(defaults)
    }

    pub fn add_message(&mut self, message: &TelemetryMessage) {
        self.message_count += 1;
        match message {
            TelemetryMessage::Record(sample) => self.add_sample(sample),
            TelemetryMessage::Profile(fields) => self.add_profile(fields),
            TelemetryMessage::Other => {}
        }
    }

    fn add_sample(&mut self, sample: &RawSample) {
        if let Some(hr) = sample.heart_rate_bpm {
            self.heart_rates.push(hr);
        }
        if let Some(steps) = sample.steps {
            self.total_steps += steps;
        }
        if let Some(meters) = sample.distance_m {
            self.distance_km += meters / 1000.0;
        }
        if let Some(ts) = sample.timestamp {
            if self.first_timestamp.is_none() {
                self.first_timestamp = Some(ts);
            }
            self.last_timestamp = Some(ts);
        }
    }

    // Later messages win, matching a top-to-bottom walk of the file.
    fn add_profile(&mut self, fields: &ProfileFields) {
        if fields.total_calories.is_some() {
            self.overrides.total_calories = fields.total_calories;
        }
        if fields.gender.is_some() {
            self.overrides.gender = fields.gender.clone();
        }
        if fields.age.is_some() {
            self.overrides.age = fields.age;
        }
        if fields.weight_kg.is_some() {
            self.overrides.weight_kg = fields.weight_kg;
        }
        if fields.height_m.is_some() {
            self.overrides.height_m = fields.height_m;
        }
    }

    /// Produce the summary; fails only if no message was ever added
    pub fn finish(self, defaults: &DecoderDefaults) -> Result<SessionSummary, RankError> {
        if self.message_count == 0 {
            return Err(RankError::MissingField(
                "telemetry stream contains no records".to_string(),
            ));
        }

        let duration_minutes = match (self.first_timestamp, self.last_timestamp) {
            (Some(start), Some(end)) => {
                round_to((end - start).num_milliseconds() as f64 / 60_000.0, 2)
            }
            _ => 0.0,
        };

        let mean_hr_bpm = mean(&self.heart_rates).map_or(0.0, |m| round_to(m, 2));
        let resting_hr_bpm = self.heart_rates.iter().copied().reduce(f64::min);

        let summary = SessionSummary {
            age: self.overrides.age.or(defaults.age),
            gender: self.overrides.gender.as_deref().map(title_case),
            height_cm: self.overrides.height_m.map(|m| round_to(m * 100.0, 1)),
            weight_kg: self.overrides.weight_kg.map(|kg| round_to(kg, 2)),
            activity_type: defaults.activity_type.clone(),
            duration_minutes,
            calories: self.overrides.total_calories.unwrap_or(0.0),
            mean_hr_bpm,
            resting_hr_bpm,
            total_steps: self.total_steps,
            distance_km: round_to(self.distance_km, 2),
        };

        debug!(
            messages = self.message_count,
            hr_samples = self.heart_rates.len(),
            duration_minutes = summary.duration_minutes,
            "aggregated telemetry into session summary"
        );

        Ok(summary)
    }
}

fn title_case(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}
