//! FIT telemetry decoder
//!
//! Parses FIT activity files and maps their messages to telemetry messages.

use super::{ProfileFields, TelemetryDecoder, TelemetryMessage};
use crate::error::RankError;
use crate::types::RawSample;
use chrono::Utc;
use fitparser::profile::MesgNum;
use fitparser::{FitDataField, FitDataRecord, Value};

/// Smallest legal FIT header: size byte, protocol, profile, data size, ".FIT"
const MIN_HEADER_LEN: usize = 12;

/// FIT file decoder
pub struct FitDecoder;

impl TelemetryDecoder for FitDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<Vec<TelemetryMessage>, RankError> {
        check_header(bytes)?;

        let records = fitparser::from_bytes(bytes)
            .map_err(|e| RankError::Decode(format!("FIT parse error: {e}")))?;

        Ok(records.iter().map(convert_record).collect())
    }
}

/// Reject input that cannot start with a FIT file header.
///
/// The parser trusts the declared header size, so a short or empty buffer
/// must be caught here.
fn check_header(bytes: &[u8]) -> Result<(), RankError> {
    let declared = bytes.first().map_or(0, |size| usize::from(*size));
    if bytes.len() < MIN_HEADER_LEN || declared < MIN_HEADER_LEN || bytes.len() < declared {
        return Err(RankError::Decode(format!(
            "missing FIT header ({} bytes)",
            bytes.len()
        )));
    }
    if &bytes[8..12] != b".FIT" {
        return Err(RankError::Decode("missing .FIT signature".to_string()));
    }
    Ok(())
}

fn convert_record(record: &FitDataRecord) -> TelemetryMessage {
    match record.kind() {
        MesgNum::Record => TelemetryMessage::Record(sample_from_fields(record.fields())),
        MesgNum::Session | MesgNum::Activity | MesgNum::FileId | MesgNum::UserProfile => {
            TelemetryMessage::Profile(profile_from_fields(record.fields()))
        }
        _ => TelemetryMessage::Other,
    }
}

fn sample_from_fields(fields: &[FitDataField]) -> RawSample {
    let mut sample = RawSample::default();

    for field in fields {
        match field.name() {
            "heart_rate" => sample.heart_rate_bpm = value_as_f64(field.value()),
            "steps" => sample.steps = value_as_f64(field.value()).map(|v| v.max(0.0) as u64),
            "distance" => sample.distance_m = value_as_f64(field.value()),
            "timestamp" => {
                if let Value::Timestamp(t) = field.value() {
                    sample.timestamp = Some(t.with_timezone(&Utc));
                }
            }
            _ => {}
        }
    }

    sample
}

fn profile_from_fields(fields: &[FitDataField]) -> ProfileFields {
    let mut profile = ProfileFields::default();

    for field in fields {
        match field.name() {
            "total_calories" => profile.total_calories = value_as_f64(field.value()),
            "gender" => {
                if let Value::String(gender) = field.value() {
                    profile.gender = Some(gender.clone());
                }
            }
            "age" => profile.age = value_as_f64(field.value()),
            "weight" => profile.weight_kg = value_as_f64(field.value()),
            "height" => profile.height_m = value_as_f64(field.value()),
            _ => {}
        }
    }

    profile
}

/// Numeric view of a FIT field value; non-numeric values yield `None`
fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Byte(v) | Value::UInt8(v) | Value::UInt8z(v) => Some(f64::from(*v)),
        Value::SInt8(v) => Some(f64::from(*v)),
        Value::UInt16(v) | Value::UInt16z(v) => Some(f64::from(*v)),
        Value::SInt16(v) => Some(f64::from(*v)),
        Value::UInt32(v) | Value::UInt32z(v) => Some(f64::from(*v)),
        Value::SInt32(v) => Some(f64::from(*v)),
        Value::UInt64(v) | Value::UInt64z(v) => Some(*v as f64),
        Value::SInt64(v) => Some(*v as f64),
        Value::Float32(v) => Some(f64::from(*v)),
        Value::Float64(v) => Some(*v),
        _ => None,
    }
}
