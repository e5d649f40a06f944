use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use fitparser::profile::MesgNum;
use fitparser::{FitDataRecord, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::debug;

use crate::import::{has_extension, validation::ActivityValidator, ImportFormat};
use crate::models::{Activity, ActivitySummary, DataPoint, Sport};

/// FIT file importer for Garmin native format
pub struct FitImporter;

impl FitImporter {
    pub fn new() -> Self {
        Self
    }

    /// Build an activity from decoded FIT messages
    fn activity_from_records(records: &[FitDataRecord], id: String) -> Result<Activity> {
        let mut samples = Vec::new();
        let mut start: Option<DateTime<Utc>> = None;
        let mut sport = Sport::Cycling;

        for record in records {
            match record.kind() {
                MesgNum::Record => {
                    if let Some(point) = Self::record_to_point(record, &mut start) {
                        samples.push(point);
                    }
                }
                MesgNum::Session | MesgNum::Sport => {
                    if let Some(field) = record.fields().iter().find(|f| f.name() == "sport") {
                        sport = Sport::parse(&field.value().to_string());
                    }
                }
                _ => {}
            }
        }

        if samples.is_empty() {
            anyhow::bail!(crate::error::ImportError::MissingData {
                field: "record messages".to_string(),
            });
        }

        Ok(Activity {
            id,
            date: start.unwrap_or_else(Utc::now).date_naive(),
            start_time: start,
            sport,
            duration_seconds: 0,
            summary: ActivitySummary::default(),
            samples,
            source: None,
        })
    }

    /// Convert one record message; records without a timestamp are skipped
    fn record_to_point(record: &FitDataRecord, start: &mut Option<DateTime<Utc>>) -> Option<DataPoint> {
        let mut point = DataPoint::default();
        let mut has_timestamp = false;

        for field in record.fields() {
            let value = field.value();
            match field.name() {
                "timestamp" => {
                    if let Value::Timestamp(ts) = value {
                        let utc = ts.with_timezone(&Utc);
                        let base = *start.get_or_insert(utc);
                        point.timestamp = (utc - base).num_seconds().max(0) as u32;
                        has_timestamp = true;
                    }
                }
                "power" => point.power = fit_value_to_f64(value).map(to_u16),
                "heart_rate" => point.heart_rate = fit_value_to_f64(value).map(to_u16),
                "cadence" => point.cadence = fit_value_to_f64(value).map(to_u16),
                "speed" | "enhanced_speed" => {
                    if let Some(v) = fit_value_to_f64(value) {
                        point.speed = Some(v);
                    }
                }
                "distance" => point.distance = fit_value_to_f64(value),
                "altitude" | "enhanced_altitude" => {
                    if let Some(v) = fit_value_to_f64(value) {
                        point.elevation = Some(v);
                    }
                }
                _ => {}
            }
        }

        has_timestamp.then_some(point)
    }
}

impl Default for FitImporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ImportFormat for FitImporter {
    fn can_import(&self, file_path: &Path) -> bool {
        has_extension(file_path, "fit")
    }

    fn import_file(&self, file_path: &Path) -> Result<Vec<Activity>> {
        let file = File::open(file_path)
            .with_context(|| format!("Failed to open FIT file: {}", file_path.display()))?;
        let mut reader = BufReader::new(file);

        let records = fitparser::from_reader(&mut reader).map_err(|e| {
            crate::error::ImportError::ParseError {
                format: "FIT".to_string(),
                reason: e.to_string(),
            }
        })?;
        debug!(file = %file_path.display(), messages = records.len(), "Decoded FIT file");

        let id = format!(
            "fit_{}",
            file_path.file_stem().unwrap_or_default().to_string_lossy()
        );
        let mut activity = Self::activity_from_records(&records, id)?;
        activity.source = Some(file_path.to_string_lossy().to_string());

        ActivityValidator::validate_activity(&mut activity)
            .with_context(|| format!("Invalid activity in {}", file_path.display()))?;

        Ok(vec![activity])
    }

    fn get_format_name(&self) -> &'static str {
        "FIT"
    }
}

fn to_u16(v: f64) -> u16 {
    v.round().clamp(0.0, u16::MAX as f64) as u16
}

/// Numeric view of a FIT field value
fn fit_value_to_f64(value: &Value) -> Option<f64> {
    let v = match value {
        Value::Float32(v) => *v as f64,
        Value::Float64(v) => *v,
        Value::SInt8(v) => *v as f64,
        Value::UInt8(v) | Value::UInt8z(v) | Value::Byte(v) => *v as f64,
        Value::SInt16(v) => *v as f64,
        Value::UInt16(v) | Value::UInt16z(v) => *v as f64,
        Value::SInt32(v) => *v as f64,
        Value::UInt32(v) | Value::UInt32z(v) => *v as f64,
        Value::SInt64(v) => *v as f64,
        Value::UInt64(v) | Value::UInt64z(v) => *v as f64,
        Value::Array(values) => return values.iter().find_map(fit_value_to_f64),
        _ => return None,
    };
    v.is_finite().then_some(v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    #[test]
    fn test_fit_value_conversion() {
        assert_eq!(fit_value_to_f64(&Value::UInt16(250)), Some(250.0));
        assert_eq!(fit_value_to_f64(&Value::Float64(f64::NAN)), None);
        assert_eq!(
            fit_value_to_f64(&Value::Array(vec![Value::String("x".into()), Value::UInt8(7)])),
            Some(7.0)
        );
        assert_eq!(fit_value_to_f64(&Value::String("300".into())), None);
        assert_eq!(to_u16(-4.0), 0);
        assert_eq!(to_u16(70000.0), u16::MAX);
    }

    #[test]
    fn test_extension_detection() {
        let importer = FitImporter::new();
        assert!(importer.can_import(Path::new("morning.FIT")));
        assert!(!importer.can_import(Path::new("morning.csv")));
    }

    #[test]
    fn test_garbage_file_is_parse_error() {
        let mut file = Builder::new().suffix(".fit").tempfile().unwrap();
        file.write_all(b"definitely not a fit file").unwrap();

        let err = FitImporter::new().import_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("FIT"));
    }
}
