use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use csv::{ReaderBuilder, Trim};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

use crate::import::{has_extension, validation::ActivityValidator, ImportFormat};
use crate::models::{Activity, ActivitySummary, DataPoint, Sport};
use crate::observations::parse_elapsed;
use crate::units::kmh_to_mps;

/// Standard column a CSV header maps onto
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Timestamp,
    Power,
    HeartRate,
    Cadence,
    /// Speed in m/s
    Speed,
    /// Speed in km/h
    SpeedKmh,
    /// Distance in meters
    Distance,
    /// Distance in kilometers
    DistanceKm,
    Elevation,
    Sport,
}

/// CSV activity importer with flexible column mapping
pub struct CsvImporter {
    column_mapping: HashMap<String, Column>,
}

impl CsvImporter {
    pub fn new() -> Self {
        let mut column_mapping = HashMap::new();

        Self::add_mapping(
            &mut column_mapping,
            Column::Timestamp,
            &["timestamp", "time", "elapsed_time", "elapsed", "secs", "seconds"],
        );
        Self::add_mapping(&mut column_mapping, Column::Power, &["power", "watts", "power_watts"]);
        Self::add_mapping(
            &mut column_mapping,
            Column::HeartRate,
            &["heart_rate", "hr", "heartrate", "bpm"],
        );
        Self::add_mapping(&mut column_mapping, Column::Cadence, &["cadence", "rpm", "cad"]);
        Self::add_mapping(&mut column_mapping, Column::Speed, &["speed", "speed_ms", "velocity"]);
        Self::add_mapping(&mut column_mapping, Column::SpeedKmh, &["speed_kmh", "kph", "kmh"]);
        Self::add_mapping(&mut column_mapping, Column::Distance, &["distance", "dist", "distance_m"]);
        Self::add_mapping(&mut column_mapping, Column::DistanceKm, &["distance_km", "km"]);
        Self::add_mapping(
            &mut column_mapping,
            Column::Elevation,
            &["elevation", "altitude", "alt", "elev"],
        );
        Self::add_mapping(&mut column_mapping, Column::Sport, &["sport", "activity_type", "type"]);

        Self { column_mapping }
    }

    fn add_mapping(mapping: &mut HashMap<String, Column>, column: Column, variations: &[&str]) {
        for variation in variations {
            mapping.insert(variation.to_lowercase(), column);
        }
    }

    fn normalize_column_name(&self, name: &str) -> Option<Column> {
        let normalized = name
            .trim()
            .to_lowercase()
            .replace(['(', ')', '/'], "")
            .replace([' ', '-'], "_");
        self.column_mapping.get(normalized.trim_matches('_')).copied()
    }

    fn parse_datetime(date_str: &str) -> Option<DateTime<Utc>> {
        let formats = [
            "%Y-%m-%d %H:%M:%S",
            "%Y-%m-%dT%H:%M:%S",
            "%Y-%m-%d %H:%M:%S%.f",
            "%Y-%m-%dT%H:%M:%S%.f",
            "%Y-%m-%dT%H:%M:%SZ",
            "%Y-%m-%dT%H:%M:%S%.fZ",
            "%d/%m/%Y %H:%M:%S",
        ];

        formats.iter().find_map(|format| {
            NaiveDateTime::parse_from_str(date_str, format)
                .ok()
                .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
        })
    }

    fn parse_number(value: &str) -> Option<f64> {
        value.replace(',', ".").parse::<f64>().ok().filter(|v| v.is_finite())
    }

    fn activity_id(file_path: &Path) -> String {
        format!(
            "csv_{}",
            file_path
                .file_stem()
                .unwrap_or_default()
                .to_string_lossy()
                .replace(' ', "_")
        )
    }
}

impl Default for CsvImporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ImportFormat for CsvImporter {
    fn can_import(&self, file_path: &Path) -> bool {
        has_extension(file_path, "csv")
    }

    fn import_file(&self, file_path: &Path) -> Result<Vec<Activity>> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .trim(Trim::All)
            .flexible(true)
            .from_path(file_path)
            .with_context(|| format!("Failed to open CSV file: {}", file_path.display()))?;

        let headers = reader.headers()?.clone();
        let header_mapping: Vec<Option<Column>> = headers
            .iter()
            .map(|header| self.normalize_column_name(header))
            .collect();

        if !header_mapping.contains(&Some(Column::Power)) {
            anyhow::bail!(crate::error::ImportError::MissingData {
                field: "power column".to_string(),
            });
        }

        let mut samples = Vec::new();
        let mut start_time: Option<DateTime<Utc>> = None;
        let mut sport = Sport::Cycling;

        for (row, result) in reader.records().enumerate() {
            let record = result?;
            // Rows without a time column are taken as 1 Hz
            let mut point = DataPoint::at(row as u32);

            for (value, column) in record.iter().zip(&header_mapping) {
                let Some(column) = column else { continue };
                if value.is_empty() {
                    continue;
                }

                match column {
                    Column::Timestamp => {
                        if let Some(dt) = Self::parse_datetime(value) {
                            let start = *start_time.get_or_insert(dt);
                            point.timestamp = (dt - start).num_seconds().max(0) as u32;
                        } else {
                            match parse_elapsed(value) {
                                Ok(elapsed) => point.timestamp = elapsed.round() as u32,
                                Err(e) => debug!(
                                    row,
                                    value,
                                    error = %e,
                                    "Unparseable time cell, using row index"
                                ),
                            }
                        }
                    }
                    Column::Power => {
                        point.power = Self::parse_number(value)
                            .filter(|p| *p >= 0.0)
                            .map(|p| p.round().min(u16::MAX as f64) as u16);
                    }
                    Column::HeartRate => {
                        point.heart_rate = Self::parse_number(value)
                            .filter(|v| *v >= 0.0)
                            .map(|v| v.round().min(u16::MAX as f64) as u16);
                    }
                    Column::Cadence => {
                        point.cadence = Self::parse_number(value)
                            .filter(|v| *v >= 0.0)
                            .map(|v| v.round().min(u16::MAX as f64) as u16);
                    }
                    Column::Speed => point.speed = Self::parse_number(value),
                    Column::SpeedKmh => point.speed = Self::parse_number(value).map(kmh_to_mps),
                    Column::Distance => point.distance = Self::parse_number(value),
                    Column::DistanceKm => {
                        point.distance = Self::parse_number(value).map(|km| km * 1000.0)
                    }
                    Column::Elevation => point.elevation = Self::parse_number(value),
                    Column::Sport => {
                        if row == 0 {
                            sport = Sport::parse(value);
                        }
                    }
                }
            }

            samples.push(point);
        }

        if samples.is_empty() {
            anyhow::bail!("No valid data points found in CSV file");
        }

        let date = start_time.unwrap_or_else(Utc::now).date_naive();
        let mut activity = Activity {
            id: Self::activity_id(file_path),
            date,
            start_time,
            sport,
            duration_seconds: 0,
            summary: ActivitySummary::default(),
            samples,
            source: Some(file_path.to_string_lossy().to_string()),
        };

        ActivityValidator::validate_activity(&mut activity)
            .with_context(|| format!("Invalid activity in {}", file_path.display()))?;

        Ok(vec![activity])
    }

    fn get_format_name(&self) -> &'static str {
        "CSV"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    fn csv_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = Builder::new().suffix(".csv").tempfile().unwrap();
        write!(file, "{}", contents).unwrap();
        file
    }

    #[test]
    fn test_column_normalization() {
        let importer = CsvImporter::new();
        assert_eq!(importer.normalize_column_name("Heart Rate"), Some(Column::HeartRate));
        assert_eq!(importer.normalize_column_name("Speed (km/h)"), Some(Column::SpeedKmh));
        assert_eq!(importer.normalize_column_name("Watts"), Some(Column::Power));
        assert_eq!(importer.normalize_column_name("lap"), None);
    }

    #[test]
    fn test_import_elapsed_clock_times() {
        let file = csv_file(
            "time,power,hr,speed_kmh,distance_km\n\
             0:00,200,120,36,0\n\
             0:01,250,121,36,0.01\n\
             0:02,,122,36,0.02\n\
             0:03,300,123,36,0.03\n",
        );

        let activities = CsvImporter::new().import_file(file.path()).unwrap();
        let activity = &activities[0];
        assert_eq!(activity.samples.len(), 4);
        assert_eq!(activity.duration_seconds, 3);
        assert_eq!(activity.samples[2].power, None);
        assert!((activity.samples[0].speed.unwrap() - 10.0).abs() < 1e-9);
        assert!((activity.summary.total_distance.unwrap() - 30.0).abs() < 1e-9);
        assert_eq!(activity.summary.max_power, Some(300));
    }

    #[test]
    fn test_import_datetimes_sets_start() {
        let file = csv_file(
            "timestamp,watts,sport\n\
             2024-06-01 08:00:00,180,Ride\n\
             2024-06-01 08:00:05,220,Ride\n",
        );

        let activity = CsvImporter::new().import_file(file.path()).unwrap().remove(0);
        assert_eq!(activity.date.to_string(), "2024-06-01");
        assert_eq!(activity.samples[1].timestamp, 5);
        assert_eq!(activity.sport, Sport::Cycling);
        assert!(activity.start_time.is_some());
    }

    #[test]
    fn test_rows_without_time_are_one_hz() {
        let file = csv_file("power\n100\n200\n300\n");
        let activity = CsvImporter::new().import_file(file.path()).unwrap().remove(0);
        assert_eq!(activity.duration_seconds, 2);
    }

    #[test]
    fn test_elapsed_seconds_from_zero() {
        let file = csv_file("secs,power\n0,100\n10,110\nlap,120\n30,130\n");
        let activity = CsvImporter::new().import_file(file.path()).unwrap().remove(0);
        let timestamps: Vec<u32> = activity.samples.iter().map(|dp| dp.timestamp).collect();
        // The bad cell falls back to its row index
        assert_eq!(timestamps, vec![0, 2, 10, 30]);
        assert_eq!(activity.duration_seconds, 30);
    }

    #[test]
    fn test_missing_power_column() {
        let file = csv_file("time,hr\n0,120\n1,121\n");
        let err = CsvImporter::new().import_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("power"));
    }
}
