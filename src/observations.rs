//! Effort observations: duration parsing and (duration, power) sets
//!
//! Durations are accepted as plain seconds (`300`, `300.5`), clock notation
//! (`5:00`, `1:02:03`) or with a unit suffix (`30s`, `5min`, `1.5h`).

use csv::{ReaderBuilder, StringRecord, Trim};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::error::ImportError;
use crate::models::Observation;

/// Parse a duration string into seconds
pub fn parse_duration(input: &str) -> Result<f64, ImportError> {
    let seconds = parse_seconds(input)?;
    if seconds <= 0.0 {
        return Err(ImportError::InvalidDuration {
            input: input.to_string(),
            reason: "duration must be positive".to_string(),
        });
    }
    Ok(seconds)
}

/// Parse an elapsed time in seconds, where `0` and `0:00` are valid
pub fn parse_elapsed(input: &str) -> Result<f64, ImportError> {
    parse_seconds(input)
}

fn parse_seconds(input: &str) -> Result<f64, ImportError> {
    let invalid = |reason: &str| ImportError::InvalidDuration {
        input: input.to_string(),
        reason: reason.to_string(),
    };

    let text = input.trim().to_lowercase();
    if text.is_empty() {
        return Err(invalid("empty"));
    }

    let seconds = if text.contains(':') {
        let parts: Vec<&str> = text.split(':').collect();
        if parts.len() > 3 {
            return Err(invalid("too many ':' separated fields"));
        }
        let mut total = 0.0;
        for (i, part) in parts.iter().enumerate() {
            let value: f64 = part.parse().map_err(|_| invalid("non-numeric field"))?;
            // Only the leading field may exceed its unit
            if i > 0 && !(0.0..60.0).contains(&value) {
                return Err(invalid("minutes and seconds must be below 60"));
            }
            total = total * 60.0 + value;
        }
        total
    } else {
        let split = text
            .find(|c: char| c.is_ascii_alphabetic())
            .unwrap_or(text.len());
        let (number, unit) = text.split_at(split);
        let value: f64 = number
            .trim()
            .parse()
            .map_err(|_| invalid("not a number"))?;
        let scale = match unit.trim() {
            "" | "s" | "sec" | "secs" | "second" | "seconds" => 1.0,
            "m" | "min" | "mins" | "minute" | "minutes" => 60.0,
            "h" | "hr" | "hrs" | "hour" | "hours" => 3600.0,
            _ => return Err(invalid("unknown unit")),
        };
        value * scale
    };

    if !seconds.is_finite() || seconds < 0.0 {
        return Err(invalid("duration must not be negative"));
    }
    Ok(seconds)
}

/// Format seconds compactly for tables: `5s`, `5m`, `1h30m`
pub fn format_duration_label(seconds: f64) -> String {
    let secs = seconds.round() as u64;
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        if secs % 60 == 0 {
            format!("{}m", secs / 60)
        } else {
            format!("{}m{:02}s", secs / 60, secs % 60)
        }
    } else if secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else {
        format!("{}h{:02}m", secs / 3600, (secs % 3600) / 60)
    }
}

/// Ordered set of best efforts keyed by duration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservationSet {
    observations: Vec<Observation>,
}

impl ObservationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_observations(observations: impl IntoIterator<Item = Observation>) -> Self {
        let mut set = Self::new();
        for obs in observations {
            set.insert(obs);
        }
        set
    }

    /// Insert an effort, keeping the higher power when the duration exists.
    ///
    /// Returns `true` when the set changed.
    pub fn insert(&mut self, obs: Observation) -> bool {
        match self
            .observations
            .binary_search_by(|o| o.duration_secs.total_cmp(&obs.duration_secs))
        {
            Ok(i) => {
                if obs.power > self.observations[i].power {
                    self.observations[i] = obs;
                    true
                } else {
                    false
                }
            }
            Err(i) => {
                self.observations.insert(i, obs);
                true
            }
        }
    }

    /// Merge another set, keeping the best power per duration
    pub fn merge(&mut self, other: &ObservationSet) -> usize {
        other
            .observations
            .iter()
            .filter(|obs| self.insert(**obs))
            .count()
    }

    /// Keep only efforts within `[min_secs, max_secs]`
    pub fn retain_range(&mut self, min_secs: f64, max_secs: f64) {
        self.observations
            .retain(|o| o.duration_secs >= min_secs && o.duration_secs <= max_secs);
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn durations(&self) -> Vec<f64> {
        self.observations.iter().map(|o| o.duration_secs).collect()
    }

    pub fn powers(&self) -> Vec<f64> {
        self.observations.iter().map(|o| o.power).collect()
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}

const DURATION_COLUMNS: &[&str] = &["duration", "time", "seconds", "secs", "t", "interval"];
const POWER_COLUMNS: &[&str] = &["power", "watts", "watt", "w", "avg_power", "mmp"];

/// Load efforts from a CSV with a duration and a power column.
///
/// Header names are matched case-insensitively; without a recognised header
/// the first two columns are used.
pub fn load_observations_csv(path: &Path) -> Result<ObservationSet, ImportError> {
    if !path.exists() {
        return Err(ImportError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let parse_error = |reason: String| ImportError::ParseError {
        format: "CSV".to_string(),
        reason,
    };

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .trim(Trim::All)
        .flexible(true)
        .from_path(path)
        .map_err(|e| parse_error(e.to_string()))?;

    let mut records = reader.records();
    let first = match records.next() {
        Some(record) => record.map_err(|e| parse_error(e.to_string()))?,
        None => return Err(ImportError::MissingData {
            field: "observations".to_string(),
        }),
    };

    let mut set = ObservationSet::new();
    let (duration_col, power_col) = match detect_columns(&first) {
        Some(columns) => columns,
        None => {
            // No header row: the first record is data
            push_record(&mut set, &first, 0, 1, 1)?;
            (0, 1)
        }
    };

    for (line, record) in records.enumerate() {
        let record = record.map_err(|e| parse_error(e.to_string()))?;
        if record.iter().all(|field| field.is_empty()) {
            continue;
        }
        push_record(&mut set, &record, duration_col, power_col, line + 2)?;
    }

    debug!(path = %path.display(), observations = set.len(), "Loaded observations");
    Ok(set)
}

fn detect_columns(header: &StringRecord) -> Option<(usize, usize)> {
    let normalized: Vec<String> = header
        .iter()
        .map(|h| h.to_lowercase().replace([' ', '-'], "_"))
        .collect();
    let find = |names: &[&str]| {
        normalized
            .iter()
            .position(|h| names.iter().any(|n| h == n || h.starts_with(&format!("{}_", n))))
    };
    match (find(DURATION_COLUMNS), find(POWER_COLUMNS)) {
        (Some(d), Some(p)) if d != p => Some((d, p)),
        _ => None,
    }
}

fn push_record(
    set: &mut ObservationSet,
    record: &StringRecord,
    duration_col: usize,
    power_col: usize,
    line: usize,
) -> Result<(), ImportError> {
    let field = |col: usize, name: &str| {
        record.get(col).ok_or_else(|| ImportError::MissingData {
            field: format!("{} on line {}", name, line),
        })
    };

    let duration = parse_duration(field(duration_col, "duration")?)?;
    let raw_power = field(power_col, "power")?;
    let power: f64 = raw_power.parse().map_err(|_| ImportError::ParseError {
        format: "CSV".to_string(),
        reason: format!("invalid power '{}' on line {}", raw_power, line),
    })?;

    set.insert(Observation::new(duration, power));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_plain_seconds() {
        assert_eq!(parse_duration("300").unwrap(), 300.0);
        assert_eq!(parse_duration(" 12.5 ").unwrap(), 12.5);
    }

    #[test]
    fn test_parse_clock_notation() {
        assert_eq!(parse_duration("5:00").unwrap(), 300.0);
        assert_eq!(parse_duration("1:02:03").unwrap(), 3723.0);
        assert_eq!(parse_duration("90:00").unwrap(), 5400.0);
        assert!(parse_duration("1:75").is_err());
        assert!(parse_duration("1:2:3:4").is_err());
    }

    #[test]
    fn test_parse_unit_suffix() {
        assert_eq!(parse_duration("30s").unwrap(), 30.0);
        assert_eq!(parse_duration("5 min").unwrap(), 300.0);
        assert_eq!(parse_duration("1.5h").unwrap(), 5400.0);
        assert!(parse_duration("3 fortnights").is_err());
    }

    #[test]
    fn test_parse_rejects_non_positive() {
        assert!(parse_duration("0").is_err());
        assert!(parse_duration("-5").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn test_parse_elapsed_accepts_zero() {
        assert_eq!(parse_elapsed("0").unwrap(), 0.0);
        assert_eq!(parse_elapsed("0:00").unwrap(), 0.0);
        assert_eq!(parse_elapsed("1:01").unwrap(), 61.0);
        assert!(parse_elapsed("-1").is_err());
        assert!(parse_elapsed("lap 3").is_err());
    }

    #[test]
    fn test_format_duration_label() {
        assert_eq!(format_duration_label(5.0), "5s");
        assert_eq!(format_duration_label(300.0), "5m");
        assert_eq!(format_duration_label(90.0), "1m30s");
        assert_eq!(format_duration_label(3600.0), "1h");
        assert_eq!(format_duration_label(5400.0), "1h30m");
    }

    #[test]
    fn test_set_keeps_best_power_sorted() {
        let mut set = ObservationSet::new();
        assert!(set.insert(Observation::new(300.0, 320.0)));
        assert!(set.insert(Observation::new(60.0, 450.0)));
        assert!(!set.insert(Observation::new(300.0, 310.0)));
        assert!(set.insert(Observation::new(300.0, 330.0)));

        assert_eq!(set.durations(), vec![60.0, 300.0]);
        assert_eq!(set.powers(), vec![450.0, 330.0]);
    }

    #[test]
    fn test_merge_and_retain() {
        let mut a = ObservationSet::from_observations(vec![
            Observation::new(5.0, 900.0),
            Observation::new(600.0, 300.0),
        ]);
        let b = ObservationSet::from_observations(vec![
            Observation::new(5.0, 950.0),
            Observation::new(7200.0, 240.0),
        ]);
        assert_eq!(a.merge(&b), 2);
        assert_eq!(a.len(), 3);

        a.retain_range(10.0, 3600.0);
        assert_eq!(a.durations(), vec![600.0]);
    }

    #[test]
    fn test_load_csv_with_header() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "Duration,Power (W)").unwrap();
        writeln!(file, "0:05,950").unwrap();
        writeln!(file, "1min,520").unwrap();
        writeln!(file, "").unwrap();
        writeln!(file, "20:00,290").unwrap();

        let set = load_observations_csv(file.path()).unwrap();
        assert_eq!(set.durations(), vec![5.0, 60.0, 1200.0]);
        assert_eq!(set.powers(), vec![950.0, 520.0, 290.0]);
    }

    #[test]
    fn test_load_csv_without_header() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "180,360").unwrap();
        writeln!(file, "300,330").unwrap();

        let set = load_observations_csv(file.path()).unwrap();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_load_csv_bad_power() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "duration,power").unwrap();
        writeln!(file, "60,abc").unwrap();

        let err = load_observations_csv(file.path()).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}
