use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Sport types an activity can be recorded for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sport {
    Cycling,
    Running,
    Rowing,
    Other,
}

impl Sport {
    /// Parse the sport names commonly found in activity exports
    pub fn parse(sport_str: &str) -> Sport {
        match sport_str.trim().to_lowercase().as_str() {
            "cycling" | "bike" | "biking" | "ride" | "virtualride" => Sport::Cycling,
            "running" | "run" | "virtualrun" => Sport::Running,
            "rowing" | "row" => Sport::Rowing,
            _ => Sport::Other,
        }
    }
}

/// Individual sample in time-series activity data
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    /// Timestamp in seconds from activity start
    pub timestamp: u32,

    /// Power output in watts
    pub power: Option<u16>,

    /// Heart rate in beats per minute
    pub heart_rate: Option<u16>,

    /// Cadence in revolutions (or steps) per minute
    pub cadence: Option<u16>,

    /// Speed in meters per second
    pub speed: Option<f64>,

    /// Cumulative distance in meters
    pub distance: Option<f64>,

    /// Altitude in meters
    pub elevation: Option<f64>,
}

impl DataPoint {
    pub fn at(timestamp: u32) -> Self {
        Self {
            timestamp,
            ..Default::default()
        }
    }
}

/// Summary metrics calculated from activity samples
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivitySummary {
    pub avg_power: Option<u16>,
    pub max_power: Option<u16>,
    pub avg_heart_rate: Option<u16>,
    pub max_heart_rate: Option<u16>,
    pub avg_cadence: Option<u16>,

    /// Total distance in meters
    pub total_distance: Option<f64>,

    /// Mechanical work in joules (1 Hz samples assumed between timestamps)
    pub work: Option<f64>,
}

impl ActivitySummary {
    pub fn from_samples(samples: &[DataPoint]) -> Self {
        fn average(values: impl Iterator<Item = u16>) -> Option<u16> {
            let (sum, count) = values.fold((0u64, 0u64), |(s, c), v| (s + v as u64, c + 1));
            if count == 0 {
                None
            } else {
                Some((sum / count) as u16)
            }
        }

        let work = {
            let mut total = 0.0;
            let mut any = false;
            for pair in samples.windows(2) {
                if let Some(p) = pair[0].power {
                    total += p as f64 * pair[1].timestamp.saturating_sub(pair[0].timestamp) as f64;
                    any = true;
                }
            }
            any.then_some(total)
        };

        Self {
            avg_power: average(samples.iter().filter_map(|dp| dp.power)),
            max_power: samples.iter().filter_map(|dp| dp.power).max(),
            avg_heart_rate: average(samples.iter().filter_map(|dp| dp.heart_rate)),
            max_heart_rate: samples.iter().filter_map(|dp| dp.heart_rate).max(),
            avg_cadence: average(samples.iter().filter_map(|dp| dp.cadence)),
            total_distance: samples.iter().rev().find_map(|dp| dp.distance),
            work,
        }
    }
}

/// A recorded activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    /// Unique identifier for the activity
    pub id: String,

    /// Date of the activity
    pub date: NaiveDate,

    /// Absolute start time when the source carries one
    pub start_time: Option<DateTime<Utc>>,

    pub sport: Sport,

    /// Elapsed duration in seconds
    pub duration_seconds: u32,

    /// Time-series samples
    pub samples: Vec<DataPoint>,

    pub summary: ActivitySummary,

    /// Original file name or source identifier
    pub source: Option<String>,
}

impl Activity {
    /// Whether any sample carries a power reading
    pub fn has_power(&self) -> bool {
        self.samples.iter().any(|dp| dp.power.is_some())
    }
}

/// A single (duration, power) effort used for model fitting
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Effort duration in seconds
    pub duration_secs: f64,

    /// Mean power over the effort in watts
    pub power: f64,
}

impl Observation {
    pub fn new(duration_secs: f64, power: f64) -> Self {
        Self {
            duration_secs,
            power,
        }
    }
}
