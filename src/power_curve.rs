//! Mean-maximal power (MMP) extraction
//!
//! Turns activity samples into the best average power for a set of
//! durations, which become the observations the OmniPD model is fitted to.

use tracing::{debug, warn};

use crate::import::validation::MAX_ACTIVITY_SPAN_SECS;
use crate::models::{Activity, DataPoint, Observation};
use crate::observations::ObservationSet;

/// Durations (seconds) extracted by default
pub const DEFAULT_MMP_DURATIONS: [u32; 12] = [1, 5, 15, 30, 60, 120, 180, 300, 600, 1200, 1800, 3600];

/// Resample power to a 1 Hz series indexed by seconds from the first sample.
///
/// Samples must be sorted by timestamp. Each sample's power holds until the
/// next sample's timestamp; samples without power contribute 0 W. Spans
/// longer than [`MAX_ACTIVITY_SPAN_SECS`] give an empty series.
pub fn resample_power(samples: &[DataPoint]) -> Vec<f64> {
    let first = match samples.first() {
        Some(dp) => dp.timestamp,
        None => return Vec::new(),
    };
    let last = samples.last().map(|dp| dp.timestamp).unwrap_or(first);
    if last.saturating_sub(first) > MAX_ACTIVITY_SPAN_SECS {
        warn!(span = last.saturating_sub(first), "Sample span too long to resample");
        return Vec::new();
    }
    let mut series = vec![0.0; last.saturating_sub(first) as usize + 1];

    for pair in samples.windows(2) {
        let start = pair[0].timestamp.saturating_sub(first) as usize;
        let end = pair[1].timestamp.saturating_sub(first) as usize;
        let power = pair[0].power.unwrap_or(0) as f64;
        for slot in &mut series[start..end.max(start + 1)] {
            *slot = power;
        }
    }
    if let Some(dp) = samples.last() {
        series[dp.timestamp.saturating_sub(first) as usize] = dp.power.unwrap_or(0) as f64;
    }
    series
}

/// Best average over any window of `duration_secs` in a 1 Hz series
pub fn mean_maximal_power(series: &[f64], duration_secs: u32) -> Option<f64> {
    let window = duration_secs as usize;
    if window == 0 || series.len() < window {
        return None;
    }

    let mut prefix = Vec::with_capacity(series.len() + 1);
    prefix.push(0.0);
    for &p in series {
        let last = prefix[prefix.len() - 1];
        prefix.push(last + p);
    }

    (window..=series.len())
        .map(|end| (prefix[end] - prefix[end - window]) / window as f64)
        .reduce(f64::max)
}

/// MMP observations for one activity
pub struct MmpExtractor {
    durations: Vec<u32>,
}

impl MmpExtractor {
    pub fn new() -> Self {
        Self {
            durations: DEFAULT_MMP_DURATIONS.to_vec(),
        }
    }

    pub fn with_durations(mut durations: Vec<u32>) -> Self {
        durations.retain(|&d| d > 0);
        durations.sort_unstable();
        durations.dedup();
        Self { durations }
    }

    pub fn durations(&self) -> &[u32] {
        &self.durations
    }

    /// Extract the MMP set for a single activity
    pub fn extract(&self, activity: &Activity) -> ObservationSet {
        let series = resample_power(&activity.samples);
        let set = ObservationSet::from_observations(self.durations.iter().filter_map(|&d| {
            mean_maximal_power(&series, d).map(|power| Observation::new(d as f64, power))
        }));
        debug!(
            activity = %activity.id,
            seconds = series.len(),
            observations = set.len(),
            "Extracted MMP curve"
        );
        set
    }

    /// Best-of MMP set across several activities
    pub fn extract_best(&self, activities: &[Activity]) -> ObservationSet {
        let mut best = ObservationSet::new();
        for activity in activities.iter().filter(|a| a.has_power()) {
            best.merge(&self.extract(activity));
        }
        best
    }
}

impl Default for MmpExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActivitySummary, Sport};
    use chrono::NaiveDate;

    fn activity(id: &str, powers: &[u16]) -> Activity {
        let samples: Vec<DataPoint> = powers
            .iter()
            .enumerate()
            .map(|(i, &p)| DataPoint {
                timestamp: i as u32,
                power: Some(p),
                ..Default::default()
            })
            .collect();
        Activity {
            id: id.to_string(),
            date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            start_time: None,
            sport: Sport::Cycling,
            duration_seconds: powers.len() as u32,
            summary: ActivitySummary::from_samples(&samples),
            samples,
            source: None,
        }
    }

    #[test]
    fn test_mean_maximal_power() {
        let series = [100.0, 200.0, 300.0, 400.0, 500.0, 400.0, 300.0, 200.0, 100.0];
        assert_eq!(mean_maximal_power(&series, 1), Some(500.0));
        let mmp3 = mean_maximal_power(&series, 3).unwrap();
        assert!((mmp3 - 1300.0 / 3.0).abs() < 1e-9);
        assert_eq!(mean_maximal_power(&series, 10), None);
        assert_eq!(mean_maximal_power(&series, 0), None);
    }

    #[test]
    fn test_resample_fills_gaps() {
        let samples = vec![
            DataPoint {
                timestamp: 10,
                power: Some(200),
                ..Default::default()
            },
            DataPoint {
                timestamp: 13,
                power: None,
                ..Default::default()
            },
            DataPoint {
                timestamp: 14,
                power: Some(300),
                ..Default::default()
            },
        ];
        assert_eq!(resample_power(&samples), vec![200.0, 200.0, 200.0, 0.0, 300.0]);
        assert!(resample_power(&[]).is_empty());

        let gap = [DataPoint::at(0), DataPoint::at(50_000_000)];
        assert!(resample_power(&gap).is_empty());
    }

    #[test]
    fn test_extract_skips_long_durations() {
        let a = activity("short", &[250; 90]);
        let set = MmpExtractor::new().extract(&a);
        assert_eq!(set.durations(), vec![1.0, 5.0, 15.0, 30.0, 60.0]);
        assert!(set.powers().iter().all(|&p| p == 250.0));
    }

    #[test]
    fn test_extract_best_across_activities() {
        let mut hard = vec![200u16; 120];
        hard[10..15].copy_from_slice(&[900; 5]);
        let a = activity("steady", &[280; 120]);
        let b = activity("sprint", &hard);

        let extractor = MmpExtractor::with_durations(vec![60, 5, 5, 0]);
        assert_eq!(extractor.durations(), &[5, 60]);

        let best = extractor.extract_best(&[a, b]);
        assert_eq!(best.powers(), vec![900.0, 280.0]);
    }
}
