use crate::models::{Activity, ActivitySummary, DataPoint};
use anyhow::Result;
use tracing::debug;

/// Upper plausible power for a single sample in watts
pub const MAX_PLAUSIBLE_POWER: u16 = 2500;

/// Longest accepted span between the first and last sample
pub const MAX_ACTIVITY_SPAN_SECS: u32 = 48 * 3600;

/// Validate and clean activity data
pub struct ActivityValidator;

impl ActivityValidator {
    /// Validate a complete activity, cleaning its samples in place
    pub fn validate_activity(activity: &mut Activity) -> Result<()> {
        if activity.samples.is_empty() {
            anyhow::bail!("Activity {} has no samples", activity.id);
        }

        let removed = Self::clean_samples(&mut activity.samples);
        if removed > 0 {
            debug!(activity = %activity.id, removed, "Dropped implausible sample values");
        }

        if let (Some(first), Some(last)) = (activity.samples.first(), activity.samples.last()) {
            activity.duration_seconds = last.timestamp - first.timestamp;
        }
        if activity.duration_seconds == 0 {
            anyhow::bail!("Activity {} has zero duration", activity.id);
        }
        if activity.duration_seconds > MAX_ACTIVITY_SPAN_SECS {
            anyhow::bail!(
                "Activity {} spans {} s, more than the {} s limit",
                activity.id,
                activity.duration_seconds,
                MAX_ACTIVITY_SPAN_SECS
            );
        }
        activity.summary = ActivitySummary::from_samples(&activity.samples);

        Ok(())
    }

    /// Sort, dedup and scrub samples; returns how many values were dropped
    pub fn clean_samples(samples: &mut Vec<DataPoint>) -> usize {
        samples.sort_by_key(|dp| dp.timestamp);
        samples.dedup_by_key(|dp| dp.timestamp);

        samples.iter_mut().map(Self::clean_sample).sum()
    }

    fn clean_sample(point: &mut DataPoint) -> usize {
        let mut removed = 0;

        if point.power.is_some_and(|p| p > MAX_PLAUSIBLE_POWER) {
            point.power = None;
            removed += 1;
        }
        if point.heart_rate.is_some_and(|hr| !(30..=220).contains(&hr)) {
            point.heart_rate = None;
            removed += 1;
        }
        if point.cadence.is_some_and(|c| c > 300) {
            point.cadence = None;
            removed += 1;
        }
        // 100 m/s = 360 km/h
        if point.speed.is_some_and(|s| !s.is_finite() || !(0.0..=100.0).contains(&s)) {
            point.speed = None;
            removed += 1;
        }
        if point.distance.is_some_and(|d| !d.is_finite() || d < 0.0) {
            point.distance = None;
            removed += 1;
        }
        if point.elevation.is_some_and(|e| !e.is_finite()) {
            point.elevation = None;
            removed += 1;
        }

        removed
    }
}
