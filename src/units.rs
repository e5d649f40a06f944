//! Unit conversions used when cleaning imports and formatting reports

/// Meters to kilometers
pub fn meters_to_km(meters: f64) -> f64 {
    meters / 1000.0
}

/// Meters per second to kilometers per hour
pub fn mps_to_kmh(mps: f64) -> f64 {
    mps * 3.6
}

/// Kilometers per hour to meters per second
pub fn kmh_to_mps(kmh: f64) -> f64 {
    kmh / 3.6
}

/// Joules to kilojoules
pub fn joules_to_kj(joules: f64) -> f64 {
    joules / 1000.0
}

/// Power per body mass in W/kg; `None` for a non-positive mass
pub fn watts_per_kg(watts: f64, mass_kg: f64) -> Option<f64> {
    (mass_kg > 0.0).then(|| watts / mass_kg)
}

/// Format seconds as `h:mm:ss` (or `m:ss` below one hour)
pub fn format_hms(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", m, s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions() {
        assert_eq!(meters_to_km(42195.0), 42.195);
        assert!((mps_to_kmh(10.0) - 36.0).abs() < 1e-12);
        assert!((kmh_to_mps(36.0) - 10.0).abs() < 1e-12);
        assert_eq!(joules_to_kj(20_000.0), 20.0);
        assert_eq!(watts_per_kg(300.0, 75.0), Some(4.0));
        assert_eq!(watts_per_kg(300.0, 0.0), None);
    }

    #[test]
    fn test_format_hms() {
        assert_eq!(format_hms(59.4), "0:59");
        assert_eq!(format_hms(300.0), "5:00");
        assert_eq!(format_hms(3723.0), "1:02:03");
    }
}
