use super::{CurveRow, FitReport};
use std::fmt::Write;
use tabled::settings::{object::Columns, Alignment, Modify, Style};
use tabled::{Table, Tabled};

use crate::observations::format_duration_label;
use crate::units::{format_hms, joules_to_kj, watts_per_kg};

#[derive(Tabled)]
struct CurveLine {
    #[tabled(rename = "Duration")]
    duration: String,
    #[tabled(rename = "Power (W)")]
    power: String,
    #[tabled(rename = "W/kg")]
    watts_per_kg: String,
    #[tabled(rename = "W' used (kJ)")]
    w_eff: String,
}

#[derive(Tabled)]
struct ObservationLine {
    #[tabled(rename = "Duration")]
    duration: String,
    #[tabled(rename = "Observed (W)")]
    observed: String,
    #[tabled(rename = "Model (W)")]
    fitted: String,
    #[tabled(rename = "Residual (W)")]
    residual: String,
}

/// Table of model predictions
pub fn render_curve(rows: &[CurveRow]) -> String {
    let lines: Vec<CurveLine> = rows
        .iter()
        .map(|row| CurveLine {
            duration: row.label.clone(),
            power: format!("{:.0}", row.power),
            watts_per_kg: row
                .watts_per_kg
                .map_or_else(|| "-".to_string(), |v| format!("{:.2}", v)),
            w_eff: format!("{:.1}", joules_to_kj(row.w_eff)),
        })
        .collect();

    Table::new(lines)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..)).with(Alignment::right()))
        .to_string()
}

/// Human-readable report: parameters, statistics and both tables
pub fn render_report(report: &FitReport) -> String {
    let mut out = String::new();
    let p = &report.params;
    let stats = &report.statistics;

    let _ = writeln!(out, "OMNIPD MODEL FIT");
    let _ = writeln!(out, "Generated: {}", report.generated_at.format("%Y-%m-%d %H:%M:%S UTC"));
    if let Some(source) = &report.source {
        let _ = writeln!(out, "Source: {}", source);
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "PARAMETERS");
    let _ = writeln!(out, "  CP:    {:.1} W", p.cp);
    let _ = writeln!(out, "  W':    {:.0} J ({:.1} kJ)", p.w_prime, joules_to_kj(p.w_prime));
    let _ = writeln!(out, "  Pmax:  {:.0} W", p.pmax);
    let _ = writeln!(out, "  A:     {:.2}", p.a);
    if let Some(mass) = report.athlete_mass_kg {
        if let Some(relative) = watts_per_kg(p.cp, mass) {
            let _ = writeln!(out, "  CP/kg: {:.2} W/kg ({:.1} kg)", relative, mass);
        }
    }
    if let Ok(Some(t95)) = p.w_prime_saturation_time(0.95) {
        let _ = writeln!(out, "  95% of W' reached after {}", format_hms(t95));
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "FIT QUALITY");
    let _ = writeln!(out, "  Efforts: {}", stats.observation_count);
    let _ = writeln!(out, "  RMSE:    {:.2} W", stats.rmse);
    let _ = writeln!(out, "  MAE:     {:.2} W", stats.mae);
    match stats.r_squared {
        Some(r2) => {
            let _ = writeln!(out, "  R²:      {:.4}", r2);
        }
        None => {
            let _ = writeln!(out, "  R²:      n/a");
        }
    }
    let _ = writeln!(
        out,
        "  Solver:  {} iterations, {}",
        stats.iterations, stats.termination
    );
    let _ = writeln!(out);

    if !report.curve.is_empty() {
        let _ = writeln!(out, "POWER-DURATION CURVE");
        let _ = writeln!(out, "{}", render_curve(&report.curve));
        let _ = writeln!(out);
    }

    if !report.observations.is_empty() {
        let lines: Vec<ObservationLine> = report
            .observations
            .iter()
            .map(|row| ObservationLine {
                duration: format_duration_label(row.duration_secs),
                observed: format!("{:.0}", row.observed),
                fitted: format!("{:.0}", row.fitted),
                residual: format!("{:+.1}", row.residual),
            })
            .collect();
        let table = Table::new(lines)
            .with(Style::rounded())
            .with(Modify::new(Columns::new(1..)).with(Alignment::right()))
            .to_string();
        let _ = writeln!(out, "OBSERVED VS MODEL");
        let _ = writeln!(out, "{}", table);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::test_support::sample_report;

    #[test]
    fn test_render_report_sections() {
        let text = render_report(&sample_report().with_source("rides/"));
        assert!(text.contains("Source: rides/"));
        assert!(text.contains("CP:    250.0 W"));
        assert!(text.contains("CP/kg: 3.57 W/kg"));
        assert!(text.contains("POWER-DURATION CURVE"));
        assert!(text.contains("OBSERVED VS MODEL"));
        assert!(text.contains("-2.0"));
        assert!(text.contains("12 iterations, cost tolerance"));
    }

    #[test]
    fn test_render_report_skips_zero_mass() {
        let mut report = sample_report();
        report.athlete_mass_kg = Some(0.0);
        let text = render_report(&report);
        assert!(!text.contains("CP/kg"));
        assert!(!text.contains("inf"));
    }

    #[test]
    fn test_render_curve_without_mass() {
        let mut report = sample_report();
        for row in &mut report.curve {
            row.watts_per_kg = None;
        }
        let table = render_curve(&report.curve);
        assert!(table.contains("Duration"));
        assert!(table.contains("1h"));
        assert!(table.contains(" - "));
    }
}
