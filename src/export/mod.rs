//! Fit reports and their JSON, CSV and text renderings

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{ExportError, ModelError};
use crate::fitting::OmniPdFit;
use crate::observations::format_duration_label;
use crate::omnipd::OmniPdParams;
use crate::solver::Termination;
use crate::units::watts_per_kg;

pub mod csv;
pub mod json;
pub mod text;

/// Export format types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Csv,
    Text,
}

impl std::str::FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            "text" | "txt" | "table" => Ok(ExportFormat::Text),
            _ => Err(ExportError::UnsupportedFormat(s.to_string())),
        }
    }
}

/// Goodness-of-fit figures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitStatistics {
    pub rmse: f64,
    pub mae: f64,
    pub r_squared: Option<f64>,
    pub observation_count: usize,
    pub iterations: usize,
    pub termination: Termination,
}

/// Model prediction at one duration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveRow {
    pub duration_secs: f64,
    pub label: String,
    pub power: f64,
    pub w_eff: f64,
    pub watts_per_kg: Option<f64>,
}

/// Observed effort next to its fitted value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRow {
    pub duration_secs: f64,
    pub label: String,
    pub observed: f64,
    pub fitted: f64,
    /// Fitted minus observed, in watts
    pub residual: f64,
}

/// Complete fit report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitReport {
    pub generated_at: DateTime<Utc>,
    /// Where the efforts came from (file or directory)
    pub source: Option<String>,
    pub athlete_mass_kg: Option<f64>,
    pub params: OmniPdParams,
    pub statistics: FitStatistics,
    pub curve: Vec<CurveRow>,
    pub observations: Vec<ObservationRow>,
}

impl FitReport {
    /// Build a report with the model curve evaluated at `curve_durations`
    pub fn from_fit(
        fit: &OmniPdFit,
        curve_durations: &[u32],
        athlete_mass_kg: Option<f64>,
    ) -> Result<Self, ModelError> {
        let durations: Vec<f64> = curve_durations.iter().map(|&d| d as f64).collect();
        let curve = Self::curve_rows(&fit.params, &durations, athlete_mass_kg)?;

        let observations = fit
            .observations
            .iter()
            .zip(&fit.residuals)
            .map(|(obs, residual)| ObservationRow {
                duration_secs: obs.duration_secs,
                label: format_duration_label(obs.duration_secs),
                observed: obs.power,
                fitted: obs.power + residual,
                residual: *residual,
            })
            .collect();

        Ok(Self {
            generated_at: Utc::now(),
            source: None,
            athlete_mass_kg,
            params: fit.params,
            statistics: FitStatistics {
                rmse: fit.rmse,
                mae: fit.mae,
                r_squared: fit.r_squared,
                observation_count: fit.observations.len(),
                iterations: fit.iterations,
                termination: fit.termination,
            },
            curve,
            observations,
        })
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Model curve rows for arbitrary parameters
    pub fn curve_rows(
        params: &OmniPdParams,
        durations: &[f64],
        athlete_mass_kg: Option<f64>,
    ) -> Result<Vec<CurveRow>, ModelError> {
        Ok(params
            .predict_curve(durations)?
            .into_iter()
            .map(|point| CurveRow {
                duration_secs: point.duration_secs,
                label: format_duration_label(point.duration_secs),
                power: point.power,
                w_eff: point.w_eff,
                watts_per_kg: athlete_mass_kg.and_then(|m| watts_per_kg(point.power, m)),
            })
            .collect())
    }
}

/// Write a report to any writer
pub fn write_report<W: Write>(
    report: &FitReport,
    format: ExportFormat,
    writer: &mut W,
) -> Result<(), ExportError> {
    match format {
        ExportFormat::Json => json::write_report(report, writer),
        ExportFormat::Csv => csv::write_report(report, writer),
        ExportFormat::Text => {
            writer.write_all(text::render_report(report).as_bytes())?;
            Ok(())
        }
    }
}

/// Write a report to a file, creating or truncating it
pub fn export_report<P: AsRef<Path>>(
    report: &FitReport,
    format: ExportFormat,
    output_path: P,
) -> Result<(), ExportError> {
    let path = output_path.as_ref();
    let failed = |e: &dyn std::fmt::Display| ExportError::ExportFailed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    let file = File::create(path).map_err(|e| failed(&e))?;
    let mut writer = BufWriter::new(file);
    write_report(report, format, &mut writer).map_err(|e| match e {
        ExportError::Io(io) => failed(&io),
        other => other,
    })?;
    writer.flush().map_err(|e| failed(&e))?;

    tracing::info!(path = %path.display(), format = ?format, "Report exported");
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::models::Observation;

    pub fn sample_fit() -> OmniPdFit {
        let params = OmniPdParams::new(250.0, 20_000.0, 1000.0, 30.0);
        let observations: Vec<Observation> = [5.0, 60.0, 300.0, 1200.0, 3600.0]
            .iter()
            .map(|&t| Observation::new(t, params.power_at(t).unwrap() + 2.0))
            .collect();
        OmniPdFit {
            params,
            rmse: 2.0,
            mae: 2.0,
            r_squared: Some(0.999),
            residuals: vec![-2.0; observations.len()],
            observations,
            iterations: 12,
            termination: Termination::CostTolerance,
        }
    }

    pub fn sample_report() -> FitReport {
        FitReport::from_fit(&sample_fit(), &[1, 60, 300, 3600], Some(70.0)).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_export_format_parsing() {
        assert_eq!("JSON".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert_eq!("txt".parse::<ExportFormat>().unwrap(), ExportFormat::Text);
        assert!(matches!(
            "pdf".parse::<ExportFormat>(),
            Err(ExportError::UnsupportedFormat(f)) if f == "pdf"
        ));
    }

    #[test]
    fn test_report_rows() {
        let report = sample_report();
        assert_eq!(report.curve.len(), 4);
        assert_eq!(report.curve[1].label, "1m");
        let row = &report.curve[3];
        assert!((row.watts_per_kg.unwrap() - row.power / 70.0).abs() < 1e-12);

        assert_eq!(report.observations.len(), 5);
        for obs in &report.observations {
            assert!((obs.fitted - obs.observed - obs.residual).abs() < 1e-9);
            assert!((obs.fitted - report.params.power_at(obs.duration_secs).unwrap()).abs() < 1e-9);
        }
        assert_eq!(report.statistics.observation_count, 5);
    }

    #[test]
    fn test_curve_rows_reject_bad_duration() {
        let params = OmniPdParams::new(250.0, 20_000.0, 1000.0, 30.0);
        assert!(FitReport::curve_rows(&params, &[60.0, 0.0], None).is_err());
    }

    #[test]
    fn test_export_report_to_file() {
        let dir = tempdir().unwrap();
        let report = sample_report().with_source("efforts.csv");

        for (format, name) in [
            (ExportFormat::Json, "report.json"),
            (ExportFormat::Csv, "report.csv"),
            (ExportFormat::Text, "report.txt"),
        ] {
            let path = dir.path().join(name);
            export_report(&report, format, &path).unwrap();
            assert!(std::fs::metadata(&path).unwrap().len() > 0);
        }

        let err = export_report(&report, ExportFormat::Json, dir.path().join("no/such/dir.json"))
            .unwrap_err();
        assert!(matches!(err, ExportError::ExportFailed { .. }));
    }
}
