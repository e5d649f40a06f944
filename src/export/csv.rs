use super::{ExportError, FitReport};
use serde::Serialize;
use std::io::Write;

/// One CSV line; curve rows leave the observation columns empty and vice versa
#[derive(Debug, Serialize)]
struct ReportLine<'a> {
    section: &'static str,
    duration_secs: f64,
    duration: &'a str,
    model_power: f64,
    observed_power: Option<f64>,
    residual: Option<f64>,
    w_eff: Option<f64>,
    watts_per_kg: Option<f64>,
}

/// Write the fitted curve followed by the observed-vs-fitted rows
pub fn write_report<W: Write>(report: &FitReport, writer: &mut W) -> Result<(), ExportError> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    let curve = report.curve.iter().map(|row| ReportLine {
        section: "curve",
        duration_secs: row.duration_secs,
        duration: &row.label,
        model_power: round2(row.power),
        observed_power: None,
        residual: None,
        w_eff: Some(round2(row.w_eff)),
        watts_per_kg: row.watts_per_kg.map(round2),
    });
    let observed = report.observations.iter().map(|row| ReportLine {
        section: "observation",
        duration_secs: row.duration_secs,
        duration: &row.label,
        model_power: round2(row.fitted),
        observed_power: Some(row.observed),
        residual: Some(round2(row.residual)),
        w_eff: None,
        watts_per_kg: None,
    });

    for line in curve.chain(observed) {
        csv_writer
            .serialize(line)
            .map_err(|e| ExportError::Serialization(e.to_string()))?;
    }
    csv_writer.flush()?;
    Ok(())
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::test_support::sample_report;

    #[test]
    fn test_csv_sections() {
        let report = sample_report();
        let mut buf = Vec::new();
        write_report(&report, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();

        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "section,duration_secs,duration,model_power,observed_power,residual,w_eff,watts_per_kg"
        );
        assert_eq!(lines.len(), 1 + report.curve.len() + report.observations.len());
        assert!(lines[1].starts_with("curve,1.0,1s,"));
        assert!(lines.last().unwrap().starts_with("observation,3600.0,1h,"));
    }

    #[test]
    fn test_csv_parses_back() {
        let mut buf = Vec::new();
        write_report(&sample_report(), &mut buf).unwrap();

        let mut reader = csv::Reader::from_reader(buf.as_slice());
        let observations = reader
            .records()
            .map(|r| r.unwrap())
            .filter(|r| &r[0] == "observation")
            .count();
        assert_eq!(observations, 5);
    }
}
