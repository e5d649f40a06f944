use super::{ExportError, FitReport};
use std::io::Write;
use std::path::Path;

/// Write a fit report as pretty-printed JSON
pub fn write_report<W: Write>(report: &FitReport, writer: &mut W) -> Result<(), ExportError> {
    serde_json::to_writer_pretty(&mut *writer, report)
        .map_err(|e| ExportError::Serialization(e.to_string()))?;
    writeln!(writer)?;
    Ok(())
}

/// Read a report previously written with [`write_report`]
pub fn load_report<P: AsRef<Path>>(path: P) -> Result<FitReport, ExportError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ExportError::ExportFailed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    serde_json::from_str(&content).map_err(|e| ExportError::Serialization(e.to_string()))
}
