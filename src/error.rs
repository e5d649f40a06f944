//! Unified error hierarchy for OmniPD
//!
//! Every fallible library operation resolves to [`OmniPdError`], which keeps
//! the originating subsystem error and maps it onto a severity and a
//! user-facing message for the CLI.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for all OmniPD operations
#[derive(Debug, Error)]
pub enum OmniPdError {
    /// Model evaluation errors
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// Curve fitting errors
    #[error("Fit error: {0}")]
    Fit(#[from] FitError),

    /// Import errors
    #[error("Import error: {0}")]
    Import(#[from] ImportError),

    /// Export errors
    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised when evaluating the power-duration model
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    /// Duration is zero, negative or not a number
    #[error("Invalid duration: {0} s (must be finite and > 0)")]
    InvalidDuration(f64),

    /// A parameter is negative or not finite
    #[error("Invalid parameter {name}={value}")]
    InvalidParameter { name: &'static str, value: f64 },

    /// Saturation fraction outside (0, 1)
    #[error("Invalid fraction: {0} (must be in (0, 1))")]
    InvalidFraction(f64),
}

/// Errors raised by `calculate_omnipd_model`
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FitError {
    /// Fewer observations than the model needs
    #[error("Insufficient data: need at least {required} observations, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    /// Durations and powers of different length
    #[error("Length mismatch: {durations} durations vs {powers} powers")]
    LengthMismatch { durations: usize, powers: usize },

    /// Observation with an impossible value
    #[error("Invalid observation #{index}: {reason}")]
    InvalidObservation { index: usize, reason: String },

    /// The optimizer did not produce a usable solution
    #[error("Model fitting failed: {reason}")]
    FittingFailed { reason: String },
}

/// Import errors
#[derive(Debug, Error)]
pub enum ImportError {
    /// File not found at specified path
    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    /// No importer registered for the file
    #[error("Unsupported format: {path}")]
    UnsupportedFormat { path: PathBuf },

    /// Format-specific parsing error
    #[error("Parse error in {format}: {reason}")]
    ParseError { format: String, reason: String },

    /// Required column or field absent
    #[error("Missing required data: {field}")]
    MissingData { field: String },

    /// A duration string could not be parsed
    #[error("Invalid duration '{input}': {reason}")]
    InvalidDuration { input: String, reason: String },
}

/// Export errors
#[derive(Debug, Error)]
pub enum ExportError {
    /// Unknown export format name
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Serializer failure
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO failure while writing to a file
    #[error("Export failed to {path}: {reason}")]
    ExportFailed { path: PathBuf, reason: String },

    /// IO failure while writing to a stream
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for OmniPD operations
pub type Result<T> = std::result::Result<T, OmniPdError>;

impl OmniPdError {
    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            OmniPdError::Fit(FitError::InsufficientData { .. }) => ErrorSeverity::Warning,
            OmniPdError::Fit(FitError::InvalidObservation { .. }) => ErrorSeverity::Warning,
            OmniPdError::Import(ImportError::FileNotFound { .. }) => ErrorSeverity::Warning,
            OmniPdError::Import(ImportError::InvalidDuration { .. }) => ErrorSeverity::Warning,
            OmniPdError::Fit(FitError::FittingFailed { .. }) => ErrorSeverity::Error,
            OmniPdError::Configuration(_) => ErrorSeverity::Error,
            _ => ErrorSeverity::Error,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            OmniPdError::Fit(FitError::InsufficientData { required, actual }) => {
                format!(
                    "Not enough efforts to fit the model: {} given, at least {} needed.",
                    actual, required
                )
            }
            OmniPdError::Fit(FitError::FittingFailed { .. }) => {
                "The model could not be fitted to these efforts. Check for outliers or add efforts across more durations.".to_string()
            }
            OmniPdError::Import(ImportError::FileNotFound { path }) => {
                format!("Could not find activity file: {}", path.display())
            }
            _ => self.to_string(),
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Error that prevents the operation
    Error,
    /// Input problem the user can fix
    Warning,
}

impl ErrorSeverity {
    /// Convert to tracing level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            ErrorSeverity::Error => tracing::Level::ERROR,
            ErrorSeverity::Warning => tracing::Level::WARN,
        }
    }
}
