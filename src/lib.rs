// Library interface for OmniPD modules
// This allows integration tests and benchmarks to access the core functionality

pub mod config;
pub mod error;
pub mod export;
pub mod fitting;
pub mod import;
pub mod logging;
pub mod models;
pub mod observations;
pub mod omnipd;
pub mod power_curve;
pub mod solver;
pub mod units;

// Re-export commonly used types for convenience
pub use models::*;
pub use error::{OmniPdError, Result};
pub use fitting::{calculate_omnipd_model, calculate_omnipd_model_with, FitOptions, OmniPdFit};
pub use logging::{LogConfig, LogFormat, LogLevel};
pub use omnipd::{ompd_power, ompd_power_short, w_eff, OmniPdParams, TCP_MAX};
