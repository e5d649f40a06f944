use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::fitting::FitOptions;
use crate::logging::LogConfig;
use crate::omnipd::{OmniPdParams, STANDARD_DURATIONS};
use crate::power_curve::DEFAULT_MMP_DURATIONS;
use crate::solver::SolverConfig;

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application metadata
    pub metadata: ConfigMetadata,

    /// Model fitting settings
    #[serde(default)]
    pub fit: FitSettings,

    /// Activity import and MMP extraction preferences
    #[serde(default)]
    pub import: ImportSettings,

    /// Report output preferences
    #[serde(default)]
    pub export: ExportSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LogConfig,
}

/// Configuration metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigMetadata {
    /// Configuration format version
    pub version: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,
}

/// Solver settings used by `omnipd fit` and `omnipd curve`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitSettings {
    pub max_iterations: usize,
    pub ftol: f64,
    pub xtol: f64,
    pub gtol: f64,
    pub initial_damping: f64,

    /// Overrides the data-derived starting point
    pub initial_guess: Option<OmniPdParams>,
}

/// Data import preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportSettings {
    /// Durations (seconds) extracted from activities
    pub mmp_durations: Vec<u32>,

    /// Shortest effort kept for fitting
    pub min_duration_secs: f64,

    /// Longest effort kept for fitting
    pub max_duration_secs: f64,

    /// Show a progress bar for directory imports
    pub show_progress: bool,
}

/// Report output preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    /// Format used when `--format` is not given (text, json, csv)
    pub default_format: String,

    /// Durations (seconds) the fitted curve is reported at
    pub curve_durations: Vec<u32>,

    /// Athlete body mass for W/kg columns
    pub athlete_mass_kg: Option<f64>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let now = Utc::now();

        AppConfig {
            metadata: ConfigMetadata {
                version: "1.0".to_string(),
                created_at: now,
                updated_at: now,
            },
            fit: FitSettings::default(),
            import: ImportSettings::default(),
            export: ExportSettings::default(),
            logging: LogConfig::default(),
        }
    }
}

impl Default for FitSettings {
    fn default() -> Self {
        let solver = SolverConfig::default();
        FitSettings {
            max_iterations: solver.max_iterations,
            ftol: solver.ftol,
            xtol: solver.xtol,
            gtol: solver.gtol,
            initial_damping: solver.initial_damping,
            initial_guess: None,
        }
    }
}

impl Default for ImportSettings {
    fn default() -> Self {
        ImportSettings {
            mmp_durations: DEFAULT_MMP_DURATIONS.to_vec(),
            min_duration_secs: 1.0,
            max_duration_secs: 4.0 * 3600.0,
            show_progress: true,
        }
    }
}

impl Default for ExportSettings {
    fn default() -> Self {
        ExportSettings {
            default_format: "text".to_string(),
            curve_durations: STANDARD_DURATIONS.to_vec(),
            athlete_mass_kg: None,
        }
    }
}

impl FitSettings {
    pub fn to_solver_config(&self) -> SolverConfig {
        SolverConfig {
            max_iterations: self.max_iterations,
            ftol: self.ftol,
            xtol: self.xtol,
            gtol: self.gtol,
            initial_damping: self.initial_damping,
        }
    }
}

/// Configuration management implementation
impl AppConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: AppConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML configuration")?;

        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.metadata.updated_at = Utc::now();

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml_content = toml::to_string_pretty(self)
            .with_context(|| "Failed to serialize configuration to TOML")?;

        fs::write(&path, toml_content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// Get default configuration file path
    pub fn default_config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".omnipd")
            .join("config.toml")
    }

    /// Load `path` (or the default location), falling back to defaults when
    /// the file does not exist. A file that exists but fails to parse is an error.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let config_path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::default_config_path);

        if !config_path.exists() {
            tracing::debug!(path = %config_path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }
        Self::load_from_file(&config_path)
    }

    /// Fit options derived from the solver settings
    pub fn to_fit_options(&self) -> FitOptions {
        FitOptions {
            solver: self.fit.to_solver_config(),
            initial_guess: self.fit.initial_guess,
        }
    }

    /// Look up a dotted key such as `fit.max_iterations`
    pub fn get(&self, key: &str) -> Result<toml::Value> {
        let root = toml::Value::try_from(self)?;
        let mut current = &root;
        for part in key.split('.') {
            current = current
                .get(part)
                .with_context(|| format!("Unknown configuration key: {}", key))?;
        }
        Ok(current.clone())
    }

    /// Set a dotted key from its string form. The value is parsed as a TOML
    /// literal first and as a plain string otherwise; the result must still
    /// deserialize into a valid configuration.
    pub fn set(&mut self, key: &str, raw: &str) -> Result<()> {
        let mut root = toml::Value::try_from(&*self)?;
        let parts: Vec<&str> = key.split('.').collect();
        let (last, parents) = parts
            .split_last()
            .with_context(|| format!("Invalid configuration key: {}", key))?;

        let mut table = root
            .as_table_mut()
            .with_context(|| "Configuration root is not a table")?;
        for part in parents {
            table = table
                .get_mut(*part)
                .and_then(toml::Value::as_table_mut)
                .with_context(|| format!("Unknown configuration section: {}", part))?;
        }

        // Only optional fields may be absent from the serialized form
        if !table.contains_key(*last) && !Self::is_optional_key(key) {
            anyhow::bail!("Unknown configuration key: {}", key);
        }
        table.insert(last.to_string(), parse_value(raw));

        *self = root
            .try_into()
            .with_context(|| format!("Invalid value for {}: {}", key, raw))?;
        Ok(())
    }

    /// All leaf keys with their values, sorted by key
    pub fn list(&self) -> Result<Vec<(String, String)>> {
        let root = toml::Value::try_from(self)?;
        let mut entries = Vec::new();
        flatten("", &root, &mut entries);
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }

    fn is_optional_key(key: &str) -> bool {
        matches!(
            key,
            "fit.initial_guess" | "export.athlete_mass_kg" | "logging.file_path"
        )
    }
}

fn parse_value(raw: &str) -> toml::Value {
    toml::from_str::<toml::Table>(&format!("value = {}", raw))
        .ok()
        .and_then(|mut t| t.remove("value"))
        .unwrap_or_else(|| toml::Value::String(raw.to_string()))
}

fn flatten(prefix: &str, value: &toml::Value, out: &mut Vec<(String, String)>) {
    match value {
        toml::Value::Table(table) => {
            for (key, child) in table {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten(&path, child, out);
            }
        }
        toml::Value::String(s) => out.push((prefix.to_string(), s.clone())),
        other => out.push((prefix.to_string(), other.to_string())),
    }
}
