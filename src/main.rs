use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use std::io::Write;
use std::path::{Path, PathBuf};

use omnipd::config::AppConfig;
use omnipd::error::{ErrorSeverity, OmniPdError};
use omnipd::export::{self, ExportFormat, FitReport};
use omnipd::fitting::{fit_observations, OmniPdFit};
use omnipd::import::ImportManager;
use omnipd::logging::init_logging;
use omnipd::models::{Activity, Observation};
use omnipd::observations::{format_duration_label, load_observations_csv, parse_duration, ObservationSet};
use omnipd::omnipd::OmniPdParams;
use omnipd::power_curve::MmpExtractor;
use omnipd::units::format_hms;

/// OmniPD - Power-Duration Modelling CLI
///
/// Fits the OmniPD model (CP, W', Pmax, A) to best efforts and predicts
/// sustainable power for any duration.
#[derive(Parser)]
#[command(name = "omnipd")]
#[command(version)]
#[command(about = "OmniPD power-duration modelling CLI", long_about = None)]
struct Cli {
    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity of output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit the model to (duration, power) efforts
    Fit {
        /// CSV file with duration and power columns
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Effort as DURATION=WATTS, e.g. 5:00=330 (repeatable)
        #[arg(short, long = "point", value_name = "DURATION=WATTS")]
        points: Vec<String>,

        /// Output format (text, json, csv)
        #[arg(short = 'F', long)]
        format: Option<String>,

        /// Write the report to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Extract best efforts from activity files and fit the model
    Curve {
        /// Activity files or directories (CSV, FIT)
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Durations to extract, e.g. 5s,1m,5m,20m (defaults from config)
        #[arg(short, long, value_delimiter = ',')]
        durations: Vec<String>,

        /// Only print the extracted efforts
        #[arg(long)]
        efforts_only: bool,

        /// Output format (text, json, csv)
        #[arg(short = 'F', long)]
        format: Option<String>,

        /// Write the report to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Predict power from known model parameters
    Predict {
        /// Load parameters from a JSON report
        #[arg(long, conflicts_with_all = ["cp", "w_prime", "pmax", "a"])]
        report: Option<PathBuf>,

        /// Critical power in watts
        #[arg(long)]
        cp: Option<f64>,

        /// W' in joules
        #[arg(long)]
        w_prime: Option<f64>,

        /// Maximal power in watts
        #[arg(long)]
        pmax: Option<f64>,

        /// Long-duration decay coefficient
        #[arg(long)]
        a: Option<f64>,

        /// Durations to predict, e.g. 30s,5m,1h (defaults from config)
        #[arg(short, long, value_delimiter = ',')]
        durations: Vec<String>,

        /// Report how long this power can be held
        #[arg(long, value_name = "WATTS")]
        power: Option<f64>,
    },

    /// Configure application settings
    Config {
        /// List all configuration options
        #[arg(short, long)]
        list: bool,

        /// Set a configuration value (key=value)
        #[arg(short, long)]
        set: Option<String>,

        /// Get a configuration value
        #[arg(short, long)]
        get: Option<String>,

        /// Write a default configuration file
        #[arg(long)]
        init: bool,
    },
}

/// Longest duration searched for time to exhaustion
const TTE_HORIZON_SECS: f64 = 24.0 * 3600.0;

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        report_error(&e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;
    init_logging(&config.logging.clone().with_verbosity(cli.verbose))?;

    match cli.command {
        Commands::Fit {
            file,
            points,
            format,
            output,
        } => {
            let mut set = match &file {
                Some(path) => load_observations_csv(path).map_err(OmniPdError::from)?,
                None => ObservationSet::new(),
            };
            for point in &points {
                set.insert(parse_point(point)?);
            }
            if set.is_empty() {
                anyhow::bail!("No efforts given; use --file or --point");
            }

            let source = file.map(|p| p.display().to_string());
            let fit = fit_set(&config, &set)?;
            emit_report(&config, &fit, source, format.as_deref(), output.as_deref())?;
        }

        Commands::Curve {
            inputs,
            durations,
            efforts_only,
            format,
            output,
        } => {
            let activities = import_activities(&config, &inputs)?;
            let extractor = if durations.is_empty() {
                MmpExtractor::with_durations(config.import.mmp_durations.clone())
            } else {
                MmpExtractor::with_durations(
                    parse_durations(&durations)?
                        .into_iter()
                        .map(|d| d.round() as u32)
                        .collect(),
                )
            };

            let mut set = extractor.extract_best(&activities);
            set.retain_range(config.import.min_duration_secs, config.import.max_duration_secs);
            eprintln!(
                "{} {} efforts from {} activities",
                "✓".green(),
                set.len(),
                activities.len()
            );

            if efforts_only {
                print_efforts(&set);
                return Ok(());
            }

            let source = inputs
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ");
            let fit = fit_set(&config, &set)?;
            emit_report(&config, &fit, Some(source), format.as_deref(), output.as_deref())?;
        }

        Commands::Predict {
            report,
            cp,
            w_prime,
            pmax,
            a,
            durations,
            power,
        } => {
            let params = match report {
                Some(path) => export::json::load_report(&path).map_err(OmniPdError::from)?.params,
                None => OmniPdParams::new(
                    cp.context("--cp is required without --report")?,
                    w_prime.context("--w-prime is required without --report")?,
                    pmax.context("--pmax is required without --report")?,
                    a.context("--a is required without --report")?,
                ),
            };
            params.validate().map_err(OmniPdError::from)?;

            let durations = if durations.is_empty() {
                config.export.curve_durations.iter().map(|&d| d as f64).collect()
            } else {
                parse_durations(&durations)?
            };
            let rows = FitReport::curve_rows(&params, &durations, config.export.athlete_mass_kg)
                .map_err(OmniPdError::from)?;
            println!("{}", export::text::render_curve(&rows));

            if let Some(target) = power {
                match params
                    .time_to_exhaustion(target, TTE_HORIZON_SECS)
                    .map_err(OmniPdError::from)?
                {
                    Some(t) => println!(
                        "{:.0} W can be held for {}",
                        target,
                        format_hms(t).bold()
                    ),
                    None => println!(
                        "{:.0} W is sustainable beyond {}",
                        target,
                        format_hms(TTE_HORIZON_SECS)
                    ),
                }
            }
        }

        Commands::Config {
            list,
            set,
            get,
            init,
        } => {
            let path = cli
                .config
                .clone()
                .unwrap_or_else(AppConfig::default_config_path);

            if init {
                if path.exists() {
                    anyhow::bail!("Config file already exists: {}", path.display());
                }
                AppConfig::default().save_to_file(&path)?;
                println!("{} Wrote {}", "✓".green(), path.display());
            } else if let Some(key_value) = set {
                let (key, value) = key_value
                    .split_once('=')
                    .context("Expected key=value")?;
                config.set(key.trim(), value.trim())?;
                config.save_to_file(&path)?;
                println!("{} {} = {}", "✓".green(), key.trim(), value.trim());
            } else if let Some(key) = get {
                println!("{}", config.get(&key)?);
            } else if list {
                for (key, value) in config.list()? {
                    println!("{} = {}", key.cyan(), value);
                }
            } else {
                println!("Config file: {}", path.display());
            }
        }
    }

    Ok(())
}

fn parse_point(point: &str) -> Result<Observation> {
    let (duration, watts) = point
        .split_once('=')
        .with_context(|| format!("Expected DURATION=WATTS, got '{}'", point))?;
    let duration = parse_duration(duration).map_err(OmniPdError::from)?;
    let power: f64 = watts
        .trim()
        .trim_end_matches(['w', 'W'])
        .parse()
        .with_context(|| format!("Invalid power in '{}'", point))?;
    Ok(Observation::new(duration, power))
}

fn parse_durations(values: &[String]) -> Result<Vec<f64>> {
    values
        .iter()
        .map(|v| parse_duration(v).map_err(|e| anyhow::Error::from(OmniPdError::from(e))))
        .collect()
}

fn fit_set(config: &AppConfig, set: &ObservationSet) -> Result<OmniPdFit> {
    let fit = fit_observations(set.observations(), &config.to_fit_options())
        .map_err(OmniPdError::from)?;
    if let Some((obs, residual)) = fit.worst_observation() {
        if residual.abs() > 3.0 * fit.rmse.max(1.0) {
            eprintln!(
                "{} {} effort is {:+.0} W off the model",
                "!".yellow(),
                format_duration_label(obs.duration_secs),
                -residual
            );
        }
    }
    Ok(fit)
}

fn import_activities(config: &AppConfig, inputs: &[PathBuf]) -> Result<Vec<Activity>> {
    let manager = ImportManager::new();
    let mut activities = Vec::new();

    for input in inputs {
        if input.is_dir() {
            let outcome = manager.import_directory(input, config.import.show_progress)?;
            for (path, reason) in &outcome.failures {
                eprintln!("{} {}: {}", "✗".red(), path.display(), reason);
            }
            activities.extend(outcome.activities);
        } else {
            activities.extend(manager.import_file(input)?);
        }
    }

    if activities.is_empty() {
        anyhow::bail!("No activities imported");
    }
    Ok(activities)
}

fn print_efforts(set: &ObservationSet) {
    for obs in set.observations() {
        println!("{:>8}  {:>6.0} W", format_duration_label(obs.duration_secs), obs.power);
    }
}

fn emit_report(
    config: &AppConfig,
    fit: &OmniPdFit,
    source: Option<String>,
    format: Option<&str>,
    output: Option<&Path>,
) -> Result<()> {
    let format: ExportFormat = format
        .unwrap_or(config.export.default_format.as_str())
        .parse()
        .map_err(OmniPdError::from)?;

    let mut report = FitReport::from_fit(fit, &config.export.curve_durations, config.export.athlete_mass_kg)
        .map_err(OmniPdError::from)?;
    if let Some(source) = source {
        report = report.with_source(source);
    }

    match output {
        Some(path) => {
            export::export_report(&report, format, path).map_err(OmniPdError::from)?;
            println!("{} Report written to {}", "✓".green(), path.display());
        }
        None => {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            export::write_report(&report, format, &mut handle).map_err(OmniPdError::from)?;
            handle.flush()?;
        }
    }
    Ok(())
}

fn report_error(error: &anyhow::Error) {
    match error.downcast_ref::<OmniPdError>() {
        Some(err) => {
            tracing::debug!(error = %err, "Command failed");
            let message = err.user_message();
            match err.severity() {
                ErrorSeverity::Error => eprintln!("{} {}", "error:".red().bold(), message),
                ErrorSeverity::Warning => eprintln!("{} {}", "warning:".yellow().bold(), message),
            }
        }
        None => eprintln!("{} {:#}", "error:".red().bold(), error),
    }
}
