//! OmniPD model fitting
//!
//! Fits [`OmniPdParams`] to (duration, power) efforts with bounded nonlinear
//! least squares and reports residual statistics.

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use tracing::{debug, info, warn};

use crate::error::FitError;
use crate::models::Observation;
use crate::omnipd::{ompd_power, ompd_power_gradient, OmniPdParams};
use crate::solver::{LeastSquaresProblem, LevenbergMarquardt, SolverConfig, Termination};

/// Fewest efforts the 4-parameter model can be fitted to
pub const MIN_OBSERVATIONS: usize = 4;

/// Percentile of observed powers used as the CP starting value
pub const CP_GUESS_PERCENTILE: f64 = 30.0;

/// Starting W' in joules
pub const W_PRIME_GUESS: f64 = 20_000.0;

/// Starting decay coefficient
pub const A_GUESS: f64 = 5.0;

/// Options controlling a fit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FitOptions {
    pub solver: SolverConfig,
    /// Replaces the data-derived starting point when set
    pub initial_guess: Option<OmniPdParams>,
}

/// Result of fitting the OmniPD model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OmniPdFit {
    pub params: OmniPdParams,
    /// Root-mean-square of the residuals in watts
    pub rmse: f64,
    /// Mean absolute residual in watts
    pub mae: f64,
    /// Coefficient of determination; `None` when all powers are equal
    pub r_squared: Option<f64>,
    /// Observations the model was fitted to, in input order
    pub observations: Vec<Observation>,
    /// Modelled minus observed power, aligned with `observations`
    pub residuals: Vec<f64>,
    pub iterations: usize,
    pub termination: Termination,
}

impl OmniPdFit {
    /// Observation with the largest absolute residual
    pub fn worst_observation(&self) -> Option<(Observation, f64)> {
        self.observations
            .iter()
            .zip(&self.residuals)
            .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
            .map(|(obs, r)| (*obs, *r))
    }
}

struct OmniPdProblem<'a> {
    durations: &'a [f64],
    powers: &'a [f64],
}

impl LeastSquaresProblem<4> for OmniPdProblem<'_> {
    fn residuals(&self, p: &[f64; 4]) -> Vec<f64> {
        self.durations
            .iter()
            .zip(self.powers)
            .map(|(&t, &power)| ompd_power(t, p[0], p[1], p[2], p[3]) - power)
            .collect()
    }

    fn jacobian(&self, p: &[f64; 4]) -> Vec<[f64; 4]> {
        self.durations
            .iter()
            .map(|&t| ompd_power_gradient(t, p[0], p[1], p[2]))
            .collect()
    }

    fn bounds(&self) -> ([f64; 4], [f64; 4]) {
        ([0.0; 4], [f64::INFINITY; 4])
    }
}

/// Fit the OmniPD model to paired durations (seconds) and powers (watts)
/// using default solver settings.
pub fn calculate_omnipd_model(durations: &[f64], powers: &[f64]) -> Result<OmniPdFit, FitError> {
    calculate_omnipd_model_with(durations, powers, &FitOptions::default())
}

/// Fit the OmniPD model with explicit options
pub fn calculate_omnipd_model_with(
    durations: &[f64],
    powers: &[f64],
    options: &FitOptions,
) -> Result<OmniPdFit, FitError> {
    validate_observations(durations, powers)?;

    let initial = match options.initial_guess {
        Some(guess) => guess,
        None => initial_guess(powers),
    };
    debug!(
        observations = durations.len(),
        cp = initial.cp,
        w_prime = initial.w_prime,
        pmax = initial.pmax,
        a = initial.a,
        "Fitting OmniPD model"
    );

    let problem = OmniPdProblem { durations, powers };
    let solver = LevenbergMarquardt::with_config(options.solver);
    let solution = solver
        .minimize(&problem, initial.to_array())
        .map_err(|e| {
            warn!(error = %e, "OmniPD solver failed");
            FitError::FittingFailed {
                reason: e.to_string(),
            }
        })?;

    let params = OmniPdParams::from_array(solution.params);
    if params.validate().is_err() {
        return Err(FitError::FittingFailed {
            reason: format!("solver returned invalid parameters {:?}", solution.params),
        });
    }

    let residuals = solution.residuals;
    let rmse = residuals.iter().quadratic_mean();
    let mae = residuals.iter().map(|r| r.abs()).mean();
    let r_squared = coefficient_of_determination(powers, &residuals);

    info!(
        cp = params.cp,
        w_prime = params.w_prime,
        pmax = params.pmax,
        a = params.a,
        rmse,
        mae,
        iterations = solution.iterations,
        termination = %solution.termination,
        "OmniPD model fitted"
    );

    Ok(OmniPdFit {
        params,
        rmse,
        mae,
        r_squared,
        observations: durations
            .iter()
            .zip(powers)
            .map(|(&t, &p)| Observation::new(t, p))
            .collect(),
        residuals,
        iterations: solution.iterations,
        termination: solution.termination,
    })
}

/// Fit the model to a slice of observations
pub fn fit_observations(
    observations: &[Observation],
    options: &FitOptions,
) -> Result<OmniPdFit, FitError> {
    let durations: Vec<f64> = observations.iter().map(|o| o.duration_secs).collect();
    let powers: Vec<f64> = observations.iter().map(|o| o.power).collect();
    calculate_omnipd_model_with(&durations, &powers, options)
}

/// Data-derived starting point: `[P30(power), 20000, max(power), 5]`
pub fn initial_guess(powers: &[f64]) -> OmniPdParams {
    let cp = percentile(powers, CP_GUESS_PERCENTILE).unwrap_or(0.0);
    let pmax = powers.iter().copied().fold(0.0, f64::max);
    OmniPdParams::new(cp, W_PRIME_GUESS, pmax, A_GUESS)
}

/// Percentile with linear interpolation between closest ranks
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() || !(0.0..=100.0).contains(&q) {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = (sorted.len() - 1) as f64 * q / 100.0;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

fn validate_observations(durations: &[f64], powers: &[f64]) -> Result<(), FitError> {
    if durations.len() != powers.len() {
        return Err(FitError::LengthMismatch {
            durations: durations.len(),
            powers: powers.len(),
        });
    }
    if durations.len() < MIN_OBSERVATIONS {
        return Err(FitError::InsufficientData {
            required: MIN_OBSERVATIONS,
            actual: durations.len(),
        });
    }
    for (index, (&t, &p)) in durations.iter().zip(powers).enumerate() {
        if !t.is_finite() || t <= 0.0 {
            return Err(FitError::InvalidObservation {
                index,
                reason: format!("duration {} s must be finite and positive", t),
            });
        }
        if !p.is_finite() || p < 0.0 {
            return Err(FitError::InvalidObservation {
                index,
                reason: format!("power {} W must be finite and non-negative", p),
            });
        }
    }
    Ok(())
}

fn coefficient_of_determination(observed: &[f64], residuals: &[f64]) -> Option<f64> {
    let mean = observed.iter().mean();
    let ss_tot: f64 = observed.iter().map(|p| (p - mean).powi(2)).sum();
    if ss_tot <= 0.0 {
        return None;
    }
    let ss_res: f64 = residuals.iter().map(|r| r * r).sum();
    Some(1.0 - ss_res / ss_tot)
}
