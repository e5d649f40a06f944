//! Bounded Levenberg-Marquardt least-squares solver
//!
//! Minimises `0.5 * sum(r_i(p)^2)` for small, fixed-size parameter vectors.
//! Steps are projected back onto box bounds after each solve.

use std::fmt;

use tracing::trace;

/// A least-squares problem with `N` parameters
pub trait LeastSquaresProblem<const N: usize> {
    /// Residual vector at `params`
    fn residuals(&self, params: &[f64; N]) -> Vec<f64>;

    /// Jacobian rows (one per residual) at `params`
    fn jacobian(&self, params: &[f64; N]) -> Vec<[f64; N]>;

    /// Lower and upper bound per parameter
    fn bounds(&self) -> ([f64; N], [f64; N]) {
        ([f64::NEG_INFINITY; N], [f64::INFINITY; N])
    }
}

/// Solver tolerances and limits
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverConfig {
    pub max_iterations: usize,
    /// Relative cost reduction tolerance
    pub ftol: f64,
    /// Relative step size tolerance
    pub xtol: f64,
    /// Gradient infinity-norm tolerance
    pub gtol: f64,
    pub initial_damping: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            ftol: 1e-10,
            xtol: 1e-10,
            gtol: 1e-10,
            initial_damping: 1e-3,
        }
    }
}

/// Which criterion stopped the solver
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    CostTolerance,
    StepTolerance,
    GradientTolerance,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::CostTolerance => write!(f, "cost tolerance"),
            Termination::StepTolerance => write!(f, "step tolerance"),
            Termination::GradientTolerance => write!(f, "gradient tolerance"),
        }
    }
}

/// Converged solution
#[derive(Debug, Clone, PartialEq)]
pub struct Solution<const N: usize> {
    pub params: [f64; N],
    pub residuals: Vec<f64>,
    /// `0.5 * sum(r^2)`
    pub cost: f64,
    pub iterations: usize,
    pub termination: Termination,
}

/// Why the solver gave up
#[derive(Debug, Clone, PartialEq)]
pub enum SolverError {
    /// Residuals at the starting point are not finite
    NonFiniteStart,
    /// Iteration budget exhausted
    MaxIterations(usize),
    /// No improving step could be found at any damping level
    DampingOverflow { iterations: usize },
    /// Residual and Jacobian row counts differ
    DimensionMismatch { residuals: usize, jacobian: usize },
}

impl fmt::Display for SolverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverError::NonFiniteStart => write!(f, "residuals are not finite at the initial guess"),
            SolverError::MaxIterations(n) => write!(f, "no convergence after {} iterations", n),
            SolverError::DampingOverflow { iterations } => {
                write!(f, "no improving step found after {} iterations", iterations)
            }
            SolverError::DimensionMismatch {
                residuals,
                jacobian,
            } => write!(
                f,
                "jacobian has {} rows for {} residuals",
                jacobian, residuals
            ),
        }
    }
}

impl std::error::Error for SolverError {}

const MAX_DAMPING: f64 = 1e16;
const MIN_DAMPING: f64 = 1e-15;
const DIAG_FLOOR: f64 = 1e-12;

/// Levenberg-Marquardt with Marquardt diagonal scaling and bound projection
pub struct LevenbergMarquardt {
    config: SolverConfig,
}

impl LevenbergMarquardt {
    pub fn new() -> Self {
        Self {
            config: SolverConfig::default(),
        }
    }

    pub fn with_config(config: SolverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn minimize<P, const N: usize>(
        &self,
        problem: &P,
        initial: [f64; N],
    ) -> Result<Solution<N>, SolverError>
    where
        P: LeastSquaresProblem<N>,
    {
        let (lower, upper) = problem.bounds();
        let mut params = project(initial, &lower, &upper);
        let mut residuals = problem.residuals(&params);
        let mut cost = half_sum_squares(&residuals);
        if !cost.is_finite() {
            return Err(SolverError::NonFiniteStart);
        }

        let mut damping = self.config.initial_damping;
        let mut accepted = 0usize;

        for iteration in 1..=self.config.max_iterations {
            let jacobian = problem.jacobian(&params);
            if jacobian.len() != residuals.len() {
                return Err(SolverError::DimensionMismatch {
                    residuals: residuals.len(),
                    jacobian: jacobian.len(),
                });
            }

            let (jtj, gradient) = normal_equations(&jacobian, &residuals);

            // Parameters sitting on a bound that the gradient pushes against stay fixed
            let mut active = [false; N];
            for j in 0..N {
                active[j] = (params[j] <= lower[j] && gradient[j] > 0.0)
                    || (params[j] >= upper[j] && gradient[j] < 0.0);
            }
            let projected_gradient = (0..N)
                .filter(|&j| !active[j])
                .map(|j| gradient[j].abs())
                .fold(0.0, f64::max);
            if projected_gradient < self.config.gtol {
                return Ok(Solution {
                    params,
                    residuals,
                    cost,
                    iterations: iteration,
                    termination: Termination::GradientTolerance,
                });
            }

            loop {
                let mut system = jtj;
                for j in 0..N {
                    system[j][j] += damping * jtj[j][j].max(DIAG_FLOOR);
                }

                let mut rhs = [0.0; N];
                for j in 0..N {
                    rhs[j] = -gradient[j];
                }
                for j in (0..N).filter(|&j| active[j]) {
                    for k in 0..N {
                        system[j][k] = 0.0;
                        system[k][j] = 0.0;
                    }
                    system[j][j] = 1.0;
                    rhs[j] = 0.0;
                }

                let candidate = solve_linear(system, rhs)
                    .map(|step| {
                        let mut next = params;
                        for j in 0..N {
                            next[j] += step[j];
                        }
                        project(next, &lower, &upper)
                    })
                    .filter(|next| next.iter().all(|v| v.is_finite()));

                if let Some(next) = candidate {
                    let next_residuals = problem.residuals(&next);
                    let next_cost = half_sum_squares(&next_residuals);

                    if next_cost.is_finite() && next_cost < cost {
                        let step_norm = norm(&difference(&next, &params));
                        let param_norm = norm(&params);
                        let reduction = (cost - next_cost) / cost.max(f64::MIN_POSITIVE);

                        trace!(
                            iteration,
                            cost = next_cost,
                            damping,
                            step = step_norm,
                            "accepted step"
                        );

                        params = next;
                        residuals = next_residuals;
                        accepted += 1;
                        cost = next_cost;
                        damping = (damping / 10.0).max(MIN_DAMPING);

                        if reduction < self.config.ftol {
                            return Ok(Solution {
                                params,
                                residuals,
                                cost,
                                iterations: iteration,
                                termination: Termination::CostTolerance,
                            });
                        }
                        if step_norm < self.config.xtol * (param_norm + self.config.xtol) {
                            return Ok(Solution {
                                params,
                                residuals,
                                cost,
                                iterations: iteration,
                                termination: Termination::StepTolerance,
                            });
                        }
                        break;
                    }
                }

                damping *= 10.0;
                if damping > MAX_DAMPING {
                    // Steps have shrunk below machine resolution around an accepted point
                    if accepted > 0 {
                        return Ok(Solution {
                            params,
                            residuals,
                            cost,
                            iterations: iteration,
                            termination: Termination::StepTolerance,
                        });
                    }
                    return Err(SolverError::DampingOverflow {
                        iterations: iteration,
                    });
                }
            }
        }

        Err(SolverError::MaxIterations(self.config.max_iterations))
    }
}

impl Default for LevenbergMarquardt {
    fn default() -> Self {
        Self::new()
    }
}

fn project<const N: usize>(mut params: [f64; N], lower: &[f64; N], upper: &[f64; N]) -> [f64; N] {
    for j in 0..N {
        params[j] = params[j].clamp(lower[j], upper[j]);
    }
    params
}

fn half_sum_squares(residuals: &[f64]) -> f64 {
    0.5 * residuals.iter().map(|r| r * r).sum::<f64>()
}

fn norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

fn difference<const N: usize>(a: &[f64; N], b: &[f64; N]) -> [f64; N] {
    let mut out = [0.0; N];
    for j in 0..N {
        out[j] = a[j] - b[j];
    }
    out
}

/// `J^T J` and `J^T r`
fn normal_equations<const N: usize>(jacobian: &[[f64; N]], residuals: &[f64]) -> ([[f64; N]; N], [f64; N]) {
    let mut jtj = [[0.0; N]; N];
    let mut jtr = [0.0; N];
    for (row, &r) in jacobian.iter().zip(residuals) {
        for a in 0..N {
            jtr[a] += row[a] * r;
            for b in 0..N {
                jtj[a][b] += row[a] * row[b];
            }
        }
    }
    (jtj, jtr)
}

/// Gaussian elimination with partial pivoting; `None` if singular.
fn solve_linear<const N: usize>(mut m: [[f64; N]; N], mut rhs: [f64; N]) -> Option<[f64; N]> {
    for col in 0..N {
        let pivot = (col..N).max_by(|&a, &b| m[a][col].abs().total_cmp(&m[b][col].abs()))?;
        if m[pivot][col].abs() < 1e-300 || !m[pivot][col].is_finite() {
            return None;
        }
        m.swap(col, pivot);
        rhs.swap(col, pivot);

        for row in (col + 1)..N {
            let factor = m[row][col] / m[col][col];
            for k in col..N {
                m[row][k] -= factor * m[col][k];
            }
            rhs[row] -= factor * rhs[col];
        }
    }

    let mut x = [0.0; N];
    for row in (0..N).rev() {
        let tail: f64 = ((row + 1)..N).map(|k| m[row][k] * x[k]).sum();
        x[row] = (rhs[row] - tail) / m[row][row];
    }
    Some(x)
}
