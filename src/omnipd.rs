//! OmniPD power-duration model
//!
//! The omni-domain model extends the classic critical power hyperbola to
//! short durations, where power is capped by Pmax, and to long durations,
//! where sustainable power decays logarithmically below CP.
//!
//! ```text
//! W_eff(t) = W' * (1 - exp(-t * (Pmax - CP) / W'))
//! P(t)     = CP + W_eff(t) / t                          t <= TCP_MAX
//! P(t)     = CP + W_eff(TCP_MAX) / TCP_MAX
//!               - A * ln(t / TCP_MAX)                   t >  TCP_MAX
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Duration (seconds) beyond which the logarithmic decay term applies
pub const TCP_MAX: f64 = 1800.0;

/// Durations (seconds) reported by default when predicting a curve
pub const STANDARD_DURATIONS: [u32; 14] = [
    1, 5, 10, 15, 30, 60, 120, 180, 300, 600, 1200, 1800, 3600, 7200,
];

/// Effective W' available over an effort of `t` seconds.
pub fn w_eff(t: f64, cp: f64, w_prime: f64, pmax: f64) -> f64 {
    if w_prime <= 0.0 {
        return 0.0;
    }
    w_prime * (1.0 - (-t * (pmax - cp) / w_prime).exp())
}

/// Short-duration branch of the model: `CP + W_eff(t) / t`.
pub fn ompd_power_short(t: f64, cp: f64, w_prime: f64, pmax: f64) -> f64 {
    cp + w_eff(t, cp, w_prime, pmax) / t
}

/// Full OmniPD power at duration `t`.
pub fn ompd_power(t: f64, cp: f64, w_prime: f64, pmax: f64, a: f64) -> f64 {
    if t <= TCP_MAX {
        ompd_power_short(t, cp, w_prime, pmax)
    } else {
        ompd_power_short(TCP_MAX, cp, w_prime, pmax) - a * (t / TCP_MAX).ln()
    }
}

/// Partial derivatives of [`ompd_power`] with respect to `[CP, W', Pmax, A]`.
pub fn ompd_power_gradient(t: f64, cp: f64, w_prime: f64, pmax: f64) -> [f64; 4] {
    let (horizon, d_a) = if t <= TCP_MAX {
        (t, 0.0)
    } else {
        (TCP_MAX, -(t / TCP_MAX).ln())
    };

    if w_prime <= 0.0 {
        // One-sided slope at W' = 0+, where w_eff(t) tends to W'
        let d_w = if pmax > cp { 1.0 / horizon } else { 0.0 };
        return [1.0, d_w, 0.0, d_a];
    }

    let e = (-horizon * (pmax - cp) / w_prime).exp();
    let d_cp = 1.0 - e;
    let d_w = (1.0 - e) / horizon - e * (pmax - cp) / w_prime;
    let d_pmax = e;
    [d_cp, d_w, d_pmax, d_a]
}

/// Fitted OmniPD parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OmniPdParams {
    /// Critical power in watts
    pub cp: f64,
    /// Anaerobic work capacity in joules
    pub w_prime: f64,
    /// Maximal instantaneous power in watts
    pub pmax: f64,
    /// Logarithmic decay coefficient beyond [`TCP_MAX`]
    pub a: f64,
}

/// A single predicted point on the model curve
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    pub duration_secs: f64,
    pub power: f64,
    /// W' contribution at this duration in joules
    pub w_eff: f64,
}

impl OmniPdParams {
    pub fn new(cp: f64, w_prime: f64, pmax: f64, a: f64) -> Self {
        Self {
            cp,
            w_prime,
            pmax,
            a,
        }
    }

    pub fn from_array(p: [f64; 4]) -> Self {
        Self::new(p[0], p[1], p[2], p[3])
    }

    pub fn to_array(&self) -> [f64; 4] {
        [self.cp, self.w_prime, self.pmax, self.a]
    }

    /// Check every parameter is finite and non-negative
    pub fn validate(&self) -> Result<(), ModelError> {
        for (name, value) in [
            ("cp", self.cp),
            ("w_prime", self.w_prime),
            ("pmax", self.pmax),
            ("a", self.a),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ModelError::InvalidParameter { name, value });
            }
        }
        Ok(())
    }

    /// Modelled power for an effort of `duration_secs`
    pub fn power_at(&self, duration_secs: f64) -> Result<f64, ModelError> {
        check_duration(duration_secs)?;
        Ok(ompd_power(
            duration_secs,
            self.cp,
            self.w_prime,
            self.pmax,
            self.a,
        ))
    }

    /// Effective W' for an effort of `duration_secs`
    pub fn w_eff_at(&self, duration_secs: f64) -> Result<f64, ModelError> {
        check_duration(duration_secs)?;
        Ok(w_eff(duration_secs, self.cp, self.w_prime, self.pmax))
    }

    /// Predicted curve at the given durations
    pub fn predict_curve(&self, durations: &[f64]) -> Result<Vec<CurvePoint>, ModelError> {
        durations
            .iter()
            .map(|&t| {
                Ok(CurvePoint {
                    duration_secs: t,
                    power: self.power_at(t)?,
                    w_eff: self.w_eff_at(t)?,
                })
            })
            .collect()
    }

    /// Duration at which `W_eff` reaches `fraction` of W'.
    ///
    /// Returns `None` when Pmax does not exceed CP, since W' is then never
    /// drawn on.
    pub fn w_prime_saturation_time(&self, fraction: f64) -> Result<Option<f64>, ModelError> {
        if !(fraction > 0.0 && fraction < 1.0) {
            return Err(ModelError::InvalidFraction(fraction));
        }
        let spread = self.pmax - self.cp;
        if spread <= 0.0 || self.w_prime <= 0.0 {
            return Ok(None);
        }
        Ok(Some(-(1.0 - fraction).ln() * self.w_prime / spread))
    }

    /// Longest duration the modelled curve sustains `power`, searched up to
    /// `horizon_secs`.
    ///
    /// `None` means the curve never drops to `power` within the horizon;
    /// powers at or above Pmax give `Some(0.0)`.
    pub fn time_to_exhaustion(&self, power: f64, horizon_secs: f64) -> Result<Option<f64>, ModelError> {
        check_duration(horizon_secs)?;
        if !power.is_finite() {
            return Err(ModelError::InvalidParameter {
                name: "power",
                value: power,
            });
        }
        if power >= self.pmax {
            return Ok(Some(0.0));
        }
        if self.power_at(horizon_secs)? > power {
            return Ok(None);
        }

        // The curve is non-increasing, so bisect on log-time
        let (mut lo, mut hi) = (1e-3_f64.ln(), horizon_secs.ln());
        for _ in 0..100 {
            let mid = 0.5 * (lo + hi);
            if self.power_at(mid.exp())? > power {
                lo = mid;
            } else {
                hi = mid;
            }
            if hi - lo < 1e-9 {
                break;
            }
        }
        Ok(Some(lo.exp()))
    }
}

fn check_duration(t: f64) -> Result<(), ModelError> {
    if t.is_finite() && t > 0.0 {
        Ok(())
    } else {
        Err(ModelError::InvalidDuration(t))
    }
}
