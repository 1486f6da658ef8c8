//! Binomial family: logistic working response with probability clipping.

use crate::config::SolverConfig;
use crate::error::PathError;

use super::{Family, Working, sigmoid};

/// Maximum Newton iterations for the null intercept under an offset.
const NULL_NEWTON_STEPS: usize = 50;

/// Binomial family; the response holds class fractions in `[0, 1]`.
pub(crate) struct Binomial<'a> {
    /// Response values in `[0, 1]`.
    pub y: &'a [f64],
    /// Normalized observation weights.
    pub w: &'a [f64],
    /// Optional per-observation offset.
    pub offset: Option<&'a [f64]>,
    /// Modified-Newton mode: replace `p (1 - p)` with the upper bound 1/4.
    pub modified: bool,
}

impl Binomial<'_> {
    fn offset_at(&self, i: usize) -> f64 {
        self.offset.map_or(0.0, |o| o[i])
    }
}

impl Family for Binomial<'_> {
    fn newton_steps(&self, cfg: &SolverConfig) -> usize {
        cfg.mxitnr
    }

    fn null_intercept(&self, intercept: bool, cfg: &SolverConfig) -> Result<f64, PathError> {
        if !intercept {
            return Ok(0.0);
        }
        if self.offset.is_none() {
            let pbar: f64 = self.y.iter().zip(self.w).map(|(yi, wi)| wi * yi).sum();
            let pbar = pbar.clamp(cfg.pmin, 1.0 - cfg.pmin);
            return Ok((pbar / (1.0 - pbar)).ln());
        }
        // With an offset the null intercept solves a one-dimensional
        // weighted logistic fit by Newton iteration.
        let mut a0 = 0.0;
        for _ in 0..NULL_NEWTON_STEPS {
            let mut score = 0.0;
            let mut info = 0.0;
            for i in 0..self.y.len() {
                let p = sigmoid(a0 + self.offset_at(i));
                score += self.w[i] * (self.y[i] - p);
                info += self.w[i] * p * (1.0 - p);
            }
            if info <= cfg.pmin {
                break;
            }
            let step = score / info;
            a0 += step;
            if step.abs() < 1e-10 {
                break;
            }
        }
        if !a0.is_finite() {
            return Err(PathError::Validation(
                "Null binomial fit diverged; response may be degenerate".to_string(),
            ));
        }
        Ok(a0)
    }

    fn working(&self, eta: &[f64], cfg: &SolverConfig) -> Working {
        let n = self.y.len();
        let mut wt = Vec::with_capacity(n);
        let mut resid = Vec::with_capacity(n);
        let mut dev = 0.0;
        for i in 0..n {
            let p = sigmoid(eta[i]).clamp(cfg.pmin, 1.0 - cfg.pmin);
            let v = if self.modified { 0.25 } else { p * (1.0 - p) };
            wt.push(self.w[i] * v);
            resid.push(self.w[i] * (self.y[i] - p));
            dev -= 2.0 * self.w[i] * (self.y[i] * p.ln() + (1.0 - self.y[i]) * (1.0 - p).ln());
        }
        let mass: f64 = wt.iter().sum();
        Working {
            saturated: mass <= cfg.pmin || !dev.is_finite(),
            wt,
            resid,
            dev,
            overflow: false,
        }
    }
}
