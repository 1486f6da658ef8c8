//! Gaussian (squared-error) family.

use crate::config::SolverConfig;
use crate::error::PathError;

use super::{Family, Working};

/// Gaussian family over an offset-adjusted response.
pub(crate) struct Gaussian<'a> {
    /// Response with any offset already subtracted.
    pub y: &'a [f64],
    /// Normalized observation weights.
    pub w: &'a [f64],
}

impl Family for Gaussian<'_> {
    fn newton_steps(&self, _cfg: &SolverConfig) -> usize {
        0
    }

    fn null_intercept(&self, intercept: bool, _cfg: &SolverConfig) -> Result<f64, PathError> {
        if !intercept {
            return Ok(0.0);
        }
        Ok(self.y.iter().zip(self.w).map(|(yi, wi)| wi * yi).sum())
    }

    fn working(&self, eta: &[f64], _cfg: &SolverConfig) -> Working {
        let n = self.y.len();
        let mut resid = Vec::with_capacity(n);
        let mut dev = 0.0;
        for i in 0..n {
            let d = self.y[i] - eta[i];
            resid.push(self.w[i] * d);
            dev += self.w[i] * d * d;
        }
        Working {
            wt: self.w.to_vec(),
            resid,
            dev,
            saturated: false,
            overflow: false,
        }
    }
}
