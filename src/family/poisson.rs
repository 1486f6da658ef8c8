//! Poisson family: log-link working response with exponent-overflow guard.

use crate::config::SolverConfig;
use crate::error::PathError;

use super::{Family, Working};

/// Poisson family; the response holds non-negative counts or rates.
pub(crate) struct Poisson<'a> {
    /// Non-negative response values.
    pub y: &'a [f64],
    /// Normalized observation weights.
    pub w: &'a [f64],
    /// Optional per-observation offset (log scale).
    pub offset: Option<&'a [f64]>,
}

impl Family for Poisson<'_> {
    fn newton_steps(&self, cfg: &SolverConfig) -> usize {
        cfg.mxitnr
    }

    fn null_intercept(&self, intercept: bool, _cfg: &SolverConfig) -> Result<f64, PathError> {
        if !intercept {
            return Ok(0.0);
        }
        let rate: f64 = self.y.iter().zip(self.w).map(|(yi, wi)| wi * yi).sum();
        if rate <= 0.0 {
            return Err(PathError::Validation(
                "Poisson response is identically zero".to_string(),
            ));
        }
        // The intercept-only fit with an offset has the closed form
        // a0 = ln(sum w y / sum w exp(offset)).
        let exposure: f64 = match self.offset {
            Some(off) => self
                .w
                .iter()
                .zip(off)
                .map(|(wi, oi)| wi * oi.exp())
                .sum(),
            None => 1.0,
        };
        Ok((rate / exposure).ln())
    }

    fn working(&self, eta: &[f64], cfg: &SolverConfig) -> Working {
        let n = self.y.len();
        let mut wt = Vec::with_capacity(n);
        let mut resid = Vec::with_capacity(n);
        let mut dev = 0.0;
        let mut overflow = false;
        for i in 0..n {
            if eta[i] > cfg.exmx {
                overflow = true;
                break;
            }
            let mu = eta[i].exp();
            wt.push(self.w[i] * mu);
            resid.push(self.w[i] * (self.y[i] - mu));
            let yi = self.y[i];
            let rate_term = if yi > 0.0 { yi * (yi.ln() - eta[i]) } else { 0.0 };
            dev += 2.0 * self.w[i] * (rate_term - (yi - mu));
        }
        if overflow {
            return Working {
                wt: Vec::new(),
                resid: Vec::new(),
                dev: f64::NAN,
                saturated: false,
                overflow: true,
            };
        }
        Working {
            saturated: !dev.is_finite(),
            wt,
            resid,
            dev,
            overflow: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn null_intercept_is_the_log_rate() {
        let y = [0.0, 1.0, 2.0, 5.0];
        let w = [0.25; 4];
        let fam = Poisson {
            y: &y,
            w: &w,
            offset: None,
        };
        let cfg = SolverConfig::default();
        let a0 = fam.null_intercept(true, &cfg).expect("positive rate");
        assert_relative_eq!(a0, 2.0f64.ln(), epsilon = 1e-12);

        // At the null fit the weighted residual sums to zero.
        let eta = [a0; 4];
        let wk = fam.working(&eta, &cfg);
        assert_relative_eq!(wk.resid.iter().sum::<f64>(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn exponent_cap_reports_overflow() {
        let y = [1.0, 2.0];
        let w = [0.5, 0.5];
        let fam = Poisson {
            y: &y,
            w: &w,
            offset: None,
        };
        let cfg = SolverConfig::default();
        let wk = fam.working(&[300.0, 0.0], &cfg);
        assert!(wk.overflow);
    }

    #[test]
    fn zero_response_is_rejected() {
        let y = [0.0, 0.0];
        let w = [0.5, 0.5];
        let fam = Poisson {
            y: &y,
            w: &w,
            offset: None,
        };
        let cfg = SolverConfig::default();
        assert!(fam.null_intercept(true, &cfg).is_err());
    }
}
