//! GLM family models: local quadratic approximations for IRLS.
//!
//! Each family turns the current linear predictor into working weights and a
//! weighted working residual, and reports the deviance of the fit. The
//! identities `wt * (ytilde - eta) = w * (y - mu)` hold for every family
//! here, so the residual handed to the gradient state is always the raw
//! weighted mean residual.

mod binomial;
mod gaussian;
mod multinomial;
mod poisson;

pub(crate) use binomial::Binomial;
pub(crate) use gaussian::Gaussian;
pub(crate) use multinomial::MultinomialModel;
pub(crate) use poisson::Poisson;

use crate::config::SolverConfig;
use crate::error::PathError;

/// One IRLS evaluation at a fixed linear predictor.
pub(crate) struct Working {
    /// Working weights `wt[i]`.
    pub wt: Vec<f64>,
    /// Weighted mean residual `w[i] * (y[i] - mu[i])`.
    pub resid: Vec<f64>,
    /// Deviance of the current fit.
    pub dev: f64,
    /// Working weight mass vanished or the deviance is non-finite.
    pub saturated: bool,
    /// A linear predictor exceeded the exponent cap (Poisson).
    pub overflow: bool,
}

/// Capability shared by the single-response families.
pub(crate) trait Family {
    /// IRLS reweighting steps per lambda; zero means the local quadratic is
    /// exact and is built once per fit (Gaussian).
    fn newton_steps(&self, cfg: &SolverConfig) -> usize;

    /// Intercept of the null (coefficient-free) model.
    ///
    /// # Errors
    /// `PathError::Validation` for a degenerate response.
    fn null_intercept(&self, intercept: bool, cfg: &SolverConfig) -> Result<f64, PathError>;

    /// Working weights, residual and deviance at linear predictor `eta`
    /// (offset and intercept already included).
    fn working(&self, eta: &[f64], cfg: &SolverConfig) -> Working;
}

/// Numerically stable logistic function.
#[inline]
pub(crate) fn sigmoid(eta: f64) -> f64 {
    if eta >= 0.0 {
        1.0 / (1.0 + (-eta).exp())
    } else {
        let e = eta.exp();
        e / (1.0 + e)
    }
}
