//! Solver-wide numerical parameters.
//!
//! These are an explicit value passed into every entry point rather than
//! process globals: a scoped override is just a modified copy that drops at
//! the end of the fit, and a running fit can never observe a mutation.

use serde::{Deserialize, Serialize};

/// Default convergence threshold for coordinate-descent sweeps, relative to
/// the null deviance.
pub const DEFAULT_THRESH: f64 = 1e-7;
/// Default minimum fractional deviance gain before the path stops early.
pub const DEFAULT_FDEV: f64 = 1e-5;
/// Default deviance-explained ceiling; the path stops once a fit is this
/// close to saturated.
pub const DEFAULT_DEVMAX: f64 = 0.999;
/// Magnitude treated as effectively infinite by the solver.
pub const DEFAULT_BIG: f64 = 9.9e35;
/// Default clipping distance keeping fitted probabilities away from 0 and 1.
pub const DEFAULT_PMIN: f64 = 1e-9;
/// Default cap on linear predictors fed to `exp` (Poisson, multinomial).
pub const DEFAULT_EXMX: f64 = 250.0;
/// Default lower bound accepted for `lambda_min_ratio`.
pub const DEFAULT_EPS_RATIO: f64 = 1e-6;
/// Default maximum number of IRLS reweighting steps per lambda.
pub const DEFAULT_MXITNR: usize = 25;
/// Default minimum number of path points retained before the
/// diminishing-returns stops may trigger.
pub const DEFAULT_MNLAM: usize = 5;
/// Default cap on the total number of coordinate-descent passes over the
/// data across the whole path.
pub const DEFAULT_MAXIT: usize = 100_000;

/// Numerical thresholds and caps shared by every component of the solver.
///
/// A fit reads its configuration once at entry; mutating a config while a
/// fit is running is impossible by construction since fits borrow it
/// immutably.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Convergence threshold for coordinate sweeps, scaled by the null
    /// deviance of the fit.
    pub thresh: f64,
    /// Minimum fractional deviance gain per lambda step; smaller gains stop
    /// the path. Forced to zero for fits with a zero box bound.
    pub fdev: f64,
    /// Stop the path once the deviance-explained fraction exceeds this.
    pub devmax: f64,
    /// Effectively-infinite magnitude used for unbounded box constraints.
    pub big: f64,
    /// Fitted probabilities are clipped to `[pmin, 1 - pmin]`.
    pub pmin: f64,
    /// Linear predictors beyond this magnitude are treated as exponent
    /// overflow for the Poisson family.
    pub exmx: f64,
    /// Smallest accepted `lambda_min_ratio`.
    pub eps_ratio: f64,
    /// Maximum IRLS reweighting steps per lambda for non-Gaussian families.
    pub mxitnr: usize,
    /// Minimum number of lambda steps before diminishing-returns stops apply.
    pub mnlam: usize,
    /// Cap on total coordinate-descent passes across the entire path.
    pub maxit: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            thresh: DEFAULT_THRESH,
            fdev: DEFAULT_FDEV,
            devmax: DEFAULT_DEVMAX,
            big: DEFAULT_BIG,
            pmin: DEFAULT_PMIN,
            exmx: DEFAULT_EXMX,
            eps_ratio: DEFAULT_EPS_RATIO,
            mxitnr: DEFAULT_MXITNR,
            mnlam: DEFAULT_MNLAM,
            maxit: DEFAULT_MAXIT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_the_documented_values() {
        let cfg = SolverConfig::default();
        assert_eq!(cfg.thresh, 1e-7);
        assert_eq!(cfg.fdev, 1e-5);
        assert_eq!(cfg.devmax, 0.999);
        assert_eq!(cfg.pmin, 1e-9);
        assert_eq!(cfg.mxitnr, 25);
        assert_eq!(cfg.mnlam, 5);
    }

    #[test]
    fn config_round_trips_through_json() {
        let cfg = SolverConfig {
            thresh: 1e-9,
            ..SolverConfig::default()
        };
        let text = serde_json::to_string(&cfg).expect("config serializes");
        let back: SolverConfig = serde_json::from_str(&text).expect("config deserializes");
        assert_eq!(cfg, back);
    }
}
