//! Error taxonomy for the path solver.
//!
//! Failures split into two tiers: fatal errors abort a fit before or during
//! the first lambda step and return no result, while warnings truncate the
//! path at the last fully converged column and travel alongside the partial
//! result. Inner loops never propagate errors directly; they report an
//! outcome to the path driver, which decides truncate-versus-abort.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fatal errors; no partial path is returned.
#[derive(Debug, Error)]
pub enum PathError {
    /// Input shapes, weights, penalties or responses failed validation
    /// before the solver was entered.
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Every coordinate is excluded or zero-variance; there is nothing to
    /// fit.
    #[error("All predictors are excluded from the fit")]
    AllExcluded,

    /// A constant column cannot carry a pure-lasso penalty: its coordinate
    /// update has a zero denominator.
    #[error("Predictor {index} has zero variance and alpha = 1")]
    ZeroVariance {
        /// Zero-based column index of the offending predictor.
        index: usize,
    },
}

impl PathError {
    /// Numeric code in the classic solver code space: 9999 for
    /// validation failures, 7777 when every predictor is excluded, and
    /// `10000 + j` (1-based j) for a zero-variance predictor.
    pub fn jerr(&self) -> i32 {
        match self {
            Self::Validation(_) => 9999,
            Self::AllExcluded => 7777,
            Self::ZeroVariance { index } => 10_000 + *index as i32 + 1,
        }
    }
}

/// Non-fatal conditions; the path is truncated at the last good column and
/// the condition is attached to the result. Convergence and numerical
/// trouble is logged; the structural limits (dfmax, pmax) are recorded for
/// their code only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathWarning {
    /// The total coordinate-descent pass budget was exhausted.
    NonConvergence {
        /// 1-based lambda step at which the budget ran out.
        step: usize,
        /// Passes consumed when the fit gave up.
        passes: usize,
    },
    /// Admitting one more variable would exceed the ever-active cap.
    PmaxExceeded {
        /// 1-based lambda step at which the cap was hit.
        step: usize,
    },
    /// One more nonzero coefficient would exceed the per-column limit.
    DfmaxExceeded {
        /// 1-based lambda step at which the limit was hit.
        step: usize,
    },
    /// A binomial or multinomial fit saturated: the working weights
    /// vanished or the deviance became non-finite.
    Saturated {
        /// 1-based lambda step at which saturation was detected.
        step: usize,
    },
    /// A Poisson linear predictor exceeded the exponent cap.
    PoissonOverflow {
        /// 1-based lambda step at which the overflow occurred.
        step: usize,
    },
}

impl PathWarning {
    /// Numeric code for the truncation: `-step` for convergence trouble,
    /// saturation and the dfmax limit, `-10000 - step` for the ever-active
    /// cap.
    pub fn jerr(&self) -> i32 {
        match self {
            Self::NonConvergence { step, .. }
            | Self::DfmaxExceeded { step }
            | Self::Saturated { step }
            | Self::PoissonOverflow { step } => -(*step as i32),
            Self::PmaxExceeded { step } => -10_000 - *step as i32,
        }
    }
}

impl std::fmt::Display for PathWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonConvergence { step, passes } => write!(
                f,
                "coordinate descent did not converge at step {step} after {passes} passes"
            ),
            Self::PmaxExceeded { step } => {
                write!(f, "ever-active variable cap reached at step {step}")
            }
            Self::DfmaxExceeded { step } => {
                write!(f, "nonzero-coefficient limit reached at step {step}")
            }
            Self::Saturated { step } => write!(f, "fit saturated at step {step}"),
            Self::PoissonOverflow { step } => {
                write!(f, "Poisson linear predictor overflowed at step {step}")
            }
        }
    }
}
