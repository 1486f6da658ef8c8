//! Elastic-net penalty state: mixing parameter, per-coordinate factors,
//! box constraints and the frozen-coordinate set.

use ndarray::Array1;

use crate::config::SolverConfig;
use crate::data::DataView;
use crate::error::PathError;

/// Validated penalty state for one fit.
///
/// Penalty factors are rescaled so they sum to the number of predictors;
/// coordinates excluded by the caller or frozen as zero-variance carry a
/// `false` inclusion flag and stay at zero for every lambda.
#[derive(Debug)]
pub struct Penalty {
    /// Elastic-net mix: 1 is pure lasso, 0 pure ridge.
    pub alpha: f64,
    vp: Array1<f64>,
    lower: Array1<f64>,
    upper: Array1<f64>,
    included: Vec<bool>,
    has_zero_bound: bool,
}

impl Penalty {
    /// Validates and assembles the penalty state.
    ///
    /// Zero-variance (constant) columns are fatal under `alpha = 1` and are
    /// otherwise frozen at zero, exactly like explicit exclusions.
    ///
    /// # Errors
    /// `PathError::Validation` for out-of-range alpha, factors or bounds;
    /// `PathError::ZeroVariance` for a constant column under pure lasso;
    /// `PathError::AllExcluded` when no coordinate remains.
    pub fn new(
        view: &DataView<'_>,
        alpha: f64,
        factors: Option<&Array1<f64>>,
        lower: Option<&Array1<f64>>,
        upper: Option<&Array1<f64>>,
        exclude: &[usize],
        cfg: &SolverConfig,
    ) -> Result<Self, PathError> {
        let p = view.p();
        if !(0.0..=1.0).contains(&alpha) {
            return Err(PathError::Validation(format!(
                "alpha must lie in [0, 1], got {alpha}"
            )));
        }

        let mut vp = match factors {
            Some(user) => {
                if user.len() != p {
                    return Err(PathError::Validation(format!(
                        "Penalty factor length mismatch: expected {p}, got {}",
                        user.len()
                    )));
                }
                for (j, &f) in user.iter().enumerate() {
                    if !f.is_finite() || f < 0.0 {
                        return Err(PathError::Validation(format!(
                            "Penalty factors must be finite and non-negative, got {f} at {j}"
                        )));
                    }
                }
                user.clone()
            }
            None => Array1::ones(p),
        };
        let total: f64 = vp.sum();
        if total <= 0.0 {
            return Err(PathError::Validation(
                "Penalty factors sum to zero; nothing is penalized".to_string(),
            ));
        }
        let rescale = p as f64 / total;
        vp.mapv_inplace(|f| f * rescale);

        let lower = bound_vector(lower, p, -cfg.big, "lower")?;
        let upper = bound_vector(upper, p, cfg.big, "upper")?;
        let mut has_zero_bound = false;
        for j in 0..p {
            if lower[j] > 0.0 || upper[j] < 0.0 {
                return Err(PathError::Validation(format!(
                    "Box constraints must bracket zero, got [{}, {}] at {j}",
                    lower[j], upper[j]
                )));
            }
            if lower[j] == 0.0 || upper[j] == 0.0 {
                has_zero_bound = true;
            }
        }

        let mut included = vec![true; p];
        for &j in exclude {
            if j >= p {
                return Err(PathError::Validation(format!(
                    "Exclusion index {j} out of range for {p} predictors"
                )));
            }
            included[j] = false;
        }

        for j in 0..p {
            if included[j] && view.is_constant(j) {
                if alpha == 1.0 {
                    return Err(PathError::ZeroVariance { index: j });
                }
                included[j] = false;
            }
        }

        if included.iter().all(|&keep| !keep) {
            return Err(PathError::AllExcluded);
        }

        Ok(Self {
            alpha,
            vp,
            lower,
            upper,
            included,
            has_zero_bound,
        })
    }

    /// Whether coordinate `j` participates in the fit.
    pub fn included(&self, j: usize) -> bool {
        self.included[j]
    }

    /// Whether coordinate `j` carries a positive penalty factor.
    pub fn penalized(&self, j: usize) -> bool {
        self.vp[j] > 0.0
    }

    /// Rescaled penalty factor for coordinate `j`.
    pub fn factor(&self, j: usize) -> f64 {
        self.vp[j]
    }

    /// L1 threshold for coordinate `j` at penalty strength `lam`.
    pub fn l1(&self, j: usize, lam: f64) -> f64 {
        lam * self.alpha * self.vp[j]
    }

    /// L2 shrinkage for coordinate `j` at penalty strength `lam`.
    pub fn l2(&self, j: usize, lam: f64) -> f64 {
        lam * (1.0 - self.alpha) * self.vp[j]
    }

    /// Box for coordinate `j`.
    pub fn bounds(&self, j: usize) -> (f64, f64) {
        (self.lower[j], self.upper[j])
    }

    /// True when any included coordinate has a zero box bound; the path
    /// driver disables the fractional-deviance early stop in that case.
    pub fn has_zero_bound(&self) -> bool {
        self.has_zero_bound
    }
}

fn bound_vector(
    user: Option<&Array1<f64>>,
    p: usize,
    fill: f64,
    label: &str,
) -> Result<Array1<f64>, PathError> {
    match user {
        Some(b) => {
            if b.len() != p {
                return Err(PathError::Validation(format!(
                    "Length mismatch for {label} limits: expected {p}, got {}",
                    b.len()
                )));
            }
            for (j, &v) in b.iter().enumerate() {
                if v.is_nan() {
                    return Err(PathError::Validation(format!(
                        "NaN in {label} limits at {j}"
                    )));
                }
            }
            Ok(b.clone())
        }
        None => Ok(Array1::from_elem(p, fill)),
    }
}
