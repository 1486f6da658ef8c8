//! Entry points: one fit per family, validation-first.
//!
//! Every entry validates shapes, weights, responses and penalty state before
//! any solver state is built, then hands off to the path driver. Dense and
//! sparse designs share each entry through [`DesignMatrix`].

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::SolverConfig;
use crate::data::{DataView, DesignMatrix};
use crate::error::PathError;
use crate::family::{Binomial, Gaussian, MultinomialModel, Poisson};
use crate::penalty::Penalty;
use crate::result::{MultinomialPathResult, PathResult};
use crate::solver::multinomial::run_multinomial_path;
use crate::solver::path::{GradientKind, PathPlan, run_path};

/// Predictor count below which dense Gaussian fits default to the
/// covariance (Gram-cache) bookkeeping.
const COVARIANCE_DEFAULT_LIMIT: usize = 500;

/// Gradient bookkeeping choice for Gaussian fits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GaussianMode {
    /// Covariance for dense designs with fewer than 500 predictors,
    /// naive otherwise.
    #[default]
    Auto,
    /// Running-residual bookkeeping.
    Naive,
    /// Gram-cache bookkeeping.
    Covariance,
}

/// IRLS weight handling for the binomial family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NewtonKind {
    /// Exact working weights `w p (1 - p)`.
    #[default]
    Exact,
    /// Modified Newton: the constant upper bound `w / 4`.
    Modified,
}

/// Caller-facing options shared by every family.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathOptions {
    /// Elastic-net mix in `[0, 1]`; 1 is pure lasso.
    pub alpha: f64,
    /// Observation weights; normalized internally to sum one.
    pub weights: Option<Array1<f64>>,
    /// Per-observation offset added to the linear predictor
    /// (single-response families).
    pub offset: Option<Array1<f64>>,
    /// Per-observation, per-class offset (multinomial only).
    pub class_offset: Option<Array2<f64>>,
    /// Per-coordinate penalty factors; rescaled to sum to the number of
    /// predictors.
    pub penalty_factors: Option<Array1<f64>>,
    /// Per-coordinate lower bounds (must be non-positive).
    pub lower_limits: Option<Array1<f64>>,
    /// Per-coordinate upper bounds (must be non-negative).
    pub upper_limits: Option<Array1<f64>>,
    /// Coordinates frozen at zero for the whole path.
    pub exclude: Vec<usize>,
    /// Largest admissible number of nonzero coefficients per column.
    pub dfmax: Option<usize>,
    /// Largest admissible number of ever-active variables.
    pub pmax: Option<usize>,
    /// Number of grid points when the grid is computed.
    pub nlambda: usize,
    /// Ratio lambda_min / lambda_max; defaults to 1e-4 when n > p, 1e-2
    /// otherwise.
    pub lambda_min_ratio: Option<f64>,
    /// Caller-supplied grid, used verbatim after descending sort.
    pub lambdas: Option<Vec<f64>>,
    /// Scale columns to unit weighted variance.
    pub standardize: bool,
    /// Fit an intercept.
    pub intercept: bool,
    /// Gaussian gradient bookkeeping.
    pub gaussian_mode: GaussianMode,
    /// Binomial IRLS weight handling.
    pub newton: NewtonKind,
    /// Multinomial group lasso: penalize each variable's class block by its
    /// L2 norm.
    pub grouped: bool,
}

impl Default for PathOptions {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            weights: None,
            offset: None,
            class_offset: None,
            penalty_factors: None,
            lower_limits: None,
            upper_limits: None,
            exclude: Vec::new(),
            dfmax: None,
            pmax: None,
            nlambda: 100,
            lambda_min_ratio: None,
            lambdas: None,
            standardize: true,
            intercept: true,
            gaussian_mode: GaussianMode::Auto,
            newton: NewtonKind::Exact,
            grouped: false,
        }
    }
}

/// Per-step progress callback invoked between lambda steps; it must not
/// re-enter the solver.
pub type Progress<'a> = Option<&'a mut dyn FnMut(usize)>;

fn check_shapes(x: &DesignMatrix, y_len: usize, options: &PathOptions) -> Result<(), PathError> {
    let n = x.nrows();
    let p = x.ncols();
    if n < 2 {
        return Err(PathError::Validation(format!(
            "At least two observations are required, got {n}"
        )));
    }
    if p == 0 {
        return Err(PathError::Validation(
            "Design matrix has no predictors".to_string(),
        ));
    }
    if y_len != n {
        return Err(PathError::Validation(format!(
            "Response length mismatch: expected {n}, got {y_len}"
        )));
    }
    if let Some(off) = &options.offset {
        if off.len() != n {
            return Err(PathError::Validation(format!(
                "Offset length mismatch: expected {n}, got {}",
                off.len()
            )));
        }
        for (i, &v) in off.iter().enumerate() {
            if !v.is_finite() {
                return Err(PathError::Validation(format!(
                    "Non-finite offset at index {i}"
                )));
            }
        }
    }
    Ok(())
}

fn check_finite(y: &Array1<f64>, label: &str) -> Result<(), PathError> {
    for (i, &v) in y.iter().enumerate() {
        if !v.is_finite() {
            return Err(PathError::Validation(format!(
                "Non-finite {label} at index {i}"
            )));
        }
    }
    Ok(())
}

fn build_plan(x: &DesignMatrix, options: &PathOptions) -> PathPlan {
    let p = x.ncols();
    let dfmax = options.dfmax.unwrap_or(p + 1);
    let pmax = options.pmax.unwrap_or((2 * dfmax + 20).min(p));
    PathPlan {
        nlambda: options.nlambda,
        user_lambdas: options.lambdas.clone(),
        lambda_min_ratio: options.lambda_min_ratio,
        dfmax,
        pmax: pmax.max(1),
        intercept: options.intercept,
    }
}

fn weights_slice<'a>(view: &'a DataView<'_>) -> &'a [f64] {
    view.weights()
        .as_slice()
        .expect("normalized weights are contiguous")
}

/// Fits a Gaussian (squared-error) path.
///
/// # Errors
/// `PathError::Validation` for shape or value problems,
/// `PathError::ZeroVariance` for a constant column under pure lasso,
/// `PathError::AllExcluded` when nothing remains to fit.
pub fn fit_gaussian(
    x: &DesignMatrix,
    y: &Array1<f64>,
    options: &PathOptions,
    cfg: &SolverConfig,
    progress: Progress<'_>,
) -> Result<PathResult, PathError> {
    check_shapes(x, y.len(), options)?;
    check_finite(y, "response")?;
    if options.class_offset.is_some() {
        return Err(PathError::Validation(
            "class_offset applies to the multinomial family only".to_string(),
        ));
    }
    debug!(n = x.nrows(), p = x.ncols(), family = "gaussian", "path fit");

    // The Gaussian working response absorbs the offset up front.
    let y_adj: Vec<f64> = match &options.offset {
        Some(off) => y.iter().zip(off).map(|(yi, oi)| yi - oi).collect(),
        None => y.to_vec(),
    };

    let view = DataView::new(x, options.weights.as_ref(), options.standardize, options.intercept)?;
    let pen = Penalty::new(
        &view,
        options.alpha,
        options.penalty_factors.as_ref(),
        options.lower_limits.as_ref(),
        options.upper_limits.as_ref(),
        &options.exclude,
        cfg,
    )?;
    let family = Gaussian {
        y: &y_adj,
        w: weights_slice(&view),
    };
    let kind = match options.gaussian_mode {
        GaussianMode::Naive => GradientKind::Naive,
        GaussianMode::Covariance => GradientKind::Covariance,
        GaussianMode::Auto => {
            if x.is_dense() && x.ncols() < COVARIANCE_DEFAULT_LIMIT {
                GradientKind::Covariance
            } else {
                GradientKind::Naive
            }
        }
    };
    let plan = build_plan(x, options);
    run_path(&view, &pen, cfg, &family, None, &plan, kind, progress)
}

/// Fits a binomial (logistic) path; the response holds class fractions in
/// `[0, 1]`.
///
/// # Errors
/// As [`fit_gaussian`], plus validation of the response range.
pub fn fit_binomial(
    x: &DesignMatrix,
    y: &Array1<f64>,
    options: &PathOptions,
    cfg: &SolverConfig,
    progress: Progress<'_>,
) -> Result<PathResult, PathError> {
    check_shapes(x, y.len(), options)?;
    check_finite(y, "response")?;
    if options.class_offset.is_some() {
        return Err(PathError::Validation(
            "class_offset applies to the multinomial family only".to_string(),
        ));
    }
    for (i, &v) in y.iter().enumerate() {
        if !(0.0..=1.0).contains(&v) {
            return Err(PathError::Validation(format!(
                "Binomial response must lie in [0, 1], got {v} at index {i}"
            )));
        }
    }
    debug!(n = x.nrows(), p = x.ncols(), family = "binomial", "path fit");

    let view = DataView::new(x, options.weights.as_ref(), options.standardize, options.intercept)?;
    let pen = Penalty::new(
        &view,
        options.alpha,
        options.penalty_factors.as_ref(),
        options.lower_limits.as_ref(),
        options.upper_limits.as_ref(),
        &options.exclude,
        cfg,
    )?;
    let y_slice = y.to_vec();
    let offset_vec = options.offset.as_ref().map(|o| o.to_vec());
    let family = Binomial {
        y: &y_slice,
        w: weights_slice(&view),
        offset: offset_vec.as_deref(),
        modified: options.newton == NewtonKind::Modified,
    };
    let plan = build_plan(x, options);
    run_path(
        &view,
        &pen,
        cfg,
        &family,
        offset_vec.as_deref(),
        &plan,
        GradientKind::Naive,
        progress,
    )
}

/// Fits a Poisson (log-link) path; the response holds non-negative counts.
///
/// # Errors
/// As [`fit_gaussian`], plus validation of the response sign.
pub fn fit_poisson(
    x: &DesignMatrix,
    y: &Array1<f64>,
    options: &PathOptions,
    cfg: &SolverConfig,
    progress: Progress<'_>,
) -> Result<PathResult, PathError> {
    check_shapes(x, y.len(), options)?;
    check_finite(y, "response")?;
    if options.class_offset.is_some() {
        return Err(PathError::Validation(
            "class_offset applies to the multinomial family only".to_string(),
        ));
    }
    for (i, &v) in y.iter().enumerate() {
        if v < 0.0 {
            return Err(PathError::Validation(format!(
                "Poisson response must be non-negative, got {v} at index {i}"
            )));
        }
    }
    debug!(n = x.nrows(), p = x.ncols(), family = "poisson", "path fit");

    let view = DataView::new(x, options.weights.as_ref(), options.standardize, options.intercept)?;
    let pen = Penalty::new(
        &view,
        options.alpha,
        options.penalty_factors.as_ref(),
        options.lower_limits.as_ref(),
        options.upper_limits.as_ref(),
        &options.exclude,
        cfg,
    )?;
    let y_slice = y.to_vec();
    let offset_vec = options.offset.as_ref().map(|o| o.to_vec());
    let family = Poisson {
        y: &y_slice,
        w: weights_slice(&view),
        offset: offset_vec.as_deref(),
    };
    let plan = build_plan(x, options);
    run_path(
        &view,
        &pen,
        cfg,
        &family,
        offset_vec.as_deref(),
        &plan,
        GradientKind::Naive,
        progress,
    )
}

/// Fits a multinomial path over an `n x K` class-membership response.
///
/// Rows are normalized to sum one; with `options.grouped` the per-variable
/// class block is penalized by its L2 norm.
///
/// # Errors
/// As [`fit_gaussian`], plus validation of the membership matrix.
pub fn fit_multinomial(
    x: &DesignMatrix,
    y: &Array2<f64>,
    options: &PathOptions,
    cfg: &SolverConfig,
    progress: Progress<'_>,
) -> Result<MultinomialPathResult, PathError> {
    check_shapes(x, y.nrows(), options)?;
    if options.offset.is_some() {
        return Err(PathError::Validation(
            "Use class_offset for the multinomial family".to_string(),
        ));
    }
    let nc = y.ncols();
    if nc < 2 {
        return Err(PathError::Validation(format!(
            "At least two response classes are required, got {nc}"
        )));
    }
    let mut ynorm = y.clone();
    for (i, mut row) in ynorm.rows_mut().into_iter().enumerate() {
        let mut total = 0.0;
        for &v in row.iter() {
            if !v.is_finite() || v < 0.0 {
                return Err(PathError::Validation(format!(
                    "Class memberships must be finite and non-negative, got {v} at row {i}"
                )));
            }
            total += v;
        }
        if total <= 0.0 {
            return Err(PathError::Validation(format!(
                "Row {i} of the response has zero total class membership"
            )));
        }
        row.mapv_inplace(|v| v / total);
    }
    if let Some(off) = &options.class_offset {
        if off.dim() != (x.nrows(), nc) {
            return Err(PathError::Validation(format!(
                "class_offset shape mismatch: expected ({}, {nc}), got {:?}",
                x.nrows(),
                off.dim()
            )));
        }
        for ((i, k), v) in off.indexed_iter() {
            if !v.is_finite() {
                return Err(PathError::Validation(format!(
                    "Non-finite class_offset at ({i}, {k})"
                )));
            }
        }
    }
    debug!(n = x.nrows(), p = x.ncols(), classes = nc, family = "multinomial", "path fit");

    let view = DataView::new(x, options.weights.as_ref(), options.standardize, options.intercept)?;
    let pen = Penalty::new(
        &view,
        options.alpha,
        options.penalty_factors.as_ref(),
        options.lower_limits.as_ref(),
        options.upper_limits.as_ref(),
        &options.exclude,
        cfg,
    )?;
    let model = MultinomialModel {
        y: &ynorm,
        w: weights_slice(&view),
        offset: options.class_offset.as_ref(),
        grouped: options.grouped,
    };
    let plan = build_plan(x, options);
    run_multinomial_path(&view, &pen, cfg, &model, &plan, progress)
}
