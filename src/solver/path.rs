//! Path driver: lambda-grid construction and the warm-started walk from
//! lambda_max down, with early-termination bookkeeping.

use tracing::{debug, warn};

use crate::config::SolverConfig;
use crate::data::DataView;
use crate::error::{PathError, PathWarning};
use crate::family::Family;
use crate::penalty::Penalty;
use crate::result::PathResult;
use crate::solver::gradient::{CovarianceState, GradientState, NaiveState};
use crate::solver::point::{PointOutcome, PointProblem, Workspace, solve_point};

/// Relative smoothing applied to the first (largest) computed lambda so the
/// KKT sweep at the top of the path is deterministic under rounding.
const LAMBDA_MAX_SMOOTHING: f64 = 1.0 + 1e-9;

/// Floor on the mixing parameter used when sizing the grid, so a pure-ridge
/// fit still gets a finite lambda_max.
const ALPHA_GRID_FLOOR: f64 = 1e-3;

/// Grid and cap settings prepared by the entry points.
pub(crate) struct PathPlan {
    /// Number of grid points when the grid is computed.
    pub nlambda: usize,
    /// Caller-supplied grid; used verbatim after descending sort.
    pub user_lambdas: Option<Vec<f64>>,
    /// Ratio lambda_min / lambda_max for computed grids.
    pub lambda_min_ratio: Option<f64>,
    /// Largest admissible number of nonzero coefficients per column.
    pub dfmax: usize,
    /// Largest admissible number of ever-active variables.
    pub pmax: usize,
    /// Fit an intercept.
    pub intercept: bool,
}

/// Gradient bookkeeping choice for the Gaussian family; other families
/// always run the naive state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GradientKind {
    /// Running weighted partial residual.
    Naive,
    /// Gram-cache covariance updates.
    Covariance,
}

/// Walks the path for a single-response family.
///
/// `offset` must already be folded into the response for the Gaussian
/// family; for the others it enters the linear predictor directly.
#[allow(clippy::too_many_arguments)]
pub(crate) fn run_path<F: Family>(
    view: &DataView<'_>,
    pen: &Penalty,
    cfg: &SolverConfig,
    family: &F,
    offset: Option<&[f64]>,
    plan: &PathPlan,
    kind: GradientKind,
    mut progress: Option<&mut dyn FnMut(usize)>,
) -> Result<PathResult, PathError> {
    let n = view.n();
    let p = view.p();

    // Null model: intercept-only fit that anchors the deviance scale.
    let a0_null = family.null_intercept(plan.intercept, cfg)?;
    let mut eta0 = vec![a0_null; n];
    if let Some(off) = offset {
        for (ei, oi) in eta0.iter_mut().zip(off) {
            *ei += oi;
        }
    }
    let wk0 = family.working(&eta0, cfg);
    if wk0.overflow {
        return Err(PathError::Validation(
            "Offset overflows the Poisson exponent cap at the null model".to_string(),
        ));
    }
    if wk0.saturated {
        return Err(PathError::Validation(
            "Null model is already saturated; response may be degenerate".to_string(),
        ));
    }
    let null_dev = wk0.dev;
    if !(null_dev > 0.0) || !null_dev.is_finite() {
        return Err(PathError::Validation(format!(
            "Null deviance must be positive and finite, got {null_dev}"
        )));
    }

    let gaussian = family.newton_steps(cfg) == 0;
    let mut grad = match kind {
        GradientKind::Naive => GradientState::Naive(NaiveState::new(wk0.wt.clone(), &wk0.resid)),
        GradientKind::Covariance => {
            GradientState::Covariance(CovarianceState::new(view, &wk0.resid))
        }
    };
    let mut ws = Workspace::new(p, a0_null, null_dev);

    let (lambdas, computed_grid) = build_grid(view, pen, cfg, plan, &mut grad, &mut ws)?;
    let thr = cfg.thresh * null_dev;
    let fdev = if pen.has_zero_bound() { 0.0 } else { cfg.fdev };
    let mnl = cfg.mnlam.min(lambdas.len()).max(2);

    let prob = PointProblem {
        view,
        pen,
        cfg,
        family,
        offset,
        update_intercept: plan.intercept && !gaussian,
        track_rss: gaussian,
        pmax: plan.pmax,
        thr,
    };

    let mut out = PathResult {
        lmu: 0,
        lambda: Vec::new(),
        a0: Vec::new(),
        ca: Vec::new(),
        ia: Vec::new(),
        nin: Vec::new(),
        dev_ratio: Vec::new(),
        null_dev,
        nlp: 0,
        jerr: 0,
        warnings: Vec::new(),
        nvars: p,
        nobs: n,
    };

    let mut lam_prev = f64::INFINITY;
    let mut rsq_prev = 0.0;
    for (step, &lam) in lambdas.iter().enumerate() {
        let m = step + 1;
        let mut dev = null_dev;
        let outcome = solve_point(&prob, &mut ws, &mut grad, lam, lam_prev, &mut dev);
        match outcome {
            PointOutcome::Converged => {}
            PointOutcome::PmaxExceeded => {
                push_limit(&mut out, PathWarning::PmaxExceeded { step: m });
                break;
            }
            PointOutcome::MaxitExceeded => {
                push_warning(
                    &mut out,
                    PathWarning::NonConvergence {
                        step: m,
                        passes: ws.nlp,
                    },
                );
                break;
            }
            PointOutcome::Saturated => {
                push_warning(&mut out, PathWarning::Saturated { step: m });
                break;
            }
            PointOutcome::Overflow => {
                push_warning(&mut out, PathWarning::PoissonOverflow { step: m });
                break;
            }
        }

        let rsq = if gaussian {
            1.0 - ws.rss / null_dev
        } else {
            1.0 - dev / null_dev
        };
        let df = ws.active.iter().filter(|&&k| ws.beta[k] != 0.0).count();
        if df > plan.dfmax {
            push_limit(&mut out, PathWarning::DfmaxExceeded { step: m });
            break;
        }
        if computed_grid && m >= mnl {
            if rsq - rsq_prev < fdev * rsq {
                break;
            }
            if rsq > cfg.devmax {
                break;
            }
        }

        record_column(&mut out, view, &ws, lam, rsq);
        debug!(step = m, lambda = lam, nin = ws.active.len(), dev_ratio = rsq, "path step");
        if let Some(cb) = progress.as_deref_mut() {
            cb(m);
        }
        rsq_prev = rsq;
        lam_prev = lam;
    }

    out.nlp = ws.nlp;
    out.ia = ws.active.clone();
    out.jerr = out.warnings.first().map_or(0, PathWarning::jerr);
    Ok(out)
}

fn push_warning(out: &mut PathResult, warning: PathWarning) {
    warn!(%warning, "path truncated");
    out.warnings.push(warning);
}

/// Structural limits truncate silently; only the code is recorded.
fn push_limit(out: &mut PathResult, warning: PathWarning) {
    debug!(%warning, "path truncated at a structural limit");
    out.warnings.push(warning);
}

fn record_column(out: &mut PathResult, view: &DataView<'_>, ws: &Workspace, lam: f64, rsq: f64) {
    let mut packed = Vec::with_capacity(ws.active.len());
    let mut a0 = ws.a0;
    for &k in &ws.active {
        let orig = ws.beta[k] / view.xs()[k];
        packed.push(orig);
        a0 -= orig * view.xm()[k];
    }
    out.lambda.push(lam);
    out.a0.push(a0);
    out.ca.push(packed);
    out.nin.push(ws.active.len());
    out.dev_ratio.push(rsq);
    out.lmu += 1;
}

/// Builds the lambda grid: a caller grid is sorted strictly decreasing and
/// used verbatim; otherwise lambda_max is derived from the null-model
/// gradients and `nlambda` log-spaced values are emitted down to
/// `ratio * lambda_max`.
fn build_grid(
    view: &DataView<'_>,
    pen: &Penalty,
    cfg: &SolverConfig,
    plan: &PathPlan,
    grad: &mut GradientState,
    ws: &mut Workspace,
) -> Result<(Vec<f64>, bool), PathError> {
    if let Some(user) = &plan.user_lambdas {
        return Ok((validate_user_grid(user)?, false));
    }

    let alpha_eff = pen.alpha.max(ALPHA_GRID_FLOOR);
    let mut lambda_max = 0.0f64;
    for j in 0..view.p() {
        if pen.included(j) && pen.penalized(j) {
            let g = grad.kkt_gradient(view, j, &ws.beta, &ws.active).abs();
            lambda_max = lambda_max.max(g / (alpha_eff * pen.factor(j)));
        }
    }
    let grid = log_spaced_grid(
        lambda_max,
        plan.nlambda,
        plan.lambda_min_ratio,
        view.n(),
        view.p(),
        cfg,
    )?;
    Ok((grid, true))
}

/// Validates a caller grid and returns it sorted strictly decreasing.
pub(crate) fn validate_user_grid(user: &[f64]) -> Result<Vec<f64>, PathError> {
    if user.is_empty() {
        return Err(PathError::Validation(
            "User lambda grid must not be empty".to_string(),
        ));
    }
    for &lam in user {
        if !lam.is_finite() || lam < 0.0 {
            return Err(PathError::Validation(format!(
                "Lambda values must be finite and non-negative, got {lam}"
            )));
        }
    }
    let mut grid = user.to_vec();
    grid.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    for pair in grid.windows(2) {
        if pair[0] <= pair[1] {
            return Err(PathError::Validation(
                "Lambda values must be distinct".to_string(),
            ));
        }
    }
    Ok(grid)
}

/// Log-spaced grid from a smoothed `lambda_max` down to
/// `ratio * lambda_max`.
pub(crate) fn log_spaced_grid(
    lambda_max: f64,
    nlambda: usize,
    ratio: Option<f64>,
    n: usize,
    p: usize,
    cfg: &SolverConfig,
) -> Result<Vec<f64>, PathError> {
    if nlambda == 0 {
        return Err(PathError::Validation(
            "nlambda must be at least 1".to_string(),
        ));
    }
    if !(lambda_max > 0.0) || !lambda_max.is_finite() {
        return Err(PathError::Validation(format!(
            "Degenerate lambda grid: lambda_max = {lambda_max}"
        )));
    }
    let default_ratio = if n > p { 1e-4 } else { 1e-2 };
    let ratio = ratio.unwrap_or(default_ratio);
    if !(cfg.eps_ratio..1.0).contains(&ratio) {
        return Err(PathError::Validation(format!(
            "lambda_min_ratio must lie in [{}, 1), got {ratio}",
            cfg.eps_ratio
        )));
    }
    let mut grid = Vec::with_capacity(nlambda);
    grid.push(lambda_max * LAMBDA_MAX_SMOOTHING);
    if nlambda > 1 {
        let denom = (nlambda - 1) as f64;
        for i in 1..nlambda {
            grid.push(lambda_max * ratio.powf(i as f64 / denom));
        }
    }
    Ok(grid)
}
