//! Multinomial path drive: per-class IRLS cycling over shared variable-level
//! screening, with ungrouped (per-class soft-threshold) and grouped (block
//! L2) coordinate updates.

use ndarray::Array2;
use tracing::{debug, warn};

use crate::config::SolverConfig;
use crate::data::DataView;
use crate::error::{PathError, PathWarning};
use crate::family::MultinomialModel;
use crate::penalty::Penalty;
use crate::result::MultinomialPathResult;
use crate::solver::gradient::NaiveState;
use crate::solver::kernel::{coordinate_update, grouped_update};
use crate::solver::path::{PathPlan, log_spaced_grid, validate_user_grid};
use crate::solver::point::PointOutcome;

/// Floor on the mixing parameter used when sizing the grid.
const ALPHA_GRID_FLOOR: f64 = 1e-3;

struct MultiState {
    beta: Array2<f64>,
    a0: Vec<f64>,
    states: Vec<NaiveState>,
    active: Vec<usize>,
    ever_active: Vec<bool>,
    strong: Vec<bool>,
    xv: Vec<Vec<f64>>,
    xv_valid: Vec<Vec<bool>>,
    nlp: usize,
}

impl MultiState {
    fn curvature(&mut self, view: &DataView<'_>, k: usize, j: usize) -> f64 {
        if !self.xv_valid[k][j] {
            self.xv[k][j] = self.states[k].curvature(view, j);
            self.xv_valid[k][j] = true;
        }
        self.xv[k][j]
    }

    fn invalidate_class(&mut self, k: usize) {
        self.xv_valid[k].iter_mut().for_each(|v| *v = false);
    }
}

/// Walks the multinomial path.
pub(crate) fn run_multinomial_path(
    view: &DataView<'_>,
    pen: &Penalty,
    cfg: &SolverConfig,
    model: &MultinomialModel<'_>,
    plan: &PathPlan,
    mut progress: Option<&mut dyn FnMut(usize)>,
) -> Result<MultinomialPathResult, PathError> {
    let n = view.n();
    let p = view.p();
    let nc = model.nclasses();

    let a0 = model.null_intercepts(plan.intercept, cfg)?;
    let mut st = MultiState {
        beta: Array2::zeros((p, nc)),
        a0,
        states: Vec::with_capacity(nc),
        active: Vec::new(),
        ever_active: vec![false; p],
        strong: vec![false; p],
        xv: vec![vec![0.0; p]; nc],
        xv_valid: vec![vec![false; p]; nc],
        nlp: 0,
    };

    let mut eta = Array2::zeros((n, nc));
    for i in 0..n {
        for k in 0..nc {
            eta[[i, k]] = st.a0[k] + model.offset_at(i, k);
        }
    }
    let probs0 = model.probabilities(&eta, cfg);
    let null_dev = model.deviance(&probs0);
    if !(null_dev > 0.0) || !null_dev.is_finite() {
        return Err(PathError::Validation(format!(
            "Null deviance must be positive and finite, got {null_dev}"
        )));
    }
    for k in 0..nc {
        let (wt, resid) = model.working_class(k, &probs0);
        st.states.push(NaiveState::new(wt, &resid));
    }

    let (lambdas, computed_grid) = match &plan.user_lambdas {
        Some(user) => (validate_user_grid(user)?, false),
        None => {
            let alpha_eff = pen.alpha.max(ALPHA_GRID_FLOOR);
            let mut lambda_max = 0.0f64;
            for j in 0..p {
                if pen.included(j) && pen.penalized(j) {
                    let score = screen_score(view, &mut st, model, j);
                    lambda_max = lambda_max.max(score / (alpha_eff * pen.factor(j)));
                }
            }
            (
                log_spaced_grid(lambda_max, plan.nlambda, plan.lambda_min_ratio, n, p, cfg)?,
                true,
            )
        }
    };

    let thr = cfg.thresh * null_dev;
    let fdev = if pen.has_zero_bound() { 0.0 } else { cfg.fdev };
    let mnl = cfg.mnlam.min(lambdas.len()).max(2);

    let mut out = MultinomialPathResult {
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
        nclasses: nc,
    };

    let mut lam_prev = f64::INFINITY;
    let mut rsq_prev = 0.0;
    for (step, &lam) in lambdas.iter().enumerate() {
        let m = step + 1;
        let mut dev = null_dev;
        let outcome = solve_multi_point(view, pen, cfg, model, plan, &mut st, lam, lam_prev, thr, &mut dev);
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
                        passes: st.nlp,
                    },
                );
                break;
            }
            PointOutcome::Saturated | PointOutcome::Overflow => {
                push_warning(&mut out, PathWarning::Saturated { step: m });
                break;
            }
        }

        let rsq = 1.0 - dev / null_dev;
        let df = st
            .active
            .iter()
            .filter(|&&j| (0..nc).any(|k| st.beta[[j, k]] != 0.0))
            .count();
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

        record_column(&mut out, view, &st, lam, rsq);
        debug!(step = m, lambda = lam, nin = st.active.len(), dev_ratio = rsq, "multinomial path step");
        if let Some(cb) = progress.as_deref_mut() {
            cb(m);
        }
        rsq_prev = rsq;
        lam_prev = lam;
    }

    out.nlp = st.nlp;
    out.ia = st.active.clone();
    out.jerr = out.warnings.first().map_or(0, PathWarning::jerr);
    Ok(out)
}

fn push_warning(out: &mut MultinomialPathResult, warning: PathWarning) {
    warn!(%warning, "multinomial path truncated");
    out.warnings.push(warning);
}

/// Structural limits truncate silently; only the code is recorded.
fn push_limit(out: &mut MultinomialPathResult, warning: PathWarning) {
    debug!(%warning, "multinomial path truncated at a structural limit");
    out.warnings.push(warning);
}

fn record_column(
    out: &mut MultinomialPathResult,
    view: &DataView<'_>,
    st: &MultiState,
    lam: f64,
    rsq: f64,
) {
    let nc = st.a0.len();
    let mut packed = Vec::with_capacity(st.active.len() * nc);
    let mut a0 = st.a0.clone();
    for &j in &st.active {
        for (k, a0k) in a0.iter_mut().enumerate() {
            let orig = st.beta[[j, k]] / view.xs()[j];
            packed.push(orig);
            *a0k -= orig * view.xm()[j];
        }
    }
    out.lambda.push(lam);
    out.a0.push(a0);
    out.ca.push(packed);
    out.nin.push(st.active.len());
    out.dev_ratio.push(rsq);
    out.lmu += 1;
}

/// Screening score of variable `j`: the max-over-classes gradient magnitude,
/// or the block L2 norm in grouped mode.
fn screen_score(
    view: &DataView<'_>,
    st: &mut MultiState,
    model: &MultinomialModel<'_>,
    j: usize,
) -> f64 {
    if model.grouped {
        let mut norm2 = 0.0;
        for state in &mut st.states {
            let g = state.gradient(view, j);
            norm2 += g * g;
        }
        norm2.sqrt()
    } else {
        let mut score = 0.0f64;
        for state in &mut st.states {
            score = score.max(state.gradient(view, j).abs());
        }
        score
    }
}

#[allow(clippy::too_many_arguments)]
fn solve_multi_point(
    view: &DataView<'_>,
    pen: &Penalty,
    cfg: &SolverConfig,
    model: &MultinomialModel<'_>,
    plan: &PathPlan,
    st: &mut MultiState,
    lam: f64,
    lam_prev: f64,
    thr: f64,
    dev_out: &mut f64,
) -> PointOutcome {
    let n = view.n();
    let p = view.p();
    let nc = model.nclasses();

    // Strong-rule screen at the variable level.
    let tlam = if lam_prev.is_finite() {
        2.0 * lam - lam_prev
    } else {
        f64::INFINITY
    };
    for j in 0..p {
        st.strong[j] = false;
        if !pen.included(j) {
            continue;
        }
        if st.ever_active[j] || !pen.penalized(j) {
            st.strong[j] = true;
            continue;
        }
        let threshold = pen.alpha * pen.factor(j) * tlam;
        if threshold.is_finite() && screen_score(view, st, model, j) >= threshold {
            st.strong[j] = true;
        }
    }

    let mut eta = Array2::zeros((n, nc));
    let mut cycles = 0usize;
    loop {
        if cycles >= cfg.mxitnr {
            return PointOutcome::MaxitExceeded;
        }
        cycles += 1;

        // Softmax is shift-invariant, so keep the intercepts centered.
        let mean = st.a0.iter().sum::<f64>() / nc as f64;
        for a in &mut st.a0 {
            *a -= mean;
        }

        rebuild_eta(view, model, st, &mut eta);
        let probs = model.probabilities(&eta, cfg);
        let dev = model.deviance(&probs);
        let mass: f64 = probs
            .rows()
            .into_iter()
            .zip(model.w)
            .map(|(row, wi)| wi * row.iter().map(|pk| pk * (1.0 - pk)).sum::<f64>())
            .sum();
        if !dev.is_finite() || mass <= cfg.pmin * nc as f64 {
            return PointOutcome::Saturated;
        }
        *dev_out = dev;

        let beta_prev = st.beta.clone();
        let a0_prev = st.a0.clone();

        if model.grouped {
            for k in 0..nc {
                let (wt, resid) = model.working_class(k, &probs);
                st.states[k].refresh(&wt, &resid);
                st.invalidate_class(k);
            }
            if let Err(outcome) = grouped_descent(view, pen, cfg, plan, st, lam, thr) {
                return outcome;
            }
        } else {
            for k in 0..nc {
                // Refresh class k from the predictor left by earlier classes
                // in this cycle.
                rebuild_eta(view, model, st, &mut eta);
                let probs_k = model.probabilities(&eta, cfg);
                let (wt, resid) = model.working_class(k, &probs_k);
                st.states[k].refresh(&wt, &resid);
                st.invalidate_class(k);
                if let Err(outcome) =
                    class_descent(view, pen, cfg, plan, st, k, lam, thr)
                {
                    return outcome;
                }
            }
        }

        // IRLS cycle convergence: total coefficient motion.
        let mut dmax = 0.0f64;
        for (k, state) in st.states.iter().enumerate() {
            let da = st.a0[k] - a0_prev[k];
            dmax = dmax.max(state.weight_sum() * da * da);
        }
        for &j in &st.active {
            for k in 0..nc {
                if st.xv_valid[k][j] {
                    let d = st.beta[[j, k]] - beta_prev[[j, k]];
                    dmax = dmax.max(st.xv[k][j] * d * d);
                }
            }
        }
        if dmax >= thr {
            continue;
        }

        // Mandatory KKT verification over the complement.
        let mut violations = false;
        for j in 0..p {
            if st.strong[j] || !pen.included(j) {
                continue;
            }
            if screen_score(view, st, model, j) > pen.l1(j, lam) {
                st.strong[j] = true;
                violations = true;
            }
        }
        if !violations {
            // Leave the states refreshed at the final fit for the next
            // lambda's screen, and report its deviance.
            rebuild_eta(view, model, st, &mut eta);
            let probs = model.probabilities(&eta, cfg);
            let dev = model.deviance(&probs);
            if !dev.is_finite() {
                return PointOutcome::Saturated;
            }
            *dev_out = dev;
            for k in 0..nc {
                let (wt, resid) = model.working_class(k, &probs);
                st.states[k].refresh(&wt, &resid);
            }
            return PointOutcome::Converged;
        }
    }
}

fn rebuild_eta(
    view: &DataView<'_>,
    model: &MultinomialModel<'_>,
    st: &MultiState,
    eta: &mut Array2<f64>,
) {
    let n = view.n();
    let nc = st.a0.len();
    for k in 0..nc {
        let mut shift = 0.0;
        for &j in &st.active {
            shift += st.beta[[j, k]] * view.xm()[j] / view.xs()[j];
        }
        let base = st.a0[k] - shift;
        let mut col: Vec<f64> = (0..n).map(|i| base + model.offset_at(i, k)).collect();
        for &j in &st.active {
            let b = st.beta[[j, k]];
            if b != 0.0 {
                view.col_add_scaled(j, b / view.xs()[j], &mut col);
            }
        }
        for (i, v) in col.into_iter().enumerate() {
            eta[[i, k]] = v;
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum SweepSet {
    Candidates,
    Active,
}

fn class_descent(
    view: &DataView<'_>,
    pen: &Penalty,
    cfg: &SolverConfig,
    plan: &PathPlan,
    st: &mut MultiState,
    k: usize,
    lam: f64,
    thr: f64,
) -> Result<(), PointOutcome> {
    loop {
        let dlx = class_sweep(view, pen, plan, st, k, lam, SweepSet::Candidates)?;
        st.nlp += 1;
        if st.nlp > cfg.maxit {
            return Err(PointOutcome::MaxitExceeded);
        }
        if dlx < thr {
            return Ok(());
        }
        loop {
            let dlx = class_sweep(view, pen, plan, st, k, lam, SweepSet::Active)?;
            st.nlp += 1;
            if st.nlp > cfg.maxit {
                return Err(PointOutcome::MaxitExceeded);
            }
            if dlx < thr {
                break;
            }
        }
    }
}

fn class_sweep(
    view: &DataView<'_>,
    pen: &Penalty,
    plan: &PathPlan,
    st: &mut MultiState,
    k: usize,
    lam: f64,
    set: SweepSet,
) -> Result<f64, PointOutcome> {
    let p = view.p();
    let mut dlx = 0.0f64;
    for j in 0..p {
        let visit = match set {
            SweepSet::Candidates => st.strong[j],
            SweepSet::Active => st.ever_active[j],
        };
        if !visit {
            continue;
        }
        let d = st.curvature(view, k, j);
        let g = st.states[k].gradient(view, j);
        let (lo, hi) = pen.bounds(j);
        let (beta_new, delta) =
            coordinate_update(st.beta[[j, k]], g, d, pen.l1(j, lam), pen.l2(j, lam), lo, hi);
        if delta == 0.0 {
            continue;
        }
        if !st.ever_active[j] {
            if st.active.len() >= plan.pmax {
                return Err(PointOutcome::PmaxExceeded);
            }
            st.ever_active[j] = true;
            st.active.push(j);
        }
        st.states[k].apply_delta(view, j, delta);
        st.beta[[j, k]] = beta_new;
        dlx = dlx.max(d * delta * delta);
    }
    if plan.intercept {
        let sw = st.states[k].weight_sum();
        if sw > 0.0 {
            let delta = st.states[k].intercept_gradient() / sw;
            if delta != 0.0 {
                st.a0[k] += delta;
                st.states[k].apply_intercept_delta(delta);
                dlx = dlx.max(sw * delta * delta);
            }
        }
    }
    Ok(dlx)
}

fn grouped_descent(
    view: &DataView<'_>,
    pen: &Penalty,
    cfg: &SolverConfig,
    plan: &PathPlan,
    st: &mut MultiState,
    lam: f64,
    thr: f64,
) -> Result<(), PointOutcome> {
    loop {
        let dlx = grouped_sweep(view, pen, plan, st, lam, SweepSet::Candidates)?;
        st.nlp += 1;
        if st.nlp > cfg.maxit {
            return Err(PointOutcome::MaxitExceeded);
        }
        if dlx < thr {
            return Ok(());
        }
        loop {
            let dlx = grouped_sweep(view, pen, plan, st, lam, SweepSet::Active)?;
            st.nlp += 1;
            if st.nlp > cfg.maxit {
                return Err(PointOutcome::MaxitExceeded);
            }
            if dlx < thr {
                break;
            }
        }
    }
}

fn grouped_sweep(
    view: &DataView<'_>,
    pen: &Penalty,
    plan: &PathPlan,
    st: &mut MultiState,
    lam: f64,
    set: SweepSet,
) -> Result<f64, PointOutcome> {
    let p = view.p();
    let nc = st.a0.len();
    let mut dlx = 0.0f64;
    let mut old = vec![0.0; nc];
    let mut g = vec![0.0; nc];
    let mut new = vec![0.0; nc];
    for j in 0..p {
        let visit = match set {
            SweepSet::Candidates => st.strong[j],
            SweepSet::Active => st.ever_active[j],
        };
        if !visit {
            continue;
        }
        // All classes share the 1/4-bound weights, so class 0's curvature
        // serves the whole block.
        let d = st.curvature(view, 0, j);
        for k in 0..nc {
            old[k] = st.beta[[j, k]];
            g[k] = st.states[k].gradient(view, j);
        }
        let (lo, hi) = pen.bounds(j);
        let max_delta = grouped_update(&old, &g, d, pen.l1(j, lam), pen.l2(j, lam), lo, hi, &mut new);
        if max_delta == 0.0 {
            continue;
        }
        if !st.ever_active[j] {
            if st.active.len() >= plan.pmax {
                return Err(PointOutcome::PmaxExceeded);
            }
            st.ever_active[j] = true;
            st.active.push(j);
        }
        for k in 0..nc {
            let delta = new[k] - old[k];
            if delta != 0.0 {
                st.states[k].apply_delta(view, j, delta);
                st.beta[[j, k]] = new[k];
            }
        }
        dlx = dlx.max(d * max_delta * max_delta);
    }
    if plan.intercept {
        for k in 0..nc {
            let sw = st.states[k].weight_sum();
            if sw > 0.0 {
                let delta = st.states[k].intercept_gradient() / sw;
                if delta != 0.0 {
                    st.a0[k] += delta;
                    st.states[k].apply_intercept_delta(delta);
                    dlx = dlx.max(sw * delta * delta);
                }
            }
        }
    }
    Ok(dlx)
}
