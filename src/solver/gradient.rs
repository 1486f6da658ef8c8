//! Gradient bookkeeping for coordinate descent.
//!
//! Two concrete shapes share one contract. The naive state keeps the
//! weighted working residual; because columns are only virtually centered,
//! the residual is stored against raw columns together with a scalar
//! correction `o = sum_j beta_j * xm_j / xs_j`, so a coordinate update costs
//! O(stored entries) even for sparse designs. The covariance state (Gaussian
//! only) keeps the full gradient vector plus Gram columns materialized the
//! first time a variable activates; updates then cost O(tracked set).

use ndarray::Array1;

use crate::data::DataView;

/// Naive residual state.
///
/// Invariant: the true weighted working residual is `r[i] + wt[i] * o`,
/// where `r` is updated only at stored column entries.
pub struct NaiveState {
    r: Vec<f64>,
    wt: Vec<f64>,
    sr: f64,
    sw: f64,
    o: f64,
    cached_j: Option<usize>,
    cached_swx: f64,
}

impl NaiveState {
    /// Starts the state at `beta = 0` with `resid[i] = w[i] * (y[i] - mu0[i])`
    /// and working weights `wt`.
    pub fn new(wt: Vec<f64>, resid: &[f64]) -> Self {
        let r: Vec<f64> = resid.to_vec();
        let sr = r.iter().sum();
        let sw = wt.iter().sum();
        Self {
            r,
            wt,
            sr,
            sw,
            o: 0.0,
            cached_j: None,
            cached_swx: 0.0,
        }
    }

    /// IRLS refresh at unchanged coefficients: installs new working weights
    /// and a freshly evaluated raw residual. The scalar correction survives
    /// because the coefficients did not move.
    pub fn refresh(&mut self, wt: &[f64], resid: &[f64]) {
        self.wt.copy_from_slice(wt);
        self.sw = wt.iter().sum();
        for i in 0..self.r.len() {
            self.r[i] = resid[i] - self.wt[i] * self.o;
        }
        self.sr = self.r.iter().sum();
        self.cached_j = None;
    }

    /// Partial gradient of coordinate `j` at the current residual.
    pub fn gradient(&mut self, view: &DataView<'_>, j: usize) -> f64 {
        let (dr, dw) = view.col_dot2(j, &self.r, &self.wt);
        self.cached_j = Some(j);
        self.cached_swx = dw;
        let xm = view.xm()[j];
        let xs = view.xs()[j];
        (dr - xm * self.sr) / xs + self.o * (dw - xm * self.sw) / xs
    }

    /// Applies a coordinate move `beta[j] += delta` to the residual.
    pub fn apply_delta(&mut self, view: &DataView<'_>, j: usize, delta: f64) {
        let swx = if self.cached_j == Some(j) {
            self.cached_swx
        } else {
            view.col_weighted_sums(j, &self.wt).0
        };
        let xs = view.xs()[j];
        view.col_axpy_weighted(j, -delta / xs, &self.wt, &mut self.r);
        self.sr -= delta * swx / xs;
        self.o += delta * view.xm()[j] / xs;
        self.cached_j = None;
    }

    /// Gradient of the intercept: the weighted residual total.
    pub fn intercept_gradient(&self) -> f64 {
        self.sr + self.o * self.sw
    }

    /// Applies an intercept move `a0 += delta`.
    pub fn apply_intercept_delta(&mut self, delta: f64) {
        for (ri, &wi) in self.r.iter_mut().zip(self.wt.iter()) {
            *ri -= delta * wi;
        }
        self.sr -= delta * self.sw;
    }

    /// Coordinate curvature `sum_i wt[i] * z[i,j]^2` under the current
    /// working weights.
    pub fn curvature(&self, view: &DataView<'_>, j: usize) -> f64 {
        let (swx, swx2) = view.col_weighted_sums(j, &self.wt);
        let xm = view.xm()[j];
        let xs = view.xs()[j];
        (swx2 - 2.0 * xm * swx + xm * xm * self.sw) / (xs * xs)
    }

    /// Total working weight mass.
    pub fn weight_sum(&self) -> f64 {
        self.sw
    }
}

/// Covariance state: exact gradients reconstructed from the null gradient
/// and the Gram columns of ever-active variables. Gaussian family only.
pub struct CovarianceState {
    g0: Vec<f64>,
    g: Vec<f64>,
    tracked: Vec<bool>,
    tracked_list: Vec<usize>,
    gram: Vec<Option<Vec<f64>>>,
}

impl CovarianceState {
    /// Builds the state from the weighted working response product
    /// `q0[i] = w[i] * ytilde[i]` at `beta = 0`.
    pub fn new(view: &DataView<'_>, q0: &[f64]) -> Self {
        let p = view.p();
        let sq: f64 = q0.iter().sum();
        let mut g0 = vec![0.0; p];
        for (j, slot) in g0.iter_mut().enumerate() {
            *slot = (view.col_dot(j, q0) - view.xm()[j] * sq) / view.xs()[j];
        }
        let g = g0.clone();
        Self {
            g0,
            g,
            tracked: vec![false; p],
            tracked_list: Vec::new(),
            gram: vec![None; p],
        }
    }

    /// Declares the candidate set for one point solve: live gradients are
    /// rebuilt for exactly these coordinates.
    pub fn begin_point(&mut self, candidates: &[usize], beta: &Array1<f64>, active: &[usize]) {
        for &j in &self.tracked_list {
            self.tracked[j] = false;
        }
        self.tracked_list.clear();
        for &j in candidates {
            self.g[j] = self.reconstruct(j, beta, active);
            self.tracked[j] = true;
            self.tracked_list.push(j);
        }
    }

    /// Adds one coordinate to the tracked set mid-solve (KKT re-entry).
    pub fn track(&mut self, j: usize, beta: &Array1<f64>, active: &[usize]) {
        if !self.tracked[j] {
            self.g[j] = self.reconstruct(j, beta, active);
            self.tracked[j] = true;
            self.tracked_list.push(j);
        }
    }

    /// Live gradient of a tracked coordinate.
    pub fn gradient(&self, j: usize) -> f64 {
        debug_assert!(self.tracked[j], "gradient read for untracked coordinate");
        self.g[j]
    }

    /// Gradient of an arbitrary coordinate rebuilt from the Gram cache;
    /// used by the KKT sweep over non-candidates.
    pub fn gradient_fresh(&self, j: usize, beta: &Array1<f64>, active: &[usize]) -> f64 {
        self.reconstruct(j, beta, active)
    }

    /// Applies a coordinate move: materializes the Gram column on first
    /// activation, then downdates every tracked gradient.
    pub fn apply_delta(&mut self, view: &DataView<'_>, j: usize, delta: f64) {
        if self.gram[j].is_none() {
            self.gram[j] = Some(materialize_gram_column(view, j));
        }
        let col = self.gram[j].as_ref().expect("gram column just materialized");
        for &l in &self.tracked_list {
            self.g[l] -= delta * col[l];
        }
    }

    /// Coordinate curvature under the construction weights.
    pub fn curvature(&self, view: &DataView<'_>, j: usize) -> f64 {
        let w = view.weights().as_slice().expect("weights are contiguous");
        let (swx, swx2) = view.col_weighted_sums(j, w);
        let xm = view.xm()[j];
        let xs = view.xs()[j];
        (swx2 - 2.0 * xm * swx + xm * xm) / (xs * xs)
    }

    fn reconstruct(&self, j: usize, beta: &Array1<f64>, active: &[usize]) -> f64 {
        let mut g = self.g0[j];
        for &k in active {
            let bk = beta[k];
            if bk != 0.0 {
                let col = self.gram[k]
                    .as_ref()
                    .expect("active coordinates always have a Gram column");
                g -= bk * col[j];
            }
        }
        g
    }
}

/// Gram column `C_j[l] = sum_i w[i] * z[i,l] * z[i,j]` for all `l`.
fn materialize_gram_column(view: &DataView<'_>, j: usize) -> Vec<f64> {
    let n = view.n();
    let p = view.p();
    let w = view.weights();
    let xm_j = view.xm()[j];
    let xs_j = view.xs()[j];

    // Dense scratch v[i] = w[i] * z[i, j].
    let mut v = vec![0.0; n];
    for (vi, &wi) in v.iter_mut().zip(w.iter()) {
        *vi = -wi * xm_j / xs_j;
    }
    view.col_axpy_weighted(j, 1.0 / xs_j, w.as_slice().expect("contiguous"), &mut v);
    let sv: f64 = v.iter().sum();

    let mut col = vec![0.0; p];
    for (l, slot) in col.iter_mut().enumerate() {
        *slot = (view.col_dot(l, &v) - view.xm()[l] * sv) / view.xs()[l];
    }
    col
}

/// Gradient bookkeeping selected at fit time.
pub enum GradientState {
    /// Running weighted partial residual.
    Naive(NaiveState),
    /// Gradient vector plus on-demand Gram cache (Gaussian only).
    Covariance(CovarianceState),
}

impl GradientState {
    /// Prepares live gradients for one point solve.
    pub fn begin_point(&mut self, candidates: &[usize], beta: &Array1<f64>, active: &[usize]) {
        if let Self::Covariance(state) = self {
            state.begin_point(candidates, beta, active);
        }
    }

    /// Partial gradient of a candidate coordinate.
    pub fn gradient(&mut self, view: &DataView<'_>, j: usize) -> f64 {
        match self {
            Self::Naive(state) => state.gradient(view, j),
            Self::Covariance(state) => state.gradient(j),
        }
    }

    /// Gradient for the KKT sweep over non-candidates.
    pub fn kkt_gradient(
        &mut self,
        view: &DataView<'_>,
        j: usize,
        beta: &Array1<f64>,
        active: &[usize],
    ) -> f64 {
        match self {
            Self::Naive(state) => state.gradient(view, j),
            Self::Covariance(state) => state.gradient_fresh(j, beta, active),
        }
    }

    /// Promotes a KKT violator into the live candidate set.
    pub fn track(&mut self, j: usize, beta: &Array1<f64>, active: &[usize]) {
        if let Self::Covariance(state) = self {
            state.track(j, beta, active);
        }
    }

    /// Applies an accepted coordinate move.
    pub fn apply_delta(&mut self, view: &DataView<'_>, j: usize, delta: f64) {
        match self {
            Self::Naive(state) => state.apply_delta(view, j, delta),
            Self::Covariance(state) => state.apply_delta(view, j, delta),
        }
    }

    /// Coordinate curvature under the current working weights.
    pub fn curvature(&self, view: &DataView<'_>, j: usize) -> f64 {
        match self {
            Self::Naive(state) => state.curvature(view, j),
            Self::Covariance(state) => state.curvature(view, j),
        }
    }

    /// Gradient of the intercept coordinate. The covariance state only runs
    /// centered Gaussian fits, where the intercept gradient is identically
    /// zero.
    pub fn intercept_gradient(&self) -> f64 {
        match self {
            Self::Naive(state) => state.intercept_gradient(),
            Self::Covariance(_) => 0.0,
        }
    }

    /// Applies an intercept move (naive state only).
    pub fn apply_intercept_delta(&mut self, delta: f64) {
        match self {
            Self::Naive(state) => state.apply_intercept_delta(delta),
            Self::Covariance(_) => debug_assert!(delta == 0.0, "covariance fits are centered"),
        }
    }

    /// Total working weight mass.
    pub fn weight_sum(&self) -> f64 {
        match self {
            Self::Naive(state) => state.weight_sum(),
            Self::Covariance(_) => 1.0,
        }
    }

    /// IRLS refresh at unchanged coefficients (naive state only).
    pub fn refresh(&mut self, wt: &[f64], resid: &[f64]) {
        match self {
            Self::Naive(state) => state.refresh(wt, resid),
            Self::Covariance(_) => {
                debug_assert!(false, "covariance fits never reweight");
            }
        }
    }
}
