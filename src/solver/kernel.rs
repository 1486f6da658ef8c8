//! Single-coordinate update primitives: soft-threshold plus box clip.

/// Soft-threshold operator `S(u, t) = sign(u) * max(|u| - t, 0)`.
#[inline]
pub fn soft_threshold(u: f64, t: f64) -> f64 {
    if u > t {
        u - t
    } else if u < -t {
        u + t
    } else {
        0.0
    }
}

/// Proposes a new value for one coordinate.
///
/// `g` is the current partial gradient at `beta_old`, `d` the coordinate
/// curvature (weighted second moment of the standardized column), `l1`/`l2`
/// the penalty terms at the current lambda, and `(lo, hi)` the box. Returns
/// `(beta_new, delta)`; a zero delta is a no-op for the caller.
#[inline]
pub fn coordinate_update(
    beta_old: f64,
    g: f64,
    d: f64,
    l1: f64,
    l2: f64,
    lo: f64,
    hi: f64,
) -> (f64, f64) {
    let u = d * beta_old + g;
    let mut beta_new = soft_threshold(u, l1) / (d + l2);
    beta_new = beta_new.clamp(lo, hi);
    (beta_new, beta_new - beta_old)
}

/// Grouped variant for the multinomial group lasso: the per-class values of
/// one variable are shrunk jointly by the L2 norm of the unpenalized
/// proposal, then clipped class-by-class.
///
/// Writes the new values into `beta_new` and returns the largest absolute
/// per-class change.
#[allow(clippy::too_many_arguments)]
pub fn grouped_update(
    beta_old: &[f64],
    g: &[f64],
    d: f64,
    l1: f64,
    l2: f64,
    lo: f64,
    hi: f64,
    beta_new: &mut [f64],
) -> f64 {
    let mut norm2 = 0.0;
    for k in 0..beta_old.len() {
        let u = d * beta_old[k] + g[k];
        beta_new[k] = u;
        norm2 += u * u;
    }
    let norm = norm2.sqrt();
    let shrink = if norm > 0.0 {
        (1.0 - l1 / norm).max(0.0) / (d + l2)
    } else {
        0.0
    };
    let mut max_delta = 0.0f64;
    for k in 0..beta_old.len() {
        beta_new[k] = (beta_new[k] * shrink).clamp(lo, hi);
        max_delta = max_delta.max((beta_new[k] - beta_old[k]).abs());
    }
    max_delta
}
