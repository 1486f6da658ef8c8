//! Design-matrix storage and the read-only column view used by the solver.
//!
//! Columns are exposed through raw primitives (`col_dot`, `col_axpy_weighted`,
//! `col_weighted_sums`) over the *stored* entries only; centering and scaling
//! are applied arithmetically by the gradient state using the cached
//! per-column mean and scale. This keeps one shared code path for dense and
//! compressed-sparse-column designs, with per-operation cost O(n) dense and
//! O(nnz) sparse.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::error::PathError;

/// Compressed-sparse-column storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CscMatrix {
    nrows: usize,
    ncols: usize,
    indptr: Vec<usize>,
    indices: Vec<usize>,
    values: Vec<f64>,
}

impl CscMatrix {
    /// Builds a CSC matrix from its raw parts, validating the layout.
    ///
    /// # Errors
    /// Returns `PathError::Validation` if the column pointers, row indices or
    /// values are inconsistent or non-finite.
    pub fn new(
        nrows: usize,
        ncols: usize,
        indptr: Vec<usize>,
        indices: Vec<usize>,
        values: Vec<f64>,
    ) -> Result<Self, PathError> {
        if indptr.len() != ncols + 1 {
            return Err(PathError::Validation(format!(
                "Column pointer length mismatch: expected {}, got {}",
                ncols + 1,
                indptr.len()
            )));
        }
        if indptr[0] != 0 || indptr[ncols] != indices.len() {
            return Err(PathError::Validation(
                "Column pointers must start at 0 and end at nnz".to_string(),
            ));
        }
        if indices.len() != values.len() {
            return Err(PathError::Validation(format!(
                "Row index / value length mismatch: {} indices, {} values",
                indices.len(),
                values.len()
            )));
        }
        for j in 0..ncols {
            if indptr[j] > indptr[j + 1] {
                return Err(PathError::Validation(format!(
                    "Column pointers must be non-decreasing (column {j})"
                )));
            }
        }
        for (pos, &row) in indices.iter().enumerate() {
            if row >= nrows {
                return Err(PathError::Validation(format!(
                    "Row index {row} out of range at position {pos} (nrows = {nrows})"
                )));
            }
        }
        for (pos, value) in values.iter().enumerate() {
            if !value.is_finite() {
                return Err(PathError::Validation(format!(
                    "Non-finite value in sparse matrix at position {pos}"
                )));
            }
        }
        Ok(Self {
            nrows,
            ncols,
            indptr,
            indices,
            values,
        })
    }

    /// Converts a dense matrix, keeping only nonzero entries.
    pub fn from_dense(x: &Array2<f64>) -> Self {
        let (nrows, ncols) = x.dim();
        let mut indptr = Vec::with_capacity(ncols + 1);
        let mut indices = Vec::new();
        let mut values = Vec::new();
        indptr.push(0);
        for j in 0..ncols {
            for i in 0..nrows {
                let v = x[[i, j]];
                if v != 0.0 {
                    indices.push(i);
                    values.push(v);
                }
            }
            indptr.push(indices.len());
        }
        Self {
            nrows,
            ncols,
            indptr,
            indices,
            values,
        }
    }

    /// Number of rows.
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    /// Number of columns.
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    fn col(&self, j: usize) -> (&[usize], &[f64]) {
        let lo = self.indptr[j];
        let hi = self.indptr[j + 1];
        (&self.indices[lo..hi], &self.values[lo..hi])
    }
}

/// A design matrix in either dense or compressed-sparse-column form.
///
/// The solver is column-addressable; dense storage may use either memory
/// order, though column-major keeps column passes contiguous.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DesignMatrix {
    /// Dense n x p matrix.
    Dense(Array2<f64>),
    /// Compressed-sparse-column n x p matrix.
    Sparse(CscMatrix),
}

impl DesignMatrix {
    /// Wraps a dense matrix, rejecting non-finite entries.
    ///
    /// # Errors
    /// Returns `PathError::Validation` if any entry is NaN or infinite.
    pub fn dense(x: Array2<f64>) -> Result<Self, PathError> {
        for ((i, j), v) in x.indexed_iter() {
            if !v.is_finite() {
                return Err(PathError::Validation(format!(
                    "Non-finite design entry at ({i}, {j})"
                )));
            }
        }
        Ok(Self::Dense(x))
    }

    /// Wraps a validated sparse matrix.
    pub fn sparse(x: CscMatrix) -> Self {
        Self::Sparse(x)
    }

    /// Number of observations.
    pub fn nrows(&self) -> usize {
        match self {
            Self::Dense(x) => x.nrows(),
            Self::Sparse(x) => x.nrows(),
        }
    }

    /// Number of predictors.
    pub fn ncols(&self) -> usize {
        match self {
            Self::Dense(x) => x.ncols(),
            Self::Sparse(x) => x.ncols(),
        }
    }

    /// True for dense storage.
    pub fn is_dense(&self) -> bool {
        matches!(self, Self::Dense(_))
    }
}

/// Read-only column view over a design matrix with cached standardization
/// moments. Created once per fit; the standardize/center mode is fixed at
/// construction and all column operations observe it consistently.
#[derive(Debug)]
pub struct DataView<'a> {
    x: &'a DesignMatrix,
    w: Array1<f64>,
    xm: Array1<f64>,
    xs: Array1<f64>,
    constant: Vec<bool>,
    centered: bool,
}

impl<'a> DataView<'a> {
    /// Builds the view: validates and normalizes the observation weights to
    /// sum one, then caches per-column weighted means and scales using 1/n
    /// (weighted) moments.
    ///
    /// With `center` false (no intercept) the mean cache is zero and the
    /// scale, when standardizing, is the uncentered second moment.
    ///
    /// # Errors
    /// Returns `PathError::Validation` for a weight-length mismatch,
    /// negative, non-finite or all-zero weights.
    pub fn new(
        x: &'a DesignMatrix,
        weights: Option<&Array1<f64>>,
        standardize: bool,
        center: bool,
    ) -> Result<Self, PathError> {
        let n = x.nrows();
        let p = x.ncols();
        if n == 0 || p == 0 {
            return Err(PathError::Validation(format!(
                "Design matrix must be non-empty, got {n} x {p}"
            )));
        }

        let mut w = match weights {
            Some(user) => {
                if user.len() != n {
                    return Err(PathError::Validation(format!(
                        "Weight length mismatch: expected {n}, got {}",
                        user.len()
                    )));
                }
                for (i, &wi) in user.iter().enumerate() {
                    if !wi.is_finite() || wi < 0.0 {
                        return Err(PathError::Validation(format!(
                            "Weights must be finite and non-negative, got {wi} at index {i}"
                        )));
                    }
                }
                // Rebuild to guarantee contiguous storage whatever view the
                // caller handed in.
                Array1::from_iter(user.iter().copied())
            }
            None => Array1::ones(n),
        };
        let sw: f64 = w.sum();
        if sw <= 0.0 {
            return Err(PathError::Validation(
                "Observation weights sum to zero".to_string(),
            ));
        }
        w.mapv_inplace(|wi| wi / sw);

        let mut xm = Array1::zeros(p);
        let mut xs = Array1::ones(p);
        let mut constant = vec![false; p];
        for j in 0..p {
            let (swx, swx2) = column_weighted_sums(x, j, w.as_slice().expect("contiguous"));
            constant[j] = column_is_constant(x, j);
            if center {
                xm[j] = swx;
            }
            if standardize {
                let second = if center { swx2 - swx * swx } else { swx2 };
                let scale = second.max(0.0).sqrt();
                // Constant columns are frozen elsewhere; a unit scale keeps
                // the arithmetic finite.
                xs[j] = if scale > 0.0 { scale } else { 1.0 };
            }
        }

        Ok(Self {
            x,
            w,
            xm,
            xs,
            constant,
            centered: center,
        })
    }

    /// Number of observations.
    pub fn n(&self) -> usize {
        self.x.nrows()
    }

    /// Number of predictors.
    pub fn p(&self) -> usize {
        self.x.ncols()
    }

    /// Normalized observation weights (sum one).
    pub fn weights(&self) -> &Array1<f64> {
        &self.w
    }

    /// Cached per-column weighted means (zero when not centering).
    pub fn xm(&self) -> &Array1<f64> {
        &self.xm
    }

    /// Cached per-column scales (one when not standardizing).
    pub fn xs(&self) -> &Array1<f64> {
        &self.xs
    }

    /// Whether columns are virtually centered by the gradient state.
    pub fn centered(&self) -> bool {
        self.centered
    }

    /// True when column `j` is exactly constant: every dense entry equal, or
    /// a sparse column that is empty or fully stored with equal values.
    pub fn is_constant(&self, j: usize) -> bool {
        self.constant[j]
    }

    /// Underlying storage kind.
    pub fn is_dense(&self) -> bool {
        self.x.is_dense()
    }

    /// Raw dot product of stored column entries with `v`.
    pub fn col_dot(&self, j: usize, v: &[f64]) -> f64 {
        match self.x {
            DesignMatrix::Dense(x) => {
                let mut acc = 0.0;
                for (i, xij) in x.column(j).iter().enumerate() {
                    acc += xij * v[i];
                }
                acc
            }
            DesignMatrix::Sparse(x) => {
                let (rows, vals) = x.col(j);
                rows.iter().zip(vals).map(|(&i, &xij)| xij * v[i]).sum()
            }
        }
    }

    /// One-pass raw dot of stored column entries against two vectors;
    /// returns `(sum x*a, sum x*b)`.
    pub fn col_dot2(&self, j: usize, a: &[f64], b: &[f64]) -> (f64, f64) {
        match self.x {
            DesignMatrix::Dense(x) => {
                let (mut da, mut db) = (0.0, 0.0);
                for (i, xij) in x.column(j).iter().enumerate() {
                    da += xij * a[i];
                    db += xij * b[i];
                }
                (da, db)
            }
            DesignMatrix::Sparse(x) => {
                let (rows, vals) = x.col(j);
                let (mut da, mut db) = (0.0, 0.0);
                for (&i, &xij) in rows.iter().zip(vals) {
                    da += xij * a[i];
                    db += xij * b[i];
                }
                (da, db)
            }
        }
    }

    /// `out[i] += c * w[i] * x[i, j]` over stored entries.
    pub fn col_axpy_weighted(&self, j: usize, c: f64, w: &[f64], out: &mut [f64]) {
        match self.x {
            DesignMatrix::Dense(x) => {
                for (i, xij) in x.column(j).iter().enumerate() {
                    out[i] += c * w[i] * xij;
                }
            }
            DesignMatrix::Sparse(x) => {
                let (rows, vals) = x.col(j);
                for (&i, &xij) in rows.iter().zip(vals) {
                    out[i] += c * w[i] * xij;
                }
            }
        }
    }

    /// `out[i] += c * x[i, j]` over stored entries.
    pub fn col_add_scaled(&self, j: usize, c: f64, out: &mut [f64]) {
        match self.x {
            DesignMatrix::Dense(x) => {
                for (i, xij) in x.column(j).iter().enumerate() {
                    out[i] += c * xij;
                }
            }
            DesignMatrix::Sparse(x) => {
                let (rows, vals) = x.col(j);
                for (&i, &xij) in rows.iter().zip(vals) {
                    out[i] += c * xij;
                }
            }
        }
    }

    /// Weighted first and second raw moments of column `j` under `w`:
    /// `(sum w*x, sum w*x^2)` over stored entries.
    pub fn col_weighted_sums(&self, j: usize, w: &[f64]) -> (f64, f64) {
        column_weighted_sums(self.x, j, w)
    }
}

fn column_weighted_sums(x: &DesignMatrix, j: usize, w: &[f64]) -> (f64, f64) {
    match x {
        DesignMatrix::Dense(m) => {
            let (mut swx, mut swx2) = (0.0, 0.0);
            for (i, xij) in m.column(j).iter().enumerate() {
                swx += w[i] * xij;
                swx2 += w[i] * xij * xij;
            }
            (swx, swx2)
        }
        DesignMatrix::Sparse(m) => {
            let (rows, vals) = m.col(j);
            let (mut swx, mut swx2) = (0.0, 0.0);
            for (&i, &xij) in rows.iter().zip(vals) {
                swx += w[i] * xij;
                swx2 += w[i] * xij * xij;
            }
            (swx, swx2)
        }
    }
}

fn column_is_constant(x: &DesignMatrix, j: usize) -> bool {
    match x {
        DesignMatrix::Dense(m) => {
            let col = m.column(j);
            let first = col[0];
            col.iter().all(|&v| v == first)
        }
        DesignMatrix::Sparse(m) => {
            let (rows, vals) = m.col(j);
            if rows.is_empty() {
                return true;
            }
            if rows.len() < m.nrows() {
                // A mix of stored and implicit-zero entries is constant only
                // if the stored values are themselves zero.
                return vals.iter().all(|&v| v == 0.0);
            }
            let first = vals[0];
            vals.iter().all(|&v| v == first)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn small_dense() -> DesignMatrix {
        DesignMatrix::Dense(array![[1.0, 0.0], [2.0, 3.0], [3.0, 0.0], [4.0, 5.0]])
    }

    #[test]
    fn weighted_moments_use_normalized_weights() {
        let x = small_dense();
        let view = DataView::new(&x, None, true, true).expect("valid view");
        // Column 0 mean under uniform weights.
        assert_relative_eq!(view.xm()[0], 2.5, epsilon = 1e-12);
        // 1/n variance, not 1/(n-1).
        let var = (1.25f64 + 0.25 + 0.25 + 2.25) / 4.0;
        assert_relative_eq!(view.xs()[0], var.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn sparse_and_dense_views_agree() {
        let dense = small_dense();
        let DesignMatrix::Dense(raw) = &dense else {
            unreachable!()
        };
        let sparse = DesignMatrix::Sparse(CscMatrix::from_dense(raw));
        let dv = DataView::new(&dense, None, true, true).expect("dense view");
        let sv = DataView::new(&sparse, None, true, true).expect("sparse view");

        let v = [1.0, -2.0, 0.5, 3.0];
        for j in 0..2 {
            assert_relative_eq!(dv.col_dot(j, &v), sv.col_dot(j, &v), epsilon = 1e-12);
            assert_relative_eq!(dv.xm()[j], sv.xm()[j], epsilon = 1e-12);
            assert_relative_eq!(dv.xs()[j], sv.xs()[j], epsilon = 1e-12);
        }
    }

    #[test]
    fn constant_column_detection_is_exact() {
        let x = DesignMatrix::Dense(array![[1.0, 2.0], [1.0, 2.0], [1.0, 2.1]]);
        let view = DataView::new(&x, None, true, true).expect("valid view");
        assert!(view.is_constant(0));
        assert!(!view.is_constant(1));

        // Sparse column with stored and implicit zeros is not constant.
        let sp = CscMatrix::new(3, 1, vec![0, 1], vec![1], vec![2.0]).expect("valid csc");
        let sx = DesignMatrix::Sparse(sp);
        let sview = DataView::new(&sx, None, true, true).expect("valid view");
        assert!(!sview.is_constant(0));
    }

    #[test]
    fn rejects_bad_weights() {
        let x = small_dense();
        let negative = array![1.0, -1.0, 1.0, 1.0];
        let err = DataView::new(&x, Some(&negative), true, true).unwrap_err();
        assert!(matches!(err, PathError::Validation(_)));
    }

    #[test]
    fn csc_layout_is_validated() {
        assert!(CscMatrix::new(3, 2, vec![0, 1], vec![0], vec![1.0]).is_err());
        assert!(CscMatrix::new(3, 1, vec![0, 1], vec![5], vec![1.0]).is_err());
        assert!(CscMatrix::new(3, 1, vec![0, 1], vec![0], vec![f64::NAN]).is_err());
    }
}
