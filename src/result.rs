//! Accumulated path output in compressed coefficient form.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::error::PathWarning;

/// Regularization path for a single-response family.
///
/// Coefficients are stored compressed: column `m` holds values for the
/// first `nin[m]` entries of `ia`, the ever-active variable list in order
/// of first entry across the whole path. `coefficients` unpacks a column
/// to dense form. Coefficients and intercepts are on the original data
/// scale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathResult {
    /// Number of lambda columns actually filled.
    pub lmu: usize,
    /// Penalty strengths used, strictly decreasing.
    pub lambda: Vec<f64>,
    /// Intercept per lambda.
    pub a0: Vec<f64>,
    /// Packed coefficient columns; `ca[m][k]` belongs to variable `ia[k]`.
    pub ca: Vec<Vec<f64>>,
    /// Ever-active variable indices in first-entry order.
    pub ia: Vec<usize>,
    /// Number of packed coefficients per lambda.
    pub nin: Vec<usize>,
    /// Fraction of null deviance explained per lambda; non-decreasing.
    pub dev_ratio: Vec<f64>,
    /// Deviance of the null model.
    pub null_dev: f64,
    /// Total coordinate-descent passes over the data.
    pub nlp: usize,
    /// Numeric status code: zero on success, negative for a truncated path.
    pub jerr: i32,
    /// Non-fatal conditions that truncated the path.
    pub warnings: Vec<PathWarning>,
    /// Number of predictors.
    pub nvars: usize,
    /// Number of observations.
    pub nobs: usize,
}

impl PathResult {
    /// Dense coefficient vector for column `m`.
    pub fn coefficients(&self, m: usize) -> Array1<f64> {
        let mut beta = Array1::zeros(self.nvars);
        for k in 0..self.nin[m] {
            beta[self.ia[k]] = self.ca[m][k];
        }
        beta
    }

    /// Number of nonzero coefficients in column `m`.
    pub fn df(&self, m: usize) -> usize {
        self.ca[m].iter().filter(|&&c| c != 0.0).count()
    }

    /// Number of recorded columns.
    pub fn len(&self) -> usize {
        self.lmu
    }

    /// True when the path has no recorded columns.
    pub fn is_empty(&self) -> bool {
        self.lmu == 0
    }
}

/// Regularization path for the multinomial family.
///
/// Per-class values of one variable are stored adjacently:
/// `ca[m][k * nclasses + c]` is the coefficient of variable `ia[k]` for
/// class `c` at lambda `m`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultinomialPathResult {
    /// Number of lambda columns actually filled.
    pub lmu: usize,
    /// Penalty strengths used, strictly decreasing.
    pub lambda: Vec<f64>,
    /// Per-class intercepts per lambda.
    pub a0: Vec<Vec<f64>>,
    /// Packed coefficient blocks per lambda.
    pub ca: Vec<Vec<f64>>,
    /// Ever-active variable indices in first-entry order.
    pub ia: Vec<usize>,
    /// Number of packed variables per lambda.
    pub nin: Vec<usize>,
    /// Fraction of null deviance explained per lambda; non-decreasing.
    pub dev_ratio: Vec<f64>,
    /// Deviance of the null model.
    pub null_dev: f64,
    /// Total coordinate-descent passes over the data.
    pub nlp: usize,
    /// Numeric status code: zero on success, negative for a truncated path.
    pub jerr: i32,
    /// Non-fatal conditions that truncated the path.
    pub warnings: Vec<PathWarning>,
    /// Number of predictors.
    pub nvars: usize,
    /// Number of observations.
    pub nobs: usize,
    /// Number of response classes.
    pub nclasses: usize,
}

impl MultinomialPathResult {
    /// Dense `nvars x nclasses` coefficient matrix for column `m`.
    pub fn coefficients(&self, m: usize) -> Array2<f64> {
        let mut beta = Array2::zeros((self.nvars, self.nclasses));
        for k in 0..self.nin[m] {
            let j = self.ia[k];
            for c in 0..self.nclasses {
                beta[[j, c]] = self.ca[m][k * self.nclasses + c];
            }
        }
        beta
    }

    /// Number of variables with any nonzero class coefficient in column `m`.
    pub fn df(&self, m: usize) -> usize {
        (0..self.nin[m])
            .filter(|&k| {
                (0..self.nclasses).any(|c| self.ca[m][k * self.nclasses + c] != 0.0)
            })
            .count()
    }

    /// Number of recorded columns.
    pub fn len(&self) -> usize {
        self.lmu
    }

    /// True when the path has no recorded columns.
    pub fn is_empty(&self) -> bool {
        self.lmu == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_columns_unpack_by_entry_order() {
        let result = PathResult {
            lmu: 2,
            lambda: vec![1.0, 0.5],
            a0: vec![0.0, 0.1],
            ca: vec![vec![2.0], vec![1.5, -0.5]],
            ia: vec![3, 1],
            nin: vec![1, 2],
            dev_ratio: vec![0.2, 0.6],
            null_dev: 1.0,
            nlp: 7,
            jerr: 0,
            warnings: Vec::new(),
            nvars: 5,
            nobs: 10,
        };
        let b0 = result.coefficients(0);
        assert_eq!(b0[3], 2.0);
        assert_eq!(b0[1], 0.0);
        let b1 = result.coefficients(1);
        assert_eq!(b1[3], 1.5);
        assert_eq!(b1[1], -0.5);
        assert_eq!(result.df(1), 2);
    }
}
