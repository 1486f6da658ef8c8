//! Coordinate-descent core for elastic-net regularized GLM paths.
//!
//! Given a dense or compressed-sparse-column design, a response and a convex
//! penalty mixing ridge and lasso terms, the solver computes a sequence of
//! coefficient vectors along a decreasing grid of penalty strengths, using
//! warm starts, strong-rule screening and KKT verification. Gaussian,
//! binomial, Poisson and multinomial families are supported, with
//! observation weights, offsets, per-coordinate penalty factors, box
//! constraints and exclusion lists.
//!
//! The solver is single-threaded and synchronous; one fit owns its state
//! exclusively. Numerical thresholds live in an explicit [`SolverConfig`]
//! value rather than process globals, so a scoped override is just a
//! modified copy.

pub mod api;
pub mod config;
pub mod data;
pub mod error;
mod family;
pub mod penalty;
pub mod result;
mod solver;

pub use api::{
    GaussianMode, NewtonKind, PathOptions, Progress, fit_binomial, fit_gaussian,
    fit_multinomial, fit_poisson,
};
pub use config::SolverConfig;
pub use data::{CscMatrix, DataView, DesignMatrix};
pub use error::{PathError, PathWarning};
pub use result::{MultinomialPathResult, PathResult};
