//! Sampler collaborator seam.
//!
//! A sampler only ever sees a [`LikelihoodProblem`]: a prior transform on the
//! unit cube and a log-likelihood of the transformed point. The bundled
//! [`NestedSampler`] is one implementation; any other engine can be plugged in
//! through [`Sampler`].

pub mod nested;
pub mod summary;

pub use nested::*;
pub use summary::*;

use crate::error::AppError;

pub trait LikelihoodProblem: Sync {
    /// Number of free parameters (cube dimensions).
    fn n_dims(&self) -> usize;

    /// Free-parameter names in cube order.
    fn parameter_names(&self) -> Vec<String>;

    /// Map a unit-cube point to physical values in place.
    fn prior(&self, cube: &mut [f64]) -> Result<(), AppError>;

    /// Log-likelihood of a point already mapped by [`LikelihoodProblem::prior`].
    fn loglike(&self, params: &[f64]) -> Result<f64, AppError>;
}

pub trait Sampler {
    /// Sample the posterior, writing outputs under `prefix`
    /// (`{prefix}samples.csv`, `{prefix}stats.json`).
    fn run(&mut self, problem: &dyn LikelihoodProblem, prefix: &str) -> Result<PosteriorSummary, AppError>;
}
