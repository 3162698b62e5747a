//! Per-chip noise models.
//!
//! A chip's noise is either independent per pixel or a full covariance
//! factorized once with a sparse Cholesky. Both variants expose the same
//! operations, so the likelihood code never branches on the representation.

use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::CscMatrix;
use nalgebra_sparse::factorization::CscCholesky;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub enum NoiseModel {
    /// Per-pixel standard deviations.
    Diagonal { sigma: DVector<f64> },
    /// `scale · Σ` with `Σ = L Lᵀ`, `L` sparse.
    Full {
        cholesky: CscCholesky<f64>,
        log_det_l: f64,
        scale: f64,
    },
}

impl NoiseModel {
    pub fn diagonal(sigma: &[f64]) -> Result<Self, AppError> {
        if let Some(bad) = sigma.iter().find(|s| !(s.is_finite() && **s > 0.0)) {
            return Err(AppError::numeric(format!("Non-positive uncertainty {bad}.")));
        }
        Ok(NoiseModel::Diagonal {
            sigma: DVector::from_column_slice(sigma),
        })
    }

    /// Factorize a covariance matrix. Failure means it is not positive definite.
    pub fn full(cov: CscMatrix<f64>) -> Result<Self, AppError> {
        if cov.nrows() != cov.ncols() {
            return Err(AppError::internal(format!(
                "Covariance is {}x{}, not square.",
                cov.nrows(),
                cov.ncols()
            )));
        }
        let n = cov.nrows();
        if let Some((i, j, v)) = cov.triplet_iter().find(|(_, _, v)| !v.is_finite()) {
            return Err(AppError::numeric(format!("Covariance entry ({i}, {j}) is {v}.")));
        }
        let cholesky = CscCholesky::factor(&cov).map_err(|e| {
            AppError::numeric(format!("Covariance ({n}x{n}) is not positive definite: {e:?}."))
        })?;
        let log_det_l = cholesky
            .l()
            .triplet_iter()
            .filter(|(i, j, _)| i == j)
            .map(|(_, _, d)| d.ln())
            .sum();
        Ok(NoiseModel::Full {
            cholesky,
            log_det_l,
            scale: 1.0,
        })
    }

    pub fn len(&self) -> usize {
        match self {
            NoiseModel::Diagonal { sigma } => sigma.len(),
            NoiseModel::Full { cholesky, .. } => cholesky.l().nrows(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `Σ⁻¹ v`.
    pub fn solve(&self, v: &DVector<f64>) -> DVector<f64> {
        match self {
            NoiseModel::Diagonal { sigma } => v.component_div(&sigma.component_mul(sigma)),
            NoiseModel::Full { cholesky, scale, .. } => {
                let rhs = DMatrix::from_column_slice(v.len(), 1, v.as_slice());
                let x = cholesky.solve(&rhs);
                DVector::from_column_slice(x.as_slice()) / *scale
            }
        }
    }

    /// `u · Σ⁻¹ v`.
    pub fn inner(&self, u: &DVector<f64>, v: &DVector<f64>) -> f64 {
        u.dot(&self.solve(v))
    }

    /// `v · Σ⁻¹ v`.
    pub fn quadratic_form(&self, v: &DVector<f64>) -> f64 {
        match self {
            NoiseModel::Diagonal { sigma } => v.component_div(sigma).norm_squared(),
            NoiseModel::Full { .. } => self.inner(v, v),
        }
    }

    /// `ln |Σ|`.
    pub fn log_determinant(&self) -> f64 {
        match self {
            NoiseModel::Diagonal { sigma } => sigma.iter().map(|s| (s * s).ln()).sum(),
            NoiseModel::Full { log_det_l, scale, .. } => {
                2.0 * log_det_l + self.len() as f64 * scale.ln()
            }
        }
    }

    /// Multiply the stored noise by `beta`: the uncertainties for a diagonal
    /// model, the covariance for a full one.
    pub fn inflate(self, beta: f64) -> Self {
        match self {
            NoiseModel::Diagonal { sigma } => NoiseModel::Diagonal { sigma: sigma * beta },
            NoiseModel::Full {
                cholesky,
                log_det_l,
                scale,
            } => NoiseModel::Full {
                cholesky,
                log_det_l,
                scale: scale * beta,
            },
        }
    }
}
