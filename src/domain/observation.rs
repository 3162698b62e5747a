//! Observed spectra, one container per instrument.
//!
//! Arrays are stored chip-major (`wlen[chip][pixel]`); the chip index is the
//! same physical detector order in every stage of the pipeline.

use nalgebra_sparse::{CooMatrix, CscMatrix};

use crate::error::AppError;
use crate::math::bin_widths;

/// GP kernel support in units of the length scale.
pub const GP_CUTOFF_LENGTHS: f64 = 5.0;

#[derive(Debug, Clone)]
pub struct Observation {
    pub wlen: Vec<Vec<f64>>,
    pub flux: Vec<Vec<f64>>,
    pub err: Vec<Vec<f64>>,
    pub wlen_bins: Vec<Vec<f64>>,
}

impl Observation {
    /// Validate chip shapes and compute bin widths.
    pub fn new(wlen: Vec<Vec<f64>>, flux: Vec<Vec<f64>>, err: Vec<Vec<f64>>) -> Result<Self, AppError> {
        if wlen.is_empty() {
            return Err(AppError::data("Observation has no chips."));
        }
        if flux.len() != wlen.len() || err.len() != wlen.len() {
            return Err(AppError::data("Observation arrays disagree on the number of chips."));
        }
        for (chip, ((w, f), e)) in wlen.iter().zip(&flux).zip(&err).enumerate() {
            if w.len() < 2 {
                return Err(AppError::data(format!("Chip {chip} has fewer than 2 pixels.")));
            }
            if f.len() != w.len() || e.len() != w.len() {
                return Err(AppError::data(format!("Chip {chip} arrays differ in length.")));
            }
            if !w.windows(2).all(|p| p[1] > p[0]) {
                return Err(AppError::data(format!(
                    "Chip {chip} wavelengths are not strictly increasing."
                )));
            }
        }
        let mut obs = Self {
            wlen,
            flux,
            err,
            wlen_bins: Vec::new(),
        };
        obs.make_wlen_bins();
        Ok(obs)
    }

    pub fn n_chips(&self) -> usize {
        self.wlen.len()
    }

    pub fn make_wlen_bins(&mut self) {
        self.wlen_bins = self.wlen.iter().map(|w| bin_widths(w)).collect();
    }

    /// Gaussian-process covariance for one chip:
    /// `K_ij = δ_ij σ_i² + a² σ_i σ_j exp(-(λ_i - λ_j)² / (2 ℓ²))`.
    ///
    /// The kernel is zero beyond [`GP_CUTOFF_LENGTHS`] length scales, so the
    /// matrix is banded (wavelengths are sorted) and stored sparse.
    pub fn make_covariance(&self, chip: usize, amp: f64, length: f64) -> CscMatrix<f64> {
        let w = &self.wlen[chip];
        let s = &self.err[chip];
        let n = w.len();
        let amp2 = amp * amp;
        let denom = 2.0 * length * length;
        let reach = GP_CUTOFF_LENGTHS * length;

        let mut coo = CooMatrix::new(n, n);
        for i in 0..n {
            coo.push(i, i, s[i] * s[i] * (1.0 + amp2));
            if !(denom > 0.0) || amp2 == 0.0 {
                continue;
            }
            for j in (i + 1)..n {
                let d = w[j] - w[i];
                if d > reach {
                    break;
                }
                let k = amp2 * s[i] * s[j] * (-(d * d) / denom).exp();
                coo.push(i, j, k);
                coo.push(j, i, k);
            }
        }
        CscMatrix::from(&coo)
    }

    /// Flattened wavelengths of chips `start..start+count`.
    pub fn chip_group_wlen(&self, start: usize, count: usize) -> Vec<f64> {
        let end = (start + count).min(self.n_chips());
        self.wlen[start..end].iter().flatten().copied().collect()
    }
}
