//! Flux-conserving rebinning onto observed pixels.
//!
//! The high-resolution model is treated as piecewise constant: each native
//! sample owns the cell between the midpoints to its neighbours. Each
//! observed pixel `[λ - w/2, λ + w/2]` receives the overlap-weighted mean of
//! the native cells it covers, so integrated flux over the bin is preserved.
//! Pixels that extend past the model only average over the covered part.

use crate::error::AppError;

/// Rebin `(wlen_native, flux_native)` onto pixels centred at `wlen_obs` with
/// full widths `bins_obs`.
///
/// `wlen_native` must be strictly increasing. Pixels with no overlap at all
/// are a data error: the model does not cover the observation.
pub fn rebin_give_width(
    wlen_native: &[f64],
    flux_native: &[f64],
    wlen_obs: &[f64],
    bins_obs: &[f64],
) -> Result<Vec<f64>, AppError> {
    let n = wlen_native.len();
    if n < 2 || flux_native.len() != n {
        return Err(AppError::data(format!(
            "Rebinning needs matching native arrays with >= 2 samples (got {} and {}).",
            n,
            flux_native.len()
        )));
    }
    if wlen_obs.len() != bins_obs.len() {
        return Err(AppError::data("Observed wavelengths and bin widths differ in length."));
    }

    // Cell edges: midpoints between samples, half a spacing beyond each end.
    let mut edges = Vec::with_capacity(n + 1);
    edges.push(wlen_native[0] - 0.5 * (wlen_native[1] - wlen_native[0]));
    for w in wlen_native.windows(2) {
        edges.push(0.5 * (w[0] + w[1]));
    }
    edges.push(wlen_native[n - 1] + 0.5 * (wlen_native[n - 1] - wlen_native[n - 2]));

    let mut out = Vec::with_capacity(wlen_obs.len());
    for (&centre, &width) in wlen_obs.iter().zip(bins_obs) {
        let lo = centre - 0.5 * width;
        let hi = centre + 0.5 * width;

        // First cell whose upper edge lies above `lo`.
        let start = edges[1..].partition_point(|&e| e <= lo);
        let mut weighted = 0.0;
        let mut covered = 0.0;
        for k in start..n {
            let cell_lo = edges[k];
            if cell_lo >= hi {
                break;
            }
            let overlap = edges[k + 1].min(hi) - cell_lo.max(lo);
            if overlap > 0.0 {
                weighted += overlap * flux_native[k];
                covered += overlap;
            }
        }

        if covered <= 0.0 {
            return Err(AppError::data(format!(
                "Model grid [{:.4}, {:.4}] does not cover observed pixel at {centre:.4}.",
                wlen_native[0],
                wlen_native[n - 1]
            )));
        }
        out.push(weighted / covered);
    }
    Ok(out)
}
