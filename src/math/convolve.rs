//! Line-broadening convolutions on uniformly sampled wavelength grids.
//!
//! All kernels are built once per call at the chip's mean wavelength, so the
//! broadening width is constant in wavelength across a chip. Inputs must be
//! evenly spaced; callers resample onto a uniform grid first.

use std::f64::consts::PI;

/// Speed of light in km/s.
pub const C_KMS: f64 = 299_792.458;

/// `2 * sqrt(2 ln 2)`: Gaussian FWHM / sigma.
const FWHM_TO_SIGMA: f64 = 2.354_820_045_030_949_3;

/// Gaussian kernel half-width in sigmas.
const GAUSS_TRUNCATE: f64 = 4.0;

/// Lorentzian kernel half-width in FWHMs.
const LORENTZ_TRUNCATE: f64 = 10.0;

/// Discrete convolution returning the central `signal.len()` samples of the
/// full convolution (zero padding outside the signal).
pub fn convolve_same(signal: &[f64], kernel: &[f64]) -> Vec<f64> {
    let n = signal.len();
    let m = kernel.len();
    if n == 0 || m == 0 {
        return vec![0.0; n];
    }
    let offset = (m - 1) / 2;
    (0..n)
        .map(|i| {
            let k = i + offset;
            // full[k] = sum_j kernel[j] * signal[k - j]
            let j_min = k.saturating_sub(n - 1);
            let j_max = k.min(m - 1);
            (j_min..=j_max).map(|j| kernel[j] * signal[k - j]).sum()
        })
        .collect()
}

fn uniform_step(wlen: &[f64]) -> Option<f64> {
    if wlen.len() < 2 {
        return None;
    }
    let dwl = wlen[1] - wlen[0];
    (dwl.is_finite() && dwl > 0.0).then_some(dwl)
}

/// Rotational broadening with a linear limb-darkening law.
///
/// `epsilon` is the limb-darkening coefficient and `vsini` the projected
/// rotational velocity in km/s. The discrete kernel is renormalized so that
/// mild broadening does not shift or rescale the spectrum.
pub fn rot_broaden(wlen: &[f64], flux: &[f64], epsilon: f64, vsini: f64) -> Vec<f64> {
    let Some(dwl) = uniform_step(wlen) else {
        return flux.to_vec();
    };
    if !(vsini > 0.0) {
        return flux.to_vec();
    }

    let eff_wlen = crate::math::grid::mean(wlen);
    let dl_max = vsini / C_KMS * eff_wlen;
    let c1 = 2.0 * (1.0 - epsilon) / (PI * dl_max * (1.0 - epsilon / 3.0));
    let c2 = epsilon / (2.0 * dl_max * (1.0 - epsilon / 3.0));

    let half = (dl_max / dwl).floor() as isize + 1;
    let mut kernel: Vec<f64> = (-2 * half..2 * half)
        .filter_map(|k| {
            let x = k as f64 * dwl / dl_max;
            (x.abs() < 1.0).then(|| {
                let u = 1.0 - x * x;
                c1 * u.sqrt() + c2 * u
            })
        })
        .filter(|g| *g > 0.0)
        .collect();

    let total: f64 = kernel.iter().sum();
    if !(total > 0.0) {
        return flux.to_vec();
    }
    // Normalized to unit area (sum * dwl == 1), then weighted by dwl in the
    // convolution: together a unit-sum discrete kernel.
    for g in &mut kernel {
        *g /= total;
    }
    convolve_same(flux, &kernel)
}

fn gaussian_kernel(sigma_px: f64) -> Vec<f64> {
    let half = (GAUSS_TRUNCATE * sigma_px).ceil().max(1.0) as isize;
    let denom = 2.0 * sigma_px * sigma_px;
    normalized((-half..=half).map(|k| (-((k * k) as f64) / denom).exp()).collect())
}

fn lorentzian_kernel(fwhm_px: f64) -> Vec<f64> {
    let gamma = 0.5 * fwhm_px;
    let half = (LORENTZ_TRUNCATE * fwhm_px).ceil().max(1.0) as isize;
    normalized(
        (-half..=half)
            .map(|k| {
                let x = k as f64;
                gamma / (PI * (x * x + gamma * gamma))
            })
            .collect(),
    )
}

fn normalized(mut kernel: Vec<f64>) -> Vec<f64> {
    let total: f64 = kernel.iter().sum();
    if total > 0.0 {
        for g in &mut kernel {
            *g /= total;
        }
    }
    kernel
}

/// Instrumental line-spread broadening: a Gaussian with FWHM `λ / resolution`
/// followed by a Lorentzian with FWHM `lorentz_fwhm_kms` (km/s).
///
/// Kernels narrower than a tenth of a pixel are skipped; they would reduce to
/// a single unit weight.
pub fn instrument_broaden(
    wlen: &[f64],
    flux: &[f64],
    resolution: f64,
    lorentz_fwhm_kms: f64,
) -> Vec<f64> {
    let Some(dwl) = uniform_step(wlen) else {
        return flux.to_vec();
    };
    let eff_wlen = crate::math::grid::mean(wlen);

    let mut out = flux.to_vec();
    if resolution > 0.0 && resolution.is_finite() {
        let sigma_px = eff_wlen / resolution / FWHM_TO_SIGMA / dwl;
        if sigma_px > 0.1 {
            out = convolve_same(&out, &gaussian_kernel(sigma_px));
        }
    }
    if lorentz_fwhm_kms > 0.0 {
        let fwhm_px = eff_wlen * lorentz_fwhm_kms / C_KMS / dwl;
        if fwhm_px > 0.1 {
            out = convolve_same(&out, &lorentzian_kernel(fwhm_px));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::grid::lin_space;

    #[test]
    fn convolve_same_matches_hand_computation() {
        let out = convolve_same(&[1.0, 2.0, 3.0, 4.0], &[0.25, 0.5, 0.25]);
        assert_eq!(out, vec![1.0, 2.0, 3.0, 2.75]);
    }

    #[test]
    fn identity_kernel_is_a_no_op() {
        let signal = [3.0, -1.0, 2.0];
        assert_eq!(convolve_same(&signal, &[1.0]), signal.to_vec());
    }

    #[test]
    fn rotational_broadening_conserves_flux_of_a_line() {
        let wlen = lin_space(2300.0, 2310.0, 4001);
        let mut flux = vec![1.0; wlen.len()];
        flux[2000] = 0.0;
        let out = rot_broaden(&wlen, &flux, 0.5, 20.0);

        // Line depth is spread out but the equivalent width is conserved
        // away from the edges.
        let deficit: f64 = out[500..3500].iter().map(|f| 1.0 - f).sum();
        assert!((deficit - 1.0).abs() < 1e-9, "deficit = {deficit}");
        assert!(out[2000] > 0.9);
    }

    #[test]
    fn zero_rotation_returns_input() {
        let wlen = lin_space(1000.0, 1001.0, 11);
        let flux: Vec<f64> = (0..11).map(|i| i as f64).collect();
        assert_eq!(rot_broaden(&wlen, &flux, 0.5, 0.0), flux);
    }

    #[test]
    fn instrument_broadening_keeps_continuum_level() {
        let wlen = lin_space(2000.0, 2001.0, 2001);
        let flux = vec![2.0; wlen.len()];
        let out = instrument_broaden(&wlen, &flux, 50_000.0, 1.0);
        for f in &out[600..1400] {
            assert!((f - 2.0).abs() < 1e-9);
        }
    }
}
