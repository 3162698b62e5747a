//! Gaussian smoothing of a 1-D profile.
//!
//! The kernel is truncated at `4σ` and the signal is extended by symmetric
//! reflection about its edges (`d c b a | a b c d | d c b a`), so a constant
//! profile stays exactly constant and the edge values are not pulled towards
//! zero.

const TRUNCATE: f64 = 4.0;

/// Normalized Gaussian weights for offsets `-radius..=radius`.
fn gaussian_weights(sigma: f64) -> Vec<f64> {
    let radius = (TRUNCATE * sigma + 0.5) as usize;
    let denom = 2.0 * sigma * sigma;
    let mut weights: Vec<f64> = (0..=2 * radius)
        .map(|k| {
            let x = k as f64 - radius as f64;
            (-(x * x) / denom).exp()
        })
        .collect();
    let total: f64 = weights.iter().sum();
    for w in &mut weights {
        *w /= total;
    }
    weights
}

/// Map an out-of-range index back into `0..n` by repeated edge reflection.
fn reflect(mut i: isize, n: isize) -> usize {
    let period = 2 * n;
    i = i.rem_euclid(period);
    if i >= n {
        i = period - i - 1;
    }
    i as usize
}

/// Convolve `values` with a Gaussian of standard deviation `sigma` (in samples).
pub fn gaussian_filter(values: &[f64], sigma: f64) -> Vec<f64> {
    let n = values.len();
    if n == 0 || sigma <= 0.0 {
        return values.to_vec();
    }
    let weights = gaussian_weights(sigma);
    let radius = (weights.len() / 2) as isize;

    (0..n as isize)
        .map(|i| {
            weights
                .iter()
                .enumerate()
                .map(|(k, w)| w * values[reflect(i + k as isize - radius, n as isize)])
                .sum()
        })
        .collect()
}
