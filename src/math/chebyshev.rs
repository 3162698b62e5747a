//! Chebyshev series evaluation for continuum polynomials.

/// Evaluate `Σ c_k T_k(x)` with Clenshaw's recurrence.
pub fn chebval(x: f64, coeffs: &[f64]) -> f64 {
    match coeffs.len() {
        0 => 0.0,
        1 => coeffs[0],
        _ => {
            let x2 = 2.0 * x;
            let mut b1 = 0.0;
            let mut b2 = 0.0;
            for &c in coeffs[1..].iter().rev() {
                let b0 = c + x2 * b1 - b2;
                b2 = b1;
                b1 = b0;
            }
            coeffs[0] + x * b1 - b2
        }
    }
}

/// Map a chip's wavelengths onto the polynomial abscissa
/// `(x - mean(x)) / (mean(x) - x[0])`, which spans roughly `[-1, 1]`.
pub fn normalized_axis(wlen: &[f64]) -> Vec<f64> {
    let centre = crate::math::grid::mean(wlen);
    let half_span = wlen.first().map_or(1.0, |&first| centre - first);
    wlen.iter().map(|&x| (x - centre) / half_span).collect()
}
