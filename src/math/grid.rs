//! Grid construction helpers.

use crate::error::AppError;

/// Generate `steps` log-spaced points between `min` and `max` (inclusive).
pub fn log_space(min: f64, max: f64, steps: usize) -> Result<Vec<f64>, AppError> {
    if !(min.is_finite() && max.is_finite() && min > 0.0 && max > 0.0 && max > min) {
        return Err(AppError::config(format!(
            "Invalid log-spaced range: min={min}, max={max} (must be finite, >0, and max>min)."
        )));
    }
    if steps < 2 {
        return Err(AppError::config("Log-spaced grids need at least 2 points."));
    }

    let ln_min = min.ln();
    let ln_max = max.ln();
    let step = (ln_max - ln_min) / (steps as f64 - 1.0);

    let mut out = Vec::with_capacity(steps);
    for i in 0..steps {
        out.push((ln_min + step * i as f64).exp());
    }
    // Pin the endpoints so callers can compare against the input bounds.
    out[0] = min;
    out[steps - 1] = max;
    Ok(out)
}

/// Generate `steps` evenly spaced points between `start` and `end` (inclusive).
pub fn lin_space(start: f64, end: f64, steps: usize) -> Vec<f64> {
    match steps {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (steps as f64 - 1.0);
            let mut out: Vec<f64> = (0..steps).map(|i| start + step * i as f64).collect();
            out[steps - 1] = end;
            out
        }
    }
}

/// Pixel bin widths of a wavelength grid: forward differences, with the last
/// width repeated for the final pixel.
pub fn bin_widths(wlen: &[f64]) -> Vec<f64> {
    if wlen.len() < 2 {
        return vec![0.0; wlen.len()];
    }
    let mut widths: Vec<f64> = wlen.windows(2).map(|w| w[1] - w[0]).collect();
    let last = widths[widths.len() - 1];
    widths.push(last);
    widths
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_space_includes_endpoints() {
        let v = log_space(1e-5, 10.0, 50).unwrap();
        assert_eq!(v.len(), 50);
        assert_eq!(v[0], 1e-5);
        assert_eq!(v[49], 10.0);
        assert!(v.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn log_space_rejects_bad_ranges() {
        assert!(log_space(0.0, 1.0, 5).is_err());
        assert!(log_space(1.0, 1.0, 5).is_err());
        assert!(log_space(1.0, 2.0, 1).is_err());
    }

    #[test]
    fn lin_space_is_uniform() {
        let v = lin_space(2.0, 4.0, 5);
        assert_eq!(v, vec![2.0, 2.5, 3.0, 3.5, 4.0]);
    }

    #[test]
    fn bin_widths_repeat_last_difference() {
        let w = bin_widths(&[1.0, 2.0, 4.0]);
        assert_eq!(w, vec![1.0, 2.0, 2.0]);
    }
}
