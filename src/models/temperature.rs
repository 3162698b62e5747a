//! Free pressure–temperature profile from knot temperatures.
//!
//! Knots sit at log-uniform pressures spanning the pressure grid. The profile
//! is the piecewise-linear interpolant in `(log10 P, T)` through the knots,
//! evaluated on the full grid and then Gaussian-smoothed (σ = 1.5 layers) to
//! remove the kinks at the knots.
//!
//! Knot `t_00` is the deepest (highest-pressure) knot. The prior transform
//! makes knot temperatures decrease upwards, so `t_00` is also the hottest.

use crate::error::AppError;
use crate::math::{Linear1d, gaussian_filter, log_space};

/// Smoothing width in pressure layers.
pub const SMOOTHING_SIGMA: f64 = 1.5;

#[derive(Debug, Clone)]
pub struct TemperatureProfile {
    pressure: Vec<f64>,
    log_pressure: Vec<f64>,
    /// log10 of the knot pressures, top of the atmosphere first.
    knot_log_pressure: Vec<f64>,
}

/// Knot parameter names, deepest first.
pub fn knot_names(n_knots: usize) -> Vec<String> {
    (0..n_knots).map(|i| format!("t_{i:02}")).collect()
}

impl TemperatureProfile {
    /// `pressure` must be strictly increasing (bar, top of the atmosphere first).
    pub fn new(pressure: Vec<f64>, n_knots: usize) -> Result<Self, AppError> {
        if n_knots < 2 {
            return Err(AppError::config("The temperature profile needs at least 2 knots."));
        }
        if pressure.len() < 2 || !pressure.windows(2).all(|w| w[1] > w[0]) {
            return Err(AppError::config(
                "Pressure grid must have >= 2 strictly increasing layers.",
            ));
        }
        let first = pressure[0];
        let last = pressure[pressure.len() - 1];
        let knot_log_pressure = log_space(first, last, n_knots)?
            .into_iter()
            .map(f64::log10)
            .collect();
        let log_pressure = pressure.iter().map(|p| p.log10()).collect();

        Ok(Self {
            pressure,
            log_pressure,
            knot_log_pressure,
        })
    }

    pub fn pressure(&self) -> &[f64] {
        &self.pressure
    }

    pub fn n_knots(&self) -> usize {
        self.knot_log_pressure.len()
    }

    /// Temperature on every pressure layer for knots given deepest first.
    pub fn evaluate(&self, knots_deepest_first: &[f64]) -> Result<Vec<f64>, AppError> {
        if knots_deepest_first.len() != self.n_knots() {
            return Err(AppError::internal(format!(
                "Expected {} temperature knots, got {}.",
                self.n_knots(),
                knots_deepest_first.len()
            )));
        }
        let knots_top_first: Vec<f64> = knots_deepest_first.iter().rev().copied().collect();
        let spline = Linear1d::new(self.knot_log_pressure.clone(), knots_top_first)?;
        let raw = spline.eval_many(&self.log_pressure);
        Ok(gaussian_filter(&raw, SMOOTHING_SIGMA))
    }
}
