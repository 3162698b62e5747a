//! Gaussian likelihood of rebinned models against observed chips.
//!
//! Per chip, in this order:
//!
//! 1. noise model: diagonal uncertainties, or a GP covariance when enabled
//! 2. optional closed-form flux scaling of the model
//! 3. optional error inflation from the scaled residual
//! 4. `ln L = -0.5 (N ln 2π + χ² + ln |Σ|)`
//!
//! Scaling is computed before inflation and inflation uses the scaled model;
//! swapping the two changes the likelihood.

pub mod noise;

pub use noise::*;

use nalgebra::DVector;

use crate::domain::Observation;
use crate::engine::ModelSegment;
use crate::error::AppError;
use crate::params::ParamSnapshot;

const LN_2PI: f64 = 1.837_877_066_409_345_3;

/// Least-squares amplitude `f = (m·Σ⁻¹d) / (m·Σ⁻¹m)`.
pub fn calc_scaling(model: &DVector<f64>, data: &DVector<f64>, noise: &NoiseModel) -> Result<f64, AppError> {
    let lhs = noise.inner(model, model);
    let rhs = noise.inner(model, data);
    let f = rhs / lhs;
    if !(lhs > 0.0) || !f.is_finite() {
        return Err(AppError::numeric(format!("Degenerate flux scaling ({rhs} / {lhs}).")));
    }
    Ok(f)
}

/// Smallest error inflation applied. A residual of exactly zero would
/// otherwise collapse the noise to nothing.
pub const MIN_ERR_INFLATION: f64 = 1e-8;

/// `β = sqrt(χ² / N)` of the residual `data - model`, floored at
/// [`MIN_ERR_INFLATION`].
pub fn calc_err_inflation(model: &DVector<f64>, data: &DVector<f64>, noise: &NoiseModel) -> f64 {
    let chi2 = noise.quadratic_form(&(data - model));
    let beta = (chi2 / data.len() as f64).sqrt();
    if beta.is_nan() { beta } else { beta.max(MIN_ERR_INFLATION) }
}

pub fn calc_log_l(model: &DVector<f64>, data: &DVector<f64>, noise: &NoiseModel) -> f64 {
    let n = data.len() as f64;
    let chi2 = noise.quadratic_form(&(data - model));
    -0.5 * (n * LN_2PI + chi2 + noise.log_determinant())
}

/// `GP_{inst}_amp` or `GP_{inst}_amp_{group:02}`.
pub fn gp_amp_name(instrument: &str, group: Option<usize>) -> String {
    match group {
        Some(g) => format!("GP_{instrument}_amp_{g:02}"),
        None => format!("GP_{instrument}_amp"),
    }
}

/// `GP_{inst}_tau` or `GP_{inst}_tau_{group:02}`.
pub fn gp_tau_name(instrument: &str, group: Option<usize>) -> String {
    match group {
        Some(g) => format!("GP_{instrument}_tau_{g:02}"),
        None => format!("GP_{instrument}_tau"),
    }
}

/// How GP hyperparameters are assigned to chips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpLayout {
    Disabled,
    /// One `(amp, tau)` pair for every chip of the instrument.
    Shared,
    /// One pair per `n` consecutive chips.
    Binned(usize),
}

impl GpLayout {
    pub fn new(enabled: bool, chip_bin: Option<usize>) -> Self {
        match (enabled, chip_bin) {
            (false, _) => GpLayout::Disabled,
            (true, None) => GpLayout::Shared,
            (true, Some(n)) => GpLayout::Binned(n.max(1)),
        }
    }

    /// Hyperparameter groups for an instrument with `n_chips` chips.
    pub fn groups(&self, n_chips: usize) -> Vec<Option<usize>> {
        match *self {
            GpLayout::Disabled => Vec::new(),
            GpLayout::Shared => vec![None],
            GpLayout::Binned(n) => (0..n_chips.div_ceil(n)).map(Some).collect(),
        }
    }

    pub fn group_for_chip(&self, chip: usize) -> Option<Option<usize>> {
        match *self {
            GpLayout::Disabled => None,
            GpLayout::Shared => Some(None),
            GpLayout::Binned(n) => Some(Some(chip / n)),
        }
    }
}

/// Fixed per-run likelihood options.
#[derive(Debug, Clone, Copy)]
pub struct LikelihoodSettings {
    pub gp: GpLayout,
    pub fit_scaling: bool,
    pub fit_err_inflation: bool,
}

/// Likelihood terms of one chip.
#[derive(Debug, Clone)]
pub struct ChipFit {
    pub log_l: f64,
    /// Scaled model on the chip's pixels.
    pub model: Vec<f64>,
    pub flux_scaling: Option<f64>,
    pub err_inflation: Option<f64>,
}

/// Chip fits of one instrument, in observation chip order.
#[derive(Debug, Clone)]
pub struct InstrumentFit {
    pub name: String,
    pub chips: Vec<ChipFit>,
}

impl InstrumentFit {
    pub fn log_l(&self) -> f64 {
        self.chips.iter().map(|c| c.log_l).sum()
    }
}

fn chip_noise(
    obs: &Observation,
    chip: usize,
    instrument: &str,
    settings: &LikelihoodSettings,
    params: &ParamSnapshot<'_>,
) -> Result<NoiseModel, AppError> {
    match settings.gp.group_for_chip(chip) {
        None => NoiseModel::diagonal(&obs.err[chip]),
        Some(group) => {
            let amp = params.value(&gp_amp_name(instrument, group))?;
            let tau = params.value(&gp_tau_name(instrument, group))?;
            NoiseModel::full(obs.make_covariance(chip, amp, tau))
        }
    }
}

/// Score every chip of one instrument. `models` must be the rebinned models,
/// one per chip in observation order.
pub fn evaluate_instrument(
    instrument: &str,
    obs: &Observation,
    models: &[ModelSegment],
    settings: &LikelihoodSettings,
    params: &ParamSnapshot<'_>,
) -> Result<Vec<ChipFit>, AppError> {
    if models.len() != obs.n_chips() {
        return Err(AppError::internal(format!(
            "{instrument}: {} model chips for {} observed chips.",
            models.len(),
            obs.n_chips()
        )));
    }

    let mut fits = Vec::with_capacity(models.len());
    for (chip, seg) in models.iter().enumerate() {
        let data = DVector::from_column_slice(&obs.flux[chip]);
        let mut model = DVector::from_column_slice(&seg.flux);
        if model.len() != data.len() {
            return Err(AppError::internal(format!(
                "{instrument} chip {chip}: model has {} pixels, data {}.",
                model.len(),
                data.len()
            )));
        }
        let mut noise = chip_noise(obs, chip, instrument, settings, params)?;

        let flux_scaling = if settings.fit_scaling {
            let f = calc_scaling(&model, &data, &noise)?;
            model *= f;
            Some(f)
        } else {
            None
        };

        let err_inflation = if settings.fit_err_inflation {
            let beta = calc_err_inflation(&model, &data, &noise);
            noise = noise.inflate(beta);
            Some(beta)
        } else {
            None
        };

        let log_l = calc_log_l(&model, &data, &noise);
        fits.push(ChipFit {
            log_l,
            model: model.as_slice().to_vec(),
            flux_scaling,
            err_inflation,
        });
    }
    Ok(fits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{ParameterStore, Prior};
    use nalgebra::DMatrix;

    fn chi2_at(alpha: f64, model: &DVector<f64>, data: &DVector<f64>, noise: &NoiseModel) -> f64 {
        noise.quadratic_form(&(data - model * alpha))
    }

    #[test]
    fn exact_model_scores_only_the_normalisation() {
        let sigma = [0.1, 0.2, 0.3, 0.4];
        let data = DVector::from_column_slice(&[1.0, 0.9, 1.1, 1.05]);
        let noise = NoiseModel::diagonal(&sigma).unwrap();
        let log_l = calc_log_l(&data, &data, &noise);
        let expected = -0.5
            * (4.0 * (2.0 * std::f64::consts::PI).ln()
                + sigma.iter().map(|s: &f64| (s * s).ln()).sum::<f64>());
        assert!((log_l - expected).abs() < 1e-12);
    }

    #[test]
    fn scaling_is_the_least_squares_optimum() {
        let model = DVector::from_column_slice(&[1.0, 2.0, 1.5, 0.7, 1.2]);
        let data = DVector::from_column_slice(&[2.1, 3.8, 3.1, 1.5, 2.3]);
        let diag = NoiseModel::diagonal(&[0.1, 0.3, 0.2, 0.1, 0.25]).unwrap();
        let cov = DMatrix::from_fn(5, 5, |i, j| {
            let d = i as f64 - j as f64;
            0.02 * (-(d * d) / 2.0).exp() + if i == j { 0.01 } else { 0.0 }
        });
        let full = NoiseModel::full(nalgebra_sparse::CscMatrix::from(&cov)).unwrap();

        for noise in [&diag, &full] {
            let f = calc_scaling(&model, &data, noise).unwrap();
            let scaled = &model * f;
            let h = 1e-6;
            let grad = (chi2_at(1.0 + h, &scaled, &data, noise) - chi2_at(1.0 - h, &scaled, &data, noise))
                / (2.0 * h);
            let chi2 = chi2_at(1.0, &scaled, &data, noise);
            assert!(grad.abs() < 1e-6 * (1.0 + chi2), "grad = {grad}");
            assert!(chi2_at(1.01, &scaled, &data, noise) > chi2);
            assert!(chi2_at(0.99, &scaled, &data, noise) > chi2);
        }
    }

    #[test]
    fn zero_model_cannot_be_scaled() {
        let noise = NoiseModel::diagonal(&[1.0, 1.0]).unwrap();
        let err = calc_scaling(&DVector::zeros(2), &DVector::from_element(2, 1.0), &noise).unwrap_err();
        assert!(err.is_numeric());
    }

    #[test]
    fn inflation_matches_residual_scatter() {
        let noise = NoiseModel::diagonal(&[0.5; 4]).unwrap();
        let model = DVector::from_element(4, 1.0);
        let data = DVector::from_column_slice(&[2.0, 0.0, 2.0, 0.0]);
        // χ² = 4 · (1 / 0.25) = 16, N = 4.
        assert!((calc_err_inflation(&model, &data, &noise) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn exact_model_with_inflation_stays_finite() {
        let noise = NoiseModel::diagonal(&[0.1; 3]).unwrap();
        let data = DVector::from_column_slice(&[1.0, 1.2, 0.9]);
        let beta = calc_err_inflation(&data, &data, &noise);
        assert_eq!(beta, MIN_ERR_INFLATION);
        let log_l = calc_log_l(&data, &data, &noise.inflate(beta));
        assert!(log_l.is_finite());

        let obs = Observation::new(vec![vec![1.0, 2.0, 3.0]], vec![vec![1.0; 3]], vec![vec![0.1; 3]]).unwrap();
        let store = ParameterStore::new();
        let snap = store.snapshot(&[]).unwrap();
        let settings = LikelihoodSettings {
            gp: GpLayout::Disabled,
            fit_scaling: true,
            fit_err_inflation: true,
        };
        let fits = evaluate_instrument("crires", &obs, &flat_models(&obs), &settings, &snap).unwrap();
        assert_eq!(fits[0].err_inflation, Some(MIN_ERR_INFLATION));
        assert!(fits[0].log_l.is_finite());
    }

    fn three_chip_observation() -> Observation {
        Observation::new(
            vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0], vec![7.0, 8.0, 9.0]],
            vec![vec![2.0, 2.2, 1.8], vec![1.0; 3], vec![1.0; 3]],
            vec![vec![0.1; 3], vec![0.1; 3], vec![0.1; 3]],
        )
        .unwrap()
    }

    fn flat_models(obs: &Observation) -> Vec<ModelSegment> {
        obs.wlen
            .iter()
            .map(|w| ModelSegment {
                wlen: w.clone(),
                flux: vec![1.0; w.len()],
            })
            .collect()
    }

    #[test]
    fn scaling_runs_before_inflation() {
        let obs = three_chip_observation();
        let store = ParameterStore::new();
        let snap = store.snapshot(&[]).unwrap();
        let settings = LikelihoodSettings {
            gp: GpLayout::Disabled,
            fit_scaling: true,
            fit_err_inflation: true,
        };
        let fits = evaluate_instrument("crires", &obs, &flat_models(&obs), &settings, &snap).unwrap();
        assert!((fits[0].flux_scaling.unwrap() - 2.0).abs() < 1e-12);
        assert!((fits[0].model[0] - 2.0).abs() < 1e-12);
        // Residual after scaling is (0, 0.2, -0.2): χ² = 8, β = sqrt(8/3).
        assert!((fits[0].err_inflation.unwrap() - (8.0f64 / 3.0).sqrt()).abs() < 1e-9);
        assert_eq!(fits[1].flux_scaling, Some(1.0));
    }

    #[test]
    fn binned_gp_reads_one_pair_per_group() {
        let obs = three_chip_observation();
        let layout = GpLayout::new(true, Some(2));
        assert_eq!(layout.groups(3), vec![Some(0), Some(1)]);

        let mut store = ParameterStore::new();
        for g in layout.groups(3) {
            store.add(gp_amp_name("crires", g), Some(0.5), Prior::UNIT, false).unwrap();
            store.add(gp_tau_name("crires", g), Some(1.0), Prior::UNIT, false).unwrap();
        }
        let snap = store.snapshot(&[]).unwrap();
        let settings = LikelihoodSettings {
            gp: layout,
            fit_scaling: false,
            fit_err_inflation: false,
        };
        let fits = evaluate_instrument("crires", &obs, &flat_models(&obs), &settings, &snap).unwrap();
        assert_eq!(fits.len(), 3);
        assert!(fits.iter().all(|f| f.log_l.is_finite()));
        // Chip 1 matches its model exactly; only normalisation terms remain.
        let noise = NoiseModel::full(obs.make_covariance(1, 0.5, 1.0)).unwrap();
        let expected = -0.5 * (3.0 * LN_2PI + noise.log_determinant());
        assert!((fits[1].log_l - expected).abs() < 1e-9);
    }

    #[test]
    fn full_detector_gp_factor_stays_banded() {
        let n = 2048;
        let wlen: Vec<f64> = (0..n).map(|i| 2300.0 + 0.01 * i as f64).collect();
        let obs = Observation::new(vec![wlen], vec![vec![1.0; n]], vec![vec![0.02; n]]).unwrap();
        // Kernel reach 5 · 0.02 nm spans 10 pixels on either side.
        let noise = NoiseModel::full(obs.make_covariance(0, 0.3, 0.02)).unwrap();
        let NoiseModel::Full { cholesky, .. } = &noise else {
            panic!("expected a full noise model");
        };
        assert!(cholesky.l().nnz() <= n * 12);
        assert!(noise.log_determinant().is_finite());
        let residual = DVector::from_fn(n, |i, _| 0.01 * (i as f64 * 0.1).sin());
        assert!(noise.quadratic_form(&residual) > 0.0);
    }

    #[test]
    fn missing_gp_parameter_is_an_internal_error() {
        let obs = three_chip_observation();
        let store = ParameterStore::new();
        let snap = store.snapshot(&[]).unwrap();
        let settings = LikelihoodSettings {
            gp: GpLayout::Shared,
            fit_scaling: false,
            fit_err_inflation: false,
        };
        let err = evaluate_instrument("crires", &obs, &flat_models(&obs), &settings, &snap).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_INTERNAL);
    }
}
