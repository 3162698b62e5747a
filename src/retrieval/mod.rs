//! The retrieval orchestrator.
//!
//! A [`Retrieval`] moves through `Uninitialized -> Configured -> Sampling ->
//! Finished`. `setup` registers every parameter and builds the forward-model
//! engines once; after that the prior transform and the likelihood only read
//! shared state, so the sampler may evaluate points concurrently.

pub mod setup;

use std::path::{Path, PathBuf};

use crate::domain::{BestFitStat, Observation, RetrievalConfig};
use crate::engine::{ForwardModelEngine, InstrumentLayout, RadiativeTransferFactory};
use crate::error::AppError;
use crate::io::{load_telluric_grid, read_summary_json, write_best_fit_csv, write_chip_factors_csv};
use crate::likelihood::{GpLayout, InstrumentFit, LikelihoodSettings, evaluate_instrument};
use crate::math::log_space;
use crate::models::{ChemistryModel, TelluricModel, TemperatureProfile, knot_names};
use crate::params::{ParameterStore, PriorTransform};
use crate::sampler::{LikelihoodProblem, PosteriorSummary, Sampler};
use crate::spectral::{StageContext, run_pipeline};

use setup::{InstrumentShape, register_parameters};

/// Log-likelihood reported for points the model cannot evaluate.
pub const INVALID_LOG_LIKELIHOOD: f64 = -1e100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalState {
    Uninitialized,
    Configured,
    Sampling,
    Finished,
}

/// One observed instrument, loaded and ready to fit.
#[derive(Debug, Clone)]
pub struct InstrumentData {
    pub name: String,
    pub observation: Observation,
    pub detector_bin: usize,
}

/// Model components switched on for this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFlags {
    pub fit_gp: bool,
    pub fit_poly: usize,
    pub fit_scaling: bool,
    pub fit_err_inflation: bool,
    pub fit_telluric: bool,
    pub has_radius_scaling: bool,
}

impl FeatureFlags {
    fn from_config(config: &RetrievalConfig) -> Self {
        Self {
            fit_gp: config.fit.gp,
            fit_poly: config.fit.poly,
            fit_scaling: config.fit.scaling,
            fit_err_inflation: config.fit.err_inflation,
            fit_telluric: config.fit.telluric,
            has_radius_scaling: config.system.radius_prior.is_some(),
        }
    }
}

/// Result of one likelihood evaluation with every chip's terms.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub log_likelihood: f64,
    pub instruments: Vec<InstrumentFit>,
}

/// Best-fit point and the model evaluated there.
#[derive(Debug, Clone)]
pub struct BestFit {
    pub which: BestFitStat,
    pub names: Vec<String>,
    pub point: Vec<f64>,
    pub evaluation: Evaluation,
}

#[derive(Debug)]
struct Model {
    store: ParameterStore,
    prior: PriorTransform,
    temperature: TemperatureProfile,
    knot_names: Vec<String>,
    chemistry: ChemistryModel,
    telluric: TelluricModel,
    engine: ForwardModelEngine,
    instruments: Vec<InstrumentData>,
    flags: FeatureFlags,
    likelihood: LikelihoodSettings,
}

#[derive(Debug)]
pub struct Retrieval {
    name: String,
    out_dir: PathBuf,
    state: RetrievalState,
    model: Option<Model>,
}

impl Retrieval {
    pub fn new(name: impl Into<String>, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            out_dir: out_dir.into(),
            state: RetrievalState::Uninitialized,
            model: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> RetrievalState {
        self.state
    }

    /// `{out_dir}/{name}_`; every output file name starts with it.
    pub fn prefix(&self) -> String {
        self.out_dir.join(format!("{}_", self.name)).display().to_string()
    }

    /// Register parameters and build the engines. Instruments must be given
    /// in run-file order.
    pub fn setup(
        &mut self,
        config: &RetrievalConfig,
        instruments: Vec<InstrumentData>,
        factory: &dyn RadiativeTransferFactory,
    ) -> Result<(), AppError> {
        if self.state != RetrievalState::Uninitialized {
            return Err(AppError::internal(format!(
                "Retrieval '{}' is already set up.",
                self.name
            )));
        }
        if instruments.len() != config.instruments.len()
            || instruments
                .iter()
                .zip(&config.instruments)
                .any(|(data, cfg)| data.name != cfg.name)
        {
            return Err(AppError::internal("Loaded instruments do not match the run file."));
        }

        let flags = FeatureFlags::from_config(config);

        let telluric = if flags.fit_telluric {
            let dir = config.telluric.grid_dir.as_deref().ok_or_else(|| {
                AppError::config("Telluric fitting is enabled but no telluric grid directory is set.")
            })?;
            TelluricModel::enabled(load_telluric_grid(dir)?)
        } else {
            TelluricModel::disabled()
        };

        let p = &config.pressure;
        let pressure = log_space(10f64.powf(p.log_min), 10f64.powf(p.log_max), p.n_layers)?;
        let temperature = TemperatureProfile::new(pressure.clone(), config.temperature.n_knots)?;
        let chemistry = ChemistryModel::new(&config.line_species, pressure.len())?;
        let gp = GpLayout::new(flags.fit_gp, config.gp.chip_bin);

        let shapes: Vec<InstrumentShape<'_>> = config
            .instruments
            .iter()
            .zip(&instruments)
            .map(|(cfg, data)| InstrumentShape {
                config: cfg,
                n_chips: data.observation.n_chips(),
            })
            .collect();
        let mut store = ParameterStore::new();
        register_parameters(&mut store, config, &shapes, &chemistry, gp)?;
        let prior = PriorTransform::from_store(&store)?;

        let layouts: Vec<InstrumentLayout<'_>> = instruments
            .iter()
            .map(|inst| InstrumentLayout {
                name: &inst.name,
                observation: &inst.observation,
                detector_bin: inst.detector_bin,
            })
            .collect();
        let engine = ForwardModelEngine::build(
            &layouts,
            &chemistry.opacity_species(),
            &config.opacity,
            &pressure,
            factory,
            flags.has_radius_scaling,
        )?;

        tracing::info!(
            name = %self.name,
            n_free = store.n_free(),
            instruments = instruments.len(),
            "retrieval configured"
        );

        self.model = Some(Model {
            store,
            prior,
            temperature,
            knot_names: knot_names(config.temperature.n_knots),
            chemistry,
            telluric,
            engine,
            instruments,
            flags,
            likelihood: LikelihoodSettings {
                gp,
                fit_scaling: flags.fit_scaling,
                fit_err_inflation: flags.fit_err_inflation,
            },
        });
        self.state = RetrievalState::Configured;
        Ok(())
    }

    fn model(&self) -> Result<&Model, AppError> {
        self.model
            .as_ref()
            .ok_or_else(|| AppError::internal(format!("Retrieval '{}' is not set up.", self.name)))
    }

    pub fn store(&self) -> Result<&ParameterStore, AppError> {
        Ok(&self.model()?.store)
    }

    pub fn flags(&self) -> Result<FeatureFlags, AppError> {
        Ok(self.model()?.flags)
    }

    pub fn free_names(&self) -> Vec<String> {
        self.model
            .as_ref()
            .map(|m| m.store.free_vector())
            .unwrap_or_default()
    }

    /// Map a unit-cube point to physical values in place.
    pub fn prior(&self, cube: &mut [f64]) -> Result<(), AppError> {
        self.model()?.prior.apply(cube)
    }

    /// Full evaluation of one physical parameter vector.
    pub fn evaluate(&self, params: &[f64]) -> Result<Evaluation, AppError> {
        let model = self.model()?;
        let snap = model.store.snapshot(params)?;

        let knots = snap.values(&model.knot_names)?;
        let temperature = model.temperature.evaluate(&knots)?;
        if let Some(t) = temperature.iter().find(|t| !(t.is_finite() && **t > 0.0)) {
            return Err(AppError::numeric(format!("Non-physical temperature {t} K.")));
        }
        let composition = model.chemistry.evaluate(&snap)?;
        let transmission = model.telluric.evaluate(&snap)?;
        let native = model.engine.evaluate(&temperature, &composition, &snap)?;

        let mut fits = Vec::with_capacity(model.instruments.len());
        for (inst, segments) in model.instruments.iter().zip(native) {
            let ctx = StageContext {
                instrument: &inst.name,
                observation: &inst.observation,
                detector_bin: inst.detector_bin,
                poly_order: model.flags.fit_poly,
                telluric: &transmission,
                params: &snap,
            };
            let rebinned = run_pipeline(segments, &ctx)?;
            let chips = evaluate_instrument(&inst.name, &inst.observation, &rebinned, &model.likelihood, &snap)?;
            fits.push(InstrumentFit {
                name: inst.name.clone(),
                chips,
            });
        }

        let log_likelihood = fits.iter().map(InstrumentFit::log_l).sum();
        Ok(Evaluation {
            log_likelihood,
            instruments: fits,
        })
    }

    /// Total log-likelihood. Numeric failures and non-finite totals score
    /// [`INVALID_LOG_LIKELIHOOD`]; every other error propagates.
    pub fn loglike(&self, params: &[f64]) -> Result<f64, AppError> {
        match self.evaluate(params) {
            Ok(eval) if eval.log_likelihood.is_finite() => {
                tracing::trace!(log_l = eval.log_likelihood, "likelihood evaluated");
                Ok(eval.log_likelihood)
            }
            Ok(eval) => {
                tracing::debug!(log_l = eval.log_likelihood, "non-finite likelihood");
                Ok(INVALID_LOG_LIKELIHOOD)
            }
            Err(err) if err.is_numeric() => {
                tracing::debug!(%err, "likelihood rejected");
                Ok(INVALID_LOG_LIKELIHOOD)
            }
            Err(err) => Err(err),
        }
    }

    /// Hand the problem to `sampler`. Outputs go under [`Retrieval::prefix`].
    pub fn run(&mut self, sampler: &mut dyn Sampler) -> Result<PosteriorSummary, AppError> {
        if self.state != RetrievalState::Configured {
            return Err(AppError::internal(format!(
                "Retrieval '{}' cannot start sampling from state {:?}.",
                self.name, self.state
            )));
        }
        std::fs::create_dir_all(&self.out_dir).map_err(|e| {
            AppError::data(format!(
                "Failed to create output directory '{}': {e}",
                self.out_dir.display()
            ))
        })?;

        self.state = RetrievalState::Sampling;
        let prefix = self.prefix();
        let summary = sampler.run(&*self, &prefix)?;
        self.state = RetrievalState::Finished;

        tracing::info!(
            log_evidence = summary.log_evidence,
            log_evidence_error = summary.log_evidence_error,
            samples = summary.n_samples,
            "sampling finished"
        );
        Ok(summary)
    }

    pub fn summary_path(&self) -> PathBuf {
        PathBuf::from(format!("{}stats.json", self.prefix()))
    }

    /// Best fit from the summary written by a previous run.
    pub fn best_fit(&self, which: BestFitStat) -> Result<BestFit, AppError> {
        let summary = read_summary_json(&self.summary_path())?;
        self.best_fit_from(&summary, which)
    }

    /// Evaluate the model at the chosen posterior statistic and write
    /// `{prefix}best_fit_model.csv` plus `{prefix}chip_factors.csv`.
    pub fn best_fit_from(&self, summary: &PosteriorSummary, which: BestFitStat) -> Result<BestFit, AppError> {
        let model = self.model()?;
        let names = model.store.free_vector();
        if summary.names() != names {
            return Err(AppError::data(format!(
                "Posterior summary parameters do not match retrieval '{}'.",
                self.name
            )));
        }
        let point = summary.point(which);
        for (name, value) in names.iter().zip(&point) {
            tracing::info!(%name, value, ?which, "best fit");
        }

        let evaluation = self.evaluate(&point)?;
        tracing::info!(log_l = evaluation.log_likelihood, "best-fit likelihood");

        let observations: Vec<Observation> = model
            .instruments
            .iter()
            .map(|inst| inst.observation.clone())
            .collect();
        let prefix = self.prefix();
        write_best_fit_csv(
            Path::new(&format!("{prefix}best_fit_model.csv")),
            &evaluation.instruments,
            &observations,
        )?;
        write_chip_factors_csv(Path::new(&format!("{prefix}chip_factors.csv")), &evaluation.instruments)?;

        Ok(BestFit {
            which,
            names,
            point,
            evaluation,
        })
    }
}

impl LikelihoodProblem for Retrieval {
    fn n_dims(&self) -> usize {
        self.model.as_ref().map_or(0, |m| m.prior.n_dims())
    }

    fn parameter_names(&self) -> Vec<String> {
        self.free_names()
    }

    fn prior(&self, cube: &mut [f64]) -> Result<(), AppError> {
        Retrieval::prior(self, cube)
    }

    fn loglike(&self, params: &[f64]) -> Result<f64, AppError> {
        Retrieval::loglike(self, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{NativeSpectrum, OpacityRequest, RadiativeTransfer};
    use crate::io::parse_config;
    use crate::models::Abundances;

    /// Flat F_lambda across the requested window, at the deepest layer's
    /// temperature.
    struct FlatFactory;

    struct FlatEngine {
        freq: Vec<f64>,
    }

    impl RadiativeTransferFactory for FlatFactory {
        fn build(&self, request: &OpacityRequest) -> Result<Box<dyn RadiativeTransfer>, AppError> {
            let (lo, hi) = request.wlen_range_micron;
            let n = 4000;
            let freq = (0..n)
                .map(|i| {
                    let lam_cm = (hi - (hi - lo) * i as f64 / (n - 1) as f64) * 1e-4;
                    crate::engine::C_CGS / lam_cm
                })
                .collect();
            Ok(Box::new(FlatEngine { freq }))
        }
    }

    impl RadiativeTransfer for FlatEngine {
        fn calc_flux(
            &self,
            temperature: &[f64],
            _abundances: &Abundances,
            _gravity: f64,
            _mmw: &[f64],
        ) -> Result<NativeSpectrum, AppError> {
            let level = temperature[temperature.len() - 1];
            let flux = self
                .freq
                .iter()
                .map(|nu| level * crate::engine::C_CGS / (nu * nu) * 1e7)
                .collect();
            Ok(NativeSpectrum {
                freq: self.freq.clone(),
                flux,
            })
        }
    }

    const RUN: &str = r#"
name = "unit"
line_species = ["H2O_main_iso", "CO_main_iso"]

[pressure]
n_layers = 12

[temperature]
n_knots = 3
t0_prior = [1000.0, 3000.0]

[fit]
poly = 1
scaling = true

[[instrument]]
name = "nirspec"
data = "unused.csv"
"#;

    fn observation() -> Observation {
        let chips: Vec<Vec<f64>> = (0..2)
            .map(|c| (0..40).map(|i| 2300.0 + 5.0 * c as f64 + 0.1 * i as f64).collect())
            .collect();
        let flux = chips.iter().map(|w| vec![1.0; w.len()]).collect();
        let err = chips.iter().map(|w| vec![0.05; w.len()]).collect();
        Observation::new(chips, flux, err).unwrap()
    }

    fn configured(text: &str) -> Retrieval {
        let config = parse_config(text).unwrap();
        let mut retrieval = Retrieval::new(config.name.clone(), config.out_dir.clone());
        let instruments = vec![InstrumentData {
            name: "nirspec".to_string(),
            observation: observation(),
            detector_bin: 1,
        }];
        retrieval.setup(&config, instruments, &FlatFactory).unwrap();
        retrieval
    }

    fn centre(retrieval: &Retrieval) -> Vec<f64> {
        let mut cube = vec![0.5; retrieval.n_dims()];
        retrieval.prior(&mut cube).unwrap();
        cube
    }

    #[test]
    fn setup_moves_to_configured() {
        let retrieval = configured(RUN);
        assert_eq!(retrieval.state(), RetrievalState::Configured);
        let flags = retrieval.flags().unwrap();
        assert!(flags.fit_scaling && !flags.fit_gp && !flags.has_radius_scaling);
        // vsini vsys logg G L, 3 knots, 2 abundances, 2 poly
        assert_eq!(retrieval.n_dims(), 12);
    }

    #[test]
    fn second_setup_is_rejected() {
        let mut retrieval = configured(RUN);
        let config = parse_config(RUN).unwrap();
        let instruments = vec![InstrumentData {
            name: "nirspec".to_string(),
            observation: observation(),
            detector_bin: 1,
        }];
        let err = retrieval.setup(&config, instruments, &FlatFactory).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_INTERNAL);
    }

    #[test]
    fn telluric_without_grid_fails_at_setup() {
        let text = RUN.replace("scaling = true", "scaling = true\ntelluric = true");
        let config = parse_config(&text).unwrap();
        let mut retrieval = Retrieval::new("unit", "out");
        let instruments = vec![InstrumentData {
            name: "nirspec".to_string(),
            observation: observation(),
            detector_bin: 1,
        }];
        let err = retrieval.setup(&config, instruments, &FlatFactory).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_CONFIG);
        assert_eq!(retrieval.state(), RetrievalState::Uninitialized);
    }

    #[test]
    fn flat_model_fits_flat_data_after_scaling() {
        let retrieval = configured(RUN);
        let mut point = centre(&retrieval);
        let names = retrieval.free_names();
        for (name, value) in names.iter().zip(point.iter_mut()) {
            if name.starts_with("poly_") || name == "vsys" {
                *value = 0.0;
            }
        }
        let eval = retrieval.evaluate(&point).unwrap();
        let chips = &eval.instruments[0].chips;
        assert_eq!(chips.len(), 2);
        for chip in chips {
            assert!(chip.model.iter().all(|m| (m - 1.0).abs() < 1e-6));
            assert!(chip.flux_scaling.unwrap() > 0.0);
        }
        let n = 80.0;
        let expected = -0.5 * n * (2.0 * std::f64::consts::PI * 0.05f64.powi(2)).ln();
        assert!((eval.log_likelihood - expected).abs() < 1e-6 * expected.abs());
    }

    #[test]
    fn wrong_length_is_an_internal_error() {
        let retrieval = configured(RUN);
        let err = retrieval.loglike(&[1.0, 2.0]).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_INTERNAL);
    }

    #[test]
    fn negative_temperature_scores_the_sentinel() {
        let retrieval = configured(RUN);
        let mut point = centre(&retrieval);
        let names = retrieval.free_names();
        for (name, value) in names.iter().zip(point.iter_mut()) {
            if name.starts_with("t_") {
                *value = -100.0;
            }
        }
        assert!(retrieval.evaluate(&point).unwrap_err().is_numeric());
        assert_eq!(retrieval.loglike(&point).unwrap(), INVALID_LOG_LIKELIHOOD);
    }

    #[test]
    fn smoothed_profile_decides_validity_not_the_raw_knot() {
        // A single cold deep knot is averaged with its warm neighbours.
        let retrieval = configured(RUN);
        let mut point = centre(&retrieval);
        let names = retrieval.free_names();
        let t0 = names.iter().position(|n| n == "t_00").unwrap();
        point[t0] = -100.0;
        let model = retrieval.model().unwrap();
        let snap = model.store.snapshot(&point).unwrap();
        let profile = model
            .temperature
            .evaluate(&snap.values(&model.knot_names).unwrap())
            .unwrap();
        let log_l = retrieval.loglike(&point).unwrap();
        if profile.iter().all(|t| *t > 0.0) {
            assert!(log_l > INVALID_LOG_LIKELIHOOD);
        } else {
            assert_eq!(log_l, INVALID_LOG_LIKELIHOOD);
        }
    }

    #[test]
    fn loglike_before_setup_fails() {
        let retrieval = Retrieval::new("unit", "out");
        assert_eq!(retrieval.n_dims(), 0);
        assert!(retrieval.loglike(&[]).is_err());
    }

    #[test]
    fn prefix_joins_out_dir_and_name() {
        let retrieval = Retrieval::new("2M0355", "/tmp/runs");
        assert_eq!(retrieval.prefix(), "/tmp/runs/2M0355_");
    }
}
