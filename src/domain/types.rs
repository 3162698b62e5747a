//! Run configuration, as read from the TOML run file.
//!
//! Every optional section has defaults so a minimal file only needs the
//! retrieval name, the line species, the temperature knots, and the
//! instruments.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A prior written as `[lower, upper]` in the run file.
pub type PriorPair = (f64, f64);

#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalConfig {
    pub name: String,
    #[serde(default = "default_out_dir")]
    pub out_dir: PathBuf,
    #[serde(default)]
    pub pressure: PressureConfig,
    pub line_species: Vec<String>,
    pub temperature: TemperatureConfig,
    #[serde(default)]
    pub fit: FitFlags,
    #[serde(default)]
    pub telluric: TelluricConfig,
    #[serde(default)]
    pub system: SystemConfig,
    #[serde(rename = "instrument")]
    pub instruments: Vec<InstrumentConfig>,
    #[serde(default)]
    pub gp: GpConfig,
    #[serde(default)]
    pub sampler: SamplerConfig,
    #[serde(default)]
    pub opacity: OpacityConfig,
    #[serde(default)]
    pub engine: GreyEngineConfig,
}

fn default_out_dir() -> PathBuf {
    PathBuf::from("out")
}

/// Log-uniform pressure grid in bar, top of the atmosphere first.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PressureConfig {
    pub log_min: f64,
    pub log_max: f64,
    pub n_layers: usize,
}

impl Default for PressureConfig {
    fn default() -> Self {
        Self {
            log_min: -5.0,
            log_max: 1.0,
            n_layers: 50,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TemperatureConfig {
    pub n_knots: usize,
    /// Prior on the deepest knot `t_00` (K).
    pub t0_prior: PriorPair,
}

/// Which optional model components are fitted.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FitFlags {
    pub gp: bool,
    /// Chebyshev continuum order; 0 disables the continuum correction.
    pub poly: usize,
    pub scaling: bool,
    pub err_inflation: bool,
    pub telluric: bool,
}

impl Default for FitFlags {
    fn default() -> Self {
        Self {
            gp: false,
            poly: 1,
            scaling: true,
            err_inflation: false,
            telluric: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TelluricConfig {
    pub grid_dir: Option<PathBuf>,
    pub airmass: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Distance in parsec.
    pub distance: f64,
    /// Linear limb-darkening coefficient for rotational broadening.
    pub limb: f64,
    /// Radius prior in Jupiter radii; enables `(R/d)^2` flux scaling.
    pub radius_prior: Option<PriorPair>,
    pub vsini_prior: PriorPair,
    pub vsys_prior: PriorPair,
    pub logg_prior: PriorPair,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            distance: 10.0,
            limb: 0.5,
            radius_prior: None,
            vsini_prior: (1.0, 50.0),
            vsys_prior: (-50.0, 50.0),
            logg_prior: (3.0, 6.0),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstrumentConfig {
    pub name: String,
    /// Observation CSV (`chip,wavelength,flux,err`).
    pub data: PathBuf,
    /// Chips per radiative-transfer group.
    pub detector_bin: Option<usize>,
}

impl InstrumentConfig {
    /// CRIRES chips are modelled three at a time unless overridden.
    pub fn detector_bin(&self) -> usize {
        self.detector_bin
            .unwrap_or_else(|| default_detector_bin(&self.name))
            .max(1)
    }
}

pub fn default_detector_bin(instrument: &str) -> usize {
    if instrument.eq_ignore_ascii_case("crires") { 3 } else { 1 }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GpConfig {
    /// Chips sharing one GP hyperparameter pair; `None` shares one pair
    /// across all chips of an instrument.
    pub chip_bin: Option<usize>,
    pub amp_prior: PriorPair,
    pub tau_prior: PriorPair,
}

impl Default for GpConfig {
    fn default() -> Self {
        Self {
            chip_bin: None,
            amp_prior: (0.0, 1.0),
            tau_prior: (0.0, 1.0),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    pub n_live: usize,
    pub sampling_efficiency: f64,
    pub evidence_tolerance: f64,
    pub max_iterations: usize,
    pub seed: u64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            n_live: 500,
            sampling_efficiency: 0.05,
            evidence_tolerance: 0.5,
            max_iterations: 200_000,
            seed: 42,
        }
    }
}

/// How the radiative-transfer engine samples opacities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpacityMode {
    /// Line-by-line.
    #[serde(rename = "lbl")]
    LineByLine,
    /// Correlated-k.
    #[serde(rename = "c-k")]
    CorrelatedK,
}

/// Opacity sources handed to every radiative-transfer engine at setup, in
/// addition to the line species.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct OpacityConfig {
    pub rayleigh_species: Vec<String>,
    /// Collision-induced absorption pairs such as `H2-He`.
    pub continuum_opacities: Vec<String>,
    pub cloud_species: Vec<String>,
    pub mode: OpacityMode,
    /// Keep every n-th point of the line-by-line opacity grid.
    pub lbl_opacity_sampling: usize,
}

impl Default for OpacityConfig {
    fn default() -> Self {
        Self {
            rayleigh_species: vec!["H2".to_string(), "He".to_string()],
            continuum_opacities: vec!["H2-H2".to_string(), "H2-He".to_string()],
            cloud_species: Vec::new(),
            mode: OpacityMode::LineByLine,
            lbl_opacity_sampling: 5,
        }
    }
}

impl OpacityConfig {
    /// Scattering in emission is needed as soon as clouds are present.
    pub fn scattering_emission(&self) -> bool {
        !self.cloud_species.is_empty()
    }
}

/// Settings for the bundled grey-atmosphere engine used in dry runs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GreyEngineConfig {
    pub resolving_power: f64,
    /// Grey opacity in cm^2/g.
    pub opacity: f64,
}

impl Default for GreyEngineConfig {
    fn default() -> Self {
        Self {
            resolving_power: 1e5,
            opacity: 0.01,
        }
    }
}

/// Which posterior statistic is used for the best-fit model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BestFitStat {
    Median,
    Maximum,
}
