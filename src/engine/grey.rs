//! Grey-atmosphere engine for dry runs and tests.
//!
//! Emits `π B_ν(T_phot)` where `T_phot` is the temperature at the grey
//! photosphere (`τ = κ P / g = 2/3`). There are no lines: it exercises the
//! whole retrieval loop without an external opacity database.

use crate::domain::GreyEngineConfig;
use crate::engine::{C_CGS, NativeSpectrum, OpacityRequest, RadiativeTransfer, RadiativeTransferFactory};
use crate::error::AppError;
use crate::math::Linear1d;
use crate::models::Abundances;

/// Planck constant (erg s).
const H_CGS: f64 = 6.626_070_15e-27;
/// Boltzmann constant (erg/K).
const K_B_CGS: f64 = 1.380_649e-16;
/// bar → dyn cm^-2.
const BAR_TO_CGS: f64 = 1e6;

const PHOTOSPHERE_TAU: f64 = 2.0 / 3.0;

/// Planck function B_ν(T) in erg s^-1 cm^-2 Hz^-1 sr^-1.
pub fn planck_nu(nu: f64, temperature: f64) -> f64 {
    let x = H_CGS * nu / (K_B_CGS * temperature);
    2.0 * H_CGS * nu.powi(3) / (C_CGS * C_CGS) / x.exp_m1()
}

#[derive(Debug, Clone)]
pub struct GreyAtmosphere {
    config: GreyEngineConfig,
}

impl GreyAtmosphere {
    pub fn new(config: GreyEngineConfig) -> Self {
        Self { config }
    }
}

impl RadiativeTransferFactory for GreyAtmosphere {
    fn build(&self, request: &OpacityRequest) -> Result<Box<dyn RadiativeTransfer>, AppError> {
        let (lo, hi) = request.wlen_range_micron;
        if !(lo > 0.0 && hi > lo) {
            return Err(AppError::engine(format!("Invalid wavelength window {lo}..{hi} µm.")));
        }
        if !(self.config.resolving_power > 0.0 && self.config.opacity > 0.0) {
            return Err(AppError::config("Grey engine needs positive resolving power and opacity."));
        }
        // Log-uniform wavelength sampling at the requested resolving power,
        // stored as descending frequency (ascending wavelength).
        let step = (1.0 + 1.0 / self.config.resolving_power).ln();
        let n = ((hi / lo).ln() / step).ceil() as usize + 1;
        let freq = (0..n)
            .map(|i| {
                let wlen_cm = lo * 1e-4 * (step * i as f64).exp();
                C_CGS / wlen_cm
            })
            .collect();

        Ok(Box::new(GreyEngine {
            freq,
            log_pressure: request.pressure.iter().map(|p| p.log10()).collect(),
            pressure: request.pressure.clone(),
            opacity: self.config.opacity,
        }))
    }
}

#[derive(Debug, Clone)]
struct GreyEngine {
    freq: Vec<f64>,
    pressure: Vec<f64>,
    log_pressure: Vec<f64>,
    opacity: f64,
}

impl GreyEngine {
    fn photosphere_temperature(&self, temperature: &[f64], gravity: f64) -> Result<f64, AppError> {
        if temperature.len() != self.pressure.len() {
            return Err(AppError::engine(format!(
                "Temperature profile has {} layers, engine expects {}.",
                temperature.len(),
                self.pressure.len()
            )));
        }
        // Pressure where τ = 2/3, clamped into the grid.
        let p_phot = PHOTOSPHERE_TAU * gravity / (self.opacity * BAR_TO_CGS);
        let first = self.pressure[0];
        let last = self.pressure[self.pressure.len() - 1];
        let log_p = p_phot.clamp(first, last).log10();
        let profile = Linear1d::new(self.log_pressure.clone(), temperature.to_vec())?;
        Ok(profile.eval(log_p))
    }
}

impl RadiativeTransfer for GreyEngine {
    fn calc_flux(
        &self,
        temperature: &[f64],
        _abundances: &Abundances,
        gravity: f64,
        _mmw: &[f64],
    ) -> Result<NativeSpectrum, AppError> {
        let t_phot = self.photosphere_temperature(temperature, gravity)?;
        if !(t_phot > 0.0) {
            return Err(AppError::engine(format!("Non-positive photospheric temperature {t_phot}.")));
        }
        let flux = self
            .freq
            .iter()
            .map(|&nu| std::f64::consts::PI * planck_nu(nu, t_phot))
            .collect();
        Ok(NativeSpectrum {
            freq: self.freq.clone(),
            flux,
        })
    }
}
