//! Radiative-transfer collaborator seam and the forward-model engine.
//!
//! The radiative transfer itself is external: anything implementing
//! [`RadiativeTransfer`] can be plugged in. One engine instance is built per
//! instrument chip group at setup through a [`RadiativeTransferFactory`].

pub mod forward;
pub mod grey;

pub use forward::*;
pub use grey::*;

use crate::domain::OpacityConfig;
use crate::error::AppError;
use crate::models::Abundances;

/// Native output of one radiative-transfer call.
#[derive(Debug, Clone)]
pub struct NativeSpectrum {
    /// Frequency grid in Hz.
    pub freq: Vec<f64>,
    /// Emergent flux density F_ν in erg s^-1 cm^-2 Hz^-1.
    pub flux: Vec<f64>,
}

/// One configured radiative-transfer engine (fixed wavelength window and
/// pressure grid).
pub trait RadiativeTransfer: Send + Sync {
    fn calc_flux(
        &self,
        temperature: &[f64],
        abundances: &Abundances,
        gravity: f64,
        mmw: &[f64],
    ) -> Result<NativeSpectrum, AppError>;
}

/// What a chip group asks of the radiative-transfer engine at setup.
#[derive(Debug, Clone)]
pub struct OpacityRequest {
    pub line_species: Vec<String>,
    /// Wavelength window in µm.
    pub wlen_range_micron: (f64, f64),
    /// Pressure grid in bar, top of the atmosphere first.
    pub pressure: Vec<f64>,
    /// Rayleigh, continuum and cloud sources plus the sampling mode.
    pub opacity: OpacityConfig,
}

pub trait RadiativeTransferFactory {
    fn build(&self, request: &OpacityRequest) -> Result<Box<dyn RadiativeTransfer>, AppError>;
}
