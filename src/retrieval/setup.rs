//! Parameter registration at setup.
//!
//! Registration order is the cube order:
//!
//! 1. system (`distance`, `limb`, `vsini`, `vsys`, `logg`, optional `radius`)
//! 2. instrument kernels (`{inst}_G`, `{inst}_L`)
//! 3. temperature knots `t_00..`
//! 4. chemistry `logX_*` plus the `H2`/`He` filler entries
//! 5. telluric parameters
//! 6. continuum polynomials
//! 7. GP hyperparameters

use crate::domain::{InstrumentConfig, RetrievalConfig};
use crate::engine::{PARAM_DISTANCE, PARAM_LOGG, PARAM_RADIUS};
use crate::error::AppError;
use crate::likelihood::{GpLayout, gp_amp_name, gp_tau_name};
use crate::models::{ChemistryModel, PARAM_AIRMASS, PARAM_CH4, PARAM_H2O, PARAM_TEMP, knot_names};
use crate::params::{Layer, ParameterStore, Prior};
use crate::spectral::{PARAM_LIMB, PARAM_VSINI, PARAM_VSYS, lorentz_param_name, poly_param_name, resolution_param_name};

pub const TEMPERATURE_CHAIN: &str = "temperature";

pub const RESOLUTION_PRIOR: (f64, f64) = (3e4, 2e5);
pub const LORENTZ_PRIOR: (f64, f64) = (0.1, 5.0);
pub const ABUNDANCE_PRIOR: (f64, f64) = (-12.0, -2.0);
pub const TELLU_TEMP_PRIOR: (f64, f64) = (-9e-4, 9e-4);
pub const TELLU_H2O_PRIOR: (f64, f64) = (0.05, 0.9);
pub const TELLU_CH4_PRIOR: (f64, f64) = (0.8, 1.2);

/// Chip counts per instrument, in configuration order.
pub struct InstrumentShape<'a> {
    pub config: &'a InstrumentConfig,
    pub n_chips: usize,
}

pub fn register_parameters(
    store: &mut ParameterStore,
    config: &RetrievalConfig,
    instruments: &[InstrumentShape<'_>],
    chemistry: &ChemistryModel,
    gp: GpLayout,
) -> Result<(), AppError> {
    add_system_params(store, config)?;
    add_instrument_kernels(store, instruments)?;
    add_temperature_knots(store, config)?;
    add_chemistry(store, chemistry)?;
    if config.fit.telluric {
        add_telluric(store, config)?;
    }
    add_poly(store, instruments, config.fit.poly)?;
    add_gp(store, config, instruments, gp)?;
    Ok(())
}

fn add_system_params(store: &mut ParameterStore, config: &RetrievalConfig) -> Result<(), AppError> {
    let sys = &config.system;
    store.add(PARAM_DISTANCE, Some(sys.distance), Prior::UNIT, false)?;
    store.add(PARAM_LIMB, Some(sys.limb), Prior::UNIT, false)?;
    store.add(PARAM_VSINI, None, sys.vsini_prior, true)?;
    store.add(PARAM_VSYS, None, sys.vsys_prior, true)?;
    store.add(PARAM_LOGG, None, sys.logg_prior, true)?;
    if let Some(prior) = sys.radius_prior {
        store.add(PARAM_RADIUS, None, prior, true)?;
    }
    Ok(())
}

fn add_instrument_kernels(store: &mut ParameterStore, instruments: &[InstrumentShape<'_>]) -> Result<(), AppError> {
    for inst in instruments {
        store.add(resolution_param_name(&inst.config.name), None, RESOLUTION_PRIOR, true)?;
        store.add(lorentz_param_name(&inst.config.name), None, LORENTZ_PRIOR, true)?;
    }
    Ok(())
}

fn add_temperature_knots(store: &mut ParameterStore, config: &RetrievalConfig) -> Result<(), AppError> {
    for (i, name) in knot_names(config.temperature.n_knots).into_iter().enumerate() {
        let chain = TEMPERATURE_CHAIN.to_string();
        if i == 0 {
            store.add_layered(name, config.temperature.t0_prior, Layer::Head { chain })?;
        } else {
            store.add_layered(name, Prior::UNIT, Layer::Fraction { chain })?;
        }
    }
    Ok(())
}

fn add_chemistry(store: &mut ParameterStore, chemistry: &ChemistryModel) -> Result<(), AppError> {
    for name in chemistry.param_names() {
        store.add(name, None, ABUNDANCE_PRIOR, true)?;
    }
    store.add("H2", None, Prior::UNIT, false)?;
    store.add("He", None, Prior::UNIT, false)?;
    Ok(())
}

fn add_telluric(store: &mut ParameterStore, config: &RetrievalConfig) -> Result<(), AppError> {
    let airmass = config.telluric.airmass.unwrap_or(1.0);
    store.add(PARAM_AIRMASS, Some(airmass), Prior::UNIT, false)?;
    store.add(PARAM_TEMP, None, TELLU_TEMP_PRIOR, true)?;
    store.add(PARAM_H2O, None, TELLU_H2O_PRIOR, true)?;
    store.add(PARAM_CH4, None, TELLU_CH4_PRIOR, true)?;
    Ok(())
}

fn add_poly(store: &mut ParameterStore, instruments: &[InstrumentShape<'_>], order: usize) -> Result<(), AppError> {
    for inst in instruments {
        for chip in 0..inst.n_chips {
            for o in 1..=order {
                let bound = 5e-2 / o as f64;
                store.add(poly_param_name(&inst.config.name, o, chip), None, (-bound, bound), true)?;
            }
        }
    }
    Ok(())
}

fn add_gp(
    store: &mut ParameterStore,
    config: &RetrievalConfig,
    instruments: &[InstrumentShape<'_>],
    gp: GpLayout,
) -> Result<(), AppError> {
    for inst in instruments {
        for group in gp.groups(inst.n_chips) {
            store.add(gp_amp_name(&inst.config.name, group), None, config.gp.amp_prior, true)?;
            store.add(gp_tau_name(&inst.config.name, group), None, config.gp.tau_prior, true)?;
        }
    }
    Ok(())
}
