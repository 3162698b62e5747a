//! Forward-model engine: one radiative-transfer call per chip group.
//!
//! Native output is converted from `F_ν(ν)` to `F_λ(λ)`:
//!
//! - `F_λ = F_ν · ν² / c · 1e-7` (W m^-2 µm^-1 from cgs input)
//! - `λ = c / ν` converted to nm
//!
//! and, when a radius parameter is fitted, scaled by `(R / d)²`.

use crate::domain::{Observation, OpacityConfig};
use crate::engine::{OpacityRequest, RadiativeTransfer, RadiativeTransferFactory};
use crate::error::AppError;
use crate::models::Composition;
use crate::params::ParamSnapshot;

/// Speed of light in cm/s.
pub const C_CGS: f64 = 2.997_924_58e10;
/// Jupiter radius in cm.
pub const R_JUP_CM: f64 = 7.1492e9;
/// Parsec in cm.
pub const PARSEC_CM: f64 = 3.085_677_58e18;

/// Native pixel spacings added on both sides of a chip group's window.
pub const WINDOW_PAD_PIXELS: f64 = 200.0;

pub const PARAM_LOGG: &str = "logg";
pub const PARAM_RADIUS: &str = "radius";
pub const PARAM_DISTANCE: &str = "distance";

/// `(wavelength, flux)` arrays for one chip group at some pipeline stage.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSegment {
    pub wlen: Vec<f64>,
    pub flux: Vec<f64>,
}

/// Setup-time description of one instrument for the engine.
#[derive(Debug, Clone, Copy)]
pub struct InstrumentLayout<'a> {
    pub name: &'a str,
    pub observation: &'a Observation,
    pub detector_bin: usize,
}

struct InstrumentEngines {
    name: String,
    groups: Vec<Box<dyn RadiativeTransfer>>,
}

pub struct ForwardModelEngine {
    instruments: Vec<InstrumentEngines>,
    has_radius_scaling: bool,
}

impl std::fmt::Debug for ForwardModelEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForwardModelEngine")
            .field(
                "groups",
                &self
                    .instruments
                    .iter()
                    .map(|i| (i.name.as_str(), i.groups.len()))
                    .collect::<Vec<_>>(),
            )
            .field("has_radius_scaling", &self.has_radius_scaling)
            .finish()
    }
}

/// Wavelength window (µm) for chips `wlen`, padded by 200 pixel spacings.
pub fn padded_window_micron(wlen: &[f64]) -> Result<(f64, f64), AppError> {
    if wlen.len() < 2 {
        return Err(AppError::data("Chip group needs at least 2 wavelengths."));
    }
    let dw = (wlen[1] - wlen[0]) * WINDOW_PAD_PIXELS;
    let lo = wlen.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = wlen.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Ok(((lo - dw) * 1e-3, (hi + dw) * 1e-3))
}

impl ForwardModelEngine {
    /// Build one radiative-transfer engine per chip group of every instrument.
    pub fn build(
        layouts: &[InstrumentLayout<'_>],
        line_species: &[String],
        opacity: &OpacityConfig,
        pressure: &[f64],
        factory: &dyn RadiativeTransferFactory,
        has_radius_scaling: bool,
    ) -> Result<Self, AppError> {
        let mut instruments = Vec::with_capacity(layouts.len());
        for layout in layouts {
            let bin = layout.detector_bin.max(1);
            let mut groups = Vec::new();
            for start in (0..layout.observation.n_chips()).step_by(bin) {
                let wlen = layout.observation.chip_group_wlen(start, bin);
                let request = OpacityRequest {
                    line_species: line_species.to_vec(),
                    wlen_range_micron: padded_window_micron(&wlen)?,
                    pressure: pressure.to_vec(),
                    opacity: opacity.clone(),
                };
                tracing::debug!(
                    instrument = layout.name,
                    first_chip = start,
                    lo_micron = request.wlen_range_micron.0,
                    hi_micron = request.wlen_range_micron.1,
                    "building radiative-transfer engine"
                );
                groups.push(factory.build(&request)?);
            }
            instruments.push(InstrumentEngines {
                name: layout.name.to_string(),
                groups,
            });
        }
        Ok(Self {
            instruments,
            has_radius_scaling,
        })
    }

    pub fn n_groups(&self, instrument: usize) -> usize {
        self.instruments.get(instrument).map_or(0, |i| i.groups.len())
    }

    /// Native model per instrument, one segment per chip group, wavelength
    /// ascending in nm.
    pub fn evaluate(
        &self,
        temperature: &[f64],
        composition: &Composition,
        params: &ParamSnapshot<'_>,
    ) -> Result<Vec<Vec<ModelSegment>>, AppError> {
        let gravity = 10f64.powf(params.value(PARAM_LOGG)?);
        let dilution = if self.has_radius_scaling {
            let ratio = params.value(PARAM_RADIUS)? * R_JUP_CM
                / (params.value(PARAM_DISTANCE)? * PARSEC_CM);
            Some(ratio * ratio)
        } else {
            None
        };

        let mut out = Vec::with_capacity(self.instruments.len());
        for inst in &self.instruments {
            let mut segments = Vec::with_capacity(inst.groups.len());
            for engine in &inst.groups {
                let native = engine.calc_flux(
                    temperature,
                    &composition.abundances,
                    gravity,
                    &composition.mmw,
                )?;
                let mut segment = to_wavelength_space(&native.freq, &native.flux)?;
                if let Some(d) = dilution {
                    for f in &mut segment.flux {
                        *f *= d;
                    }
                }
                segments.push(segment);
            }
            out.push(segments);
        }
        Ok(out)
    }
}

/// Convert `(ν, F_ν)` to `(λ [nm], F_λ)` with wavelength ascending.
pub fn to_wavelength_space(freq: &[f64], flux_nu: &[f64]) -> Result<ModelSegment, AppError> {
    if freq.len() != flux_nu.len() || freq.len() < 2 {
        return Err(AppError::engine(format!(
            "Radiative transfer returned {} frequencies and {} fluxes.",
            freq.len(),
            flux_nu.len()
        )));
    }
    let mut wlen: Vec<f64> = freq.iter().map(|nu| C_CGS / nu / 1e-7).collect();
    let mut flux: Vec<f64> = freq
        .iter()
        .zip(flux_nu)
        .map(|(nu, f)| f * nu * nu / C_CGS * 1e-7)
        .collect();

    if wlen.windows(2).all(|w| w[1] < w[0]) {
        wlen.reverse();
        flux.reverse();
    } else if !wlen.windows(2).all(|w| w[1] > w[0]) {
        return Err(AppError::engine(
            "Radiative transfer returned a non-monotonic frequency grid.",
        ));
    }
    Ok(ModelSegment { wlen, flux })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OpacityMode;
    use crate::engine::NativeSpectrum;
    use crate::models::Abundances;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingFactory {
        requests: Mutex<Vec<OpacityRequest>>,
    }

    struct Silent;

    impl RadiativeTransfer for Silent {
        fn calc_flux(&self, _: &[f64], _: &Abundances, _: f64, _: &[f64]) -> Result<NativeSpectrum, AppError> {
            Err(AppError::engine("not evaluated"))
        }
    }

    impl RadiativeTransferFactory for RecordingFactory {
        fn build(&self, request: &OpacityRequest) -> Result<Box<dyn RadiativeTransfer>, AppError> {
            if let Ok(mut seen) = self.requests.lock() {
                seen.push(request.clone());
            }
            Ok(Box::new(Silent))
        }
    }

    #[test]
    fn every_chip_group_receives_the_opacity_sources() {
        let wlen: Vec<Vec<f64>> = (0..3)
            .map(|c| (0..10).map(|i| 2000.0 + 10.0 * c as f64 + 0.1 * i as f64).collect())
            .collect();
        let flux = wlen.iter().map(|w| vec![1.0; w.len()]).collect();
        let err = wlen.iter().map(|w| vec![0.1; w.len()]).collect();
        let obs = Observation::new(wlen, flux, err).unwrap();
        let layouts = [InstrumentLayout {
            name: "crires",
            observation: &obs,
            detector_bin: 2,
        }];
        let opacity = OpacityConfig {
            cloud_species: vec!["MgSiO3(c)_cd".to_string()],
            mode: OpacityMode::CorrelatedK,
            lbl_opacity_sampling: 2,
            ..OpacityConfig::default()
        };
        let factory = RecordingFactory::default();
        let engine = ForwardModelEngine::build(
            &layouts,
            &["H2O_main_iso".to_string()],
            &opacity,
            &[1e-4, 1e-2, 1.0],
            &factory,
            false,
        )
        .unwrap();
        assert_eq!(engine.n_groups(0), 2);

        let requests = factory.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        for request in requests.iter() {
            assert_eq!(request.opacity, opacity);
            assert!(request.opacity.scattering_emission());
            assert_eq!(request.opacity.rayleigh_species, ["H2", "He"]);
            assert_eq!(request.line_species, ["H2O_main_iso"]);
            assert_eq!(request.pressure, [1e-4, 1e-2, 1.0]);
        }
        assert!(requests[0].wlen_range_micron.1 < requests[1].wlen_range_micron.1);
    }

    #[test]
    fn frequency_grid_is_converted_and_sorted() {
        // Descending frequency means ascending wavelength already; ascending
        // frequency must be reversed.
        let freq = [C_CGS / 2.0e-4, C_CGS / 2.1e-4, C_CGS / 2.2e-4];
        let seg = to_wavelength_space(&freq, &[1.0, 1.0, 1.0]).unwrap();
        assert!((seg.wlen[0] - 2000.0).abs() < 1e-9);
        assert!((seg.wlen[2] - 2200.0).abs() < 1e-9);

        let mut rev = freq;
        rev.reverse();
        let seg_rev = to_wavelength_space(&rev, &[1.0, 1.0, 1.0]).unwrap();
        assert_eq!(seg.wlen, seg_rev.wlen);
        assert_eq!(seg.flux, seg_rev.flux);
    }

    #[test]
    fn flux_density_uses_nu_squared_over_c() {
        let nu = C_CGS / 2.0e-4;
        let seg = to_wavelength_space(&[nu, nu * 0.9], &[3.0, 3.0]).unwrap();
        let expected = 3.0 * nu * nu / C_CGS * 1e-7;
        // Reversed: the higher frequency is the shorter wavelength, first.
        assert!((seg.flux[0] - expected).abs() <= 1e-12 * expected);
    }

    #[test]
    fn window_is_padded_by_two_hundred_pixels() {
        let (lo, hi) = padded_window_micron(&[2000.0, 2000.01, 2000.02]).unwrap();
        assert!((lo - (2000.0 - 2.0) * 1e-3).abs() < 1e-9);
        assert!((hi - (2000.02 + 2.0) * 1e-3).abs() < 1e-9);
    }

    #[test]
    fn mismatched_lengths_are_engine_errors() {
        let err = to_wavelength_space(&[1.0, 2.0], &[1.0]).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_ENGINE);
    }
}
