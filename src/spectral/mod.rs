//! Post-radiative-transfer spectral pipeline.
//!
//! The stages run in the fixed order of [`STAGES`]; each one consumes the
//! previous [`ModelState`] and returns the next generation. Up to
//! [`Stage::Rebin`] the state holds one segment per radiative-transfer chip
//! group; from then on it holds one segment per observed chip, aligned with
//! the observation's chip order.

use crate::domain::Observation;
use crate::engine::{C_CGS, ModelSegment};
use crate::error::AppError;
use crate::math::{chebval, instrument_broaden, interp_extrapolate, lin_space, normalized_axis, rebin_give_width, rot_broaden};
use crate::models::TelluricTransmission;
use crate::params::ParamSnapshot;

/// Upsampling factor relative to the native model sampling.
pub const UPSAMPLE_FACTOR: usize = 20;

pub const PARAM_VSYS: &str = "vsys";
pub const PARAM_VSINI: &str = "vsini";
pub const PARAM_LIMB: &str = "limb";

/// `{inst}_G`: instrumental resolving power.
pub fn resolution_param_name(instrument: &str) -> String {
    format!("{instrument}_G")
}

/// `{inst}_L`: Lorentzian FWHM in km/s.
pub fn lorentz_param_name(instrument: &str) -> String {
    format!("{instrument}_L")
}

/// `poly_{inst}_{order}_{chip:02}`.
pub fn poly_param_name(instrument: &str, order: usize, chip: usize) -> String {
    format!("poly_{instrument}_{order}_{chip:02}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    RvShift,
    Upsample,
    RotationalBroadening,
    Telluric,
    InstrumentBroadening,
    Rebin,
    Continuum,
}

/// The pipeline order. Reordering changes the model.
pub const STAGES: [Stage; 7] = [
    Stage::RvShift,
    Stage::Upsample,
    Stage::RotationalBroadening,
    Stage::Telluric,
    Stage::InstrumentBroadening,
    Stage::Rebin,
    Stage::Continuum,
];

/// Unshifted extent of a native segment; upsampling is done on this range.
#[derive(Debug, Clone, Copy, PartialEq)]
struct NativeSpan {
    first: f64,
    last: f64,
    len: usize,
}

#[derive(Debug, Clone)]
pub struct ModelState {
    pub segments: Vec<ModelSegment>,
    native: Vec<NativeSpan>,
}

impl ModelState {
    pub fn from_native(segments: Vec<ModelSegment>) -> Self {
        Self {
            segments,
            native: Vec::new(),
        }
    }
}

/// Everything a stage may read besides the model state.
#[derive(Debug, Clone, Copy)]
pub struct StageContext<'a> {
    pub instrument: &'a str,
    pub observation: &'a Observation,
    pub detector_bin: usize,
    pub poly_order: usize,
    pub telluric: &'a TelluricTransmission,
    pub params: &'a ParamSnapshot<'a>,
}

impl Stage {
    pub fn apply(self, state: ModelState, ctx: &StageContext<'_>) -> Result<ModelState, AppError> {
        match self {
            Stage::RvShift => rv_shift(state, ctx),
            Stage::Upsample => upsample(state),
            Stage::RotationalBroadening => rotational_broadening(state, ctx),
            Stage::Telluric => Ok(telluric(state, ctx)),
            Stage::InstrumentBroadening => instrumental_broadening(state, ctx),
            Stage::Rebin => rebin(state, ctx),
            Stage::Continuum => continuum(state, ctx),
        }
    }
}

/// Run every stage in order on the native model of one instrument.
pub fn run_pipeline(native: Vec<ModelSegment>, ctx: &StageContext<'_>) -> Result<Vec<ModelSegment>, AppError> {
    let mut state = ModelState::from_native(native);
    for stage in STAGES {
        state = stage.apply(state, ctx)?;
        tracing::trace!(instrument = ctx.instrument, ?stage, segments = state.segments.len(), "stage done");
    }
    Ok(state.segments)
}

fn map_flux(state: ModelState, f: impl Fn(&ModelSegment) -> Vec<f64>) -> ModelState {
    let segments = state
        .segments
        .iter()
        .map(|seg| ModelSegment {
            wlen: seg.wlen.clone(),
            flux: f(seg),
        })
        .collect();
    ModelState {
        segments,
        native: state.native,
    }
}

fn rv_shift(state: ModelState, ctx: &StageContext<'_>) -> Result<ModelState, AppError> {
    let factor = 1.0 + ctx.params.value(PARAM_VSYS)? * 1e5 / C_CGS;
    let native = state
        .segments
        .iter()
        .map(|seg| NativeSpan {
            first: seg.wlen[0],
            last: seg.wlen[seg.wlen.len() - 1],
            len: seg.wlen.len(),
        })
        .collect();
    let segments = state
        .segments
        .into_iter()
        .map(|seg| ModelSegment {
            wlen: seg.wlen.iter().map(|w| w * factor).collect(),
            flux: seg.flux,
        })
        .collect();
    Ok(ModelState { segments, native })
}

fn upsample(state: ModelState) -> Result<ModelState, AppError> {
    if state.native.len() != state.segments.len() {
        return Err(AppError::internal("Upsampling before the velocity shift."));
    }
    let segments = state
        .segments
        .iter()
        .zip(&state.native)
        .map(|(seg, span)| {
            let wlen = lin_space(span.first, span.last, span.len * UPSAMPLE_FACTOR);
            let flux = interp_extrapolate(&seg.wlen, &seg.flux, &wlen)?;
            Ok(ModelSegment { wlen, flux })
        })
        .collect::<Result<Vec<_>, AppError>>()?;
    Ok(ModelState {
        segments,
        native: state.native,
    })
}

fn rotational_broadening(state: ModelState, ctx: &StageContext<'_>) -> Result<ModelState, AppError> {
    let limb = ctx.params.value(PARAM_LIMB)?;
    let vsini = ctx.params.value(PARAM_VSINI)?;
    Ok(map_flux(state, |seg| rot_broaden(&seg.wlen, &seg.flux, limb, vsini)))
}

fn telluric(state: ModelState, ctx: &StageContext<'_>) -> ModelState {
    if matches!(ctx.telluric, TelluricTransmission::Unity) {
        return state;
    }
    map_flux(state, |seg| {
        ctx.telluric
            .eval_many(&seg.wlen)
            .iter()
            .zip(&seg.flux)
            .map(|(t, f)| t * f)
            .collect()
    })
}

fn instrumental_broadening(state: ModelState, ctx: &StageContext<'_>) -> Result<ModelState, AppError> {
    let resolution = ctx.params.value(&resolution_param_name(ctx.instrument))?;
    let lorentz = ctx.params.value(&lorentz_param_name(ctx.instrument))?;
    Ok(map_flux(state, |seg| instrument_broaden(&seg.wlen, &seg.flux, resolution, lorentz)))
}

fn rebin(state: ModelState, ctx: &StageContext<'_>) -> Result<ModelState, AppError> {
    let obs = ctx.observation;
    let bin = ctx.detector_bin.max(1);
    let segments = (0..obs.n_chips())
        .map(|chip| {
            let group = chip / bin;
            let seg = state.segments.get(group).ok_or_else(|| {
                AppError::internal(format!(
                    "{}: chip {chip} maps to model group {group}, only {} groups exist.",
                    ctx.instrument,
                    state.segments.len()
                ))
            })?;
            let flux = rebin_give_width(&seg.wlen, &seg.flux, &obs.wlen[chip], &obs.wlen_bins[chip])?;
            Ok(ModelSegment {
                wlen: obs.wlen[chip].clone(),
                flux,
            })
        })
        .collect::<Result<Vec<_>, AppError>>()?;
    Ok(ModelState {
        segments,
        native: Vec::new(),
    })
}

fn continuum(state: ModelState, ctx: &StageContext<'_>) -> Result<ModelState, AppError> {
    if ctx.poly_order == 0 {
        return Ok(state);
    }
    let mut segments = Vec::with_capacity(state.segments.len());
    for (chip, seg) in state.segments.into_iter().enumerate() {
        let mut coeffs = Vec::with_capacity(ctx.poly_order + 1);
        coeffs.push(1.0);
        for order in 1..=ctx.poly_order {
            coeffs.push(ctx.params.value(&poly_param_name(ctx.instrument, order, chip))?);
        }
        let flux = normalized_axis(&seg.wlen)
            .iter()
            .zip(&seg.flux)
            .map(|(&x, f)| f * chebval(x, &coeffs))
            .collect();
        segments.push(ModelSegment { wlen: seg.wlen, flux });
    }
    Ok(ModelState {
        segments,
        native: state.native,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Linear1d;
    use crate::params::{Prior, ParameterStore};

    const INST: &str = "crires";

    fn store(poly: f64) -> ParameterStore {
        let mut s = ParameterStore::new();
        s.add(PARAM_LIMB, Some(0.5), Prior::UNIT, false).unwrap();
        s.add(PARAM_VSINI, Some(10.0), Prior::UNIT, false).unwrap();
        s.add(PARAM_VSYS, Some(5.0), Prior::UNIT, false).unwrap();
        s.add(resolution_param_name(INST), Some(1e5), Prior::UNIT, false).unwrap();
        s.add(lorentz_param_name(INST), Some(1.0), Prior::UNIT, false).unwrap();
        for chip in 0..2 {
            s.add(poly_param_name(INST, 1, chip), Some(poly), Prior::UNIT, false).unwrap();
        }
        s
    }

    fn observation() -> Observation {
        let chips = vec![lin_space(2004.0, 2005.0, 51), lin_space(2005.2, 2006.0, 41)];
        let flux = chips.iter().map(|c| vec![1.0; c.len()]).collect();
        let err = chips.iter().map(|c| vec![0.1; c.len()]).collect();
        Observation::new(chips, flux, err).unwrap()
    }

    fn flat_native(level: f64) -> Vec<ModelSegment> {
        let wlen = lin_space(2000.0, 2010.0, 1001);
        let flux = vec![level; wlen.len()];
        vec![ModelSegment { wlen, flux }]
    }

    #[test]
    fn stage_order_is_fixed() {
        assert_eq!(
            STAGES,
            [
                Stage::RvShift,
                Stage::Upsample,
                Stage::RotationalBroadening,
                Stage::Telluric,
                Stage::InstrumentBroadening,
                Stage::Rebin,
                Stage::Continuum,
            ]
        );
    }

    #[test]
    fn flat_model_stays_flat_through_the_pipeline() {
        let s = store(0.0);
        let snap = s.snapshot(&[]).unwrap();
        let obs = observation();
        let ctx = StageContext {
            instrument: INST,
            observation: &obs,
            detector_bin: 2,
            poly_order: 1,
            telluric: &TelluricTransmission::Unity,
            params: &snap,
        };
        let out = run_pipeline(flat_native(2.0), &ctx).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].wlen, obs.wlen[1]);
        for seg in &out {
            for f in &seg.flux {
                assert!((f - 2.0).abs() < 1e-9, "flux = {f}");
            }
        }
    }

    #[test]
    fn continuum_tilts_each_chip_around_its_centre() {
        let s = store(0.01);
        let snap = s.snapshot(&[]).unwrap();
        let obs = observation();
        let ctx = StageContext {
            instrument: INST,
            observation: &obs,
            detector_bin: 2,
            poly_order: 1,
            telluric: &TelluricTransmission::Unity,
            params: &snap,
        };
        let out = run_pipeline(flat_native(2.0), &ctx).unwrap();
        // First pixel sits at x = -1 on the normalized axis, centre at 0.
        assert!((out[0].flux[0] - 2.0 * 0.99).abs() < 1e-9);
        assert!((out[0].flux[25] - 2.0).abs() < 1e-9);
        assert!((out[0].flux[50] - 2.0 * 1.01).abs() < 1e-9);
    }

    #[test]
    fn telluric_transmission_multiplies_the_model() {
        let s = store(0.0);
        let snap = s.snapshot(&[]).unwrap();
        let obs = observation();
        let half = TelluricTransmission::Tabulated(
            Linear1d::new(vec![1990.0, 2020.0], vec![0.5, 0.5]).unwrap(),
        );
        let ctx = StageContext {
            instrument: INST,
            observation: &obs,
            detector_bin: 2,
            poly_order: 0,
            telluric: &half,
            params: &snap,
        };
        let out = run_pipeline(flat_native(2.0), &ctx).unwrap();
        assert!((out[1].flux[10] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn missing_chip_group_is_an_internal_error() {
        let s = store(0.0);
        let snap = s.snapshot(&[]).unwrap();
        let obs = observation();
        let ctx = StageContext {
            instrument: INST,
            observation: &obs,
            detector_bin: 1,
            poly_order: 0,
            telluric: &TelluricTransmission::Unity,
            params: &snap,
        };
        let err = run_pipeline(flat_native(1.0), &ctx).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_INTERNAL);
    }

    #[test]
    fn velocity_shift_keeps_the_native_span_for_upsampling() {
        let s = store(0.0);
        let snap = s.snapshot(&[]).unwrap();
        let obs = observation();
        let ctx = StageContext {
            instrument: INST,
            observation: &obs,
            detector_bin: 2,
            poly_order: 0,
            telluric: &TelluricTransmission::Unity,
            params: &snap,
        };
        let shifted = Stage::RvShift
            .apply(ModelState::from_native(flat_native(1.0)), &ctx)
            .unwrap();
        let factor = 1.0 + 5.0 * 1e5 / C_CGS;
        assert!((shifted.segments[0].wlen[0] - 2000.0 * factor).abs() < 1e-9);

        let up = Stage::Upsample.apply(shifted, &ctx).unwrap();
        let wlen = &up.segments[0].wlen;
        assert_eq!(wlen.len(), 1001 * UPSAMPLE_FACTOR);
        assert!((wlen[0] - 2000.0).abs() < 1e-9);
        assert!((wlen[wlen.len() - 1] - 2010.0).abs() < 1e-9);
    }
}
