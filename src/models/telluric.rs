//! Telluric (Earth atmosphere) transmission model.
//!
//! H2O and CH4 transmissions are tabulated on `(relative temperature,
//! relative abundance)` grids; N2O, CO, CO2 and O3 are fixed curves. A model
//! evaluation interpolates the two grids at the current parameters, clips
//! negative transmissions, multiplies in the fixed curves, and raises the
//! product to the airmass.

use crate::error::AppError;
use crate::math::{Linear1d, RegularGrid2d, lin_space};
use crate::params::ParamSnapshot;

pub const PARAM_AIRMASS: &str = "airmass";
pub const PARAM_TEMP: &str = "tellu_temp";
pub const PARAM_H2O: &str = "tellu_H2O";
pub const PARAM_CH4: &str = "tellu_CH4";

/// Tabulated relative-temperature axis: -9e-4 to 9e-4 in steps of 3e-4.
pub fn rel_temp_axis() -> Vec<f64> {
    lin_space(-9e-4, 9e-4, 7)
}

/// Tabulated relative H2O axis.
pub fn rel_h2o_axis() -> Vec<f64> {
    vec![0.05, 0.10, 0.20, 0.30, 0.40, 0.50, 0.60, 0.70, 0.80]
}

/// Tabulated relative CH4 axis: 0.8 to 1.2 in steps of 0.05.
pub fn rel_ch4_axis() -> Vec<f64> {
    lin_space(0.8, 1.2, 9)
}

/// Preloaded telluric tables. Immutable after loading.
#[derive(Debug, Clone)]
pub struct TelluricGrid {
    wave: Vec<f64>,
    h2o: RegularGrid2d,
    ch4: RegularGrid2d,
    /// Elementwise product of the N2O, CO, CO2 and O3 curves.
    fixed: Vec<f64>,
}

/// Raw tables as read from disk, before validation.
#[derive(Debug, Clone)]
pub struct TelluricTables {
    pub wave: Vec<f64>,
    pub h2o: Vec<Vec<f64>>,
    pub ch4: Vec<Vec<f64>>,
    pub n2o: Vec<f64>,
    pub co: Vec<f64>,
    pub co2: Vec<f64>,
    pub o3: Vec<f64>,
}

impl TelluricGrid {
    pub fn from_tables(tables: TelluricTables) -> Result<Self, AppError> {
        let n = tables.wave.len();
        if n < 2 || !tables.wave.windows(2).all(|w| w[1] > w[0]) {
            return Err(AppError::data(
                "Telluric wavelength axis must have >= 2 strictly increasing values.",
            ));
        }

        let h2o = RegularGrid2d::new(rel_temp_axis(), rel_h2o_axis(), tables.h2o)?;
        let ch4 = RegularGrid2d::new(rel_temp_axis(), rel_ch4_axis(), tables.ch4)?;
        for (label, width) in [("H2O", h2o.width()), ("CH4", ch4.width())] {
            if width != n {
                return Err(AppError::data(format!(
                    "Telluric {label} grid has {width} wavelengths, expected {n}."
                )));
            }
        }

        let mut fixed = vec![1.0; n];
        for (label, curve) in [
            ("N2O", &tables.n2o),
            ("CO", &tables.co),
            ("CO2", &tables.co2),
            ("O3", &tables.o3),
        ] {
            if curve.len() != n {
                return Err(AppError::data(format!(
                    "Telluric {label} curve has {} wavelengths, expected {n}.",
                    curve.len()
                )));
            }
            for (f, c) in fixed.iter_mut().zip(curve) {
                *f *= c;
            }
        }

        Ok(Self {
            wave: tables.wave,
            h2o,
            ch4,
            fixed,
        })
    }

    pub fn wave(&self) -> &[f64] {
        &self.wave
    }

    /// Combined transmission on the native telluric wavelength grid.
    pub fn transmission(&self, rel_temp: f64, rel_h2o: f64, rel_ch4: f64, airmass: f64) -> Vec<f64> {
        let y_h2o = self.h2o.eval(rel_temp, rel_h2o);
        let y_ch4 = self.ch4.eval(rel_temp, rel_ch4);
        y_h2o
            .iter()
            .zip(&y_ch4)
            .zip(&self.fixed)
            .map(|((h, c), f)| (h.max(0.0) * c.max(0.0) * f).powf(airmass))
            .collect()
    }
}

/// Transmission as a continuous function of wavelength.
#[derive(Debug, Clone)]
pub enum TelluricTransmission {
    /// No telluric fitting: transmission is 1 everywhere.
    Unity,
    Tabulated(Linear1d),
}

impl TelluricTransmission {
    pub fn eval_many(&self, wlen: &[f64]) -> Vec<f64> {
        match self {
            TelluricTransmission::Unity => vec![1.0; wlen.len()],
            TelluricTransmission::Tabulated(f) => f.eval_many(wlen),
        }
    }
}

/// Telluric stage of the forward model; `None` grid means fitting is disabled.
#[derive(Debug, Clone)]
pub struct TelluricModel {
    grid: Option<TelluricGrid>,
}

impl TelluricModel {
    pub fn disabled() -> Self {
        Self { grid: None }
    }

    pub fn enabled(grid: TelluricGrid) -> Self {
        Self { grid: Some(grid) }
    }

    pub fn is_enabled(&self) -> bool {
        self.grid.is_some()
    }

    pub fn evaluate(&self, params: &ParamSnapshot<'_>) -> Result<TelluricTransmission, AppError> {
        let Some(grid) = &self.grid else {
            return Ok(TelluricTransmission::Unity);
        };
        let trans = grid.transmission(
            params.value(PARAM_TEMP)?,
            params.value(PARAM_H2O)?,
            params.value(PARAM_CH4)?,
            params.value(PARAM_AIRMASS)?,
        );
        Ok(TelluricTransmission::Tabulated(Linear1d::new(
            grid.wave.clone(),
            trans,
        )?))
    }
}
