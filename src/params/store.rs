//! Named retrieval parameters and per-evaluation snapshots.
//!
//! Registration order is the contract with the sampler: the i-th free
//! parameter registered is the i-th coordinate of every unit-cube point. The
//! store never re-sorts.
//!
//! The store itself is only mutated during setup. Each likelihood evaluation
//! builds an immutable [`ParamSnapshot`] from a cube point instead of writing
//! values back into the store, so concurrent evaluations cannot observe each
//! other's parameter values.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Uniform prior bounds `[lower, upper]` for a free parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prior {
    pub lower: f64,
    pub upper: f64,
}

impl Prior {
    pub const UNIT: Prior = Prior {
        lower: 0.0,
        upper: 1.0,
    };

    pub fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    /// Linear map from `[0, 1]` onto `[lower, upper]`.
    pub fn rescale(&self, u: f64) -> f64 {
        self.lower + (self.upper - self.lower) * u
    }

    pub fn centre(&self) -> f64 {
        0.5 * (self.lower + self.upper)
    }
}

impl From<(f64, f64)> for Prior {
    fn from((lower, upper): (f64, f64)) -> Self {
        Self { lower, upper }
    }
}

/// Position of a parameter inside a layered (monotone-chained) profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Layer {
    /// First element of the chain; rescaled normally.
    Head { chain: String },
    /// Later element; its rescaled value is a multiplicative fraction of the
    /// previous transformed element of the same chain.
    Fraction { chain: String },
}

#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: String,
    pub value: Option<f64>,
    pub prior: Prior,
    pub is_free: bool,
    pub layer: Option<Layer>,
}

#[derive(Debug, Clone, Default)]
pub struct ParameterStore {
    params: Vec<Parameter>,
    index: HashMap<String, usize>,
}

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a parameter. Each name may be registered once.
    pub fn add(
        &mut self,
        name: impl Into<String>,
        value: Option<f64>,
        prior: impl Into<Prior>,
        is_free: bool,
    ) -> Result<(), AppError> {
        self.add_parameter(Parameter {
            name: name.into(),
            value,
            prior: prior.into(),
            is_free,
            layer: None,
        })
    }

    /// Register a free parameter that belongs to a layered profile chain.
    pub fn add_layered(
        &mut self,
        name: impl Into<String>,
        prior: impl Into<Prior>,
        layer: Layer,
    ) -> Result<(), AppError> {
        self.add_parameter(Parameter {
            name: name.into(),
            value: None,
            prior: prior.into(),
            is_free: true,
            layer: Some(layer),
        })
    }

    fn add_parameter(&mut self, param: Parameter) -> Result<(), AppError> {
        if self.index.contains_key(&param.name) {
            return Err(AppError::internal(format!(
                "Parameter '{}' registered twice.",
                param.name
            )));
        }
        tracing::debug!(
            name = %param.name,
            value = ?param.value,
            lower = param.prior.lower,
            upper = param.prior.upper,
            is_free = param.is_free,
            "add parameter"
        );
        self.index.insert(param.name.clone(), self.params.len());
        self.params.push(param);
        Ok(())
    }

    pub fn set_value(&mut self, name: &str, value: f64) -> Result<(), AppError> {
        let idx = self.position(name)?;
        self.params[idx].value = Some(value);
        Ok(())
    }

    pub fn set_prior(&mut self, name: &str, prior: impl Into<Prior>) -> Result<(), AppError> {
        let idx = self.position(name)?;
        self.params[idx].prior = prior.into();
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&Parameter, AppError> {
        Ok(&self.params[self.position(name)?])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    fn position(&self, name: &str) -> Result<usize, AppError> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| AppError::internal(format!("Unregistered parameter '{name}'.")))
    }

    /// All parameters in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.params.iter()
    }

    /// Free parameters in registration order (the cube-index mapping).
    pub fn free(&self) -> impl Iterator<Item = &Parameter> {
        self.params.iter().filter(|p| p.is_free)
    }

    /// Names of the free parameters in registration order.
    pub fn free_vector(&self) -> Vec<String> {
        self.free().map(|p| p.name.clone()).collect()
    }

    pub fn n_free(&self) -> usize {
        self.free().count()
    }

    /// Build the per-evaluation snapshot: fixed values from the store, free
    /// values from `cube` (already prior-transformed) in registration order.
    pub fn snapshot(&self, cube: &[f64]) -> Result<ParamSnapshot<'_>, AppError> {
        let n_free = self.n_free();
        if cube.len() != n_free {
            return Err(AppError::internal(format!(
                "Cube has {} entries but {n_free} parameters are free.",
                cube.len()
            )));
        }
        let mut free_values = cube.iter().copied();
        let values = self
            .params
            .iter()
            .map(|p| if p.is_free { free_values.next() } else { p.value })
            .collect();
        Ok(ParamSnapshot {
            index: &self.index,
            values,
        })
    }
}

/// Immutable name → value view for one likelihood evaluation.
#[derive(Debug, Clone)]
pub struct ParamSnapshot<'a> {
    index: &'a HashMap<String, usize>,
    values: Vec<Option<f64>>,
}

impl ParamSnapshot<'_> {
    /// Value of a parameter. Unknown names and fixed parameters without a
    /// value are programming errors.
    pub fn value(&self, name: &str) -> Result<f64, AppError> {
        let idx = self
            .index
            .get(name)
            .ok_or_else(|| AppError::internal(format!("Unregistered parameter '{name}'.")))?;
        self.values[*idx]
            .ok_or_else(|| AppError::internal(format!("Parameter '{name}' has no value.")))
    }

    /// Values for a list of names, in the given order.
    pub fn values(&self, names: &[String]) -> Result<Vec<f64>, AppError> {
        names.iter().map(|n| self.value(n)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_store() -> ParameterStore {
        let mut store = ParameterStore::new();
        store.add("distance", Some(10.0), Prior::UNIT, false).unwrap();
        store.add("vsini", None, (1.0, 50.0), true).unwrap();
        store.add("limb", Some(0.5), Prior::UNIT, false).unwrap();
        store.add("vsys", None, (-50.0, 50.0), true).unwrap();
        store
    }

    #[test]
    fn free_vector_keeps_registration_order() {
        let store = sample_store();
        assert_eq!(store.free_vector(), vec!["vsini", "vsys"]);
        assert_eq!(store.n_free(), 2);
    }

    #[test]
    fn snapshot_merges_fixed_and_free_values() {
        let store = sample_store();
        let snap = store.snapshot(&[12.0, -3.0]).unwrap();
        assert_eq!(snap.value("distance").unwrap(), 10.0);
        assert_eq!(snap.value("vsini").unwrap(), 12.0);
        assert_eq!(snap.value("limb").unwrap(), 0.5);
        assert_eq!(snap.value("vsys").unwrap(), -3.0);
    }

    #[test]
    fn unregistered_access_is_an_internal_error() {
        let mut store = sample_store();
        let err = store.set_value("logg", 4.0).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_INTERNAL);

        let snap = store.snapshot(&[1.0, 2.0]).unwrap();
        assert!(snap.value("logg").is_err());
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut store = sample_store();
        assert!(store.add("vsini", None, Prior::UNIT, true).is_err());
    }

    #[test]
    fn snapshot_rejects_wrong_cube_length() {
        let store = sample_store();
        assert!(store.snapshot(&[1.0]).is_err());
    }
}
