//! Free chemistry: constant-with-pressure mass fractions plus H2/He filler.

use std::collections::BTreeMap;

use crate::error::AppError;
use crate::models::elements::molar_mass;
use crate::params::ParamSnapshot;

/// Number fractions of the H2/He filler gas.
pub const H2_NUMBER_FRACTION: f64 = 0.84;
pub const HE_NUMBER_FRACTION: f64 = 0.16;

/// Mass fraction per species, one value per pressure layer.
pub type Abundances = BTreeMap<String, Vec<f64>>;

/// Atmospheric composition for one evaluation.
#[derive(Debug, Clone)]
pub struct Composition {
    pub abundances: Abundances,
    pub mmw: Vec<f64>,
}

#[derive(Debug, Clone)]
struct Species {
    opacity_name: String,
    param_name: String,
    molar_mass: f64,
}

#[derive(Debug, Clone)]
pub struct ChemistryModel {
    species: Vec<Species>,
    h2_mass: f64,
    he_mass: f64,
    n_layers: usize,
}

/// Abundance parameter for an opacity species: `logX_<root>`, or
/// `logX_<root>_36` for the isotopologue tagged `_36`.
pub fn abundance_param_name(species: &str) -> String {
    let root = species.split('_').next().unwrap_or(species);
    if species.split('_').any(|p| p == "36") {
        format!("logX_{root}_36")
    } else {
        format!("logX_{root}")
    }
}

impl ChemistryModel {
    /// `line_species` may contain duplicates (several instruments share
    /// species); each opacity species is kept once, in first-seen order.
    pub fn new(line_species: &[String], n_layers: usize) -> Result<Self, AppError> {
        let mut species: Vec<Species> = Vec::new();
        for name in line_species {
            if species.iter().any(|s| &s.opacity_name == name) {
                continue;
            }
            species.push(Species {
                opacity_name: name.clone(),
                param_name: abundance_param_name(name),
                molar_mass: molar_mass(name)?,
            });
        }
        Ok(Self {
            species,
            h2_mass: molar_mass("H2")?,
            he_mass: molar_mass("He")?,
            n_layers,
        })
    }

    /// Distinct abundance parameter names, in species order.
    pub fn param_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for s in &self.species {
            if !names.contains(&s.param_name) {
                names.push(s.param_name.clone());
            }
        }
        names
    }

    pub fn opacity_species(&self) -> Vec<String> {
        self.species.iter().map(|s| s.opacity_name.clone()).collect()
    }

    /// Mass fractions from `10^logX`, filler H2/He closing the sum to 1, and
    /// the mean molecular weight per layer.
    pub fn evaluate(&self, params: &ParamSnapshot<'_>) -> Result<Composition, AppError> {
        let mut fractions: Vec<(String, f64, f64)> = Vec::with_capacity(self.species.len() + 2);
        for s in &self.species {
            let x = 10f64.powf(params.value(&s.param_name)?);
            fractions.push((s.opacity_name.clone(), x, s.molar_mass));
        }

        let metals: f64 = fractions.iter().map(|(_, x, _)| x).sum();
        // More than unit mass in trace species is non-physical; the filler is
        // clipped at zero rather than going negative.
        let filler = (1.0 - metals).max(0.0);
        let h2_weight = self.h2_mass * H2_NUMBER_FRACTION;
        let he_weight = self.he_mass * HE_NUMBER_FRACTION;
        let total_weight = h2_weight + he_weight;
        fractions.push(("H2".to_string(), h2_weight / total_weight * filler, self.h2_mass));
        fractions.push(("He".to_string(), he_weight / total_weight * filler, self.he_mass));

        let inverse_mmw: f64 = fractions.iter().map(|(_, x, m)| x / m).sum();
        let mmw = 1.0 / (f64::MIN_POSITIVE + inverse_mmw);

        let abundances = fractions
            .into_iter()
            .map(|(name, x, _)| (name, vec![x; self.n_layers]))
            .collect();

        Ok(Composition {
            abundances,
            mmw: vec![mmw; self.n_layers],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParameterStore;
    use proptest::prelude::*;

    fn species(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn store_for(model: &ChemistryModel) -> ParameterStore {
        let mut store = ParameterStore::new();
        for name in model.param_names() {
            store.add(name, None, (-12.0, -2.0), true).unwrap();
        }
        store
    }

    #[test]
    fn isotopologue_gets_its_own_parameter() {
        assert_eq!(abundance_param_name("CO_main_iso"), "logX_CO");
        assert_eq!(abundance_param_name("CO_36"), "logX_CO_36");
        assert_eq!(abundance_param_name("CO_36_high"), "logX_CO_36");
        assert_eq!(abundance_param_name("Na"), "logX_Na");
    }

    #[test]
    fn duplicate_species_are_registered_once() {
        let model = ChemistryModel::new(&species(&["H2O", "CO", "H2O", "CO_36"]), 10).unwrap();
        assert_eq!(model.param_names(), vec!["logX_H2O", "logX_CO", "logX_CO_36"]);
    }

    #[test]
    fn pure_filler_has_solar_like_mmw() {
        let model = ChemistryModel::new(&species(&["H2O"]), 3).unwrap();
        let store = store_for(&model);
        let snap = store.snapshot(&[-300.0]).unwrap();
        let comp = model.evaluate(&snap).unwrap();
        // 1 / (X_H2/2 + X_He/4) with the 0.84:0.16 number ratio is 2.32.
        assert!((comp.mmw[0] - 2.32).abs() < 1e-9);
        assert_eq!(comp.mmw.len(), 3);
    }

    #[test]
    fn empty_atmosphere_does_not_divide_by_zero() {
        let model = ChemistryModel::new(&species(&["H2O"]), 2).unwrap();
        let store = store_for(&model);
        // 10^0 = 1: all mass in water, filler clipped to zero.
        let snap = store.snapshot(&[0.0]).unwrap();
        let comp = model.evaluate(&snap).unwrap();
        assert!((comp.mmw[0] - 18.0).abs() < 1e-9);
        assert_eq!(comp.abundances["H2"][0], 0.0);
    }

    proptest! {
        #[test]
        fn mass_fractions_sum_to_one(
            logx in prop::collection::vec(-12.0f64..-2.0, 4),
        ) {
            let model = ChemistryModel::new(&species(&["H2O", "CO", "CO_36", "CH4"]), 5).unwrap();
            let store = store_for(&model);
            let snap = store.snapshot(&logx).unwrap();
            let comp = model.evaluate(&snap).unwrap();
            for layer in 0..5 {
                let total: f64 = comp.abundances.values().map(|v| v[layer]).sum();
                prop_assert!((total - 1.0).abs() < 1e-12);
            }
        }
    }
}
