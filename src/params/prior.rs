//! Unit-hypercube → physical parameter transform.
//!
//! Each free parameter is rescaled linearly onto its prior bounds. Layered
//! chains (temperature knots ordered by depth) are then rewritten as a running
//! product: the head keeps its rescaled value and every later element becomes
//! `previous * fraction`, where `fraction` is that element's rescaled value.
//! With fractions drawn from `(0, 1)` the chain is strictly decreasing by
//! construction.

use crate::error::AppError;
use crate::params::store::{Layer, ParameterStore, Prior};

#[derive(Debug, Clone)]
struct Chain {
    head: usize,
    fractions: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct PriorTransform {
    priors: Vec<Prior>,
    chains: Vec<Chain>,
}

impl PriorTransform {
    /// Capture the free-parameter priors and layered chains from the store.
    pub fn from_store(store: &ParameterStore) -> Result<Self, AppError> {
        let mut priors = Vec::new();
        let mut chain_names: Vec<String> = Vec::new();
        let mut chains: Vec<Chain> = Vec::new();

        for (i, param) in store.free().enumerate() {
            priors.push(param.prior);
            match &param.layer {
                None => {}
                Some(Layer::Head { chain }) => {
                    if chain_names.contains(chain) {
                        return Err(AppError::internal(format!(
                            "Layered chain '{chain}' has more than one head."
                        )));
                    }
                    chain_names.push(chain.clone());
                    chains.push(Chain {
                        head: i,
                        fractions: Vec::new(),
                    });
                }
                Some(Layer::Fraction { chain }) => {
                    let pos = chain_names.iter().position(|c| c == chain).ok_or_else(|| {
                        AppError::internal(format!(
                            "Parameter '{}' follows chain '{chain}' before its head.",
                            param.name
                        ))
                    })?;
                    chains[pos].fractions.push(i);
                }
            }
        }

        Ok(Self { priors, chains })
    }

    pub fn n_dims(&self) -> usize {
        self.priors.len()
    }

    /// Transform `cube` in place.
    pub fn apply(&self, cube: &mut [f64]) -> Result<(), AppError> {
        if cube.len() != self.priors.len() {
            return Err(AppError::internal(format!(
                "Prior transform expects {} dimensions, got {}.",
                self.priors.len(),
                cube.len()
            )));
        }

        for (u, prior) in cube.iter_mut().zip(&self.priors) {
            *u = prior.rescale(*u);
        }

        for chain in &self.chains {
            let mut running = cube[chain.head];
            for &k in &chain.fractions {
                running *= cube[k];
                cube[k] = running;
            }
        }
        Ok(())
    }
}
