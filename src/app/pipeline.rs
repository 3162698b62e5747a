//! Shared setup used by every subcommand:
//! run file -> observations -> engines -> configured [`Retrieval`].

use std::path::Path;

use crate::domain::RetrievalConfig;
use crate::engine::{GreyAtmosphere, RadiativeTransferFactory};
use crate::error::AppError;
use crate::io::{load_config, load_observation};
use crate::retrieval::{InstrumentData, Retrieval};

pub fn load_instruments(config: &RetrievalConfig) -> Result<Vec<InstrumentData>, AppError> {
    config
        .instruments
        .iter()
        .map(|inst| {
            let observation = load_observation(&inst.data)?;
            tracing::info!(
                instrument = %inst.name,
                chips = observation.n_chips(),
                path = %inst.data.display(),
                "observation loaded"
            );
            Ok(InstrumentData {
                name: inst.name.clone(),
                observation,
                detector_bin: inst.detector_bin(),
            })
        })
        .collect()
}

/// Configured retrieval from an already-parsed run file.
pub fn prepare_with(config: &RetrievalConfig, factory: &dyn RadiativeTransferFactory) -> Result<Retrieval, AppError> {
    let instruments = load_instruments(config)?;
    let mut retrieval = Retrieval::new(config.name.clone(), config.out_dir.clone());
    retrieval.setup(config, instruments, factory)?;
    Ok(retrieval)
}

/// Load the run file and set up a retrieval on the grey-atmosphere engine.
pub fn prepare(path: &Path, out_dir: Option<&Path>) -> Result<(RetrievalConfig, Retrieval), AppError> {
    let mut config = load_config(path)?;
    if let Some(dir) = out_dir {
        config.out_dir = dir.to_path_buf();
    }
    let factory = GreyAtmosphere::new(config.engine.clone());
    let retrieval = prepare_with(&config, &factory)?;
    Ok((config, retrieval))
}
