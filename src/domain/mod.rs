//! Domain types used throughout the retrieval.
//!
//! This module defines:
//!
//! - the run configuration read from TOML (`RetrievalConfig` and its sections)
//! - the per-instrument observation container (`Observation`)

pub mod observation;
pub mod types;

pub use observation::*;
pub use types::*;
