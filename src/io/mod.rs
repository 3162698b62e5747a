//! Input/output helpers.
//!
//! - run-file loading + environment overrides (`config`)
//! - observation CSV ingest (`observation`)
//! - telluric grid directory (`telluric`)
//! - posterior summary JSON read/write (`summary`)
//! - sample and best-fit exports (`export`)

pub mod config;
pub mod export;
pub mod observation;
pub mod summary;
pub mod telluric;

pub use config::*;
pub use export::*;
pub use observation::*;
pub use summary::*;
pub use telluric::*;
