//! Physical sub-models feeding the radiative transfer and the spectral pipeline.
//!
//! Each model is a pure function of a parameter snapshot plus immutable setup
//! state, so the forward model can be evaluated concurrently.

pub mod chemistry;
pub mod elements;
pub mod telluric;
pub mod temperature;

pub use chemistry::*;
pub use elements::*;
pub use telluric::*;
pub use temperature::*;
