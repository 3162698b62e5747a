//! `hires-retrieval` library crate.
//!
//! The binary (`retrieve`) is a thin wrapper around this library so that:
//!
//! - the forward model and likelihood are testable without spawning processes
//! - radiative-transfer engines and samplers can be swapped through traits
//! - code stays easy to navigate as the model grows

pub mod app;
pub mod cli;
pub mod domain;
pub mod engine;
pub mod error;
pub mod io;
pub mod likelihood;
pub mod math;
pub mod models;
pub mod params;
pub mod report;
pub mod retrieval;
pub mod sampler;
pub mod spectral;
