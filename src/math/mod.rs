//! Numerical utilities shared by the forward model.

pub mod chebyshev;
pub mod convolve;
pub mod grid;
pub mod interp;
pub mod rebin;
pub mod smooth;

pub use chebyshev::*;
pub use convolve::*;
pub use grid::*;
pub use interp::*;
pub use rebin::*;
pub use smooth::*;
