//! Formatted terminal output.
//!
//! Formatting stays here so the numeric modules never print.

pub mod format;

pub use format::*;
