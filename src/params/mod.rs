//! Parameter bookkeeping: registration, snapshots, and the prior transform.

pub mod prior;
pub mod store;

pub use prior::*;
pub use store::*;
