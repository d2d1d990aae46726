//! bg-core: stable foundation for the bond-graph engine.
//!
//! Contains:
//! - ids (compact ids for components and bonds, scope ids for graphs)
//! - rational (exact rational arithmetic used by symbolic elimination)
//! - error (`BgError`, the error every crate converts into)

pub mod error;
pub mod ids;
pub mod rational;

pub use error::{BgError, BgResult};
pub use ids::*;
pub use rational::Rational;
