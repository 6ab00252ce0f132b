//! fxstream Common Types
//!
//! Shared types used across the fxstream workspace: currency codes, rate
//! pairs, rate updates and streaming session identifiers.

pub mod currency;
pub mod identifiers;

pub use currency::*;
pub use identifiers::*;
