//! # Flag Rules
//!
//! The flag vocabulary the delivery engine reasons over: flag identifiers and
//! values, bundles of resolved flags, criteria and condition sets, and the
//! registry that knows each flag's value type and symbol domain.
//! This crate holds no selection logic; `delivery_core` consumes it.

pub mod criteria;
pub mod flags;
pub mod registry;

pub use criteria::*;
pub use flags::*;
pub use registry::*;
