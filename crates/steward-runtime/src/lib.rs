//! Orchestration facade.
//!
//! [`Steward`] owns the feature registry, the reconciler and the
//! dispatch engine, and keeps the three in step: every change to the
//! device set or the feature toggles rebuilds the desired catalog, runs
//! a reconciliation pass and swaps the engine's watch plan.

mod config;
mod steward;

pub use config::StewardConfig;
pub use steward::{Steward, StewardBuilder, StewardError};
