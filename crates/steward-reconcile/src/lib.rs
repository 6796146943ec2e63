//! Desired-vs-actual reconciliation against the host registry.
//!
//! [`reconcile`] derives what has to change as a pure function of the
//! object catalog and a registry snapshot. [`Reconciler`] applies a
//! delta: removals first, then creations, each item attempted
//! independently so one failure never blocks the rest of the pass.

mod delta;
mod reconciler;

pub use delta::{reconcile, ReconciliationDelta};
pub use reconciler::{
    ItemError, ItemOperation, ReconcileError, ReconciliationSummary, Reconciler,
};
