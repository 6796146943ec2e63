//! Feature contract and desired-object catalog.
//!
//! A [`Feature`] declares the objects it owns per device, the state
//! changes it wants to be woken for, and the decision logic to run once
//! those changes settle. [`ObjectCatalog::build`] expands every
//! registered feature's declarations across the discovered devices into
//! the full desired set, which the reconciliation engine then diffs
//! against the host registry.

mod catalog;
mod decision;
mod feature;

pub use catalog::{CatalogBuild, CatalogIssue, ObjectCatalog};
pub use decision::{DecisionContext, DecisionError};
pub use feature::{
    Action, CatalogError, EdgeTrigger, Feature, FeatureRegistry, ObjectDeclaration, TriggerPattern,
};
