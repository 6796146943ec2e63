//! Core types for steward
//!
//! This crate provides the fundamental types used throughout the steward
//! extension engine: identifiers for devices, features and managed objects,
//! the canonical-id derivation, the `ManagedObject` value type and the
//! `ObjectState`/`StateChange` pair carried by the host boundary.

mod context;
mod ids;
mod object;
mod object_id;
mod state;

pub use context::ChangeContext;
pub use ids::{slugify, DeviceId, FeatureId, IdError};
pub use object::ManagedObject;
pub use object_id::{canonical_object_id, ObjectId, ObjectIdError, ObjectKind};
pub use state::{ObjectState, StateChange};

/// State value for a switch or binary sensor that is on
pub const STATE_ON: &str = "on";

/// State value for a switch or binary sensor that is off
pub const STATE_OFF: &str = "off";

/// State value used before an object has reported anything
pub const STATE_UNKNOWN: &str = "unknown";

/// State value used when an object's backing device is unreachable
pub const STATE_UNAVAILABLE: &str = "unavailable";
