//! Canonical object identifiers
//!
//! An [`ObjectId`] names one managed object in the host registry as
//! `kind.slug`, e.g. `sensor.vent_42__humidity_control__max_humidity`.
//! The slug is derived deterministically from the owning device, feature and
//! declaration key by [`canonical_object_id`]; recomputing it from the same
//! inputs always yields the same value.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::ids::{is_valid_component_slug, DeviceId, FeatureId};

/// Error type for invalid object ids
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ObjectIdError {
    #[error("object id must contain exactly one '.' separator")]
    InvalidFormat,

    #[error("unknown object kind: {0}")]
    UnknownKind(String),

    #[error(
        "object slug contains invalid characters (must be lowercase alphanumeric with underscores, cannot start or end with underscore)"
    )]
    InvalidSlug,

    #[error("declaration key is not a valid slug: {0}")]
    InvalidKey(String),
}

/// The kind of a managed object, doubling as the id prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Switch,
    Sensor,
    BinarySensor,
    Number,
    Select,
}

impl ObjectKind {
    /// Stable wire name, also used as the object id prefix
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Switch => "switch",
            ObjectKind::Sensor => "sensor",
            ObjectKind::BinarySensor => "binary_sensor",
            ObjectKind::Number => "number",
            ObjectKind::Select => "select",
        }
    }
}

impl FromStr for ObjectKind {
    type Err = ObjectIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "switch" => Ok(ObjectKind::Switch),
            "sensor" => Ok(ObjectKind::Sensor),
            "binary_sensor" => Ok(ObjectKind::BinarySensor),
            "number" => Ok(ObjectKind::Number),
            "select" => Ok(ObjectKind::Select),
            other => Err(ObjectIdError::UnknownKind(other.to_string())),
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of one object in the host registry (`kind.slug`)
///
/// The slug allows interior double underscores (they separate the canonical
/// components) but cannot start or end with an underscore.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectId {
    kind: ObjectKind,
    slug: String,
}

impl ObjectId {
    /// Create an object id from a kind and slug
    pub fn new(kind: ObjectKind, slug: impl Into<String>) -> Result<Self, ObjectIdError> {
        let slug = slug.into();
        if !Self::is_valid_slug(&slug) {
            return Err(ObjectIdError::InvalidSlug);
        }
        Ok(Self { kind, slug })
    }

    /// Get the object kind
    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    /// Get the slug part of the id
    pub fn slug(&self) -> &str {
        &self.slug
    }

    fn is_valid_slug(s: &str) -> bool {
        if s.is_empty() || s.starts_with('_') || s.ends_with('_') {
            return false;
        }
        s.chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    }
}

impl FromStr for ObjectId {
    type Err = ObjectIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() != 2 {
            return Err(ObjectIdError::InvalidFormat);
        }
        let kind: ObjectKind = parts[0].parse()?;
        Self::new(kind, parts[1])
    }
}

impl TryFrom<String> for ObjectId {
    type Error = ObjectIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ObjectId> for String {
    fn from(id: ObjectId) -> String {
        id.to_string()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.kind.as_str(), self.slug)
    }
}

/// Derive the canonical id for a managed object.
///
/// Pure function of its inputs: the slug is `device__feature__key`. Because
/// component slugs cannot contain double underscores, the join is unambiguous
/// and distinct `(kind, feature, device, key)` tuples never collide.
pub fn canonical_object_id(
    kind: ObjectKind,
    feature: &FeatureId,
    device: &DeviceId,
    key: &str,
) -> Result<ObjectId, ObjectIdError> {
    if !is_valid_component_slug(key) {
        return Err(ObjectIdError::InvalidKey(key.to_string()));
    }
    let slug = format!("{}__{}__{}", device.as_str(), feature.as_str(), key);
    Ok(ObjectId { kind, slug })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature(s: &str) -> FeatureId {
        FeatureId::new(s).unwrap()
    }

    fn device(s: &str) -> DeviceId {
        DeviceId::new(s).unwrap()
    }

    #[test]
    fn test_canonical_id_shape() {
        let id = canonical_object_id(
            ObjectKind::Sensor,
            &feature("humidity_control"),
            &device("vent_42"),
            "max_humidity",
        )
        .unwrap();
        assert_eq!(
            id.to_string(),
            "sensor.vent_42__humidity_control__max_humidity"
        );
        assert_eq!(id.kind(), ObjectKind::Sensor);
    }

    #[test]
    fn test_canonical_id_is_deterministic() {
        let a = canonical_object_id(
            ObjectKind::Switch,
            &feature("hum"),
            &device("dev"),
            "master",
        )
        .unwrap();
        let b = canonical_object_id(
            ObjectKind::Switch,
            &feature("hum"),
            &device("dev"),
            "master",
        )
        .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_canonical_id_collision_free() {
        // The underscore-heavy case that a single-underscore join would merge.
        let a = canonical_object_id(
            ObjectKind::Sensor,
            &feature("b_c"),
            &device("a"),
            "d",
        )
        .unwrap();
        let b = canonical_object_id(
            ObjectKind::Sensor,
            &feature("c"),
            &device("a_b"),
            "d",
        )
        .unwrap();
        assert_ne!(a, b);

        // Distinct kinds with otherwise identical components stay distinct.
        let c = canonical_object_id(
            ObjectKind::Number,
            &feature("b_c"),
            &device("a"),
            "d",
        )
        .unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_invalid_key_rejected() {
        let err = canonical_object_id(
            ObjectKind::Sensor,
            &feature("f"),
            &device("d"),
            "Bad Key",
        )
        .unwrap_err();
        assert!(matches!(err, ObjectIdError::InvalidKey(_)));
    }

    #[test]
    fn test_parse_object_id() {
        let id: ObjectId = "binary_sensor.vent__hum__active".parse().unwrap();
        assert_eq!(id.kind(), ObjectKind::BinarySensor);
        assert_eq!(id.slug(), "vent__hum__active");
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert_eq!(
            "no_separator".parse::<ObjectId>().unwrap_err(),
            ObjectIdError::InvalidFormat
        );
        assert_eq!(
            "too.many.parts".parse::<ObjectId>().unwrap_err(),
            ObjectIdError::InvalidFormat
        );
        assert!(matches!(
            "fan.blades".parse::<ObjectId>().unwrap_err(),
            ObjectIdError::UnknownKind(_)
        ));
        assert_eq!(
            "sensor._leading".parse::<ObjectId>().unwrap_err(),
            ObjectIdError::InvalidSlug
        );
    }

    #[test]
    fn test_serde_roundtrip() {
        let id = ObjectId::new(ObjectKind::Select, "vent__base__mode").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"select.vent__base__mode\"");
        let parsed: ObjectId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }
}
