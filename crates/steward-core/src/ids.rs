//! Device and feature identifiers
//!
//! Both are validated slugs. The double-underscore restriction is what makes
//! the canonical object id a reversible join of its parts, so it is enforced
//! here rather than at the join site.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for invalid device/feature identifiers
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IdError {
    #[error("identifier cannot be empty")]
    Empty,

    #[error(
        "identifier contains invalid characters (must be lowercase alphanumeric with underscores, cannot start/end with underscore or contain double underscores)"
    )]
    InvalidChars,
}

/// Check a component slug: lowercase alphanumeric plus underscore, no
/// leading/trailing underscore and no double underscore.
pub(crate) fn is_valid_component_slug(s: &str) -> bool {
    if s.is_empty() || s.starts_with('_') || s.ends_with('_') || s.contains("__") {
        return false;
    }
    s.chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Normalize free-form text into a component slug.
///
/// Lowercases, maps every run of non-alphanumeric characters to a single
/// underscore and trims underscores from both ends. Returns an empty string
/// when the input contains no alphanumeric characters at all.
pub fn slugify(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_was_sep = true;
    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            last_was_sep = false;
        } else if !last_was_sep {
            out.push('_');
            last_was_sep = true;
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

/// Identifier of a physical device discovered by the host
///
/// Device ids are opaque to the host but must be valid component slugs here
/// so they can participate in canonical object ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceId(String);

impl DeviceId {
    /// Create a device id from an already-valid slug
    pub fn new(id: impl Into<String>) -> Result<Self, IdError> {
        let id = id.into();
        if id.is_empty() {
            return Err(IdError::Empty);
        }
        if !is_valid_component_slug(&id) {
            return Err(IdError::InvalidChars);
        }
        Ok(Self(id))
    }

    /// Get the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for DeviceId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for DeviceId {
    type Error = IdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<DeviceId> for String {
    fn from(id: DeviceId) -> String {
        id.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a feature registered with the engine
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FeatureId(String);

impl FeatureId {
    /// Create a feature id from an already-valid slug
    pub fn new(id: impl Into<String>) -> Result<Self, IdError> {
        let id = id.into();
        if id.is_empty() {
            return Err(IdError::Empty);
        }
        if !is_valid_component_slug(&id) {
            return Err(IdError::InvalidChars);
        }
        Ok(Self(id))
    }

    /// Get the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for FeatureId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for FeatureId {
    type Error = IdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<FeatureId> for String {
    fn from(id: FeatureId) -> String {
        id.0
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_ids() {
        let device = DeviceId::new("vent_42").unwrap();
        assert_eq!(device.as_str(), "vent_42");
        assert_eq!(device.to_string(), "vent_42");

        let feature: FeatureId = "humidity_control".parse().unwrap();
        assert_eq!(feature.as_str(), "humidity_control");
    }

    #[test]
    fn test_empty_rejected() {
        assert_eq!(DeviceId::new("").unwrap_err(), IdError::Empty);
        assert_eq!(FeatureId::new("").unwrap_err(), IdError::Empty);
    }

    #[test]
    fn test_invalid_chars_rejected() {
        for bad in ["Vent", "vent-42", "vent 42", "_vent", "vent_", "ve__nt"] {
            assert_eq!(DeviceId::new(bad).unwrap_err(), IdError::InvalidChars, "{bad}");
            assert_eq!(FeatureId::new(bad).unwrap_err(), IdError::InvalidChars, "{bad}");
        }
    }

    #[test]
    fn test_serde_roundtrip() {
        let id = DeviceId::new("attic_unit").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"attic_unit\"");
        let parsed: DeviceId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);

        assert!(serde_json::from_str::<FeatureId>("\"UPPER\"").is_err());
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Vent 42"), "vent_42");
        assert_eq!(slugify("  CVE--Unit (attic)  "), "cve_unit_attic");
        assert_eq!(slugify("already_fine"), "already_fine");
        assert_eq!(slugify("***"), "");
        assert!(is_valid_component_slug(&slugify("Vent 42")));
    }
}
