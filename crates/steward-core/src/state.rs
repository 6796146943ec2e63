//! Object state and change notifications

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ChangeContext, DeviceId, ObjectId, STATE_OFF, STATE_ON, STATE_UNAVAILABLE, STATE_UNKNOWN};

/// The state of one registry object at a point in time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectState {
    /// The object this state belongs to
    pub object_id: ObjectId,

    /// The state value (e.g. "on", "42.5", "auto")
    pub state: String,

    /// Additional attributes associated with the state
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,

    /// When the state value last changed
    pub last_changed: DateTime<Utc>,

    /// When the state was last written, even if the value was unchanged
    pub last_updated: DateTime<Utc>,
}

impl ObjectState {
    /// Create a new state with the current timestamp
    pub fn new(
        object_id: ObjectId,
        state: impl Into<String>,
        attributes: HashMap<String, serde_json::Value>,
    ) -> Self {
        let now = Utc::now();
        Self {
            object_id,
            state: state.into(),
            attributes,
            last_changed: now,
            last_updated: now,
        }
    }

    /// Create an updated state, preserving `last_changed` when the value is
    /// the same as before.
    pub fn with_update(
        &self,
        new_state: impl Into<String>,
        new_attributes: HashMap<String, serde_json::Value>,
    ) -> Self {
        let now = Utc::now();
        let new_state = new_state.into();
        let changed = self.state != new_state;

        Self {
            object_id: self.object_id.clone(),
            state: new_state,
            attributes: new_attributes,
            last_changed: if changed { now } else { self.last_changed },
            last_updated: now,
        }
    }

    /// Whether the state is the literal "on"
    pub fn is_on(&self) -> bool {
        self.state == STATE_ON
    }

    /// Whether the state is the literal "off"
    pub fn is_off(&self) -> bool {
        self.state == STATE_OFF
    }

    /// Whether the object has not reported a value yet
    pub fn is_unknown(&self) -> bool {
        self.state == STATE_UNKNOWN
    }

    /// Whether the object's backing device is unreachable
    pub fn is_unavailable(&self) -> bool {
        self.state == STATE_UNAVAILABLE
    }

    /// Parse the state value as a number, if it is one
    pub fn number(&self) -> Option<f64> {
        self.state.trim().parse().ok()
    }

    /// Get an attribute value by key
    pub fn attribute<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.attributes
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

impl PartialEq for ObjectState {
    fn eq(&self, other: &Self) -> bool {
        // Timestamps are not compared; two states are equal when they describe
        // the same object, value and attributes.
        self.object_id == other.object_id
            && self.state == other.state
            && self.attributes == other.attributes
    }
}

/// Notification of one object's state changing, as delivered by the host
///
/// `new = None` means the object was removed from the registry;
/// `old = None` means it had no state before this write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateChange {
    /// The object that changed
    pub object_id: ObjectId,

    /// The owning device, when the registry knows it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceId>,

    /// State before the change
    pub old: Option<ObjectState>,

    /// State after the change
    pub new: Option<ObjectState>,

    /// Context of the write that produced this change
    pub context: ChangeContext,

    /// When the change was observed
    pub occurred_at: DateTime<Utc>,
}

impl StateChange {
    /// Whether this change removed the object
    pub fn is_removal(&self) -> bool {
        self.new.is_none()
    }

    /// The state value after the change, if the object still exists
    pub fn new_value(&self) -> Option<&str> {
        self.new.as_ref().map(|s| s.state.as_str())
    }

    /// The state value before the change, if there was one
    pub fn old_value(&self) -> Option<&str> {
        self.old.as_ref().map(|s| s.state.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ObjectKind;
    use serde_json::json;

    fn sample_id() -> ObjectId {
        ObjectId::new(ObjectKind::Sensor, "vent__base__indoor_humidity").unwrap()
    }

    #[test]
    fn test_update_preserves_last_changed_for_same_value() {
        let first = ObjectState::new(sample_id(), "61.0", HashMap::new());
        let second = first.with_update("61.0", HashMap::new());
        assert_eq!(first.last_changed, second.last_changed);
        assert!(second.last_updated >= first.last_updated);

        let third = second.with_update("62.5", HashMap::new());
        assert!(third.last_changed >= second.last_changed);
        assert_ne!(third.state, second.state);
    }

    #[test]
    fn test_number_parsing() {
        let state = ObjectState::new(sample_id(), " 15.5 ", HashMap::new());
        assert_eq!(state.number(), Some(15.5));

        let state = ObjectState::new(sample_id(), "unknown", HashMap::new());
        assert_eq!(state.number(), None);
        assert!(state.is_unknown());
    }

    #[test]
    fn test_on_off() {
        let on = ObjectState::new(sample_id(), "on", HashMap::new());
        assert!(on.is_on() && !on.is_off());
        let off = on.with_update("off", HashMap::new());
        assert!(off.is_off() && !off.is_on());
    }

    #[test]
    fn test_eq_ignores_timestamps() {
        let a = ObjectState::new(sample_id(), "on", HashMap::new());
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = ObjectState::new(sample_id(), "on", HashMap::new());
        assert_eq!(a, b);
    }

    #[test]
    fn test_attribute_lookup() {
        let attrs = HashMap::from([("unit".to_string(), json!("%"))]);
        let state = ObjectState::new(sample_id(), "55", attrs);
        assert_eq!(state.attribute::<String>("unit").as_deref(), Some("%"));
        assert_eq!(state.attribute::<String>("missing"), None);
    }

    #[test]
    fn test_removal_change() {
        let old = ObjectState::new(sample_id(), "on", HashMap::new());
        let change = StateChange {
            object_id: sample_id(),
            device: None,
            old: Some(old),
            new: None,
            context: ChangeContext::new(),
            occurred_at: Utc::now(),
        };
        assert!(change.is_removal());
        assert_eq!(change.old_value(), Some("on"));
        assert_eq!(change.new_value(), None);
    }
}
