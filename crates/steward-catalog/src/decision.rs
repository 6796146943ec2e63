use std::collections::HashMap;

use chrono::{DateTime, Utc};
use steward_core::{DeviceId, ObjectId, ObjectState};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecisionError {
    #[error("role not available: {0}")]
    MissingRole(String),

    #[error("decision failed: {0}")]
    Failed(String),
}

/// Immutable inputs for one decision invocation.
///
/// Holds the values of every resolved role of one device, captured at
/// `observed_at`. A role is present even when its object currently has
/// no state; the typed getters then return `None`.
#[derive(Debug, Clone)]
pub struct DecisionContext {
    device: DeviceId,
    roles: HashMap<String, RoleValue>,
    observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct RoleValue {
    object_id: ObjectId,
    state: Option<ObjectState>,
}

impl DecisionContext {
    pub fn new(device: DeviceId) -> Self {
        Self {
            device,
            roles: HashMap::new(),
            observed_at: Utc::now(),
        }
    }

    pub fn with_role(
        mut self,
        role: impl Into<String>,
        object_id: ObjectId,
        state: Option<ObjectState>,
    ) -> Self {
        self.roles.insert(role.into(), RoleValue { object_id, state });
        self
    }

    pub fn device(&self) -> &DeviceId {
        &self.device
    }

    pub fn observed_at(&self) -> DateTime<Utc> {
        self.observed_at
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains_key(role)
    }

    /// Object id bound to a role, or an error naming the missing role.
    pub fn object_id(&self, role: &str) -> Result<&ObjectId, DecisionError> {
        self.roles
            .get(role)
            .map(|value| &value.object_id)
            .ok_or_else(|| DecisionError::MissingRole(role.to_string()))
    }

    pub fn state(&self, role: &str) -> Option<&ObjectState> {
        self.roles.get(role).and_then(|value| value.state.as_ref())
    }

    /// Raw state value of a role, if the object has a usable one.
    pub fn value(&self, role: &str) -> Option<&str> {
        self.state(role)
            .filter(|state| !state.is_unknown() && !state.is_unavailable())
            .map(|state| state.state.as_str())
    }

    /// State parsed as a number. Unknown and unavailable parse as `None`.
    pub fn number(&self, role: &str) -> Option<f64> {
        self.state(role).and_then(|state| state.number())
    }

    pub fn is_on(&self, role: &str) -> bool {
        self.state(role).map(|state| state.is_on()).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use steward_core::{canonical_object_id, ObjectKind};

    use super::*;

    fn ctx() -> DecisionContext {
        let device: DeviceId = "vent_42".parse().unwrap();
        let feature = "humidity_control".parse().unwrap();
        let master =
            canonical_object_id(ObjectKind::Switch, &feature, &device, "humidity_control").unwrap();
        let humidity =
            canonical_object_id(ObjectKind::Sensor, &feature, &device, "indoor_humidity").unwrap();
        let broken =
            canonical_object_id(ObjectKind::Sensor, &feature, &device, "broken").unwrap();

        DecisionContext::new(device)
            .with_role(
                "master",
                master.clone(),
                Some(ObjectState::new(master, "on", HashMap::new())),
            )
            .with_role(
                "humidity",
                humidity.clone(),
                Some(ObjectState::new(humidity, "71.5", HashMap::new())),
            )
            .with_role(
                "broken",
                broken.clone(),
                Some(ObjectState::new(broken, "unavailable", HashMap::new())),
            )
    }

    #[test]
    fn typed_getters() {
        let ctx = ctx();
        assert!(ctx.is_on("master"));
        assert_eq!(ctx.number("humidity"), Some(71.5));
        assert_eq!(ctx.value("humidity"), Some("71.5"));
        assert!(ctx.has_role("broken"));
        assert_eq!(ctx.value("broken"), None);
        assert_eq!(ctx.number("broken"), None);
    }

    #[test]
    fn missing_role_is_an_error_for_object_id() {
        let ctx = ctx();
        assert!(ctx.object_id("master").is_ok());
        assert_eq!(
            ctx.object_id("nope").unwrap_err(),
            DecisionError::MissingRole("nope".to_string())
        );
        assert!(!ctx.is_on("nope"));
        assert_eq!(ctx.number("nope"), None);
    }
}
