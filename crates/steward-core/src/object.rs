//! ManagedObject: one registry entry this system is responsible for

use serde::{Deserialize, Serialize};

use crate::{canonical_object_id, DeviceId, FeatureId, ObjectId, ObjectIdError, ObjectKind};

/// A managed object: one entry the engine wants to exist (or not exist) in
/// the host registry.
///
/// Constructed fresh on every catalog build and never mutated in place; the
/// canonical id is computed once at construction and recomputable from the
/// other fields at any time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagedObject {
    object_id: ObjectId,

    /// Object kind (switch, sensor, ...)
    pub kind: ObjectKind,

    /// Feature that declared this object
    pub feature: FeatureId,

    /// Device the object belongs to
    pub device: DeviceId,

    /// Declaration key, unique within the feature
    pub key: String,

    /// Rendered display name
    pub friendly_name: String,

    /// Unit of measurement, for sensors and numbers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,

    /// Allowed options, for selects
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub select_options: Vec<String>,

    /// State written when the object is first created
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial: Option<String>,

    /// Whether the object should currently exist in the registry
    pub should_exist: bool,
}

impl ManagedObject {
    /// Create a managed object; fails if `key` is not a valid component slug.
    ///
    /// Defaults: no unit, no options, no initial state, `should_exist = true`
    /// and a friendly name equal to the key.
    pub fn new(
        kind: ObjectKind,
        feature: FeatureId,
        device: DeviceId,
        key: impl Into<String>,
    ) -> Result<Self, ObjectIdError> {
        let key = key.into();
        let object_id = canonical_object_id(kind, &feature, &device, &key)?;
        Ok(Self {
            object_id,
            kind,
            feature,
            device,
            friendly_name: key.clone(),
            key,
            unit: None,
            select_options: Vec::new(),
            initial: None,
            should_exist: true,
        })
    }

    /// Set the rendered display name
    pub fn with_friendly_name(mut self, name: impl Into<String>) -> Self {
        self.friendly_name = name.into();
        self
    }

    /// Set the unit of measurement
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Set the allowed select options
    pub fn with_select_options(mut self, options: Vec<String>) -> Self {
        self.select_options = options;
        self
    }

    /// Set the initial state written at creation
    pub fn with_initial(mut self, state: impl Into<String>) -> Self {
        self.initial = Some(state.into());
        self
    }

    /// Set whether the object should exist
    pub fn with_should_exist(mut self, should_exist: bool) -> Self {
        self.should_exist = should_exist;
        self
    }

    /// The canonical id, computed at construction
    pub fn object_id(&self) -> &ObjectId {
        &self.object_id
    }
}
