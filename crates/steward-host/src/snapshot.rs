use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use steward_core::{DeviceId, FeatureId, ManagedObject, ObjectId, ObjectKind};

/// A registered object as the host knows it.
///
/// Entries created through steward carry the owning feature and device;
/// entries registered by other integrations have neither and are never
/// touched by reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub object_id: ObjectId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature: Option<FeatureId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceId>,
    pub friendly_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub select_options: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl RegistryEntry {
    pub fn from_object(object: &ManagedObject) -> Self {
        Self {
            object_id: object.object_id().clone(),
            feature: Some(object.feature.clone()),
            device: Some(object.device.clone()),
            friendly_name: object.friendly_name.clone(),
            unit: object.unit.clone(),
            select_options: object.select_options.clone(),
            created_at: Utc::now(),
        }
    }

    /// An entry registered outside steward, with no ownership marker.
    pub fn foreign(object_id: ObjectId, friendly_name: impl Into<String>) -> Self {
        Self {
            object_id,
            feature: None,
            device: None,
            friendly_name: friendly_name.into(),
            unit: None,
            select_options: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Whether steward owns this entry.
    pub fn is_owned(&self) -> bool {
        self.feature.is_some()
    }
}

/// Point-in-time listing of registry entries, ordered by object id.
#[derive(Debug, Clone)]
pub struct RegistrySnapshot {
    pub taken_at: DateTime<Utc>,
    entries: IndexMap<ObjectId, RegistryEntry>,
}

impl RegistrySnapshot {
    pub fn from_entries(mut entries: Vec<RegistryEntry>) -> Self {
        entries.sort_by(|a, b| a.object_id.cmp(&b.object_id));
        Self {
            taken_at: Utc::now(),
            entries: entries
                .into_iter()
                .map(|entry| (entry.object_id.clone(), entry))
                .collect(),
        }
    }

    pub fn empty() -> Self {
        Self {
            taken_at: Utc::now(),
            entries: IndexMap::new(),
        }
    }

    pub fn contains(&self, object_id: &ObjectId) -> bool {
        self.entries.contains_key(object_id)
    }

    pub fn get(&self, object_id: &ObjectId) -> Option<&RegistryEntry> {
        self.entries.get(object_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegistryEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Narrowing criteria for [`Registry::list_objects`].
///
/// [`Registry::list_objects`]: crate::Registry::list_objects
#[derive(Debug, Clone, Default)]
pub struct RegistryFilter {
    pub feature: Option<FeatureId>,
    pub device: Option<DeviceId>,
    pub kind: Option<ObjectKind>,
    /// Only entries carrying an ownership marker.
    pub owned_only: bool,
}

impl RegistryFilter {
    /// Match every entry.
    pub fn all() -> Self {
        Self::default()
    }

    /// Match entries owned by steward, any feature.
    pub fn owned() -> Self {
        Self {
            owned_only: true,
            ..Self::default()
        }
    }

    pub fn with_feature(mut self, feature: FeatureId) -> Self {
        self.feature = Some(feature);
        self
    }

    pub fn with_device(mut self, device: DeviceId) -> Self {
        self.device = Some(device);
        self
    }

    pub fn with_kind(mut self, kind: ObjectKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn matches(&self, entry: &RegistryEntry) -> bool {
        if self.owned_only && !entry.is_owned() {
            return false;
        }
        if let Some(feature) = &self.feature {
            if entry.feature.as_ref() != Some(feature) {
                return false;
            }
        }
        if let Some(device) = &self.device {
            if entry.device.as_ref() != Some(device) {
                return false;
            }
        }
        if let Some(kind) = self.kind {
            if entry.object_id.kind() != kind {
                return false;
            }
        }
        true
    }
}
