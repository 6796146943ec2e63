use std::collections::BTreeSet;

use indexmap::IndexMap;
use serde::Serialize;
use steward_core::{DeviceId, FeatureId, ManagedObject, ObjectId};
use tracing::warn;

use crate::feature::FeatureRegistry;

/// A problem found while expanding declarations. Issues never abort a
/// build; the offending item is skipped and the rest proceeds.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum CatalogIssue {
    InvalidDeclaration {
        feature: FeatureId,
        device: DeviceId,
        key: String,
        reason: String,
    },
    DuplicateObjectId {
        object_id: ObjectId,
        feature: FeatureId,
        device: DeviceId,
    },
    UnknownToggle {
        toggle: FeatureId,
    },
}

/// The full desired-object set for one point in time.
///
/// Built from scratch on every pass; never patched incrementally.
/// Objects of enabled features carry `should_exist = true`, objects of
/// registered-but-disabled features carry `should_exist = false` so the
/// reconciler can remove their leftovers.
#[derive(Debug, Clone, Default)]
pub struct ObjectCatalog {
    objects: IndexMap<ObjectId, ManagedObject>,
}

pub struct CatalogBuild {
    pub catalog: ObjectCatalog,
    pub issues: Vec<CatalogIssue>,
}

impl ObjectCatalog {
    /// Expand every registered feature's declarations across `devices`.
    ///
    /// Deterministic: features are visited in registration order,
    /// devices in sorted order, declarations in declaration order.
    /// Duplicate ids keep the first object and report the loser.
    pub fn build(
        features: &FeatureRegistry,
        toggles: &BTreeSet<FeatureId>,
        devices: &BTreeSet<DeviceId>,
    ) -> CatalogBuild {
        let enabled = features.enabled(toggles);
        let mut issues: Vec<CatalogIssue> = toggles
            .iter()
            .filter(|toggle| !features.contains(toggle))
            .map(|toggle| CatalogIssue::UnknownToggle {
                toggle: toggle.clone(),
            })
            .collect();

        let mut objects = IndexMap::new();
        for feature in features.iter() {
            let feature_id = feature.id();
            let should_exist = enabled.contains(&feature_id);
            for device in devices {
                for declaration in feature.declarations() {
                    match declaration.instantiate(&feature_id, device, should_exist) {
                        Ok(object) => {
                            let object_id = object.object_id().clone();
                            if objects.contains_key(&object_id) {
                                issues.push(CatalogIssue::DuplicateObjectId {
                                    object_id,
                                    feature: feature_id.clone(),
                                    device: device.clone(),
                                });
                            } else {
                                objects.insert(object_id, object);
                            }
                        }
                        Err(err) => issues.push(CatalogIssue::InvalidDeclaration {
                            feature: feature_id.clone(),
                            device: device.clone(),
                            key: declaration.key.clone(),
                            reason: err.to_string(),
                        }),
                    }
                }
            }
        }

        for issue in &issues {
            warn!(?issue, "catalog build issue");
        }
        CatalogBuild {
            catalog: Self { objects },
            issues,
        }
    }

    pub fn get(&self, object_id: &ObjectId) -> Option<&ManagedObject> {
        self.objects.get(object_id)
    }

    pub fn contains(&self, object_id: &ObjectId) -> bool {
        self.objects.contains_key(object_id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// All objects, in build order.
    pub fn iter(&self) -> impl Iterator<Item = &ManagedObject> {
        self.objects.values()
    }

    /// Objects that should currently exist.
    pub fn desired(&self) -> impl Iterator<Item = &ManagedObject> {
        self.objects.values().filter(|object| object.should_exist)
    }

    /// Devices that have at least one desired object.
    pub fn devices(&self) -> BTreeSet<DeviceId> {
        self.desired().map(|object| object.device.clone()).collect()
    }
}
