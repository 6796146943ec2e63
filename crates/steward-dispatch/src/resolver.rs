use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use steward_catalog::{EdgeTrigger, Feature, FeatureRegistry, ObjectCatalog};
use steward_core::{DeviceId, FeatureId, ObjectId};
use tracing::debug;

/// One edge trigger resolved to a concrete object.
#[derive(Debug, Clone)]
pub struct EdgeWatch {
    pub object_id: ObjectId,
    pub edge: EdgeTrigger,
}

/// A fully resolved (feature, device) automation instance.
///
/// Every trigger role is bound to exactly one live object id; the
/// decision context for this binding is assembled from these roles.
#[derive(Clone)]
pub struct AutomationBinding {
    pub feature: Arc<dyn Feature>,
    pub device: DeviceId,
    pub roles: IndexMap<String, ObjectId>,
    pub edges: Vec<EdgeWatch>,
}

impl AutomationBinding {
    /// Whether a change to `object_id` should wake this binding's
    /// debounce window.
    pub fn watches(&self, object_id: &ObjectId) -> bool {
        self.roles.values().any(|id| id == object_id)
    }
}

impl fmt::Debug for AutomationBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutomationBinding")
            .field("feature", &self.feature.id())
            .field("device", &self.device)
            .field("roles", &self.roles)
            .field("edges", &self.edges.len())
            .finish()
    }
}

/// A (feature, device) pair that could not be fully resolved yet.
///
/// Not a failure: the objects may simply not be in the catalog yet.
/// `conflicts` lists roles whose pattern matched more than one object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingBinding {
    pub feature: FeatureId,
    pub device: DeviceId,
    pub missing: Vec<String>,
    pub conflicts: Vec<String>,
}

/// Everything the dispatch engine should watch right now.
#[derive(Debug, Clone, Default)]
pub struct WatchPlan {
    pub bindings: Vec<AutomationBinding>,
    pub pending: Vec<PendingBinding>,
}

impl WatchPlan {
    /// An empty plan signals "retry later," never a hard failure.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn devices(&self) -> BTreeSet<DeviceId> {
        self.bindings
            .iter()
            .map(|binding| binding.device.clone())
            .collect()
    }

    pub fn bindings_for(&self, device: &DeviceId) -> impl Iterator<Item = &AutomationBinding> {
        let device = device.clone();
        self.bindings
            .iter()
            .filter(move |binding| binding.device == device)
    }
}

/// Expand enabled features' trigger patterns against the catalog.
///
/// Per (feature, device) pair: if every role's pattern matches exactly
/// one desired object, the pair becomes a binding; otherwise it is
/// reported pending with the unresolved roles. A wildcard matching
/// several objects of one device is a resolution conflict and defers
/// the binding. The resolver runs once and never loops; callers decide
/// when to retry.
pub fn resolve(
    catalog: &ObjectCatalog,
    features: &FeatureRegistry,
    enabled: &BTreeSet<FeatureId>,
) -> WatchPlan {
    let devices = catalog.devices();
    let mut bindings = Vec::new();
    let mut pending = Vec::new();

    for feature in features.iter() {
        let feature_id = feature.id();
        if !enabled.contains(&feature_id) {
            continue;
        }
        let triggers = feature.triggers();
        if triggers.is_empty() {
            continue;
        }
        let edges = feature.edges();

        for device in &devices {
            let mut roles: IndexMap<String, ObjectId> = IndexMap::new();
            let mut missing = Vec::new();
            let mut conflicts = Vec::new();

            for pattern in &triggers {
                let candidates: Vec<&ObjectId> = catalog
                    .desired()
                    .filter(|object| object.device == *device && pattern.matches_object(object))
                    .map(|object| object.object_id())
                    .collect();
                match candidates.as_slice() {
                    [] => missing.push(pattern.role.clone()),
                    [only] => {
                        roles.insert(pattern.role.clone(), (*only).clone());
                    }
                    _ => conflicts.push(pattern.role.clone()),
                }
            }

            if missing.is_empty() && conflicts.is_empty() {
                let edge_watches: Vec<EdgeWatch> = edges
                    .iter()
                    .flat_map(|edge| {
                        catalog
                            .desired()
                            .filter(|object| {
                                object.device == *device && edge.pattern.matches_object(object)
                            })
                            .map(|object| EdgeWatch {
                                object_id: object.object_id().clone(),
                                edge: edge.clone(),
                            })
                    })
                    .collect();
                bindings.push(AutomationBinding {
                    feature: Arc::clone(feature),
                    device: device.clone(),
                    roles,
                    edges: edge_watches,
                });
            } else {
                debug!(
                    feature = %feature_id,
                    device = %device,
                    missing = ?missing,
                    conflicts = ?conflicts,
                    "binding not resolvable yet"
                );
                pending.push(PendingBinding {
                    feature: feature_id.clone(),
                    device: device.clone(),
                    missing,
                    conflicts,
                });
            }
        }
    }

    WatchPlan { bindings, pending }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use steward_catalog::{ObjectDeclaration, TriggerPattern};
    use steward_core::ObjectKind;

    use super::*;

    struct Watcher {
        id: FeatureId,
        declarations: Vec<ObjectDeclaration>,
        triggers: Vec<TriggerPattern>,
        edges: Vec<EdgeTrigger>,
    }

    #[async_trait]
    impl Feature for Watcher {
        fn id(&self) -> FeatureId {
            self.id.clone()
        }

        fn title(&self) -> &str {
            "watcher"
        }

        fn declarations(&self) -> Vec<ObjectDeclaration> {
            self.declarations.clone()
        }

        fn triggers(&self) -> Vec<TriggerPattern> {
            self.triggers.clone()
        }

        fn edges(&self) -> Vec<EdgeTrigger> {
            self.edges.clone()
        }
    }

    fn feature_id(s: &str) -> FeatureId {
        s.parse().unwrap()
    }

    fn sensor_pattern(role: &str, feature: &str, key: &str) -> TriggerPattern {
        TriggerPattern::new(role, feature_id(feature), ObjectKind::Sensor, key)
    }

    /// Base feature with two sensors plus a controller watching them.
    fn fixture(controller_triggers: Vec<TriggerPattern>, edges: Vec<EdgeTrigger>) -> FeatureRegistry {
        let mut features = FeatureRegistry::new();
        features
            .register(Arc::new(Watcher {
                id: feature_id("base"),
                declarations: vec![
                    ObjectDeclaration::new(ObjectKind::Sensor, "indoor_humidity", "{key}"),
                    ObjectDeclaration::new(ObjectKind::Sensor, "outdoor_humidity", "{key}"),
                ],
                triggers: Vec::new(),
                edges: Vec::new(),
            }))
            .unwrap();
        features
            .register(Arc::new(Watcher {
                id: feature_id("controller"),
                declarations: vec![ObjectDeclaration::new(
                    ObjectKind::Switch,
                    "master",
                    "{key}",
                )
                .with_initial("off")],
                triggers: controller_triggers,
                edges,
            }))
            .unwrap();
        features
    }

    fn plan_for(features: &FeatureRegistry, devices: &[&str]) -> WatchPlan {
        let toggles: BTreeSet<FeatureId> = [feature_id("base"), feature_id("controller")]
            .into_iter()
            .collect();
        let devices: BTreeSet<DeviceId> =
            devices.iter().map(|name| name.parse().unwrap()).collect();
        let build = ObjectCatalog::build(features, &toggles, &devices);
        assert!(build.issues.is_empty());
        let enabled = features.enabled(&toggles);
        resolve(&build.catalog, features, &enabled)
    }

    #[test]
    fn binds_when_every_role_resolves() {
        let features = fixture(
            vec![
                sensor_pattern("indoor", "base", "indoor_humidity"),
                sensor_pattern("outdoor", "base", "outdoor_humidity"),
                TriggerPattern::new(
                    "master",
                    feature_id("controller"),
                    ObjectKind::Switch,
                    "master",
                ),
            ],
            Vec::new(),
        );
        let plan = plan_for(&features, &["vent_42", "vent_43"]);

        assert_eq!(plan.bindings.len(), 2);
        assert!(plan.pending.is_empty());

        let devices = plan.devices();
        assert!(devices.contains(&"vent_42".parse().unwrap()));
        assert!(devices.contains(&"vent_43".parse().unwrap()));

        let binding = plan
            .bindings_for(&"vent_42".parse().unwrap())
            .next()
            .unwrap();
        assert_eq!(binding.roles.len(), 3);
        assert_eq!(
            binding.roles.get("indoor").unwrap().to_string(),
            "sensor.vent_42__base__indoor_humidity"
        );
        assert!(binding.watches(&"sensor.vent_42__base__indoor_humidity".parse().unwrap()));
        assert!(!binding.watches(&"sensor.vent_43__base__indoor_humidity".parse().unwrap()));
    }

    #[test]
    fn bindings_for_narrows_to_one_device() {
        let features = fixture(
            vec![sensor_pattern("indoor", "base", "indoor_humidity")],
            Vec::new(),
        );
        let plan = plan_for(&features, &["vent_42", "vent_43"]);

        let bound: Vec<_> = plan.bindings_for(&"vent_42".parse().unwrap()).collect();
        assert_eq!(bound.len(), 1);
        assert_eq!(bound[0].device.as_str(), "vent_42");
    }

    #[test]
    fn missing_role_defers_the_binding() {
        let features = fixture(
            vec![sensor_pattern("absolute", "absent_feature", "indoor_absolute")],
            Vec::new(),
        );
        let plan = plan_for(&features, &["vent_42"]);

        assert!(plan.is_empty());
        assert_eq!(plan.pending.len(), 1);
        assert_eq!(plan.pending[0].missing, vec!["absolute".to_string()]);
        assert!(plan.pending[0].conflicts.is_empty());
    }

    #[test]
    fn wildcard_matching_several_objects_is_a_conflict() {
        let features = fixture(
            vec![sensor_pattern("humidity", "base", "*_humidity")],
            Vec::new(),
        );
        let plan = plan_for(&features, &["vent_42"]);

        assert!(plan.is_empty());
        assert_eq!(plan.pending.len(), 1);
        assert_eq!(plan.pending[0].conflicts, vec!["humidity".to_string()]);
    }

    #[test]
    fn wildcard_matching_one_object_binds() {
        let features = fixture(
            vec![sensor_pattern("indoor", "base", "indoor_*")],
            Vec::new(),
        );
        let plan = plan_for(&features, &["vent_42"]);

        assert_eq!(plan.bindings.len(), 1);
        assert_eq!(
            plan.bindings[0].roles.get("indoor").unwrap().to_string(),
            "sensor.vent_42__base__indoor_humidity"
        );
    }

    #[test]
    fn disabled_features_are_not_considered() {
        let features = fixture(
            vec![sensor_pattern("indoor", "base", "indoor_humidity")],
            Vec::new(),
        );
        let toggles: BTreeSet<FeatureId> = [feature_id("base")].into_iter().collect();
        let devices: BTreeSet<DeviceId> = ["vent_42".parse().unwrap()].into_iter().collect();
        let build = ObjectCatalog::build(&features, &toggles, &devices);
        let enabled = features.enabled(&toggles);

        let plan = resolve(&build.catalog, &features, &enabled);
        assert!(plan.is_empty());
        assert!(plan.pending.is_empty());
    }

    #[test]
    fn edges_resolve_to_concrete_objects() {
        let master = TriggerPattern::new(
            "master",
            feature_id("controller"),
            ObjectKind::Switch,
            "master",
        );
        let features = fixture(
            vec![master.clone()],
            vec![EdgeTrigger::new(master, "off")],
        );
        let plan = plan_for(&features, &["vent_42"]);

        assert_eq!(plan.bindings.len(), 1);
        let binding = &plan.bindings[0];
        assert_eq!(binding.edges.len(), 1);
        assert_eq!(
            binding.edges[0].object_id.to_string(),
            "switch.vent_42__controller__master"
        );
        assert_eq!(binding.edges[0].edge.to, "off");
    }
}
