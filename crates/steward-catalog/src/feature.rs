use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use steward_core::{DeviceId, FeatureId, ManagedObject, ObjectId, ObjectIdError, ObjectKind};
use thiserror::Error;

use crate::decision::{DecisionContext, DecisionError};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("feature already registered: {0}")]
    DuplicateFeature(FeatureId),
}

/// One object a feature owns per device.
///
/// Declarations are device-independent; the catalog instantiates them
/// for every discovered device. The name template may reference
/// `{device}`, `{feature}` and `{key}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectDeclaration {
    pub kind: ObjectKind,
    pub key: String,
    pub name_template: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub select_options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial: Option<String>,
}

impl ObjectDeclaration {
    pub fn new(kind: ObjectKind, key: impl Into<String>, name_template: impl Into<String>) -> Self {
        Self {
            kind,
            key: key.into(),
            name_template: name_template.into(),
            unit: None,
            select_options: Vec::new(),
            initial: None,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_select_options(mut self, options: Vec<String>) -> Self {
        self.select_options = options;
        self
    }

    pub fn with_initial(mut self, state: impl Into<String>) -> Self {
        self.initial = Some(state.into());
        self
    }

    /// Expand this declaration for one device of one feature.
    pub fn instantiate(
        &self,
        feature: &FeatureId,
        device: &DeviceId,
        should_exist: bool,
    ) -> Result<ManagedObject, ObjectIdError> {
        let mut object = ManagedObject::new(
            self.kind,
            feature.clone(),
            device.clone(),
            self.key.clone(),
        )?
        .with_friendly_name(self.render_name(feature, device))
        .with_should_exist(should_exist);
        object.unit = self.unit.clone();
        object.select_options = self.select_options.clone();
        object.initial = self.initial.clone();
        Ok(object)
    }

    fn render_name(&self, feature: &FeatureId, device: &DeviceId) -> String {
        self.name_template
            .replace("{device}", device.as_str())
            .replace("{feature}", feature.as_str())
            .replace("{key}", &self.key)
    }
}

/// A state subscription a feature asks for, expanded per device.
///
/// The key may contain `*` wildcards. Each pattern names the role under
/// which the matched object's value appears in the decision context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerPattern {
    pub role: String,
    pub feature: FeatureId,
    pub kind: ObjectKind,
    pub key: String,
}

impl TriggerPattern {
    pub fn new(
        role: impl Into<String>,
        feature: FeatureId,
        kind: ObjectKind,
        key: impl Into<String>,
    ) -> Self {
        Self {
            role: role.into(),
            feature,
            kind,
            key: key.into(),
        }
    }

    /// Whether `key` matches this pattern, honoring `*` wildcards.
    pub fn matches_key(&self, key: &str) -> bool {
        if !self.key.contains('*') {
            return self.key == key;
        }
        let pattern = format!("^{}$", regex::escape(&self.key).replace(r"\*", ".*"));
        Regex::new(&pattern)
            .map(|re| re.is_match(key))
            .unwrap_or(false)
    }

    /// Whether a catalog object is a candidate for this pattern.
    pub fn matches_object(&self, object: &ManagedObject) -> bool {
        object.feature == self.feature
            && object.kind == self.kind
            && self.matches_key(&object.key)
    }
}

/// An immediate, non-debounced watch on a specific state transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeTrigger {
    pub pattern: TriggerPattern,
    /// Required previous value; any when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    /// Value the object must transition to.
    pub to: String,
}

impl EdgeTrigger {
    pub fn new(pattern: TriggerPattern, to: impl Into<String>) -> Self {
        Self {
            pattern,
            from: None,
            to: to.into(),
        }
    }

    pub fn from_state(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    /// Whether an observed transition fires this edge. Rewrites of the
    /// same value are not transitions.
    pub fn matches_transition(&self, old: Option<&str>, new: Option<&str>) -> bool {
        if new != Some(self.to.as_str()) || old == new {
            return false;
        }
        match &self.from {
            Some(from) => old == Some(from.as_str()),
            None => true,
        }
    }
}

/// What a decision wants done.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    SetState { object_id: ObjectId, state: String },
}

impl Action {
    pub fn set_state(object_id: ObjectId, state: impl Into<String>) -> Self {
        Self::SetState {
            object_id,
            state: state.into(),
        }
    }
}

/// A pluggable feature: the objects it owns and the logic it runs.
///
/// `decide` is invoked once per settled burst of changes on a device;
/// `on_edge` runs immediately for each matching transition. Both return
/// the actions to apply, never apply anything themselves.
#[async_trait]
pub trait Feature: Send + Sync {
    fn id(&self) -> FeatureId;

    fn title(&self) -> &str;

    /// Always-on features are enabled regardless of toggles.
    fn always_on(&self) -> bool {
        false
    }

    fn declarations(&self) -> Vec<ObjectDeclaration>;

    fn triggers(&self) -> Vec<TriggerPattern> {
        Vec::new()
    }

    fn edges(&self) -> Vec<EdgeTrigger> {
        Vec::new()
    }

    async fn decide(&self, _ctx: &DecisionContext) -> Result<Vec<Action>, DecisionError> {
        Ok(Vec::new())
    }

    async fn on_edge(
        &self,
        _edge: &EdgeTrigger,
        _ctx: &DecisionContext,
    ) -> Result<Vec<Action>, DecisionError> {
        Ok(Vec::new())
    }
}

/// Registered features, in registration order.
#[derive(Default)]
pub struct FeatureRegistry {
    features: IndexMap<FeatureId, Arc<dyn Feature>>,
}

impl FeatureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, feature: Arc<dyn Feature>) -> Result<(), CatalogError> {
        let id = feature.id();
        if self.features.contains_key(&id) {
            return Err(CatalogError::DuplicateFeature(id));
        }
        self.features.insert(id, feature);
        Ok(())
    }

    pub fn get(&self, id: &FeatureId) -> Option<&Arc<dyn Feature>> {
        self.features.get(id)
    }

    pub fn contains(&self, id: &FeatureId) -> bool {
        self.features.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Feature>> {
        self.features.values()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// The set of enabled features: always-on features plus registered
    /// features named in `toggles`. Enablement is computed here and
    /// nowhere else.
    pub fn enabled(&self, toggles: &BTreeSet<FeatureId>) -> BTreeSet<FeatureId> {
        self.features
            .iter()
            .filter(|(id, feature)| feature.always_on() || toggles.contains(*id))
            .map(|(id, _)| id.clone())
            .collect()
    }
}
