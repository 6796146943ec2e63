use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde_json::json;
use steward_core::{
    ChangeContext, ManagedObject, ObjectId, ObjectState, StateChange, STATE_UNKNOWN,
};
use tokio::sync::{broadcast, watch};
use tracing::debug;

use crate::registry::{HostSignals, Registry, RegistryError};
use crate::snapshot::{RegistryEntry, RegistryFilter, RegistrySnapshot};
use crate::DEFAULT_CHANNEL_CAPACITY;

/// In-process registry backend.
///
/// Keeps entries and states in concurrent maps and publishes every
/// transition on a broadcast channel. Readiness starts out `false`;
/// call [`MemoryRegistry::mark_ready`] once the simulated host has
/// finished starting up.
pub struct MemoryRegistry {
    entries: DashMap<ObjectId, RegistryEntry>,
    states: DashMap<ObjectId, ObjectState>,
    changes: broadcast::Sender<StateChange>,
    ready: watch::Sender<bool>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (changes, _) = broadcast::channel(capacity);
        let (ready, _) = watch::channel(false);
        Self {
            entries: DashMap::new(),
            states: DashMap::new(),
            changes,
            ready,
        }
    }

    /// Flip the readiness latch. Idempotent.
    pub fn mark_ready(&self) {
        self.ready.send_replace(true);
        debug!("host marked ready");
    }

    /// Seed an entry directly, without firing a change event. Models
    /// objects that were registered before steward connected.
    pub fn insert_entry(&self, entry: RegistryEntry) {
        self.entries.insert(entry.object_id.clone(), entry);
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    fn fire(&self, change: StateChange) {
        // Send only fails when nobody is subscribed yet.
        let _ = self.changes.send(change);
    }

    fn base_attributes(entry: &RegistryEntry) -> HashMap<String, serde_json::Value> {
        let mut attributes = HashMap::new();
        attributes.insert("friendly_name".to_string(), json!(entry.friendly_name));
        if let Some(unit) = &entry.unit {
            attributes.insert("unit_of_measurement".to_string(), json!(unit));
        }
        if !entry.select_options.is_empty() {
            attributes.insert("options".to_string(), json!(entry.select_options));
        }
        attributes
    }
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn list_objects(
        &self,
        filter: &RegistryFilter,
    ) -> Result<RegistrySnapshot, RegistryError> {
        let entries: Vec<RegistryEntry> = self
            .entries
            .iter()
            .filter(|item| filter.matches(item.value()))
            .map(|item| item.value().clone())
            .collect();
        Ok(RegistrySnapshot::from_entries(entries))
    }

    async fn create_object(&self, object: &ManagedObject) -> Result<RegistryEntry, RegistryError> {
        let object_id = object.object_id().clone();
        if self.entries.contains_key(&object_id) {
            return Err(RegistryError::AlreadyExists(object_id));
        }

        let entry = RegistryEntry::from_object(object);
        let initial = object
            .initial
            .clone()
            .unwrap_or_else(|| STATE_UNKNOWN.to_string());
        let state = ObjectState::new(object_id.clone(), initial, Self::base_attributes(&entry));

        self.entries.insert(object_id.clone(), entry.clone());
        self.states.insert(object_id.clone(), state.clone());
        debug!(object = %object_id, "object registered");

        self.fire(StateChange {
            object_id,
            device: entry.device.clone(),
            old: None,
            new: Some(state),
            context: ChangeContext::new(),
            occurred_at: Utc::now(),
        });
        Ok(entry)
    }

    async fn remove_object(&self, object_id: &ObjectId) -> Result<RegistryEntry, RegistryError> {
        let (_, entry) = self
            .entries
            .remove(object_id)
            .ok_or_else(|| RegistryError::NotFound(object_id.clone()))?;
        let old = self.states.remove(object_id).map(|(_, state)| state);
        debug!(object = %object_id, "object removed");

        self.fire(StateChange {
            object_id: object_id.clone(),
            device: entry.device.clone(),
            old,
            new: None,
            context: ChangeContext::new(),
            occurred_at: Utc::now(),
        });
        Ok(entry)
    }

    async fn get_state(&self, object_id: &ObjectId) -> Option<ObjectState> {
        self.states.get(object_id).map(|state| state.clone())
    }

    async fn set_state(
        &self,
        object_id: &ObjectId,
        state: &str,
        context: ChangeContext,
    ) -> Result<ObjectState, RegistryError> {
        let entry = self
            .entries
            .get(object_id)
            .map(|item| item.value().clone())
            .ok_or_else(|| RegistryError::NotFound(object_id.clone()))?;

        let old = self.states.get(object_id).map(|item| item.value().clone());
        let new = match &old {
            Some(previous) => previous.with_update(state, previous.attributes.clone()),
            None => ObjectState::new(object_id.clone(), state, Self::base_attributes(&entry)),
        };
        self.states.insert(object_id.clone(), new.clone());

        // Writing the value an object already has refreshes its
        // timestamps but is not a transition, so nothing is published.
        if old.as_ref().map(|previous| previous.state.as_str()) == Some(state) {
            debug!(object = %object_id, state = %state, "state rewritten, no change published");
            return Ok(new);
        }
        debug!(object = %object_id, state = %state, "state set");

        self.fire(StateChange {
            object_id: object_id.clone(),
            device: entry.device,
            old,
            new: Some(new.clone()),
            context,
            occurred_at: Utc::now(),
        });
        Ok(new)
    }

    fn changes(&self) -> broadcast::Receiver<StateChange> {
        self.changes.subscribe()
    }
}

impl HostSignals for MemoryRegistry {
    fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    fn ready_signal(&self) -> watch::Receiver<bool> {
        self.ready.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use steward_core::{DeviceId, FeatureId, ObjectKind};

    use super::*;

    fn switch(device: &str, key: &str) -> ManagedObject {
        let feature: FeatureId = "climate".parse().unwrap();
        let device: DeviceId = device.parse().unwrap();
        ManagedObject::new(ObjectKind::Switch, feature, device, key)
            .unwrap()
            .with_initial("off")
    }

    #[tokio::test]
    async fn create_seeds_initial_state() {
        let registry = MemoryRegistry::new();
        let object = switch("kitchen", "humidity_control");

        let entry = registry.create_object(&object).await.unwrap();
        assert!(entry.is_owned());

        let state = registry.get_state(object.object_id()).await.unwrap();
        assert!(state.is_off());
        assert_eq!(
            state.attribute::<String>("friendly_name"),
            Some(object.friendly_name.clone())
        );
    }

    #[tokio::test]
    async fn create_without_initial_defaults_to_unknown() {
        let registry = MemoryRegistry::new();
        let feature: FeatureId = "climate".parse().unwrap();
        let device: DeviceId = "kitchen".parse().unwrap();
        let object = ManagedObject::new(ObjectKind::Sensor, feature, device, "humidity").unwrap();

        registry.create_object(&object).await.unwrap();
        let state = registry.get_state(object.object_id()).await.unwrap();
        assert!(state.is_unknown());
    }

    #[tokio::test]
    async fn duplicate_create_is_rejected() {
        let registry = MemoryRegistry::new();
        let object = switch("kitchen", "humidity_control");

        registry.create_object(&object).await.unwrap();
        let err = registry.create_object(&object).await.unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn set_state_fires_change_with_device() {
        let registry = MemoryRegistry::new();
        let object = switch("kitchen", "humidity_control");
        registry.create_object(&object).await.unwrap();

        let mut rx = registry.changes();
        registry
            .set_state(object.object_id(), "on", ChangeContext::new())
            .await
            .unwrap();

        let change = rx.recv().await.unwrap();
        assert_eq!(change.object_id, *object.object_id());
        assert_eq!(change.device, Some(object.device.clone()));
        assert_eq!(change.old_value(), Some("off"));
        assert_eq!(change.new_value(), Some("on"));
    }

    #[tokio::test]
    async fn remove_fires_removal_event_and_drops_state() {
        let registry = MemoryRegistry::new();
        let object = switch("kitchen", "humidity_control");
        registry.create_object(&object).await.unwrap();

        let mut rx = registry.changes();
        registry.remove_object(object.object_id()).await.unwrap();

        let change = rx.recv().await.unwrap();
        assert!(change.is_removal());
        assert_eq!(change.old_value(), Some("off"));
        assert!(registry.get_state(object.object_id()).await.is_none());
    }

    #[tokio::test]
    async fn rewriting_the_same_value_publishes_nothing() {
        let registry = MemoryRegistry::new();
        let object = switch("kitchen", "humidity_control");
        registry.create_object(&object).await.unwrap();

        let mut rx = registry.changes();
        registry
            .set_state(object.object_id(), "off", ChangeContext::new())
            .await
            .unwrap();
        registry
            .set_state(object.object_id(), "on", ChangeContext::new())
            .await
            .unwrap();

        // Only the actual transition comes through.
        let change = rx.recv().await.unwrap();
        assert_eq!(change.new_value(), Some("on"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn set_state_on_unregistered_object_errors() {
        let registry = MemoryRegistry::new();
        let object_id: ObjectId = "switch.kitchen__climate__nope".parse().unwrap();

        let err = registry
            .set_state(&object_id, "on", ChangeContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));
    }

    #[tokio::test]
    async fn readiness_latch_is_visible_to_late_subscribers() {
        let registry = MemoryRegistry::new();
        assert!(!registry.is_ready());

        registry.mark_ready();
        registry.mark_ready();

        assert!(registry.is_ready());
        let rx = registry.ready_signal();
        assert!(*rx.borrow());
    }

    #[tokio::test]
    async fn list_objects_applies_ownership_filter() {
        let registry = MemoryRegistry::new();
        registry
            .create_object(&switch("kitchen", "humidity_control"))
            .await
            .unwrap();
        registry.insert_entry(RegistryEntry::foreign(
            "sensor.preexisting".parse().unwrap(),
            "Pre-existing",
        ));

        let all = registry.list_objects(&RegistryFilter::all()).await.unwrap();
        assert_eq!(all.len(), 2);

        let owned = registry
            .list_objects(&RegistryFilter::owned())
            .await
            .unwrap();
        assert_eq!(owned.len(), 1);
        assert!(owned.iter().all(|entry| entry.is_owned()));
    }
}
