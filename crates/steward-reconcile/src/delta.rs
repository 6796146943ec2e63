use serde::Serialize;
use steward_catalog::ObjectCatalog;
use steward_core::{ManagedObject, ObjectId};
use steward_host::RegistrySnapshot;

/// What one reconciliation pass has to do.
///
/// `to_create` preserves catalog order; `to_remove` and `unchanged` are
/// sorted by id. Recomputed from scratch every pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciliationDelta {
    pub to_create: Vec<ManagedObject>,
    pub to_remove: Vec<ObjectId>,
    pub unchanged: Vec<ObjectId>,
}

impl ReconciliationDelta {
    /// Whether applying this delta would touch the registry at all.
    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty() && self.to_remove.is_empty()
    }
}

/// Derive the delta between the desired catalog and a registry snapshot.
///
/// Pure and deterministic: identical inputs produce an identical delta.
/// Four cases per catalog object (should exist × already exists), plus
/// orphan collection: entries owned by this system with no catalog
/// counterpart are removed. Entries without an ownership marker are
/// never touched.
pub fn reconcile(catalog: &ObjectCatalog, snapshot: &RegistrySnapshot) -> ReconciliationDelta {
    let mut to_create = Vec::new();
    let mut to_remove = Vec::new();
    let mut unchanged = Vec::new();

    for object in catalog.iter() {
        let object_id = object.object_id();
        match (object.should_exist, snapshot.contains(object_id)) {
            (true, true) => unchanged.push(object_id.clone()),
            (true, false) => to_create.push(object.clone()),
            (false, true) => to_remove.push(object_id.clone()),
            (false, false) => {}
        }
    }

    for entry in snapshot.iter() {
        if entry.is_owned() && !catalog.contains(&entry.object_id) {
            to_remove.push(entry.object_id.clone());
        }
    }

    to_remove.sort();
    to_remove.dedup();
    unchanged.sort();

    ReconciliationDelta {
        to_create,
        to_remove,
        unchanged,
    }
}
