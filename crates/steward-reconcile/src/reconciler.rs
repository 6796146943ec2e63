use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use steward_catalog::ObjectCatalog;
use steward_core::ObjectId;
use steward_host::{Registry, RegistryError, RegistryFilter};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::delta::reconcile;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("failed to snapshot registry: {0}")]
    Snapshot(#[source] RegistryError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemOperation {
    Create,
    Remove,
}

/// One object that could not be created or removed during a pass.
#[derive(Debug, Clone, Serialize)]
pub struct ItemError {
    pub object_id: ObjectId,
    pub operation: ItemOperation,
    pub message: String,
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationSummary {
    pub pass_id: String,
    pub created: Vec<ObjectId>,
    pub removed: Vec<ObjectId>,
    pub unchanged: Vec<ObjectId>,
    pub errors: Vec<ItemError>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ReconciliationSummary {
    /// Whether the pass left the registry untouched.
    pub fn is_noop(&self) -> bool {
        self.created.is_empty() && self.removed.is_empty() && self.errors.is_empty()
    }
}

/// Applies reconciliation passes against the registry.
///
/// Passes are serialized behind a guard so two concurrent triggers can
/// never interleave their registry mutations; each trigger still gets
/// its own full pass against a fresh snapshot.
pub struct Reconciler {
    registry: Arc<dyn Registry>,
    pass_guard: Mutex<()>,
}

impl Reconciler {
    pub fn new(registry: Arc<dyn Registry>) -> Self {
        Self {
            registry,
            pass_guard: Mutex::new(()),
        }
    }

    /// Run one pass: snapshot, derive the delta, apply removals then
    /// creations. Per-item failures are aggregated into the summary;
    /// only a failed snapshot aborts the pass.
    pub async fn run(&self, catalog: &ObjectCatalog) -> Result<ReconciliationSummary, ReconcileError> {
        let _guard = self.pass_guard.lock().await;
        let pass_id = Ulid::new().to_string();
        let started_at = Utc::now();

        let snapshot = self
            .registry
            .list_objects(&RegistryFilter::all())
            .await
            .map_err(ReconcileError::Snapshot)?;
        let delta = reconcile(catalog, &snapshot);

        let mut created = Vec::new();
        let mut removed = Vec::new();
        let mut errors = Vec::new();

        if delta.is_empty() {
            debug!(pass = %pass_id, unchanged = delta.unchanged.len(), "nothing to reconcile");
        } else {
            for object_id in &delta.to_remove {
                match self.registry.remove_object(object_id).await {
                    Ok(_) => {
                        debug!(pass = %pass_id, object = %object_id, "removed object");
                        removed.push(object_id.clone());
                    }
                    Err(err) => {
                        warn!(pass = %pass_id, object = %object_id, error = %err, "remove failed");
                        errors.push(ItemError {
                            object_id: object_id.clone(),
                            operation: ItemOperation::Remove,
                            message: err.to_string(),
                        });
                    }
                }
            }

            for object in &delta.to_create {
                let object_id = object.object_id();
                match self.registry.create_object(object).await {
                    Ok(_) => {
                        debug!(pass = %pass_id, object = %object_id, "created object");
                        created.push(object_id.clone());
                    }
                    Err(err) => {
                        warn!(pass = %pass_id, object = %object_id, error = %err, "create failed");
                        errors.push(ItemError {
                            object_id: object_id.clone(),
                            operation: ItemOperation::Create,
                            message: err.to_string(),
                        });
                    }
                }
            }

            info!(
                pass = %pass_id,
                created = created.len(),
                removed = removed.len(),
                unchanged = delta.unchanged.len(),
                errors = errors.len(),
                "reconciliation pass finished"
            );
        }

        Ok(ReconciliationSummary {
            pass_id,
            created,
            removed,
            unchanged: delta.unchanged,
            errors,
            started_at,
            finished_at: Utc::now(),
        })
    }
}
