use async_trait::async_trait;
use steward_core::{ChangeContext, ManagedObject, ObjectId, ObjectState, StateChange};
use thiserror::Error;
use tokio::sync::{broadcast, watch};

use crate::snapshot::{RegistryEntry, RegistryFilter, RegistrySnapshot};

/// Errors surfaced by a [`Registry`] backend.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    #[error("object not found: {0}")]
    NotFound(ObjectId),

    #[error("object already exists: {0}")]
    AlreadyExists(ObjectId),

    /// The backend is temporarily unreachable. Callers may retry on a
    /// later pass.
    #[error("registry unavailable: {0}")]
    Unavailable(String),

    /// The backend refused the operation outright.
    #[error("registry rejected operation: {0}")]
    Rejected(String),
}

/// Object lifecycle and state access on the host.
///
/// Implementations must be safe to share across tasks. All mutating
/// calls publish a [`StateChange`] on the channel returned by
/// [`Registry::changes`] so that subscribers observe every transition,
/// including creation (`old == None`) and removal (`new == None`).
#[async_trait]
pub trait Registry: Send + Sync {
    /// List registered objects matching `filter`.
    async fn list_objects(&self, filter: &RegistryFilter)
        -> Result<RegistrySnapshot, RegistryError>;

    /// Register `object` and seed its initial state.
    async fn create_object(&self, object: &ManagedObject) -> Result<RegistryEntry, RegistryError>;

    /// Unregister the object and drop its state.
    async fn remove_object(&self, object_id: &ObjectId) -> Result<RegistryEntry, RegistryError>;

    /// Current state of an object, if it has one.
    async fn get_state(&self, object_id: &ObjectId) -> Option<ObjectState>;

    /// Write a new state value for a registered object.
    async fn set_state(
        &self,
        object_id: &ObjectId,
        state: &str,
        context: ChangeContext,
    ) -> Result<ObjectState, RegistryError>;

    /// Subscribe to state changes. Each call returns an independent
    /// receiver positioned at the current end of the stream.
    fn changes(&self) -> broadcast::Receiver<StateChange>;
}

/// Startup readiness signals from the host.
///
/// The readiness flag is a latch: once it turns `true` it never reverts
/// within the lifetime of the process.
pub trait HostSignals: Send + Sync {
    /// Whether the host has finished starting up.
    fn is_ready(&self) -> bool;

    /// Watch channel carrying the readiness latch. Receivers created
    /// after the latch flipped still observe `true` immediately.
    fn ready_signal(&self) -> watch::Receiver<bool>;
}
