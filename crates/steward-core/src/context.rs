//! Context type for tracking the causality of state writes

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Context attached to every state write and change notification
///
/// Actions applied in response to a change carry a child context of the
/// change that triggered them, so a chain of cause and effect can be traced
/// through the logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeContext {
    /// Unique identifier for this context (ULID)
    pub id: String,

    /// Parent context id for causality chains
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl ChangeContext {
    /// Create a new root context with a fresh ULID
    pub fn new() -> Self {
        Self {
            id: Ulid::new().to_string(),
            parent_id: None,
        }
    }

    /// Create a child context with this context as parent
    pub fn child(&self) -> Self {
        Self {
            id: Ulid::new().to_string(),
            parent_id: Some(self.id.clone()),
        }
    }
}

impl Default for ChangeContext {
    fn default() -> Self {
        Self::new()
    }
}
