//! Opaque subscriber ownership reference

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque reference to whoever owns a subscription
///
/// The billing engine never resolves this to a concrete entity; it is only
/// stored on records and passed through to the notifier collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerRef {
    /// Kind of the owning entity, e.g. `"user"` or `"account"`
    pub kind: String,
    /// Identifier of the owning entity
    pub id: Uuid,
}

impl OwnerRef {
    /// Create an owner reference
    pub fn new(kind: impl Into<String>, id: Uuid) -> Self {
        Self {
            kind: kind.into(),
            id,
        }
    }

    /// Convenience constructor for user-owned subscriptions
    pub fn user(id: Uuid) -> Self {
        Self::new("user", id)
    }
}

impl std::fmt::Display for OwnerRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}
