//! Payment transactions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Money, SubscriptionId};

/// Unique transaction identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(pub Uuid);

impl TransactionId {
    /// Create a new random transaction ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

/// A payment outcome reported by the gateway
///
/// Immutable once persisted, except for `message`, which processing may
/// append outcome notes to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction ID
    pub id: TransactionId,
    /// Subscription the payment belongs to
    pub subscription_id: SubscriptionId,
    /// Amount charged or attempted
    pub amount: Money,
    /// Whether the charge succeeded
    pub success: bool,
    /// Gateway subscriber id the charge ran against
    pub billing_key: String,
    /// Free-text outcome note
    pub message: Option<String>,
    /// When the gateway created the transaction
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Record a payment outcome
    pub fn new(
        subscription_id: SubscriptionId,
        amount: Money,
        success: bool,
        billing_key: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TransactionId::new(),
            subscription_id,
            amount,
            success,
            billing_key: billing_key.into(),
            message: None,
            created_at,
        }
    }

    /// Attach an outcome note
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}
