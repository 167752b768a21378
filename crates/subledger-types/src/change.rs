//! Plan-change audit records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Money, OwnerRef, PlanId};

/// Why a subscription's plan or terminal state changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeReason {
    /// First subscription for this owner
    New,
    /// Moved to a plan with an equal or higher rate
    Upgrade,
    /// Moved to a plan with a lower rate
    Downgrade,
    /// Downgraded because the grace period ran out
    Expiration,
    /// Subscription deleted
    Cancellation,
}

impl std::fmt::Display for ChangeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::New => "new",
            Self::Upgrade => "upgrade",
            Self::Downgrade => "downgrade",
            Self::Expiration => "expiration",
            Self::Cancellation => "cancellation",
        };
        f.write_str(s)
    }
}

/// Unique change record identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeRecordId(pub Uuid);

impl ChangeRecordId {
    /// Create a new random change record ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ChangeRecordId {
    fn default() -> Self {
        Self::new()
    }
}

/// One entry in the append-only plan-change audit log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Record ID
    pub id: ChangeRecordId,
    /// Owner of the affected subscription
    pub owner: OwnerRef,
    /// Why the change happened
    pub reason: ChangeReason,
    /// Plan before the change, absent for new subscriptions
    pub original_plan: Option<PlanId>,
    /// Plan after the change, absent for cancellations
    pub new_plan: Option<PlanId>,
    /// Undiscounted rate before the change
    pub original_rate: Money,
    /// Undiscounted rate after the change
    pub new_rate: Money,
    /// When the change was recorded
    pub created_at: DateTime<Utc>,
}
