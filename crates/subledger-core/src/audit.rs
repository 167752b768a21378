//! Plan-change audit trail
//!
//! Every plan change, expiration, and cancellation appends a record; the
//! log is never rewritten. A failed append aborts the enclosing operation
//! so the trail can be trusted.

use std::sync::Arc;
use tracing::debug;

use subledger_db::ChangeLogRepository;
use subledger_types::{ChangeReason, ChangeRecord, ChangeRecordId, Money, OwnerRef, PlanId};

use crate::error::BillingError;

/// Append-only recorder of subscription changes
#[derive(Clone)]
pub struct ChangeAuditor {
    changes: Arc<dyn ChangeLogRepository>,
}

impl ChangeAuditor {
    pub fn new(changes: Arc<dyn ChangeLogRepository>) -> Self {
        Self { changes }
    }

    /// Append one change record
    pub async fn record(
        &self,
        reason: ChangeReason,
        owner: &OwnerRef,
        original_plan: Option<PlanId>,
        new_plan: Option<PlanId>,
        original_rate: Money,
        new_rate: Money,
    ) -> Result<ChangeRecord, BillingError> {
        let record = ChangeRecord {
            id: ChangeRecordId::new(),
            owner: owner.clone(),
            reason,
            original_plan,
            new_plan,
            original_rate,
            new_rate,
            created_at: chrono::Utc::now(),
        };
        let record = self.changes.append(record).await?;
        debug!(owner = %owner, reason = %reason, "change recorded");
        Ok(record)
    }

    /// The full change history for an owner, oldest first
    pub async fn history(&self, owner: &OwnerRef) -> Result<Vec<ChangeRecord>, BillingError> {
        Ok(self.changes.for_owner(owner).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use subledger_db::MemoryChangeLog;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_history_preserves_order() {
        let auditor = ChangeAuditor::new(Arc::new(MemoryChangeLog::new()));
        let owner = OwnerRef::user(Uuid::new_v4());
        let plan = PlanId::new();

        auditor
            .record(
                ChangeReason::New,
                &owner,
                None,
                Some(plan),
                Money::ZERO,
                Money::from_cents(3041),
            )
            .await
            .unwrap();
        auditor
            .record(
                ChangeReason::Cancellation,
                &owner,
                Some(plan),
                None,
                Money::from_cents(3041),
                Money::ZERO,
            )
            .await
            .unwrap();

        let history = auditor.history(&owner).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].reason, ChangeReason::New);
        assert_eq!(history[1].reason, ChangeReason::Cancellation);
    }
}
