//! Subscriptions and their derived lifecycle state

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{OwnerRef, PlanId};

/// Unique subscription identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(pub Uuid);

impl SubscriptionId {
    /// Create a new random subscription ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Derived lifecycle state, never stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// On a free plan; never billed
    Free,
    /// In the initial free trial
    Trial,
    /// Paid through today or later
    Active,
    /// Past due, service continues until `expire_on`
    Grace,
    /// Grace elapsed; service lost
    Expired,
}

/// A subscription linking an owner to a plan
///
/// `paid_through` is the date through which service is already paid; it is
/// `None` exactly when the plan is free. `expire_on` is set only while the
/// subscription is in its grace period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    /// Subscription ID
    pub id: SubscriptionId,
    /// Who owns the subscription
    pub owner: OwnerRef,
    /// Current plan
    pub plan_id: PlanId,
    /// Opaque reference to the card stored at the gateway, if any
    pub card_ref: Option<String>,
    /// Gateway subscriber id; absent on free plans
    pub billing_key: Option<String>,
    /// When the current plan took effect
    pub started_on: NaiveDate,
    /// Date through which service is paid; `None` only on free plans
    pub paid_through: Option<NaiveDate>,
    /// Scheduled loss-of-service date, set only while in grace
    pub expire_on: Option<NaiveDate>,
    /// Whether the subscription is still in its initial free trial
    pub in_trial: bool,
    /// Timestamp of the newest gateway transaction applied to this
    /// subscription; the recurring strategy's per-subscription watermark
    pub last_transaction_at: Option<DateTime<Utc>>,
    /// When the subscription was created
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    /// Create a subscription shell; lifecycle fields are filled in by the
    /// billing cycle manager
    pub fn new(owner: OwnerRef, plan_id: PlanId, started_on: NaiveDate) -> Self {
        Self {
            id: SubscriptionId::new(),
            owner,
            plan_id,
            card_ref: None,
            billing_key: None,
            started_on,
            paid_through: None,
            expire_on: None,
            in_trial: false,
            last_transaction_at: None,
            created_at: Utc::now(),
        }
    }

    /// Days of already-paid service left as of `today`; zero when paid
    /// exactly through today, negative when past due
    pub fn remaining_days(&self, today: NaiveDate) -> i64 {
        match self.paid_through {
            Some(paid_through) => (paid_through - today).num_days(),
            None => 0,
        }
    }

    /// Whether the paid period has elapsed but service has not yet been lost
    pub fn in_grace(&self, today: NaiveDate) -> bool {
        self.paid_through.is_some() && self.remaining_days(today) < 0 && !self.is_expired(today)
    }

    /// Days of grace left as of `today`; negative once expired
    pub fn remaining_days_of_grace(&self, today: NaiveDate) -> i64 {
        match self.expire_on {
            Some(expire_on) => (expire_on - today).num_days() - 1,
            None => 0,
        }
    }

    /// Whether the grace deadline has passed
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        matches!(self.expire_on, Some(expire_on) if expire_on <= today)
    }

    /// Derived lifecycle state; `plan_is_paid` comes from the plan's rate
    pub fn status(&self, plan_is_paid: bool, today: NaiveDate) -> SubscriptionStatus {
        if !plan_is_paid && self.paid_through.is_none() {
            SubscriptionStatus::Free
        } else if self.is_expired(today) {
            SubscriptionStatus::Expired
        } else if self.in_trial {
            SubscriptionStatus::Trial
        } else if self.remaining_days(today) < 0 {
            SubscriptionStatus::Grace
        } else {
            SubscriptionStatus::Active
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 15).unwrap()
    }

    fn subscription(paid_through: Option<i64>, expire_on: Option<i64>) -> Subscription {
        let mut sub = Subscription::new(OwnerRef::user(Uuid::new_v4()), PlanId::new(), today());
        sub.paid_through = paid_through.map(|d| today() + chrono::Duration::days(d));
        sub.expire_on = expire_on.map(|d| today() + chrono::Duration::days(d));
        sub
    }

    #[test]
    fn test_active_subscription() {
        let sub = subscription(Some(5), None);
        assert!(!sub.in_grace(today()));
        assert!(!sub.is_expired(today()));
        assert_eq!(sub.status(true, today()), SubscriptionStatus::Active);
    }

    #[test]
    fn test_past_due_without_expiry_is_in_grace() {
        // a billing run may have skipped; the subscriber is still owed a
        // full grace period from the failed attempt
        let sub = subscription(Some(-5), None);
        assert!(sub.in_grace(today()));
        assert!(!sub.is_expired(today()));
        assert_eq!(sub.status(true, today()), SubscriptionStatus::Grace);
    }

    #[test]
    fn test_grace_boundaries() {
        // expires tomorrow: last day of grace
        let sub = subscription(Some(-5), Some(1));
        assert_eq!(sub.remaining_days_of_grace(today()), 0);
        assert!(sub.in_grace(today()));
        assert!(!sub.is_expired(today()));

        // expires today: expired
        let sub = subscription(Some(-5), Some(0));
        assert_eq!(sub.remaining_days_of_grace(today()), -1);
        assert!(!sub.in_grace(today()));
        assert!(sub.is_expired(today()));
        assert_eq!(sub.status(true, today()), SubscriptionStatus::Expired);
    }

    #[test]
    fn test_free_status() {
        let sub = subscription(None, None);
        assert_eq!(sub.status(false, today()), SubscriptionStatus::Free);
        assert_eq!(sub.remaining_days(today()), 0);
    }

    #[test]
    fn test_json_round_trip() {
        let mut sub = subscription(Some(5), Some(8));
        sub.billing_key = Some("key-1".to_string());

        let json = serde_json::to_string(&sub).unwrap();
        // newtype ids serialize as bare uuids
        assert!(json.contains(&sub.id.0.to_string()));
        assert!(json.contains(&sub.plan_id.0.to_string()));

        let back: Subscription = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, sub.id);
        assert_eq!(back.owner, sub.owner);
        assert_eq!(back.plan_id, sub.plan_id);
        assert_eq!(back.billing_key, sub.billing_key);
        assert_eq!(back.paid_through, sub.paid_through);
        assert_eq!(back.expire_on, sub.expire_on);
        assert_eq!(back.created_at, sub.created_at);
    }
}
