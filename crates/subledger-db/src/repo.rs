//! Repository traits
//!
//! Async persistence interfaces for the billing entities. Queries are
//! described declaratively; implementations decide how to run them.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use subledger_types::{
    ChangeRecord, Coupon, CouponId, CouponRedemption, OwnerRef, Plan, PlanId, RedemptionId,
    Subscription, SubscriptionId, Transaction, TransactionId,
};

use crate::error::DbResult;

/// Plan repository trait
#[async_trait]
pub trait PlanRepository: Send + Sync {
    /// Find a plan by ID
    async fn find_by_id(&self, id: PlanId) -> DbResult<Option<Plan>>;

    /// Create a new plan
    async fn create(&self, plan: Plan) -> DbResult<Plan>;

    /// All plans
    async fn all(&self) -> DbResult<Vec<Plan>>;
}

/// Subscription repository trait
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Find a subscription by ID
    async fn find_by_id(&self, id: SubscriptionId) -> DbResult<Option<Subscription>>;

    /// Find a subscription by its gateway billing key
    async fn find_by_billing_key(&self, billing_key: &str) -> DbResult<Option<Subscription>>;

    /// Subscriptions with a paid-through date on or before `date`
    async fn find_due(&self, date: NaiveDate) -> DbResult<Vec<Subscription>>;

    /// Subscriptions past due with no loss-of-service date scheduled yet
    async fn find_past_due_without_expiry(&self, date: NaiveDate) -> DbResult<Vec<Subscription>>;

    /// Subscriptions whose scheduled loss-of-service date has arrived
    async fn find_expired(&self, date: NaiveDate) -> DbResult<Vec<Subscription>>;

    /// The newest gateway transaction timestamp across all subscriptions
    async fn max_last_transaction_at(&self) -> DbResult<Option<DateTime<Utc>>>;

    /// Create a new subscription
    async fn create(&self, sub: Subscription) -> DbResult<Subscription>;

    /// Persist the current state of a subscription
    async fn update(&self, sub: &Subscription) -> DbResult<()>;

    /// Set `expire_on` only if it is currently unset; returns whether the
    /// write happened. Must be atomic so grace scheduling stays idempotent
    /// under retries and concurrent workers.
    async fn set_expire_on_if_unset(
        &self,
        id: SubscriptionId,
        expire_on: NaiveDate,
    ) -> DbResult<bool>;

    /// Delete a subscription
    async fn delete(&self, id: SubscriptionId) -> DbResult<()>;
}

/// Coupon and redemption repository trait
#[async_trait]
pub trait CouponRepository: Send + Sync {
    /// Find a coupon by ID
    async fn find_by_id(&self, id: CouponId) -> DbResult<Option<Coupon>>;

    /// Find a coupon by redemption key; the key is matched lowercase
    async fn find_by_key(&self, key: &str) -> DbResult<Option<Coupon>>;

    /// Create a new coupon
    async fn create(&self, coupon: Coupon) -> DbResult<Coupon>;

    /// Delete a coupon and all of its redemptions
    async fn delete(&self, id: CouponId) -> DbResult<()>;

    /// How many times a coupon has been redeemed
    async fn redemption_count(&self, coupon_id: CouponId) -> DbResult<u64>;

    /// All redemptions held by a subscription
    async fn redemptions_for_subscription(
        &self,
        subscription_id: SubscriptionId,
    ) -> DbResult<Vec<CouponRedemption>>;

    /// Record a redemption; fails with a conflict if the subscription has
    /// already redeemed this coupon
    async fn create_redemption(&self, redemption: CouponRedemption)
        -> DbResult<CouponRedemption>;

    /// Terminate a redemption early
    async fn expire_redemption(&self, id: RedemptionId, on: NaiveDate) -> DbResult<()>;
}

/// Transaction repository trait
#[async_trait]
pub trait TransactionRepository: Send + Sync {
    /// Persist a transaction
    async fn create(&self, transaction: Transaction) -> DbResult<Transaction>;

    /// Append an outcome note to a transaction's message
    async fn append_message(&self, id: TransactionId, message: &str) -> DbResult<()>;

    /// Transactions created at or after `since`
    async fn since(&self, since: DateTime<Utc>) -> DbResult<Vec<Transaction>>;

    /// All transactions for a subscription, oldest first
    async fn for_subscription(&self, id: SubscriptionId) -> DbResult<Vec<Transaction>>;
}

/// Append-only plan-change audit log trait
#[async_trait]
pub trait ChangeLogRepository: Send + Sync {
    /// Append a change record
    async fn append(&self, record: ChangeRecord) -> DbResult<ChangeRecord>;

    /// All change records for an owner, oldest first
    async fn for_owner(&self, owner: &OwnerRef) -> DbResult<Vec<ChangeRecord>>;
}
