//! In-memory repositories
//!
//! Concurrent-map backed implementations of the repository traits. These
//! serve as the reference store for tests and embedded use; a real
//! deployment swaps in a database-backed implementation of the same traits.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use std::sync::Arc;

use subledger_types::{
    ChangeRecord, Coupon, CouponId, CouponRedemption, OwnerRef, Plan, PlanId, RedemptionId,
    Subscription, SubscriptionId, Transaction, TransactionId,
};

use crate::error::{DbError, DbResult};
use crate::repo::{
    ChangeLogRepository, CouponRepository, PlanRepository, SubscriptionRepository,
    TransactionRepository,
};

/// In-memory plan repository
#[derive(Default, Clone)]
pub struct MemoryPlanRepository {
    plans: Arc<DashMap<PlanId, Plan>>,
}

impl MemoryPlanRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PlanRepository for MemoryPlanRepository {
    async fn find_by_id(&self, id: PlanId) -> DbResult<Option<Plan>> {
        Ok(self.plans.get(&id).map(|r| r.value().clone()))
    }

    async fn create(&self, plan: Plan) -> DbResult<Plan> {
        self.plans.insert(plan.id, plan.clone());
        Ok(plan)
    }

    async fn all(&self) -> DbResult<Vec<Plan>> {
        Ok(self.plans.iter().map(|r| r.value().clone()).collect())
    }
}

/// In-memory subscription repository
#[derive(Default, Clone)]
pub struct MemorySubscriptionRepository {
    subscriptions: Arc<DashMap<SubscriptionId, Subscription>>,
}

impl MemorySubscriptionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn filtered<F>(&self, predicate: F) -> Vec<Subscription>
    where
        F: Fn(&Subscription) -> bool,
    {
        let mut subs: Vec<Subscription> = self
            .subscriptions
            .iter()
            .filter(|r| predicate(r.value()))
            .map(|r| r.value().clone())
            .collect();
        // deterministic batch order
        subs.sort_by_key(|s| s.id);
        subs
    }
}

#[async_trait]
impl SubscriptionRepository for MemorySubscriptionRepository {
    async fn find_by_id(&self, id: SubscriptionId) -> DbResult<Option<Subscription>> {
        Ok(self.subscriptions.get(&id).map(|r| r.value().clone()))
    }

    async fn find_by_billing_key(&self, billing_key: &str) -> DbResult<Option<Subscription>> {
        Ok(self
            .subscriptions
            .iter()
            .find(|r| r.value().billing_key.as_deref() == Some(billing_key))
            .map(|r| r.value().clone()))
    }

    async fn find_due(&self, date: NaiveDate) -> DbResult<Vec<Subscription>> {
        Ok(self.filtered(|s| matches!(s.paid_through, Some(paid) if paid <= date)))
    }

    async fn find_past_due_without_expiry(&self, date: NaiveDate) -> DbResult<Vec<Subscription>> {
        Ok(self.filtered(|s| {
            s.expire_on.is_none() && matches!(s.paid_through, Some(paid) if paid < date)
        }))
    }

    async fn find_expired(&self, date: NaiveDate) -> DbResult<Vec<Subscription>> {
        Ok(self.filtered(|s| matches!(s.expire_on, Some(expire) if expire <= date)))
    }

    async fn max_last_transaction_at(&self) -> DbResult<Option<DateTime<Utc>>> {
        Ok(self
            .subscriptions
            .iter()
            .filter_map(|r| r.value().last_transaction_at)
            .max())
    }

    async fn create(&self, sub: Subscription) -> DbResult<Subscription> {
        self.subscriptions.insert(sub.id, sub.clone());
        Ok(sub)
    }

    async fn update(&self, sub: &Subscription) -> DbResult<()> {
        match self.subscriptions.get_mut(&sub.id) {
            Some(mut existing) => {
                *existing = sub.clone();
                Ok(())
            }
            None => Err(DbError::NotFound),
        }
    }

    async fn set_expire_on_if_unset(
        &self,
        id: SubscriptionId,
        expire_on: NaiveDate,
    ) -> DbResult<bool> {
        // get_mut holds the shard write lock, making the check-and-set atomic
        let mut sub = self.subscriptions.get_mut(&id).ok_or(DbError::NotFound)?;
        if sub.expire_on.is_some() {
            return Ok(false);
        }
        sub.expire_on = Some(expire_on);
        Ok(true)
    }

    async fn delete(&self, id: SubscriptionId) -> DbResult<()> {
        self.subscriptions.remove(&id);
        Ok(())
    }
}

/// In-memory coupon and redemption repository
#[derive(Default, Clone)]
pub struct MemoryCouponRepository {
    coupons: Arc<DashMap<CouponId, Coupon>>,
    redemptions: Arc<DashMap<RedemptionId, CouponRedemption>>,
}

impl MemoryCouponRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CouponRepository for MemoryCouponRepository {
    async fn find_by_id(&self, id: CouponId) -> DbResult<Option<Coupon>> {
        Ok(self.coupons.get(&id).map(|r| r.value().clone()))
    }

    async fn find_by_key(&self, key: &str) -> DbResult<Option<Coupon>> {
        let key = key.to_lowercase();
        Ok(self
            .coupons
            .iter()
            .find(|r| r.value().redemption_key.as_deref() == Some(key.as_str()))
            .map(|r| r.value().clone()))
    }

    async fn create(&self, coupon: Coupon) -> DbResult<Coupon> {
        if let Some(ref key) = coupon.redemption_key {
            if self.find_by_key(key).await?.is_some() {
                return Err(DbError::Conflict(format!(
                    "redemption key {key} already taken"
                )));
            }
        }
        self.coupons.insert(coupon.id, coupon.clone());
        Ok(coupon)
    }

    async fn delete(&self, id: CouponId) -> DbResult<()> {
        self.coupons.remove(&id);
        self.redemptions.retain(|_, r| r.coupon_id != id);
        Ok(())
    }

    async fn redemption_count(&self, coupon_id: CouponId) -> DbResult<u64> {
        Ok(self
            .redemptions
            .iter()
            .filter(|r| r.value().coupon_id == coupon_id)
            .count() as u64)
    }

    async fn redemptions_for_subscription(
        &self,
        subscription_id: SubscriptionId,
    ) -> DbResult<Vec<CouponRedemption>> {
        let mut redemptions: Vec<CouponRedemption> = self
            .redemptions
            .iter()
            .filter(|r| r.value().subscription_id == subscription_id)
            .map(|r| r.value().clone())
            .collect();
        redemptions.sort_by_key(|r| r.id);
        Ok(redemptions)
    }

    async fn create_redemption(
        &self,
        redemption: CouponRedemption,
    ) -> DbResult<CouponRedemption> {
        let duplicate = self.redemptions.iter().any(|r| {
            r.value().subscription_id == redemption.subscription_id
                && r.value().coupon_id == redemption.coupon_id
        });
        if duplicate {
            return Err(DbError::Conflict(
                "coupon has already been applied".to_string(),
            ));
        }
        self.redemptions.insert(redemption.id, redemption.clone());
        Ok(redemption)
    }

    async fn expire_redemption(&self, id: RedemptionId, on: NaiveDate) -> DbResult<()> {
        let mut redemption = self.redemptions.get_mut(&id).ok_or(DbError::NotFound)?;
        redemption.expired_on = Some(on);
        Ok(())
    }
}

/// In-memory transaction repository
#[derive(Default, Clone)]
pub struct MemoryTransactionRepository {
    transactions: Arc<DashMap<TransactionId, Transaction>>,
}

impl MemoryTransactionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransactionRepository for MemoryTransactionRepository {
    async fn create(&self, transaction: Transaction) -> DbResult<Transaction> {
        self.transactions
            .insert(transaction.id, transaction.clone());
        Ok(transaction)
    }

    async fn append_message(&self, id: TransactionId, message: &str) -> DbResult<()> {
        let mut transaction = self.transactions.get_mut(&id).ok_or(DbError::NotFound)?;
        transaction.message = Some(match transaction.message.take() {
            Some(existing) => format!("{existing}; {message}"),
            None => message.to_string(),
        });
        Ok(())
    }

    async fn since(&self, since: DateTime<Utc>) -> DbResult<Vec<Transaction>> {
        let mut transactions: Vec<Transaction> = self
            .transactions
            .iter()
            .filter(|r| r.value().created_at >= since)
            .map(|r| r.value().clone())
            .collect();
        transactions.sort_by_key(|t| t.created_at);
        Ok(transactions)
    }

    async fn for_subscription(&self, id: SubscriptionId) -> DbResult<Vec<Transaction>> {
        let mut transactions: Vec<Transaction> = self
            .transactions
            .iter()
            .filter(|r| r.value().subscription_id == id)
            .map(|r| r.value().clone())
            .collect();
        transactions.sort_by_key(|t| t.created_at);
        Ok(transactions)
    }
}

/// In-memory append-only change log
#[derive(Default, Clone)]
pub struct MemoryChangeLog {
    records: Arc<DashMap<usize, ChangeRecord>>,
    seq: Arc<std::sync::atomic::AtomicUsize>,
}

impl MemoryChangeLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChangeLogRepository for MemoryChangeLog {
    async fn append(&self, record: ChangeRecord) -> DbResult<ChangeRecord> {
        let seq = self.seq.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.records.insert(seq, record.clone());
        Ok(record)
    }

    async fn for_owner(&self, owner: &OwnerRef) -> DbResult<Vec<ChangeRecord>> {
        let mut seqs: Vec<usize> = self
            .records
            .iter()
            .filter(|r| &r.value().owner == owner)
            .map(|r| *r.key())
            .collect();
        seqs.sort_unstable();
        Ok(seqs
            .into_iter()
            .filter_map(|seq| self.records.get(&seq).map(|r| r.value().clone()))
            .collect())
    }
}

/// Bundle of all in-memory repositories sharing no state
#[derive(Default, Clone)]
pub struct MemoryStore {
    pub plans: MemoryPlanRepository,
    pub subscriptions: MemorySubscriptionRepository,
    pub coupons: MemoryCouponRepository,
    pub transactions: MemoryTransactionRepository,
    pub changes: MemoryChangeLog,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}
