//! Subscription lifecycle
//!
//! Advances and retracts the paid-through date as payments and plan
//! changes arrive, schedules the grace period, and retires subscriptions
//! whose grace has run out. Every operation takes an explicit date; the
//! engine never reads a clock of its own.

use chrono::{Duration, Months, NaiveDate};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use subledger_db::{
    ChangeLogRepository, CouponRepository, PlanRepository, SubscriptionRepository,
};
use subledger_types::{
    Address, CardDetails, ChangeReason, Money, OwnerRef, Plan, PlanId, Subscription,
    SubscriptionId, SubscriptionStatus,
};

use crate::audit::ChangeAuditor;
use crate::config::BillingConfig;
use crate::coupons::CouponLedger;
use crate::error::{BillingError, ValidationError};
use crate::gateway::Gateway;
use crate::notifier::{Notifier, NotifyError};

/// Subscription lifecycle service
///
/// Holds the repositories, the coupon ledger, the change auditor, and the
/// gateway and notifier collaborators. Cheap to clone.
#[derive(Clone)]
pub struct BillingCycleManager {
    plans: Arc<dyn PlanRepository>,
    subscriptions: Arc<dyn SubscriptionRepository>,
    coupons: CouponLedger,
    auditor: ChangeAuditor,
    gateway: Arc<dyn Gateway>,
    notifier: Arc<dyn Notifier>,
    config: BillingConfig,
}

impl BillingCycleManager {
    pub fn new(
        plans: Arc<dyn PlanRepository>,
        subscriptions: Arc<dyn SubscriptionRepository>,
        coupons: Arc<dyn CouponRepository>,
        changes: Arc<dyn ChangeLogRepository>,
        gateway: Arc<dyn Gateway>,
        notifier: Arc<dyn Notifier>,
        config: BillingConfig,
    ) -> Self {
        Self {
            plans,
            subscriptions,
            coupons: CouponLedger::new(coupons),
            auditor: ChangeAuditor::new(changes),
            gateway,
            notifier,
            config,
        }
    }

    /// The coupon ledger sharing this manager's repository
    pub fn coupons(&self) -> &CouponLedger {
        &self.coupons
    }

    /// The change auditor sharing this manager's repository
    pub fn auditor(&self) -> &ChangeAuditor {
        &self.auditor
    }

    pub fn config(&self) -> &BillingConfig {
        &self.config
    }

    /// Create a subscription
    ///
    /// A paid plan requires valid card details; the card is stored offsite
    /// before the subscription persists, and a rejected card aborts the
    /// whole operation. The paid-through date starts at the end of the
    /// configured free trial (the creation date itself when there is none).
    #[instrument(skip(self, card, address), fields(owner = %owner, plan_id = %plan_id))]
    pub async fn subscribe(
        &self,
        owner: OwnerRef,
        plan_id: PlanId,
        card: Option<&CardDetails>,
        address: Option<&Address>,
        date: NaiveDate,
    ) -> Result<Subscription, BillingError> {
        let plan = self.require_plan(plan_id).await?;
        let mut sub = Subscription::new(owner, plan_id, date);

        if plan.is_paid() {
            let card = card.ok_or(ValidationError::MissingCreditCard)?;
            card.validate(date).map_err(ValidationError::from)?;

            let response = self.gateway.store(card, address).await?;
            let billing_key = match (response.success, response.billing_key) {
                (true, Some(key)) => key,
                _ => {
                    return Err(BillingError::CardStorage(
                        response
                            .message
                            .unwrap_or_else(|| "card was not accepted".to_string()),
                    ))
                }
            };
            sub.billing_key = Some(billing_key);
            sub.card_ref = Some(card.masked());
            sub.paid_through = Some(date + Duration::days(i64::from(self.config.days_free_trial)));
            sub.in_trial = self.config.days_free_trial > 0;
        }

        let sub = self.subscriptions.create(sub).await?;
        self.auditor
            .record(
                ChangeReason::New,
                &sub.owner,
                None,
                Some(plan.id),
                Money::ZERO,
                plan.rate,
            )
            .await?;
        info!(subscription_id = %sub.id, in_trial = sub.in_trial, "subscription created");
        Ok(sub)
    }

    /// Move a subscription to another plan
    ///
    /// Moving to the same plan is a no-op. Moving to a free plan tears down
    /// the stored card and remote billing key. Moving between paid plans
    /// outside a trial prorates: the value of the remaining paid days
    /// becomes a credit at the new plan's rate. Trial or free time earns no
    /// credit.
    #[instrument(skip(self), fields(subscription_id = %id, new_plan_id = %new_plan_id))]
    pub async fn change_plan(
        &self,
        id: SubscriptionId,
        new_plan_id: PlanId,
        date: NaiveDate,
    ) -> Result<Subscription, BillingError> {
        let mut sub = self.require_subscription(id).await?;
        if sub.plan_id == new_plan_id {
            return Ok(sub);
        }
        let old_plan = self.require_plan(sub.plan_id).await?;
        let new_plan = self.require_plan(new_plan_id).await?;

        // rate moves decide the audit reason; a sideways move counts as an
        // upgrade
        let reason = if new_plan.rate < old_plan.rate {
            if sub.is_expired(date) {
                ChangeReason::Expiration
            } else {
                ChangeReason::Downgrade
            }
        } else {
            ChangeReason::Upgrade
        };

        if new_plan.is_free() {
            self.release_billing_key(&mut sub).await;
            sub.paid_through = None;
            sub.expire_on = None;
            sub.in_trial = false;
        } else {
            if sub.billing_key.is_none() {
                return Err(ValidationError::MissingCreditCard.into());
            }
            let prorate = old_plan.is_paid() && !sub.in_trial && sub.paid_through.is_some();
            if prorate {
                let old_daily = self
                    .coupons
                    .effective_daily_rate(&sub, &old_plan, date)
                    .await?;
                let remaining_days = sub.remaining_days(date).max(0);
                let remaining_value = old_daily * remaining_days;
                sub.paid_through = Some(date);
                self.apply_credit(&mut sub, &new_plan, remaining_value, date)
                    .await?;
            } else {
                sub.paid_through = Some(date);
                sub.in_trial = false;
                sub.expire_on = None;
            }
        }
        sub.plan_id = new_plan_id;
        sub.started_on = date;
        self.subscriptions.update(&sub).await?;

        self.auditor
            .record(
                reason,
                &sub.owner,
                Some(old_plan.id),
                Some(new_plan.id),
                old_plan.rate,
                new_plan.rate,
            )
            .await?;
        info!(reason = %reason, "plan changed");
        Ok(sub)
    }

    /// Apply a payment's value to a subscription
    ///
    /// An amount that is a whole multiple of the effective monthly rate
    /// extends the paid-through date by that many calendar months; anything
    /// else extends it by the amount's worth of days. Either way the grace
    /// deadline is lifted and any trial ends. An invoice goes out through
    /// the notifier; delivery failure is logged, never fatal.
    #[instrument(skip(self), fields(subscription_id = %id, amount = %amount))]
    pub async fn credit(
        &self,
        id: SubscriptionId,
        amount: Money,
        date: NaiveDate,
    ) -> Result<Subscription, BillingError> {
        let (sub, delivery) = self.credit_and_invoice(id, amount, date).await?;
        if let Some(err) = delivery {
            warn!(error = %err, "invoice delivery failed");
        }
        Ok(sub)
    }

    /// Like [`credit`](Self::credit), but hands any invoice-delivery
    /// failure back to the caller so a billing run can record it on the
    /// transaction
    pub(crate) async fn credit_and_invoice(
        &self,
        id: SubscriptionId,
        amount: Money,
        date: NaiveDate,
    ) -> Result<(Subscription, Option<NotifyError>), BillingError> {
        let mut sub = self.require_subscription(id).await?;
        let plan = self.require_plan(sub.plan_id).await?;
        self.apply_credit(&mut sub, &plan, amount, date).await?;
        self.subscriptions.update(&sub).await?;
        info!(paid_through = ?sub.paid_through, "payment credited");

        let delivery = self.notifier.send_invoice(&sub.owner, &sub, amount).await.err();
        Ok((sub, delivery))
    }

    /// Schedule loss of service after the grace period
    ///
    /// Compare-and-set: if a deadline is already scheduled this is a no-op
    /// and returns `None`, so retries and overlapping billing runs can
    /// never push the deadline out. Otherwise the deadline lands
    /// `days_grace` after the paid-through date (or after `date`, whichever
    /// is later) and an expiration warning goes out.
    pub async fn expire_after_grace(
        &self,
        sub: &Subscription,
        date: NaiveDate,
    ) -> Result<Option<NaiveDate>, BillingError> {
        let base = match sub.paid_through {
            Some(paid_through) if paid_through > date => paid_through,
            _ => date,
        };
        let expire_on = base + Duration::days(i64::from(self.config.days_grace));
        if !self
            .subscriptions
            .set_expire_on_if_unset(sub.id, expire_on)
            .await?
        {
            return Ok(None);
        }
        info!(subscription_id = %sub.id, expire_on = %expire_on, "grace period started");

        if let Err(err) = self.notifier.send_expiration_warning(&sub.owner, sub).await {
            warn!(error = %err, "expiration warning delivery failed");
        }
        Ok(Some(expire_on))
    }

    /// Retire a subscription whose grace deadline has arrived
    ///
    /// A no-op unless `expire_on <= date`. Tears down the stored card and
    /// remote billing key, moves to the configured fallback plan when one
    /// is set (the plan stays put otherwise), records the expiration, and
    /// sends the expiration notice.
    #[instrument(skip(self, sub), fields(subscription_id = %sub.id))]
    pub async fn expire(
        &self,
        sub: &Subscription,
        date: NaiveDate,
    ) -> Result<Subscription, BillingError> {
        let mut sub = self.require_subscription(sub.id).await?;
        if !sub.is_expired(date) {
            return Ok(sub);
        }
        let old_plan = self.require_plan(sub.plan_id).await?;
        let fallback = match self.config.expired_plan {
            Some(plan_id) => Some(self.require_plan(plan_id).await?),
            None => None,
        };

        self.release_billing_key(&mut sub).await;
        if let Some(plan) = &fallback {
            sub.plan_id = plan.id;
            sub.started_on = date;
            sub.paid_through = if plan.is_paid() { Some(date) } else { None };
        }
        sub.in_trial = false;
        self.subscriptions.update(&sub).await?;

        let final_plan = fallback.as_ref().unwrap_or(&old_plan);
        self.auditor
            .record(
                ChangeReason::Expiration,
                &sub.owner,
                Some(old_plan.id),
                Some(final_plan.id),
                old_plan.rate,
                final_plan.rate,
            )
            .await?;
        info!("subscription expired");

        if let Err(err) = self.notifier.send_expiration_notice(&sub.owner, &sub).await {
            warn!(error = %err, "expiration notice delivery failed");
        }
        Ok(sub)
    }

    /// Delete a subscription as of `date`, releasing its remote billing key
    #[instrument(skip(self), fields(subscription_id = %id, date = %date))]
    pub async fn cancel(&self, id: SubscriptionId, date: NaiveDate) -> Result<(), BillingError> {
        let mut sub = self.require_subscription(id).await?;
        let plan = self.require_plan(sub.plan_id).await?;

        self.release_billing_key(&mut sub).await;
        self.subscriptions.delete(sub.id).await?;
        self.auditor
            .record(
                ChangeReason::Cancellation,
                &sub.owner,
                Some(plan.id),
                None,
                plan.rate,
                Money::ZERO,
            )
            .await?;
        info!("subscription canceled");
        Ok(())
    }

    /// Store or replace the card behind a subscription
    ///
    /// The card is validated locally, then stored (or updated, when a
    /// billing key already exists) offsite. A rejected card aborts the
    /// save. Success records the returned billing key and lifts any grace
    /// deadline, since the subscriber has shown a billable card again.
    #[instrument(skip(self, card, address), fields(subscription_id = %id))]
    pub async fn store_card(
        &self,
        id: SubscriptionId,
        card: &CardDetails,
        address: Option<&Address>,
        date: NaiveDate,
    ) -> Result<Subscription, BillingError> {
        let mut sub = self.require_subscription(id).await?;
        card.validate(date).map_err(ValidationError::from)?;

        let response = match &sub.billing_key {
            Some(key) => self.gateway.update(key, card, address).await?,
            None => self.gateway.store(card, address).await?,
        };
        if !response.success {
            return Err(BillingError::CardStorage(
                response
                    .message
                    .unwrap_or_else(|| "card was not accepted".to_string()),
            ));
        }
        if let Some(key) = response.billing_key {
            sub.billing_key = Some(key);
        }
        sub.card_ref = Some(card.masked());
        sub.expire_on = None;
        self.subscriptions.update(&sub).await?;
        info!(card = %card.masked(), "card stored");
        Ok(sub)
    }

    /// Derived lifecycle state of a subscription on `date`
    pub async fn status(
        &self,
        sub: &Subscription,
        date: NaiveDate,
    ) -> Result<SubscriptionStatus, BillingError> {
        let plan = self.require_plan(sub.plan_id).await?;
        Ok(sub.status(plan.is_paid(), date))
    }

    async fn require_plan(&self, id: PlanId) -> Result<Plan, BillingError> {
        Ok(self
            .plans
            .find_by_id(id)
            .await?
            .ok_or(ValidationError::PlanNotFound)?)
    }

    async fn require_subscription(&self, id: SubscriptionId) -> Result<Subscription, BillingError> {
        Ok(self
            .subscriptions
            .find_by_id(id)
            .await?
            .ok_or(ValidationError::SubscriptionNotFound)?)
    }

    /// Extend `paid_through` by the given amount at the plan's effective
    /// rate; lifts the grace deadline and ends any trial
    async fn apply_credit(
        &self,
        sub: &mut Subscription,
        plan: &Plan,
        amount: Money,
        date: NaiveDate,
    ) -> Result<(), BillingError> {
        let monthly = self.coupons.effective_rate(sub, plan, date).await?;
        let daily = self.coupons.effective_daily_rate(sub, plan, date).await?;
        let base = sub.paid_through.unwrap_or(date);

        sub.paid_through = Some(
            if monthly.is_positive() && amount.cents() % monthly.cents() == 0 {
                base + Months::new((amount.cents() / monthly.cents()) as u32)
            } else if daily.is_positive() {
                base + Duration::days(amount.cents() / daily.cents())
            } else {
                base
            },
        );
        sub.expire_on = None;
        sub.in_trial = false;
        Ok(())
    }

    /// Cancel the remote billing key and forget the stored card; a gateway
    /// failure here is logged and the key is dropped locally anyway
    async fn release_billing_key(&self, sub: &mut Subscription) {
        if let Some(key) = sub.billing_key.take() {
            if let Err(err) = self.gateway.cancel(&key).await {
                warn!(error = %err, "gateway cancel failed; key dropped locally");
            }
        }
        sub.card_ref = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::TestGateway;
    use crate::notifier::RecordingNotifier;
    use subledger_db::MemoryStore;
    use uuid::Uuid;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 15).unwrap()
    }

    fn manager(config: BillingConfig) -> (BillingCycleManager, MemoryStore) {
        let store = MemoryStore::new();
        let manager = BillingCycleManager::new(
            Arc::new(store.plans.clone()),
            Arc::new(store.subscriptions.clone()),
            Arc::new(store.coupons.clone()),
            Arc::new(store.changes.clone()),
            Arc::new(TestGateway::new()),
            Arc::new(RecordingNotifier::new()),
            config,
        );
        (manager, store)
    }

    async fn create_plan(store: &MemoryStore, rate: i64) -> Plan {
        use subledger_db::PlanRepository;
        store
            .plans
            .create(Plan::new("plan", Money::from_cents(rate), "full"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_free_subscription_has_no_paid_through() {
        let (manager, store) = manager(BillingConfig::new());
        let plan = create_plan(&store, 0).await;

        let sub = manager
            .subscribe(OwnerRef::user(Uuid::new_v4()), plan.id, None, None, today())
            .await
            .unwrap();
        assert!(sub.paid_through.is_none());
        assert!(sub.billing_key.is_none());
        assert_eq!(
            manager.status(&sub, today()).await.unwrap(),
            SubscriptionStatus::Free
        );
    }

    #[tokio::test]
    async fn test_paid_subscription_requires_a_card() {
        let (manager, store) = manager(BillingConfig::new());
        let plan = create_plan(&store, 3041).await;

        let err = manager
            .subscribe(OwnerRef::user(Uuid::new_v4()), plan.id, None, None, today())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BillingError::Validation(ValidationError::MissingCreditCard)
        ));
    }

    #[tokio::test]
    async fn test_trial_starts_paid_through_at_trial_end() {
        let (manager, store) = manager(BillingConfig::new().with_days_free_trial(30));
        let plan = create_plan(&store, 3041).await;

        let sub = manager
            .subscribe(
                OwnerRef::user(Uuid::new_v4()),
                plan.id,
                Some(&CardDetails::sample()),
                None,
                today(),
            )
            .await
            .unwrap();
        assert!(sub.in_trial);
        assert_eq!(sub.paid_through, Some(today() + Duration::days(30)));
        assert_eq!(
            manager.status(&sub, today()).await.unwrap(),
            SubscriptionStatus::Trial
        );
    }

    #[tokio::test]
    async fn test_grace_deadline_never_moves_out() {
        let (manager, store) = manager(BillingConfig::new().with_days_grace(3));
        let plan = create_plan(&store, 3041).await;
        let mut sub = Subscription::new(OwnerRef::user(Uuid::new_v4()), plan.id, today());
        sub.paid_through = Some(today() - Duration::days(1));
        use subledger_db::SubscriptionRepository;
        let sub = store.subscriptions.create(sub).await.unwrap();

        let first = manager.expire_after_grace(&sub, today()).await.unwrap();
        assert_eq!(first, Some(today() + Duration::days(3)));

        // a later retry is a no-op
        let retry = manager
            .expire_after_grace(&sub, today() + Duration::days(2))
            .await
            .unwrap();
        assert_eq!(retry, None);
        let stored = store.subscriptions.find_by_id(sub.id).await.unwrap().unwrap();
        assert_eq!(stored.expire_on, Some(today() + Duration::days(3)));
    }
}
