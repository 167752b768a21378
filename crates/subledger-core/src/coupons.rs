//! Coupon ledger
//!
//! Owns coupon definitions and redemption records. At most one coupon
//! discounts a subscription at a time; when several redemptions overlap,
//! the deepest discount wins and discounts never stack.

use chrono::NaiveDate;
use std::cmp::Reverse;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use subledger_db::CouponRepository;
use subledger_types::{Coupon, CouponRedemption, Money, Plan, RedemptionId, Subscription};

use crate::error::{BillingError, ValidationError};
use crate::rates;

/// Coupon and redemption service
#[derive(Clone)]
pub struct CouponLedger {
    coupons: Arc<dyn CouponRepository>,
}

impl CouponLedger {
    pub fn new(coupons: Arc<dyn CouponRepository>) -> Self {
        Self { coupons }
    }

    /// Register a coupon after validating its discount
    pub async fn create_coupon(&self, coupon: Coupon) -> Result<Coupon, BillingError> {
        if coupon.discount_percentage == 0 || coupon.discount_percentage > 100 {
            return Err(ValidationError::InvalidDiscountPercentage(
                coupon.discount_percentage,
            )
            .into());
        }
        Ok(self.coupons.create(coupon).await?)
    }

    /// The redemption in effect for a subscription on `date`, with its
    /// coupon
    ///
    /// Among redemptions whose window contains `date`, the highest discount
    /// wins; ties break toward the lowest redemption id so the winner is
    /// stable across calls.
    pub async fn active_redemption(
        &self,
        subscription: &Subscription,
        date: NaiveDate,
    ) -> Result<Option<(CouponRedemption, Coupon)>, BillingError> {
        let redemptions = self
            .coupons
            .redemptions_for_subscription(subscription.id)
            .await?;

        let mut candidates = Vec::new();
        for redemption in redemptions {
            let Some(coupon) = self.coupons.find_by_id(redemption.coupon_id).await? else {
                continue;
            };
            if redemption.active_on(date, coupon.duration_in_months) {
                candidates.push((redemption, coupon));
            }
        }

        Ok(candidates
            .into_iter()
            .max_by_key(|(redemption, coupon)| (coupon.discount_percentage, Reverse(redemption.id))))
    }

    /// The coupon discounting a subscription on `date`, if any
    pub async fn active_coupon(
        &self,
        subscription: &Subscription,
        date: NaiveDate,
    ) -> Result<Option<Coupon>, BillingError> {
        Ok(self
            .active_redemption(subscription, date)
            .await?
            .map(|(_, coupon)| coupon))
    }

    /// The monthly rate a subscription is actually billed on `date`
    pub async fn effective_rate(
        &self,
        subscription: &Subscription,
        plan: &Plan,
        date: NaiveDate,
    ) -> Result<Money, BillingError> {
        let coupon = self.active_coupon(subscription, date).await?;
        Ok(rates::effective_rate(plan, coupon.as_ref()))
    }

    /// The daily rate a subscription is actually billed on `date`
    pub async fn effective_daily_rate(
        &self,
        subscription: &Subscription,
        plan: &Plan,
        date: NaiveDate,
    ) -> Result<Money, BillingError> {
        let coupon = self.active_coupon(subscription, date).await?;
        Ok(rates::daily_rate(plan, coupon.as_ref()))
    }

    /// Whether a coupon accepts no further redemptions
    pub async fn is_expired(&self, coupon: &Coupon, date: NaiveDate) -> Result<bool, BillingError> {
        if matches!(coupon.redemption_expiration, Some(expiration) if date > expiration) {
            return Ok(true);
        }
        if let Some(limit) = coupon.redemption_limit {
            if self.coupons.redemption_count(coupon.id).await? >= u64::from(limit) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Redeem a coupon by key for a subscription
    ///
    /// Validation order is fixed: unknown key, then exhausted or expired
    /// coupon, then plan eligibility, then the paid-plan requirement, then
    /// duplicates.
    #[instrument(skip(self, subscription, plan), fields(subscription_id = %subscription.id, key = %key))]
    pub async fn redeem(
        &self,
        subscription: &Subscription,
        plan: &Plan,
        key: &str,
        date: NaiveDate,
    ) -> Result<CouponRedemption, BillingError> {
        let coupon = self
            .coupons
            .find_by_key(key)
            .await?
            .ok_or(ValidationError::CouponNotFound)?;
        if self.is_expired(&coupon, date).await? {
            return Err(ValidationError::CouponExpired.into());
        }
        if !coupon.applies_to_plan(plan.id) {
            return Err(ValidationError::PlanNotEligible.into());
        }
        if plan.is_free() {
            return Err(ValidationError::SubscriptionUnpaid.into());
        }
        let already_redeemed = self
            .coupons
            .redemptions_for_subscription(subscription.id)
            .await?
            .iter()
            .any(|r| r.coupon_id == coupon.id);
        if already_redeemed {
            return Err(ValidationError::DuplicateRedemption.into());
        }

        let redemption = self
            .coupons
            .create_redemption(CouponRedemption::new(subscription.id, coupon.id, date))
            .await
            .map_err(|err| match err {
                subledger_db::DbError::Conflict(_) => {
                    BillingError::from(ValidationError::DuplicateRedemption)
                }
                other => other.into(),
            })?;

        info!(
            coupon_id = %coupon.id.0,
            discount = coupon.discount_percentage,
            "coupon redeemed"
        );
        Ok(redemption)
    }

    /// Terminate a redemption early; the rate reverts to the undiscounted
    /// plan rate from `date` on
    pub async fn expire_redemption(
        &self,
        id: RedemptionId,
        date: NaiveDate,
    ) -> Result<(), BillingError> {
        self.coupons.expire_redemption(id, date).await?;
        debug!(redemption_id = %id.0, "redemption terminated");
        Ok(())
    }
}
