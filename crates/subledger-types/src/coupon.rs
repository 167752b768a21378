//! Discount coupons and their redemptions

use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::{Money, PlanId, SubscriptionId};

/// Unique coupon identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CouponId(pub Uuid);

impl CouponId {
    /// Create a new random coupon ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CouponId {
    fn default() -> Self {
        Self::new()
    }
}

/// A percentage discount coupon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coupon {
    /// Coupon ID
    pub id: CouponId,
    /// Human-readable description, e.g. "30% off"
    pub description: String,
    /// Discount applied to the plan rate, 1..=100
    pub discount_percentage: u8,
    /// Optional self-serve redemption code; stored lowercase, matched
    /// case-insensitively
    pub redemption_key: Option<String>,
    /// Maximum number of redemptions across all subscriptions
    pub redemption_limit: Option<u32>,
    /// Date after which no new redemptions are accepted
    pub redemption_expiration: Option<NaiveDate>,
    /// How long a redemption stays active; `None` means perpetual
    pub duration_in_months: Option<u32>,
    /// Plans the coupon is limited to; empty means all plans
    pub restricted_plans: HashSet<PlanId>,
}

impl Coupon {
    /// Create a coupon; the redemption key is normalized to lowercase here
    pub fn new(description: impl Into<String>, discount_percentage: u8) -> Self {
        Self {
            id: CouponId::new(),
            description: description.into(),
            discount_percentage,
            redemption_key: None,
            redemption_limit: None,
            redemption_expiration: None,
            duration_in_months: None,
            restricted_plans: HashSet::new(),
        }
    }

    /// Set the redemption key, normalized to lowercase
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.redemption_key = Some(key.into().to_lowercase());
        self
    }

    /// Cap the number of redemptions
    pub fn with_redemption_limit(mut self, limit: u32) -> Self {
        self.redemption_limit = Some(limit);
        self
    }

    /// Stop accepting new redemptions after this date
    pub fn with_redemption_expiration(mut self, date: NaiveDate) -> Self {
        self.redemption_expiration = Some(date);
        self
    }

    /// Limit how long a redemption stays active
    pub fn with_duration_in_months(mut self, months: u32) -> Self {
        self.duration_in_months = Some(months);
        self
    }

    /// Restrict the coupon to a plan
    pub fn restricted_to(mut self, plan_id: PlanId) -> Self {
        self.restricted_plans.insert(plan_id);
        self
    }

    /// Apply the discount to a rate, truncating toward zero
    pub fn discount(&self, rate: Money) -> Money {
        rate.discount_percent(self.discount_percentage)
    }

    /// Whether the coupon applies to the given plan
    pub fn applies_to_plan(&self, plan_id: PlanId) -> bool {
        self.restricted_plans.is_empty() || self.restricted_plans.contains(&plan_id)
    }
}

/// Unique redemption identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RedemptionId(pub Uuid);

impl RedemptionId {
    /// Create a new random redemption ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RedemptionId {
    fn default() -> Self {
        Self::new()
    }
}

/// The application of a coupon to a subscription
///
/// At most one redemption may exist per (subscription, coupon) pair. Its
/// validity window is independent of the coupon's own limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouponRedemption {
    /// Redemption ID
    pub id: RedemptionId,
    /// Subscription the coupon was applied to
    pub subscription_id: SubscriptionId,
    /// The redeemed coupon
    pub coupon_id: CouponId,
    /// Set once at creation
    pub redeemed_on: NaiveDate,
    /// Explicit early termination date, if any
    pub expired_on: Option<NaiveDate>,
}

impl CouponRedemption {
    /// Create a redemption effective on `redeemed_on`
    pub fn new(
        subscription_id: SubscriptionId,
        coupon_id: CouponId,
        redeemed_on: NaiveDate,
    ) -> Self {
        Self {
            id: RedemptionId::new(),
            subscription_id,
            coupon_id,
            redeemed_on,
            expired_on: None,
        }
    }

    /// End of the validity window given the coupon's duration, exclusive;
    /// `None` means the redemption is perpetual
    pub fn expires_on(&self, duration_in_months: Option<u32>) -> Option<NaiveDate> {
        duration_in_months.map(|months| self.redeemed_on + Months::new(months))
    }

    /// Whether the redemption is in effect on `date`
    ///
    /// The window is `[redeemed_on, redeemed_on + duration)`; an explicitly
    /// terminated redemption is never active.
    pub fn active_on(&self, date: NaiveDate, duration_in_months: Option<u32>) -> bool {
        if self.expired_on.is_some() || date < self.redeemed_on {
            return false;
        }
        match self.expires_on(duration_in_months) {
            Some(expires_on) => date < expires_on,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 15).unwrap()
    }

    #[test]
    fn test_discount() {
        let coupon = Coupon::new("30% off", 30);
        assert_eq!(coupon.discount(Money::from_cents(1000)).cents(), 700);

        let comp = Coupon::new("Complimentary", 100);
        assert_eq!(comp.discount(Money::from_cents(3041)).cents(), 0);
    }

    #[test]
    fn test_key_normalized_to_lowercase() {
        let coupon = Coupon::new("30% off", 30).with_key("30OFF");
        assert_eq!(coupon.redemption_key.as_deref(), Some("30off"));
    }

    #[test]
    fn test_plan_restriction() {
        let premium = PlanId::new();
        let basic = PlanId::new();
        let unrestricted = Coupon::new("any", 10);
        assert!(unrestricted.applies_to_plan(premium));

        let restricted = Coupon::new("premium only", 10).restricted_to(premium);
        assert!(restricted.applies_to_plan(premium));
        assert!(!restricted.applies_to_plan(basic));
    }

    #[test]
    fn test_redemption_window() {
        let redemption = CouponRedemption::new(SubscriptionId::new(), CouponId::new(), today());

        // perpetual without a duration
        assert!(redemption.active_on(today() + chrono::Duration::days(4000), None));

        // three-month window is half-open
        let duration = Some(3);
        assert!(redemption.active_on(today(), duration));
        assert!(redemption.active_on(today() + Months::new(3) - chrono::Duration::days(1), duration));
        assert!(!redemption.active_on(today() + Months::new(3), duration));
        assert!(!redemption.active_on(today() - chrono::Duration::days(1), duration));
    }

    #[test]
    fn test_terminated_redemption_is_inactive() {
        let mut redemption = CouponRedemption::new(SubscriptionId::new(), CouponId::new(), today());
        redemption.expired_on = Some(today());
        assert!(!redemption.active_on(today(), None));
    }
}
