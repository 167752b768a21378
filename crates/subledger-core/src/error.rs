//! Billing errors

use thiserror::Error;

use subledger_types::CardError;

/// Caller-facing validation failures; never retried automatically
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// No coupon matches the given redemption key
    #[error("coupon not found")]
    CouponNotFound,

    /// Coupon past its redemption expiration or over its redemption limit
    #[error("coupon has expired")]
    CouponExpired,

    /// Coupon is restricted to other plans
    #[error("coupon is not valid for the selected plan")]
    PlanNotEligible,

    /// Coupons only apply to paid subscriptions
    #[error("subscription must be paid")]
    SubscriptionUnpaid,

    /// The subscription already redeemed this coupon
    #[error("coupon has already been applied")]
    DuplicateRedemption,

    /// Discount must be between 1 and 100 percent
    #[error("{0} is not a valid discount percentage")]
    InvalidDiscountPercentage(u8),

    /// Referenced plan does not exist
    #[error("plan not found")]
    PlanNotFound,

    /// Referenced subscription does not exist
    #[error("subscription not found")]
    SubscriptionNotFound,

    /// Paid plans require a stored card before the subscription persists
    #[error("a credit card is required for a paid plan")]
    MissingCreditCard,

    /// Card details failed validation before any gateway call
    #[error("invalid card: {0}")]
    InvalidCard(#[from] CardError),
}

/// Billing engine errors
#[derive(Error, Debug)]
pub enum BillingError {
    /// Validation failure, surfaced to the caller
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The gateway refused to store or update a card; the enclosing save
    /// aborts and the caller must retry the whole operation
    #[error("card storage failed: {0}")]
    CardStorage(String),

    /// Gateway transport failure (not a declined charge; declines are
    /// successful transactions with `success=false`)
    #[error("gateway error: {0}")]
    Gateway(String),

    /// Storage collaborator failure
    #[error("database error: {0}")]
    Database(#[from] subledger_db::DbError),
}

impl BillingError {
    /// Whether the error is a caller mistake rather than a system fault
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
