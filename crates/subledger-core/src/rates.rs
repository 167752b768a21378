//! Rate calculation
//!
//! Pure functions from a plan and an optional active coupon to the amounts
//! billing actually charges. Monthly is the unit everything else derives
//! from: yearly is a flat twelve months, daily divides the year by 365.
//! All division truncates toward zero.

use subledger_types::{Coupon, Money, Plan};

/// The monthly rate after any active coupon discount
pub fn effective_rate(plan: &Plan, coupon: Option<&Coupon>) -> Money {
    match coupon {
        Some(coupon) => coupon.discount(plan.rate),
        None => plan.rate,
    }
}

/// Alias for [`effective_rate`]; the plan rate is already monthly
pub fn monthly_rate(plan: &Plan, coupon: Option<&Coupon>) -> Money {
    effective_rate(plan, coupon)
}

/// Twelve flat months, not calendar-accurate
pub fn yearly_rate(plan: &Plan, coupon: Option<&Coupon>) -> Money {
    effective_rate(plan, coupon) * 12
}

/// The yearly rate spread over 365 days
pub fn daily_rate(plan: &Plan, coupon: Option<&Coupon>) -> Money {
    Money::from_cents(yearly_rate(plan, coupon).cents() / 365)
}

/// Whether a rate bills at all; a 100% coupon makes a subscription unpaid
pub fn is_paid(rate: Money) -> bool {
    rate.is_positive()
}
