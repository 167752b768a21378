//! Integer-cent monetary values
//!
//! All billing arithmetic runs on whole cents. There is deliberately no
//! constructor from a float: every amount enters the system as an integer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};

/// A monetary amount in cents
///
/// Signed so that intermediate values (an overdue subscription's remaining
/// value, for example) can go negative; callers floor at zero where the
/// domain requires it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Zero cents
    pub const ZERO: Money = Money(0);

    /// Create an amount from cents
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// The amount in cents
    pub const fn cents(self) -> i64 {
        self.0
    }

    /// Whether the amount is exactly zero
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Whether the amount is greater than zero
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Apply a percentage discount, truncating toward zero
    ///
    /// `discount_percent(30)` on 1000¢ yields 700¢. A 100% discount always
    /// yields zero.
    pub const fn discount_percent(self, percentage: u8) -> Money {
        Money(self.0 * (100 - percentage as i64) / 100)
    }

    /// Clamp negative amounts to zero
    pub const fn max_zero(self) -> Money {
        if self.0 < 0 {
            Money::ZERO
        } else {
            self
        }
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Money) {
        self.0 -= rhs.0;
    }
}

impl Mul<i64> for Money {
    type Output = Money;

    fn mul(self, rhs: i64) -> Money {
        Money(self.0 * rhs)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.abs();
        write!(f, "{sign}${}.{:02}", abs / 100, abs % 100)
    }
}
