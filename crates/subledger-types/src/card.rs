//! Card details handed to the gateway when storing a payment method
//!
//! The engine never persists a card number; after a successful offsite
//! store only the masked form and the gateway's billing key remain.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Card validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CardError {
    /// Cardholder name missing
    #[error("cardholder name cannot be empty")]
    MissingName,

    /// Number fails length or checksum validation
    #[error("not a valid card number")]
    InvalidNumber,

    /// Number doesn't match any known brand
    #[error("unknown card brand")]
    UnknownBrand,

    /// Expiration month outside 1..=12
    #[error("{0} is not a valid month")]
    InvalidMonth(u32),

    /// Card already expired
    #[error("card has expired")]
    Expired,
}

/// Known card brands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardBrand {
    Visa,
    Mastercard,
    Amex,
    Discover,
}

/// Billing address passed through to the gateway alongside a card
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Address {
    /// Postal code
    pub zip: Option<String>,
    /// ISO country code
    pub country: Option<String>,
}

/// Raw card details, held only long enough to store offsite
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardDetails {
    /// Card number, digits only
    pub number: String,
    /// Expiration month, 1..=12
    pub exp_month: u32,
    /// Expiration year, four digits
    pub exp_year: i32,
    /// Cardholder name
    pub holder_name: String,
}

impl CardDetails {
    /// Create card details, stripping non-digits from the number
    pub fn new(
        number: impl Into<String>,
        exp_month: u32,
        exp_year: i32,
        holder_name: impl Into<String>,
    ) -> Self {
        let number: String = number.into().chars().filter(char::is_ascii_digit).collect();
        Self {
            number,
            exp_month,
            exp_year,
            holder_name: holder_name.into(),
        }
    }

    /// Detect the card brand from the number prefix
    pub fn brand(&self) -> Option<CardBrand> {
        let n = self.number.as_str();
        if n.starts_with('4') && (n.len() == 13 || n.len() == 16) {
            Some(CardBrand::Visa)
        } else if n.len() == 16 && matches!(&n[..2], "51" | "52" | "53" | "54" | "55") {
            Some(CardBrand::Mastercard)
        } else if n.len() == 15 && matches!(&n[..2], "34" | "37") {
            Some(CardBrand::Amex)
        } else if n.len() == 16 && (n.starts_with("6011") || n.starts_with("65")) {
            Some(CardBrand::Discover)
        } else {
            None
        }
    }

    /// Luhn checksum validation
    pub fn valid_checksum(&self) -> bool {
        if self.number.len() < 12 {
            return false;
        }
        let sum: u32 = self
            .number
            .chars()
            .rev()
            .filter_map(|c| c.to_digit(10))
            .enumerate()
            .map(|(i, d)| {
                if i % 2 == 1 {
                    let doubled = d * 2;
                    if doubled > 9 {
                        doubled - 9
                    } else {
                        doubled
                    }
                } else {
                    d
                }
            })
            .sum();
        sum % 10 == 0
    }

    /// Last four digits of the number
    pub fn last_digits(&self) -> &str {
        let len = self.number.len();
        &self.number[len.saturating_sub(4)..]
    }

    /// Masked form safe to persist, e.g. `XXXX-XXXX-XXXX-4242`
    pub fn masked(&self) -> String {
        format!("XXXX-XXXX-XXXX-{}", self.last_digits())
    }

    /// Whether the card has expired as of `today`
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        (self.exp_year, self.exp_month) < (today.year(), today.month())
    }

    /// Validate the essential attributes before any gateway call
    pub fn validate(&self, today: NaiveDate) -> Result<(), CardError> {
        if self.holder_name.trim().is_empty() {
            return Err(CardError::MissingName);
        }
        if !(1..=12).contains(&self.exp_month) {
            return Err(CardError::InvalidMonth(self.exp_month));
        }
        if self.is_expired(today) {
            return Err(CardError::Expired);
        }
        if !self.valid_checksum() {
            return Err(CardError::InvalidNumber);
        }
        if self.brand().is_none() {
            return Err(CardError::UnknownBrand);
        }
        Ok(())
    }

    /// A well-known test card accepted by gateway sandboxes
    pub fn sample() -> Self {
        Self::new("4111 1111 1111 1111", 12, 2030, "Pat Example")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 15).unwrap()
    }

    #[test]
    fn test_sample_card_is_valid() {
        let card = CardDetails::sample();
        assert_eq!(card.brand(), Some(CardBrand::Visa));
        assert!(card.valid_checksum());
        assert!(card.validate(today()).is_ok());
    }

    #[test]
    fn test_masking() {
        let card = CardDetails::sample();
        assert_eq!(card.last_digits(), "1111");
        assert_eq!(card.masked(), "XXXX-XXXX-XXXX-1111");
    }

    #[test]
    fn test_checksum_rejects_typos() {
        let card = CardDetails::new("4111111111111112", 12, 2030, "Pat Example");
        assert!(!card.valid_checksum());
        assert_eq!(card.validate(today()), Err(CardError::InvalidNumber));
    }

    #[test]
    fn test_expired_card() {
        let card = CardDetails::new("4111111111111111", 2, 2026, "Pat Example");
        assert!(card.is_expired(today()));
        assert_eq!(card.validate(today()), Err(CardError::Expired));
    }

    #[test]
    fn test_brand_detection() {
        let mastercard = CardDetails::new("5555555555554444", 12, 2030, "Pat");
        assert_eq!(mastercard.brand(), Some(CardBrand::Mastercard));
        let amex = CardDetails::new("378282246310005", 12, 2030, "Pat");
        assert_eq!(amex.brand(), Some(CardBrand::Amex));
    }
}
