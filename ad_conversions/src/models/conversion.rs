use chrono::{DateTime, FixedOffset};
use rust_decimal::Decimal;

/// A conversion attributed through an ad click identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct ClickConversion {
    pub click_id: String,
    pub order_id: Option<String>,
    /// Monetary value, two fractional digits.
    pub value: Decimal,
    pub conversion_time: DateTime<FixedOffset>,
}

/// A conversion attributed through hashed customer identifiers.
///
/// Digests are lowercase SHA-256 hex of the normalized identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct HashedConversion {
    pub phone_sha256: Option<String>,
    pub email_sha256: Option<String>,
    pub order_id: Option<String>,
    pub value: Decimal,
    pub conversion_time: DateTime<FixedOffset>,
}

impl HashedConversion {
    /// True when at least one identifier digest is present.
    pub fn has_identifier(&self) -> bool {
        self.phone_sha256.is_some() || self.email_sha256.is_some()
    }
}

/// Two-decimal value from integer minor units.
pub fn value_from_cents(total_cents: i64) -> Decimal {
    Decimal::new(total_cents, 2)
}

/// Integer micros of `value`, truncated.
pub fn value_to_micros(value: Decimal) -> i64 {
    use rust_decimal::prelude::ToPrimitive;

    (value * Decimal::from(1_000_000)).trunc().to_i64().unwrap_or(0)
}
