//! Money value type
//! All balances and ledger amounts are stored as integer minor units (cents)
//! to avoid floating-point rounding; conversion to display units (KES) happens
//! only at the serialization boundary.

use bigdecimal::{BigDecimal, ToPrimitive};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Amount in minor currency units (1 KES = 100 minor units).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Money(i64);

/// The only currency this platform transacts in.
pub const CURRENCY: &str = "KES";

#[derive(Debug, Clone, thiserror::Error)]
pub enum MoneyError {
    #[error("invalid decimal amount: {0}")]
    InvalidDecimal(String),

    #[error("amount has sub-cent precision: {0}")]
    SubCentPrecision(String),

    #[error("amount out of range: {0}")]
    OutOfRange(String),
}

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_minor(minor: i64) -> Self {
        Money(minor)
    }

    pub const fn minor(&self) -> i64 {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Parse a display-unit decimal string ("150", "150.5", "150.50") into
    /// minor units. Rejects sub-cent precision rather than rounding.
    pub fn parse_display(value: &str) -> Result<Self, MoneyError> {
        let parsed = BigDecimal::from_str(value.trim())
            .map_err(|_| MoneyError::InvalidDecimal(value.to_string()))?;
        let scaled = parsed * BigDecimal::from(100);
        if !scaled.is_integer() {
            return Err(MoneyError::SubCentPrecision(value.to_string()));
        }
        scaled
            .to_i64()
            .map(Money)
            .ok_or_else(|| MoneyError::OutOfRange(value.to_string()))
    }

    /// Display-unit string with two decimal places, e.g. `1050` -> "10.50".
    pub fn display_value(&self) -> String {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        format!("{}{}.{:02}", sign, abs / 100, abs % 100)
    }

    pub fn checked_sub(&self, other: Money) -> Option<Money> {
        self.0.checked_sub(other.0).map(Money)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_value())
    }
}

// Serialized in display units so API payloads read "150.00" rather than a
// raw cent count; accepts both JSON numbers and decimal strings on input.
impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.display_value())
    }
}

struct MoneyVisitor;

impl<'de> Visitor<'de> for MoneyVisitor {
    type Value = Money;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a decimal amount in display units")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Money, E> {
        Money::parse_display(value).map_err(de::Error::custom)
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Money, E> {
        let minor = i64::try_from(value)
            .ok()
            .and_then(|v| v.checked_mul(100))
            .ok_or_else(|| de::Error::custom("amount out of range"))?;
        Ok(Money(minor))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Money, E> {
        let minor = value
            .checked_mul(100)
            .ok_or_else(|| de::Error::custom("amount out of range"))?;
        Ok(Money(minor))
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> Result<Money, E> {
        Money::parse_display(&value.to_string()).map_err(de::Error::custom)
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Money, D::Error> {
        deserializer.deserialize_any(MoneyVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_display_converts_to_minor_units() {
        assert_eq!(Money::parse_display("150").unwrap().minor(), 15_000);
        assert_eq!(Money::parse_display("150.5").unwrap().minor(), 15_050);
        assert_eq!(Money::parse_display("0.01").unwrap().minor(), 1);
    }

    #[test]
    fn parse_display_rejects_sub_cent_precision() {
        assert!(matches!(
            Money::parse_display("10.505"),
            Err(MoneyError::SubCentPrecision(_))
        ));
    }

    #[test]
    fn parse_display_rejects_garbage() {
        assert!(matches!(
            Money::parse_display("abc"),
            Err(MoneyError::InvalidDecimal(_))
        ));
    }

    #[test]
    fn display_value_round_trips() {
        assert_eq!(Money::from_minor(15_050).display_value(), "150.50");
        assert_eq!(Money::from_minor(5).display_value(), "0.05");
        assert_eq!(Money::from_minor(0).display_value(), "0.00");
    }

    #[test]
    fn deserializes_from_number_and_string() {
        let from_number: Money = serde_json::from_str("1000").unwrap();
        assert_eq!(from_number.minor(), 100_000);

        let from_string: Money = serde_json::from_str("\"10.50\"").unwrap();
        assert_eq!(from_string.minor(), 1_050);

        let from_float: Money = serde_json::from_str("10.5").unwrap();
        assert_eq!(from_float.minor(), 1_050);
    }

    #[test]
    fn serializes_as_display_string() {
        let json = serde_json::to_string(&Money::from_minor(15_000)).unwrap();
        assert_eq!(json, "\"150.00\"");
    }
}
