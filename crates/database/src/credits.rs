//! Fixed-point credit amounts.
//!
//! Balances are stored as integer hundredths of a credit so the debit can be a
//! single conditional `UPDATE` in SQL.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::error::{DatabaseError, Result};

/// Decimal places kept for credit amounts.
pub const CREDIT_SCALE: u32 = 2;

/// Units in one whole credit.
pub const UNITS_PER_CREDIT: i64 = 100;

/// Convert a decimal credit amount to storage units, rounding to the scale.
pub fn to_units(amount: Decimal) -> Result<i64> {
    (amount.round_dp(CREDIT_SCALE) * Decimal::from(UNITS_PER_CREDIT))
        .trunc()
        .to_i64()
        .ok_or_else(|| DatabaseError::InvalidAmount(amount.to_string()))
}

/// Convert storage units to a decimal credit amount.
pub fn from_units(units: i64) -> Decimal {
    Decimal::new(units, CREDIT_SCALE)
}

/// Units for a whole number of messages at one credit each.
pub fn units_for_messages(message_count: i64) -> Result<i64> {
    message_count
        .checked_mul(UNITS_PER_CREDIT)
        .ok_or_else(|| DatabaseError::InvalidAmount(message_count.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_round_trip() {
        assert_eq!(to_units(dec!(5.00)).unwrap(), 500);
        assert_eq!(from_units(500), dec!(5.00));
        assert_eq!(from_units(500).to_string(), "5.00");
        assert_eq!(to_units(dec!(-2.5)).unwrap(), -250);
    }

    #[test]
    fn test_rounds_to_scale() {
        assert_eq!(to_units(dec!(1.005)).unwrap(), 100);
        assert_eq!(to_units(dec!(1.015)).unwrap(), 102);
    }

    #[test]
    fn test_units_for_messages() {
        assert_eq!(units_for_messages(3).unwrap(), 300);
        assert!(units_for_messages(i64::MAX).is_err());
    }
}
