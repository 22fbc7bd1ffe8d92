//! Monetary value objects.
//!
//! All amounts are `rust_decimal::Decimal` in major currency units (e.g.
//! 12.34 EUR). Percentages are stored as 0-100 decimals, not 0-1 fractions.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// The two currencies this domain deals in: the supplier market prices in
/// PLN, orders are presented in EUR or PLN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Eur,
    Pln,
}

impl core::fmt::Display for Currency {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Currency::Eur => write!(f, "EUR"),
            Currency::Pln => write!(f, "PLN"),
        }
    }
}

impl core::str::FromStr for Currency {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "EUR" => Ok(Currency::Eur),
            "PLN" => Ok(Currency::Pln),
            other => Err(DomainError::validation(format!(
                "unsupported currency '{other}'"
            ))),
        }
    }
}

/// Round a monetary amount to 2 decimal places, midpoint away from zero.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// A percentage in the 0-100 range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Percent(Decimal);

impl ValueObject for Percent {}

impl Percent {
    pub const ZERO: Percent = Percent(Decimal::ZERO);

    pub fn new(value: Decimal) -> DomainResult<Self> {
        if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED {
            return Err(DomainError::validation(format!(
                "percent must be within 0-100, got {value}"
            )));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// The 0-1 fraction form (10% -> 0.1).
    pub fn fraction(&self) -> Decimal {
        self.0 / Decimal::ONE_HUNDRED
    }

    /// `value`% of `amount`.
    pub fn of(&self, amount: Decimal) -> Decimal {
        amount * self.fraction()
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl core::fmt::Display for Percent {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// VAT rate. Only 0% and the standard 23% exist in this domain; anything
/// else is rejected at the boundary so gross-to-net division can never see
/// a zero-or-negative divisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VatRate {
    Zero,
    Standard,
}

/// The rate assumed when freezing a line's original net price, regardless of
/// the order's live VAT rate.
pub const DEFAULT_VAT_RATE: VatRate = VatRate::Standard;

impl ValueObject for VatRate {}

impl VatRate {
    pub fn from_percent(value: Decimal) -> DomainResult<Self> {
        if value == Decimal::ZERO {
            Ok(VatRate::Zero)
        } else if value == Decimal::from(23) {
            Ok(VatRate::Standard)
        } else {
            Err(DomainError::validation(format!(
                "vat rate must be 0 or 23, got {value}"
            )))
        }
    }

    pub fn as_percent(&self) -> Decimal {
        match self {
            VatRate::Zero => Decimal::ZERO,
            VatRate::Standard => Decimal::from(23),
        }
    }

    /// The 0-1 fraction form (23% -> 0.23).
    pub fn fraction(&self) -> Decimal {
        self.as_percent() / Decimal::ONE_HUNDRED
    }

    /// Divisor that backs net out of a gross amount (23% -> 1.23).
    pub fn gross_divisor(&self) -> Decimal {
        Decimal::ONE + self.fraction()
    }
}

/// Header-level discount: percent-of-subtotal or a fixed amount, never both.
///
/// The discriminator is structural - the non-authoritative component does not
/// exist, instead of being "treated as zero".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type", content = "value")]
pub enum HeaderDiscount {
    None,
    Percent(Percent),
    Amount(Decimal),
}

impl ValueObject for HeaderDiscount {}

impl HeaderDiscount {
    pub fn amount(value: Decimal) -> DomainResult<Self> {
        if value < Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "discount amount must not be negative, got {value}"
            )));
        }
        Ok(HeaderDiscount::Amount(value))
    }

    pub fn percent(value: Decimal) -> DomainResult<Self> {
        Ok(HeaderDiscount::Percent(Percent::new(value)?))
    }

    /// Subtract this discount from a subtotal (applied once, at header level).
    ///
    /// A fixed amount can spend the whole subtotal but never drives it
    /// negative; the excess is forfeited.
    pub fn apply(&self, subtotal: Decimal) -> Decimal {
        match self {
            HeaderDiscount::None => subtotal,
            HeaderDiscount::Percent(p) => subtotal - p.of(subtotal),
            HeaderDiscount::Amount(a) => (subtotal - a).max(Decimal::ZERO),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn rounding_is_midpoint_away_from_zero() {
        assert_eq!(round_money(dec!(23.805)), dec!(23.81));
        assert_eq!(round_money(dec!(-23.805)), dec!(-23.81));
        assert_eq!(round_money(dec!(47.619)), dec!(47.62));
    }

    #[test]
    fn percent_bounds_are_enforced() {
        assert!(Percent::new(dec!(0)).is_ok());
        assert!(Percent::new(dec!(100)).is_ok());
        assert!(Percent::new(dec!(100.01)).is_err());
        assert!(Percent::new(dec!(-1)).is_err());
    }

    #[test]
    fn vat_rate_rejects_everything_but_0_and_23() {
        assert_eq!(VatRate::from_percent(dec!(0)).unwrap(), VatRate::Zero);
        assert_eq!(
            VatRate::from_percent(dec!(23)).unwrap(),
            VatRate::Standard
        );
        assert!(VatRate::from_percent(dec!(8)).is_err());
        assert!(VatRate::from_percent(dec!(-23)).is_err());
    }

    #[test]
    fn gross_divisor_backs_out_vat() {
        assert_eq!(VatRate::Standard.gross_divisor(), dec!(1.23));
        assert_eq!(VatRate::Zero.gross_divisor(), dec!(1));
    }

    #[test]
    fn header_discount_applies_exclusively() {
        let subtotal = dec!(100);
        assert_eq!(HeaderDiscount::None.apply(subtotal), dec!(100));
        assert_eq!(
            HeaderDiscount::percent(dec!(10)).unwrap().apply(subtotal),
            dec!(90)
        );
        assert_eq!(
            HeaderDiscount::amount(dec!(15)).unwrap().apply(subtotal),
            dec!(85)
        );
    }

    #[test]
    fn negative_discount_amount_is_rejected() {
        assert!(HeaderDiscount::amount(dec!(-5)).is_err());
    }

    #[test]
    fn oversized_discount_amount_is_clamped_to_zero() {
        let discount = HeaderDiscount::amount(dec!(150)).unwrap();
        assert_eq!(discount.apply(dec!(100)), dec!(0));
        assert_eq!(discount.apply(dec!(150)), dec!(0));
    }
}
