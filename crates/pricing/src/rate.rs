//! PLN->EUR conversion rate lookup.
//!
//! The rate is an explicit parameter of every pricing computation, resolved
//! once per order at the order's creation date. There is exactly one
//! resolution policy: display estimates and authoritative totals go through
//! the same provider, so they can never disagree.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;

/// Source of the PLN->EUR rate (PLN per 1 EUR) effective on a given date.
///
/// Returning `None` means no rate is known for that date; callers must fail
/// closed rather than fall back to a hardcoded divisor.
pub trait RateProvider {
    fn pln_per_eur(&self, as_of: NaiveDate) -> Option<Decimal>;
}

impl<T: RateProvider + ?Sized> RateProvider for &T {
    fn pln_per_eur(&self, as_of: NaiveDate) -> Option<Decimal> {
        (**self).pln_per_eur(as_of)
    }
}

/// A constant rate, independent of date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedRate(pub Decimal);

impl RateProvider for FixedRate {
    fn pln_per_eur(&self, _as_of: NaiveDate) -> Option<Decimal> {
        Some(self.0)
    }
}

/// A date-indexed rate table.
///
/// Lookup takes the most recent rate on or before the requested date, since
/// published rates skip weekends and holidays.
#[derive(Debug, Clone, Default)]
pub struct RateTable {
    rates: BTreeMap<NaiveDate, Decimal>,
}

impl RateTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, effective_from: NaiveDate, rate: Decimal) {
        self.rates.insert(effective_from, rate);
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

impl RateProvider for RateTable {
    fn pln_per_eur(&self, as_of: NaiveDate) -> Option<Decimal> {
        self.rates.range(..=as_of).next_back().map(|(_, rate)| *rate)
    }
}
