//! Line price cache manager.
//!
//! A line's `original_net_price` freezes its per-unit net price in the header
//! currency at save time. Recomputation always backs VAT out at the standard
//! 23% rate, whatever the order's live VAT rate says - this is the one place
//! that rate is hardwired, so cached prices from different orders stay
//! comparable. Re-running "save basket" is the only way a changed unit price
//! reaches the totals once a cache value exists.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use bridgecart_core::{round_money, Currency, DomainResult, DEFAULT_VAT_RATE};
use bridgecart_orders::{CachedLinePrice, Order, OrderLine};

use crate::rate::RateProvider;
use crate::totals::gross_in_header_currency;

/// Per-unit net price for one line: gross converted to the header currency,
/// then divided by the fixed default VAT divisor, rounded to 2dp.
pub fn recompute_original_net_price(
    line: &OrderLine,
    header_currency: Currency,
    as_of: Option<NaiveDate>,
    provider: &dyn RateProvider,
) -> DomainResult<Decimal> {
    let gross =
        gross_in_header_currency(line.unit_price, line.currency, header_currency, as_of, provider)?;
    Ok(round_money(gross / DEFAULT_VAT_RATE.gross_divisor()))
}

/// "Save basket": recompute the cached net price for every line of the order.
///
/// Fails closed as a whole - if any line needs a rate that is unavailable,
/// no prices are returned and the existing cache stays authoritative.
pub fn save_basket_prices(
    order: &Order,
    provider: &dyn RateProvider,
) -> DomainResult<Vec<CachedLinePrice>> {
    order
        .lines()
        .iter()
        .map(|line| {
            let net_price = recompute_original_net_price(
                line,
                order.currency(),
                order.pricing_date(),
                provider,
            )?;
            Ok(CachedLinePrice {
                line_no: line.line_no,
                net_price,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate::{FixedRate, RateTable};
    use bridgecart_core::{DomainError, Percent, VatRate};
    use bridgecart_orders::{LineDraft, UnitOfMeasure};
    use rust_decimal_macros::dec;

    fn pln_line(unit_price: Decimal) -> OrderLine {
        OrderLine::from_draft(
            1,
            &LineDraft {
                product_name: "walnut table".to_string(),
                quantity: dec!(2),
                unit_of_measure: UnitOfMeasure::Unit,
                unit_price,
                currency: Currency::Pln,
                line_discount: Percent::ZERO,
                vat_rate_override: None,
                supplier_name: None,
            },
        )
    }

    fn today() -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(2026, 3, 2)
    }

    #[test]
    fn recompute_converts_then_backs_out_default_vat() {
        // (123 / 4.2) / 1.23 = 23.809... -> 23.81
        let net = recompute_original_net_price(
            &pln_line(dec!(123)),
            Currency::Eur,
            today(),
            &FixedRate(dec!(4.2)),
        )
        .unwrap();
        assert_eq!(net, dec!(23.81));
    }

    #[test]
    fn recompute_skips_conversion_for_matching_currency() {
        let net = recompute_original_net_price(
            &pln_line(dec!(123)),
            Currency::Pln,
            today(),
            &RateTable::new(),
        )
        .unwrap();
        assert_eq!(net, dec!(100));
    }

    #[test]
    fn default_vat_is_hardwired_regardless_of_overrides() {
        // Even a zero-rated line caches at the standard divisor.
        let mut line = pln_line(dec!(123));
        line.vat_rate_override = Some(VatRate::Zero);
        let net = recompute_original_net_price(&line, Currency::Pln, today(), &RateTable::new())
            .unwrap();
        assert_eq!(net, dec!(100));
    }

    #[test]
    fn recompute_fails_closed_without_a_rate() {
        let err = recompute_original_net_price(
            &pln_line(dec!(123)),
            Currency::Eur,
            today(),
            &RateTable::new(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::RateUnavailable(_)));
    }
}
