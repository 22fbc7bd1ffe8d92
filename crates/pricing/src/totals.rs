//! Totals computation.
//!
//! `compute_totals` is a pure function of the order aggregate and a rate
//! provider. Persisted totals are only ever a read cache of this computation;
//! there is no other write path.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use bridgecart_core::{round_money, Currency, DomainError, DomainResult, VatRate};
use bridgecart_orders::{Order, OrderLine};

use crate::rate::RateProvider;

/// Derived order totals, all in the order's header currency, rounded to 2dp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub currency: Currency,
    /// Sum of line nets before any header-level adjustment.
    pub items_net_before_header: Decimal,
    /// Header discount actually subtracted (resolved from the discriminated
    /// percent/amount form).
    pub discount_amount: Decimal,
    /// Net after header discount and markup.
    pub items_net: Decimal,
    pub vat_amount: Decimal,
    pub items_gross: Decimal,
    pub shipping_cost: Decimal,
    pub grand_total: Decimal,
}

/// Convert a gross amount entered in `from` into the order's header currency.
///
/// Only the PLN->EUR pair needs a rate; everything else is identity. A
/// missing rate fails closed - no partial totals are produced.
pub(crate) fn gross_in_header_currency(
    amount: Decimal,
    from: Currency,
    header: Currency,
    as_of: Option<NaiveDate>,
    provider: &dyn RateProvider,
) -> DomainResult<Decimal> {
    if from == Currency::Pln && header == Currency::Eur {
        let as_of = as_of.ok_or_else(|| {
            DomainError::rate_unavailable("order has no creation date to resolve a rate for")
        })?;
        let rate = provider.pln_per_eur(as_of).ok_or_else(|| {
            DomainError::rate_unavailable(format!("no PLN->EUR rate effective {as_of}"))
        })?;
        Ok(amount / rate)
    } else {
        Ok(amount)
    }
}

/// Net contribution of one line, in the header currency, rounded to 2dp.
///
/// A cached `original_net_price` wins over the live unit price and VAT rate;
/// the line discount is live either way.
fn line_net(
    line: &OrderLine,
    header_currency: Currency,
    order_vat: VatRate,
    as_of: Option<NaiveDate>,
    provider: &dyn RateProvider,
) -> DomainResult<Decimal> {
    let net = match line.original_net_price {
        Some(unit_net) => unit_net * line.quantity,
        None => {
            let gross = gross_in_header_currency(
                line.unit_price,
                line.currency,
                header_currency,
                as_of,
                provider,
            )?;
            let vat = line.vat_rate_override.unwrap_or(order_vat);
            (gross / vat.gross_divisor()) * line.quantity
        }
    };
    let net = net - line.line_discount.of(net);
    Ok(round_money(net))
}

/// Compute the order's totals. Pure and deterministic: the same aggregate
/// state and rate table always produce bit-identical output.
pub fn compute_totals(order: &Order, provider: &dyn RateProvider) -> DomainResult<Totals> {
    let header_currency = order.currency();
    let as_of = order.pricing_date();

    let mut items_net_before_header = Decimal::ZERO;
    for line in order.lines() {
        items_net_before_header +=
            line_net(line, header_currency, order.vat_rate(), as_of, provider)?;
    }

    let after_discount = round_money(order.discount().apply(items_net_before_header));
    let discount_amount = items_net_before_header - after_discount;
    let items_net = round_money(after_discount * (Decimal::ONE + order.markup().fraction()));
    let vat_amount = round_money(items_net * order.vat_rate().fraction());
    let items_gross = items_net + vat_amount;
    let grand_total = items_gross + order.shipping_cost();

    Ok(Totals {
        currency: header_currency,
        items_net_before_header,
        discount_amount,
        items_net,
        vat_amount,
        items_gross,
        shipping_cost: order.shipping_cost(),
        grand_total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate::{FixedRate, RateTable};
    use bridgecart_core::{
        Aggregate, AggregateId, HeaderDiscount, Percent, TenantId, VatRate,
    };
    use bridgecart_orders::{
        AddLine, CacheLinePrices, CachedLinePrice, CreateOrder, LineDraft, OrderCommand,
        OrderId, SetHeaderPricing, UnitOfMeasure,
    };
    use chrono::Utc;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn run(order: &mut Order, cmd: OrderCommand) {
        let events = order.handle(&cmd).unwrap();
        for e in &events {
            order.apply(e);
        }
    }

    fn new_order(currency: Currency, vat_rate: VatRate) -> Order {
        let tenant_id = TenantId::new();
        let order_id = OrderId::new(AggregateId::new());
        let mut order = Order::empty(order_id);
        run(
            &mut order,
            OrderCommand::CreateOrder(CreateOrder {
                tenant_id,
                order_id,
                currency,
                vat_rate,
                occurred_at: Utc::now(),
            }),
        );
        order
    }

    fn add_line(order: &mut Order, unit_price: Decimal, quantity: Decimal, currency: Currency) {
        let tenant_id = order.tenant_id().unwrap();
        let order_id = order.id_typed();
        run(
            order,
            OrderCommand::AddLine(AddLine {
                tenant_id,
                order_id,
                line: LineDraft {
                    product_name: "oak shelf".to_string(),
                    quantity,
                    unit_of_measure: UnitOfMeasure::Area,
                    unit_price,
                    currency,
                    line_discount: Percent::ZERO,
                    vat_rate_override: None,
                    supplier_name: None,
                },
                occurred_at: Utc::now(),
            }),
        );
    }

    fn set_header(
        order: &mut Order,
        vat_rate: VatRate,
        shipping: Decimal,
        discount: HeaderDiscount,
        markup: Percent,
    ) {
        let tenant_id = order.tenant_id().unwrap();
        let order_id = order.id_typed();
        run(
            order,
            OrderCommand::SetHeaderPricing(SetHeaderPricing {
                tenant_id,
                order_id,
                vat_rate,
                shipping_cost: shipping,
                discount,
                markup,
                transport_cost: Decimal::ZERO,
                logistics_cost: Decimal::ZERO,
                occurred_at: Utc::now(),
            }),
        );
    }

    fn cache_price(order: &mut Order, line_no: u32, net_price: Decimal) {
        let tenant_id = order.tenant_id().unwrap();
        let order_id = order.id_typed();
        run(
            order,
            OrderCommand::CacheLinePrices(CacheLinePrices {
                tenant_id,
                order_id,
                prices: vec![CachedLinePrice { line_no, net_price }],
                occurred_at: Utc::now(),
            }),
        );
    }

    #[test]
    fn header_discount_applies_before_markup() {
        let mut order = new_order(Currency::Eur, VatRate::Standard);
        add_line(&mut order, dec!(123), dec!(1), Currency::Eur);
        cache_price(&mut order, 1, dec!(100));
        set_header(
            &mut order,
            VatRate::Standard,
            dec!(5),
            HeaderDiscount::percent(dec!(10)).unwrap(),
            Percent::new(dec!(20)).unwrap(),
        );

        let totals = compute_totals(&order, &FixedRate(dec!(4.2))).unwrap();
        assert_eq!(totals.items_net_before_header, dec!(100));
        assert_eq!(totals.discount_amount, dec!(10));
        assert_eq!(totals.items_net, dec!(108));
        assert_eq!(totals.vat_amount, dec!(24.84));
        assert_eq!(totals.items_gross, dec!(132.84));
        assert_eq!(totals.grand_total, dec!(137.84));
    }

    #[test]
    fn cached_line_is_insulated_from_vat_changes() {
        let mut order = new_order(Currency::Eur, VatRate::Standard);
        add_line(&mut order, dec!(123), dec!(2), Currency::Pln);
        cache_price(&mut order, 1, dec!(23.81));

        let provider = FixedRate(dec!(4.2));
        let before = compute_totals(&order, &provider).unwrap();
        assert_eq!(before.items_net_before_header, dec!(47.62));

        set_header(
            &mut order,
            VatRate::Zero,
            Decimal::ZERO,
            HeaderDiscount::None,
            Percent::ZERO,
        );
        let after = compute_totals(&order, &provider).unwrap();
        assert_eq!(after.items_net_before_header, dec!(47.62));
    }

    #[test]
    fn uncached_line_converts_and_backs_out_vat() {
        let mut order = new_order(Currency::Eur, VatRate::Standard);
        add_line(&mut order, dec!(123), dec!(2), Currency::Pln);

        // (123 / 4.2) / 1.23 * 2 = 47.619... -> 47.62
        let totals = compute_totals(&order, &FixedRate(dec!(4.2))).unwrap();
        assert_eq!(totals.items_net_before_header, dec!(47.62));
    }

    #[test]
    fn no_conversion_when_currencies_match() {
        let mut order = new_order(Currency::Pln, VatRate::Standard);
        add_line(&mut order, dec!(123), dec!(1), Currency::Pln);

        // An empty rate table is fine: the PLN->EUR pair is never needed.
        let totals = compute_totals(&order, &RateTable::new()).unwrap();
        assert_eq!(totals.items_net_before_header, dec!(100));
    }

    #[test]
    fn missing_rate_fails_closed() {
        let mut order = new_order(Currency::Eur, VatRate::Standard);
        add_line(&mut order, dec!(123), dec!(1), Currency::Pln);

        let err = compute_totals(&order, &RateTable::new()).unwrap_err();
        assert!(matches!(err, DomainError::RateUnavailable(_)));
    }

    #[test]
    fn line_discount_applies_after_vat_removal() {
        let mut order = new_order(Currency::Pln, VatRate::Standard);
        add_line(&mut order, dec!(123), dec!(1), Currency::Pln);
        let tenant_id = order.tenant_id().unwrap();
        let order_id = order.id_typed();
        run(
            &mut order,
            OrderCommand::UpdateLine(bridgecart_orders::UpdateLine {
                tenant_id,
                order_id,
                line_no: 1,
                product_name: None,
                quantity: None,
                unit_price: None,
                line_discount: Some(Percent::new(dec!(10)).unwrap()),
                supplier_name: None,
                occurred_at: Utc::now(),
            }),
        );

        // 123 / 1.23 = 100 net, minus 10% line discount.
        let totals = compute_totals(&order, &RateTable::new()).unwrap();
        assert_eq!(totals.items_net_before_header, dec!(90));
    }

    #[test]
    fn line_vat_override_beats_order_rate() {
        let mut order = new_order(Currency::Pln, VatRate::Standard);
        let tenant_id = order.tenant_id().unwrap();
        let order_id = order.id_typed();
        run(
            &mut order,
            OrderCommand::AddLine(AddLine {
                tenant_id,
                order_id,
                line: LineDraft {
                    product_name: "zero-rated freight".to_string(),
                    quantity: dec!(1),
                    unit_of_measure: UnitOfMeasure::Unit,
                    unit_price: dec!(100),
                    currency: Currency::Pln,
                    line_discount: Percent::ZERO,
                    vat_rate_override: Some(VatRate::Zero),
                    supplier_name: None,
                },
                occurred_at: Utc::now(),
            }),
        );

        let totals = compute_totals(&order, &RateTable::new()).unwrap();
        assert_eq!(totals.items_net_before_header, dec!(100));
    }

    #[test]
    fn fixed_amount_discount_is_exclusive_of_percent() {
        let mut order = new_order(Currency::Eur, VatRate::Standard);
        add_line(&mut order, dec!(123), dec!(1), Currency::Eur);
        cache_price(&mut order, 1, dec!(100));
        set_header(
            &mut order,
            VatRate::Standard,
            Decimal::ZERO,
            HeaderDiscount::amount(dec!(15)).unwrap(),
            Percent::ZERO,
        );

        let totals = compute_totals(&order, &FixedRate(dec!(4.2))).unwrap();
        assert_eq!(totals.discount_amount, dec!(15));
        assert_eq!(totals.items_net, dec!(85));
    }

    #[test]
    fn oversized_fixed_discount_bottoms_out_at_zero() {
        let mut order = new_order(Currency::Eur, VatRate::Standard);
        add_line(&mut order, dec!(123), dec!(1), Currency::Eur);
        cache_price(&mut order, 1, dec!(100));
        set_header(
            &mut order,
            VatRate::Standard,
            dec!(5),
            HeaderDiscount::amount(dec!(250)).unwrap(),
            Percent::new(dec!(20)).unwrap(),
        );

        // Only the subtotal is forfeitable: the rest of the discount is lost
        // and shipping still charges.
        let totals = compute_totals(&order, &FixedRate(dec!(4.2))).unwrap();
        assert_eq!(totals.discount_amount, dec!(100));
        assert_eq!(totals.items_net, dec!(0));
        assert_eq!(totals.vat_amount, dec!(0));
        assert_eq!(totals.grand_total, dec!(5));
    }

    #[test]
    fn compute_totals_is_idempotent() {
        let mut order = new_order(Currency::Eur, VatRate::Standard);
        add_line(&mut order, dec!(123), dec!(2), Currency::Pln);
        set_header(
            &mut order,
            VatRate::Standard,
            dec!(5),
            HeaderDiscount::percent(dec!(10)).unwrap(),
            Percent::new(dec!(20)).unwrap(),
        );

        let provider = FixedRate(dec!(4.2));
        let first = compute_totals(&order, &provider).unwrap();
        let second = compute_totals(&order, &provider).unwrap();
        assert_eq!(first, second);
    }

    proptest! {
        #[test]
        fn gross_is_always_net_plus_vat(
            unit_net in 1u32..=10_000u32,
            quantity in 1u32..=50u32,
            markup in 0u32..=100u32,
            shipping in 0u32..=500u32,
        ) {
            let mut order = new_order(Currency::Eur, VatRate::Standard);
            add_line(&mut order, dec!(123), Decimal::from(quantity), Currency::Eur);
            cache_price(&mut order, 1, Decimal::from(unit_net) / dec!(100));
            set_header(
                &mut order,
                VatRate::Standard,
                Decimal::from(shipping),
                HeaderDiscount::None,
                Percent::new(Decimal::from(markup)).unwrap(),
            );

            let totals = compute_totals(&order, &FixedRate(dec!(4.2))).unwrap();
            prop_assert_eq!(totals.items_gross, totals.items_net + totals.vat_amount);
            prop_assert_eq!(totals.grand_total, totals.items_gross + totals.shipping_cost);
            prop_assert!(totals.items_net >= Decimal::ZERO);
        }
    }
}
