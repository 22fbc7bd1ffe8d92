use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use std::sync::Arc;

use chrono::Utc;
use rust_decimal_macros::dec;
use serde_json::Value as JsonValue;

use bridgecart_core::{Aggregate, AggregateId, Currency, Percent, TenantId, VatRate};
use bridgecart_events::{EventEnvelope, InMemoryEventBus};
use bridgecart_infra::service::OrderService;
use bridgecart_orders::{
    AddLine, CacheLinePrices, CachedLinePrice, CreateOrder, LineDraft, Order, OrderCommand,
    OrderId, UnitOfMeasure,
};
use bridgecart_pricing::{compute_totals, FixedRate};

type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
type Store = Arc<bridgecart_infra::event_store::InMemoryEventStore>;

fn run(order: &mut Order, cmd: OrderCommand) {
    let events = order.handle(&cmd).unwrap();
    for e in &events {
        order.apply(e);
    }
}

/// Order with `n` PLN lines; even-numbered lines have a cached net price.
fn order_with_lines(n: u32) -> Order {
    let tenant_id = TenantId::new();
    let order_id = OrderId::new(AggregateId::new());
    let mut order = Order::empty(order_id);
    run(
        &mut order,
        OrderCommand::CreateOrder(CreateOrder {
            tenant_id,
            order_id,
            currency: Currency::Eur,
            vat_rate: VatRate::Standard,
            occurred_at: Utc::now(),
        }),
    );
    for i in 0..n {
        run(
            &mut order,
            OrderCommand::AddLine(AddLine {
                tenant_id,
                order_id,
                line: LineDraft {
                    product_name: format!("product {i}"),
                    quantity: dec!(2),
                    unit_of_measure: UnitOfMeasure::Unit,
                    unit_price: dec!(123) + rust_decimal::Decimal::from(i),
                    currency: Currency::Pln,
                    line_discount: Percent::ZERO,
                    vat_rate_override: None,
                    supplier_name: Some("Meblex".to_string()),
                },
                occurred_at: Utc::now(),
            }),
        );
    }
    let cached: Vec<_> = (1..=n)
        .filter(|line_no| line_no % 2 == 0)
        .map(|line_no| CachedLinePrice {
            line_no,
            net_price: dec!(23.81),
        })
        .collect();
    if !cached.is_empty() {
        run(
            &mut order,
            OrderCommand::CacheLinePrices(CacheLinePrices {
                tenant_id,
                order_id,
                prices: cached,
                occurred_at: Utc::now(),
            }),
        );
    }
    order
}

fn bench_compute_totals(c: &mut Criterion) {
    let mut group = c.benchmark_group("compute_totals");
    let provider = FixedRate(dec!(4.2));

    for lines in [1u32, 10, 50, 200] {
        let order = order_with_lines(lines);
        group.throughput(Throughput::Elements(lines as u64));
        group.bench_with_input(BenchmarkId::from_parameter(lines), &order, |b, order| {
            b.iter(|| compute_totals(black_box(order), &provider).unwrap());
        });
    }

    group.finish();
}

fn bench_dispatch_with_history(c: &mut Criterion) {
    let mut group = c.benchmark_group("order_dispatch");
    group.sample_size(200);

    group.bench_function("add_line_with_history", |b| {
        let store: Store = Arc::new(bridgecart_infra::event_store::InMemoryEventStore::new());
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let orders = OrderService::new(store, bus, FixedRate(dec!(4.2)));

        let tenant_id = TenantId::new();
        let order_id = OrderId::new(AggregateId::new());
        orders
            .execute(
                tenant_id,
                order_id,
                OrderCommand::CreateOrder(CreateOrder {
                    tenant_id,
                    order_id,
                    currency: Currency::Eur,
                    vat_rate: VatRate::Standard,
                    occurred_at: Utc::now(),
                }),
            )
            .unwrap();

        b.iter(|| {
            orders
                .execute(
                    tenant_id,
                    order_id,
                    OrderCommand::AddLine(AddLine {
                        tenant_id,
                        order_id,
                        line: LineDraft {
                            product_name: black_box("oak shelf".to_string()),
                            quantity: dec!(1),
                            unit_of_measure: UnitOfMeasure::Unit,
                            unit_price: dec!(123),
                            currency: Currency::Pln,
                            line_discount: Percent::ZERO,
                            vat_rate_override: None,
                            supplier_name: None,
                        },
                        occurred_at: Utc::now(),
                    }),
                )
                .unwrap();
        });
    });

    group.finish();
}

criterion_group!(benches, bench_compute_totals, bench_dispatch_with_history);
criterion_main!(benches);
