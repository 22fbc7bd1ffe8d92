//! End-to-end tests across the dispatcher, services, and projections.

use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, Utc};
use rust_decimal_macros::dec;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use bridgecart_core::{AggregateId, Currency, ExpectedVersion, Percent, TenantId, VatRate};
use bridgecart_events::{EventBus, EventEnvelope, InMemoryEventBus};
use bridgecart_orders::{
    AddLine, CreateOrder, FulfillmentChange, LineDraft, OrderAction, OrderCommand, OrderId,
    OrderStatus, SetLineProcurement, TransitionStatus, UnitOfMeasure, UpdateLineFulfillment,
};
use bridgecart_pricing::RateTable;
use bridgecart_procurement::{MarkReceived, RecordReceipt, SupplierOrderCommand};

use crate::command_dispatcher::DispatchError;
use crate::event_store::{EventStore, EventStoreError, InMemoryEventStore, UncommittedEvent};
use crate::projections::{OrderTotalsProjection, ORDER_AGGREGATE_TYPE};
use crate::read_model::InMemoryTenantStore;
use crate::service::{reconcile_after_split, OrderService, ProcurementService};

type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
type Store = Arc<InMemoryEventStore>;

fn rates() -> RateTable {
    let mut table = RateTable::new();
    table.insert(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(), dec!(4.2));
    table
}

fn setup() -> (
    Store,
    Bus,
    OrderService<Store, Bus, RateTable>,
    ProcurementService<Store, Bus>,
) {
    bridgecart_observability::init();
    let store: Store = Arc::new(InMemoryEventStore::new());
    let bus: Bus = Arc::new(InMemoryEventBus::new());
    let orders = OrderService::new(store.clone(), bus.clone(), rates());
    let procurement = ProcurementService::new(store.clone(), bus.clone());
    (store, bus, orders, procurement)
}

fn create_order_with_lines(
    orders: &OrderService<Store, Bus, RateTable>,
    tenant_id: TenantId,
    suppliers: &[&str],
) -> OrderId {
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
    for supplier in suppliers {
        orders
            .execute(
                tenant_id,
                order_id,
                OrderCommand::AddLine(AddLine {
                    tenant_id,
                    order_id,
                    line: LineDraft {
                        product_name: "oak shelf".to_string(),
                        quantity: dec!(2),
                        unit_of_measure: UnitOfMeasure::Unit,
                        unit_price: dec!(123),
                        currency: Currency::Pln,
                        line_discount: Percent::ZERO,
                        vat_rate_override: None,
                        supplier_name: Some(supplier.to_string()),
                    },
                    occurred_at: Utc::now(),
                }),
            )
            .unwrap();
    }
    order_id
}

fn transition(
    orders: &OrderService<Store, Bus, RateTable>,
    tenant_id: TenantId,
    order_id: OrderId,
    action: OrderAction,
) {
    orders
        .execute(
            tenant_id,
            order_id,
            OrderCommand::TransitionStatus(TransitionStatus {
                tenant_id,
                order_id,
                action,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
}

fn mark(
    orders: &OrderService<Store, Bus, RateTable>,
    tenant_id: TenantId,
    order_id: OrderId,
    line_no: u32,
    change: FulfillmentChange,
) {
    orders
        .execute(
            tenant_id,
            order_id,
            OrderCommand::UpdateLineFulfillment(UpdateLineFulfillment {
                tenant_id,
                order_id,
                line_no,
                change,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
}

#[test]
fn full_order_lifecycle_through_the_pipeline() {
    let (_store, bus, orders, procurement) = setup();
    let tenant_id = TenantId::new();
    let subscription = bus.subscribe();
    let projection = OrderTotalsProjection::new(InMemoryTenantStore::new(), rates());

    let order_id = create_order_with_lines(&orders, tenant_id, &["Meblex", "Drewnopol"]);

    // Save basket: each line freezes at (123 / 4.2) / 1.23 = 23.81.
    orders.save_basket(tenant_id, order_id, Utc::now()).unwrap();
    let totals = orders.totals(tenant_id, order_id).unwrap();
    assert_eq!(totals.items_net_before_header, dec!(95.24));

    transition(&orders, tenant_id, order_id, OrderAction::Submit);
    transition(&orders, tenant_id, order_id, OrderAction::Confirm);

    orders
        .execute(
            tenant_id,
            order_id,
            OrderCommand::SetLineProcurement(SetLineProcurement {
                tenant_id,
                order_id,
                line_no: 1,
                actual_supplier: None,
                net_cost: Some(dec!(80)),
                logistics_cost: None,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

    for line_no in [1, 2] {
        mark(&orders, tenant_id, order_id, line_no, FulfillmentChange::Ordered);
    }
    let order = orders.load_order(tenant_id, order_id).unwrap();
    assert_eq!(order.status(), OrderStatus::Ordered);

    // Split into one batch per supplier.
    let today = Utc::now().date_naive();
    let outcome = procurement
        .split_order(tenant_id, &order, today, Utc::now())
        .unwrap();
    assert_eq!(outcome.batches.len(), 2);
    assert!(reconcile_after_split(tenant_id, order_id, &outcome, Utc::now()).is_none());

    let batches = procurement.open_batches(tenant_id).unwrap();
    assert_eq!(batches.len(), 2);
    let meblex = batches
        .iter()
        .find(|b| b.supplier_name() == "Meblex")
        .unwrap();
    // 80 * qty 2; the Drewnopol line has no net cost yet.
    assert_eq!(meblex.total_cost(), dec!(160));

    // Goods arrive: record against the batch, flag the order lines.
    let batch_id = meblex.id_typed();
    procurement
        .execute(
            tenant_id,
            batch_id,
            SupplierOrderCommand::RecordReceipt(RecordReceipt {
                tenant_id,
                batch_id,
                order_id,
                line_no: 1,
                quantity: dec!(2),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
    procurement
        .execute(
            tenant_id,
            batch_id,
            SupplierOrderCommand::MarkReceived(MarkReceived {
                tenant_id,
                batch_id,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

    mark(&orders, tenant_id, order_id, 1, FulfillmentChange::Received);
    let order = orders.load_order(tenant_id, order_id).unwrap();
    assert_eq!(order.status(), OrderStatus::PartiallyReceived);

    mark(&orders, tenant_id, order_id, 2, FulfillmentChange::Received);
    transition(&orders, tenant_id, order_id, OrderAction::MarkPaid);
    for line_no in [1, 2] {
        mark(&orders, tenant_id, order_id, line_no, FulfillmentChange::Packed);
    }
    transition(&orders, tenant_id, order_id, OrderAction::MarkDispatched);
    transition(&orders, tenant_id, order_id, OrderAction::MarkDelivered);

    let order = orders.load_order(tenant_id, order_id).unwrap();
    assert_eq!(order.status(), OrderStatus::Delivered);
    assert!(order.delivered_at().is_some());

    // Drain the bus into the projection; the cached totals must agree with
    // the authoritative computation.
    while let Ok(envelope) = subscription.try_recv() {
        projection.apply_envelope(&envelope).unwrap();
    }
    let cached = projection.totals(tenant_id, order_id).unwrap();
    assert_eq!(cached, orders.totals(tenant_id, order_id).unwrap());
}

#[test]
fn stale_append_is_rejected_by_the_store() {
    let (store, _bus, orders, _procurement) = setup();
    let tenant_id = TenantId::new();
    let order_id = create_order_with_lines(&orders, tenant_id, &["Meblex"]);

    // A writer that decided against version 1 loses once the stream moved on.
    let order = orders.load_order(tenant_id, order_id).unwrap();
    let decided = bridgecart_core::Aggregate::handle(
        &order,
        &OrderCommand::TransitionStatus(TransitionStatus {
            tenant_id,
            order_id,
            action: OrderAction::Submit,
            occurred_at: Utc::now(),
        }),
    )
    .unwrap();
    let uncommitted: Vec<_> = decided
        .iter()
        .map(|e| {
            UncommittedEvent::from_typed(
                tenant_id,
                order_id.0,
                ORDER_AGGREGATE_TYPE,
                Uuid::now_v7(),
                e,
            )
            .unwrap()
        })
        .collect();

    let err = store
        .append(uncommitted, ExpectedVersion::Exact(1))
        .unwrap_err();
    assert!(matches!(err, EventStoreError::Concurrency(_)));

    // The order is untouched by the failed write.
    let order = orders.load_order(tenant_id, order_id).unwrap();
    assert_eq!(order.status(), OrderStatus::Draft);
}

#[test]
fn rejected_transition_reports_valid_actions() {
    let (_store, _bus, orders, _procurement) = setup();
    let tenant_id = TenantId::new();
    let order_id = create_order_with_lines(&orders, tenant_id, &["Meblex"]);

    let err = orders
        .execute(
            tenant_id,
            order_id,
            OrderCommand::TransitionStatus(TransitionStatus {
                tenant_id,
                order_id,
                action: OrderAction::Confirm,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap_err();

    match err {
        DispatchError::TransitionRejected { action, from, allowed } => {
            assert_eq!(action, "confirm");
            assert_eq!(from, "draft");
            assert!(allowed.contains(&"submit".to_string()));
        }
        other => panic!("expected TransitionRejected, got {other:?}"),
    }
}

#[test]
fn save_basket_fails_closed_without_a_rate() {
    bridgecart_observability::init();
    let store: Store = Arc::new(InMemoryEventStore::new());
    let bus: Bus = Arc::new(InMemoryEventBus::new());
    // No rates at all: PLN lines in a EUR order cannot be priced.
    let orders = OrderService::new(store.clone(), bus, RateTable::new());

    let tenant_id = TenantId::new();
    let order_id = create_order_with_lines(&orders, tenant_id, &["Meblex"]);

    let err = orders
        .save_basket(tenant_id, order_id, Utc::now())
        .unwrap_err();
    assert!(matches!(err, DispatchError::RateUnavailable(_)));

    // Nothing was cached by the failed attempt.
    let order = orders.load_order(tenant_id, order_id).unwrap();
    assert!(order.lines()[0].original_net_price.is_none());
}

#[test]
fn cross_tenant_reads_see_nothing() {
    let (_store, _bus, orders, _procurement) = setup();
    let tenant_id = TenantId::new();
    let order_id = create_order_with_lines(&orders, tenant_id, &["Meblex"]);

    let err = orders.load_order(TenantId::new(), order_id).unwrap_err();
    assert!(matches!(err, DispatchError::NotFound));
}

/// Collects formatted log lines so tests can assert on dispatcher output.
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl std::io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[test]
fn dispatch_logs_commits_and_rejections() {
    let (_store, _bus, orders, _procurement) = setup();
    let buffer = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(buffer.clone())
        .finish();

    tracing::subscriber::with_default(subscriber, || {
        let tenant_id = TenantId::new();
        let order_id = create_order_with_lines(&orders, tenant_id, &["Meblex"]);

        let err = orders
            .execute(
                tenant_id,
                order_id,
                OrderCommand::TransitionStatus(TransitionStatus {
                    tenant_id,
                    order_id,
                    action: OrderAction::Confirm,
                    occurred_at: Utc::now(),
                }),
            )
            .unwrap_err();
        assert!(matches!(err, DispatchError::TransitionRejected { .. }));
    });

    let logs = buffer.contents();
    assert!(logs.contains("events committed"), "missing commit info line: {logs}");
    assert!(
        logs.contains("status action rejected"),
        "missing rejection warn line: {logs}"
    );
}
