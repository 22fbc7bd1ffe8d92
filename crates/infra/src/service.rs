//! Application services: thin orchestration over the dispatcher, the pricing
//! engine, and the procurement splitter.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value as JsonValue;

use bridgecart_core::{AggregateId, TenantId};
use bridgecart_events::{EventBus, EventEnvelope};
use bridgecart_orders::{
    CacheLinePrices, Order, OrderCommand, OrderId, ReconcileStatus,
};
use bridgecart_pricing::{compute_totals, save_basket_prices, RateProvider, Totals};
use bridgecart_procurement::{
    split_into_supplier_orders, AddItems, OpenBatch, SplitOutcome, SupplierOrder,
    SupplierOrderCommand, SupplierOrderId,
};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::{EventStore, StoredEvent};
use crate::projections::ORDER_AGGREGATE_TYPE;

/// Aggregate type tag under which supplier batch streams are appended.
pub const SUPPLIER_ORDER_AGGREGATE_TYPE: &str = "procurement.batch";

/// Order-facing service: command execution, totals, and the "save basket"
/// price recompute.
#[derive(Debug)]
pub struct OrderService<S, B, R> {
    dispatcher: CommandDispatcher<S, B>,
    provider: R,
}

impl<S, B, R> OrderService<S, B, R>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
    R: RateProvider,
{
    pub fn new(store: S, bus: B, provider: R) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(store, bus),
            provider,
        }
    }

    pub fn execute(
        &self,
        tenant_id: TenantId,
        order_id: OrderId,
        command: OrderCommand,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        self.dispatcher.dispatch(
            tenant_id,
            order_id.0,
            ORDER_AGGREGATE_TYPE,
            command,
            |_, id| Order::empty(OrderId::new(id)),
        )
    }

    pub fn load_order(
        &self,
        tenant_id: TenantId,
        order_id: OrderId,
    ) -> Result<Order, DispatchError> {
        let order = self
            .dispatcher
            .load(tenant_id, order_id.0, |_, id| Order::empty(OrderId::new(id)))?;
        if order.created_at().is_none() {
            return Err(DispatchError::NotFound);
        }
        Ok(order)
    }

    /// Authoritative totals, computed fresh from the current aggregate state.
    pub fn totals(&self, tenant_id: TenantId, order_id: OrderId) -> Result<Totals, DispatchError> {
        let order = self.load_order(tenant_id, order_id)?;
        compute_totals(&order, &self.provider).map_err(DispatchError::from)
    }

    /// "Save basket": freeze every line's net price at today's conversion and
    /// the default VAT divisor. Fails closed before any write if a rate is
    /// missing.
    pub fn save_basket(
        &self,
        tenant_id: TenantId,
        order_id: OrderId,
        now: DateTime<Utc>,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        let order = self.load_order(tenant_id, order_id)?;
        let prices = save_basket_prices(&order, &self.provider).map_err(DispatchError::from)?;
        if prices.is_empty() {
            return Ok(vec![]);
        }
        self.execute(
            tenant_id,
            order_id,
            OrderCommand::CacheLinePrices(CacheLinePrices {
                tenant_id,
                order_id,
                prices,
                occurred_at: now,
            }),
        )
    }
}

/// Procurement service: runs the splitter against the order aggregate and
/// the open batches it knows about, then commits the planned batches.
///
/// The batch index is an in-memory registry of streams this service created;
/// a persistent deployment would back it with a read model.
#[derive(Debug)]
pub struct ProcurementService<S, B> {
    dispatcher: CommandDispatcher<S, B>,
    batch_index: RwLock<HashMap<TenantId, Vec<SupplierOrderId>>>,
}

impl<S, B> ProcurementService<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(store: S, bus: B) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(store, bus),
            batch_index: RwLock::new(HashMap::new()),
        }
    }

    pub fn execute(
        &self,
        tenant_id: TenantId,
        batch_id: SupplierOrderId,
        command: SupplierOrderCommand,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        self.dispatcher.dispatch(
            tenant_id,
            batch_id.0,
            SUPPLIER_ORDER_AGGREGATE_TYPE,
            command,
            |_, id| SupplierOrder::empty(SupplierOrderId::new(id)),
        )
    }

    pub fn load_batch(
        &self,
        tenant_id: TenantId,
        batch_id: SupplierOrderId,
    ) -> Result<SupplierOrder, DispatchError> {
        self.dispatcher.load(tenant_id, batch_id.0, |_, id| {
            SupplierOrder::empty(SupplierOrderId::new(id))
        })
    }

    /// All batches known for the tenant that are still open.
    pub fn open_batches(&self, tenant_id: TenantId) -> Result<Vec<SupplierOrder>, DispatchError> {
        let ids = self
            .batch_index
            .read()
            .ok()
            .and_then(|idx| idx.get(&tenant_id).cloned())
            .unwrap_or_default();

        let mut open = Vec::new();
        for id in ids {
            let batch = self.load_batch(tenant_id, id)?;
            if batch.is_open() {
                open.push(batch);
            }
        }
        Ok(open)
    }

    /// Split the order's supplier-ordered lines into batches dated `today`,
    /// commit the plans (opening new batches or appending to today's), and
    /// reconcile the order's status.
    pub fn split_order(
        &self,
        tenant_id: TenantId,
        order: &Order,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<SplitOutcome, DispatchError> {
        let open = self.open_batches(tenant_id)?;
        let outcome = split_into_supplier_orders(order, &open, today);

        for plan in &outcome.batches {
            let batch_id = match plan.batch_id {
                Some(id) => id,
                None => {
                    let id = SupplierOrderId::new(AggregateId::new());
                    self.execute(
                        tenant_id,
                        id,
                        SupplierOrderCommand::OpenBatch(OpenBatch {
                            tenant_id,
                            batch_id: id,
                            supplier_name: plan.supplier_name.clone(),
                            order_date: plan.order_date,
                            occurred_at: now,
                        }),
                    )?;
                    if let Ok(mut idx) = self.batch_index.write() {
                        idx.entry(tenant_id).or_default().push(id);
                    }
                    id
                }
            };

            self.execute(
                tenant_id,
                batch_id,
                SupplierOrderCommand::AddItems(AddItems {
                    tenant_id,
                    batch_id,
                    items: plan.items.clone(),
                    occurred_at: now,
                }),
            )?;
        }

        Ok(outcome)
    }
}

/// Build the order-side reconcile command for a split outcome, if one is
/// needed. Dispatched through the order service so the status write is
/// CAS-protected like any other transition.
pub fn reconcile_after_split(
    tenant_id: TenantId,
    order_id: OrderId,
    outcome: &SplitOutcome,
    now: DateTime<Utc>,
) -> Option<OrderCommand> {
    outcome.new_order_status?;
    Some(OrderCommand::ReconcileStatus(ReconcileStatus {
        tenant_id,
        order_id,
        occurred_at: now,
    }))
}
