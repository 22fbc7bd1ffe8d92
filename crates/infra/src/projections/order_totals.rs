use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value as JsonValue;
use thiserror::Error;

use bridgecart_core::{Aggregate, AggregateId, DomainError, TenantId};
use bridgecart_events::EventEnvelope;
use bridgecart_orders::{Order, OrderEvent, OrderId};
use bridgecart_pricing::{compute_totals, RateProvider, Totals};

use crate::read_model::TenantStore;

/// Aggregate type tag under which order streams are appended.
pub const ORDER_AGGREGATE_TYPE: &str = "orders.order";

/// Tenant+aggregate cursor for idempotent projection.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum OrderTotalsProjectionError {
    #[error("failed to deserialize order event: {0}")]
    Deserialize(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Projection: order events -> cached totals per order.
///
/// The cached value is always the output of `compute_totals` over the
/// rehydrated aggregate; there is no direct write path. When a recomputation
/// fails (no rate for the order's date) the previously cached totals remain
/// authoritative until the rate table catches up.
#[derive(Debug)]
pub struct OrderTotalsProjection<S, R>
where
    S: TenantStore<AggregateId, Totals>,
    R: RateProvider,
{
    store: S,
    provider: R,
    orders: RwLock<HashMap<CursorKey, Order>>,
    cursors: RwLock<HashMap<CursorKey, u64>>,
}

impl<S, R> OrderTotalsProjection<S, R>
where
    S: TenantStore<AggregateId, Totals>,
    R: RateProvider,
{
    pub fn new(store: S, provider: R) -> Self {
        Self {
            store,
            provider,
            orders: RwLock::new(HashMap::new()),
            cursors: RwLock::new(HashMap::new()),
        }
    }

    /// Fold one published envelope into the projection.
    ///
    /// Idempotent: envelopes at or below the stream cursor are skipped, so
    /// at-least-once delivery from the bus is safe.
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), OrderTotalsProjectionError> {
        if envelope.aggregate_type() != ORDER_AGGREGATE_TYPE {
            return Ok(());
        }

        let key = CursorKey {
            tenant_id: envelope.tenant_id(),
            aggregate_id: envelope.aggregate_id(),
        };
        let last = self
            .cursors
            .read()
            .ok()
            .and_then(|c| c.get(&key).copied())
            .unwrap_or(0);
        let found = envelope.sequence_number();
        if found <= last {
            return Ok(());
        }
        if found != last + 1 {
            return Err(OrderTotalsProjectionError::NonMonotonicSequence { last, found });
        }

        let event: OrderEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| OrderTotalsProjectionError::Deserialize(e.to_string()))?;

        let order = {
            let mut orders = match self.orders.write() {
                Ok(o) => o,
                Err(_) => return Ok(()),
            };
            let order = orders
                .entry(key)
                .or_insert_with(|| Order::empty(OrderId::new(key.aggregate_id)));
            order.apply(&event);
            order.clone()
        };

        match compute_totals(&order, &self.provider) {
            Ok(totals) => self.store.upsert(key.tenant_id, key.aggregate_id, totals),
            Err(DomainError::RateUnavailable(msg)) => {
                // Prior cached totals stay authoritative.
                tracing::warn!(order_id = %order.id_typed(), "totals not refreshed: {msg}");
            }
            Err(other) => {
                tracing::warn!(order_id = %order.id_typed(), "totals recomputation failed: {other}");
            }
        }

        if let Ok(mut cursors) = self.cursors.write() {
            cursors.insert(key, found);
        }

        Ok(())
    }

    pub fn totals(&self, tenant_id: TenantId, order_id: OrderId) -> Option<Totals> {
        self.store.get(tenant_id, &order_id.0)
    }

    /// Drop all cached state for a tenant (rebuild support).
    pub fn clear_tenant(&self, tenant_id: TenantId) {
        self.store.clear_tenant(tenant_id);
        if let Ok(mut orders) = self.orders.write() {
            orders.retain(|k, _| k.tenant_id != tenant_id);
        }
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.retain(|k, _| k.tenant_id != tenant_id);
        }
    }
}
