//! Procurement splitter: group an order's supplier-ordered lines into
//! per-supplier purchase batches.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use bridgecart_orders::{infer_status, Order, OrderStatus};

use crate::supplier_order::{SupplierOrder, SupplierOrderId, SupplierOrderItem};

/// Items destined for one supplier batch.
///
/// `batch_id` names the existing open batch to append to; `None` means a new
/// batch must be opened for `(supplier_name, order_date)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchPlan {
    pub batch_id: Option<SupplierOrderId>,
    pub supplier_name: String,
    pub order_date: NaiveDate,
    pub items: Vec<SupplierOrderItem>,
}

/// Result of one split pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitOutcome {
    pub batches: Vec<BatchPlan>,
    /// Status the parent order should move to, if the line state implies one.
    pub new_order_status: Option<OrderStatus>,
}

impl SplitOutcome {
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty() && self.new_order_status.is_none()
    }
}

/// Group the order's eligible lines into supplier batches dated `today`.
///
/// Eligible: flagged ordered, not yet received in the warehouse, with a
/// non-blank effective supplier, and not already attached to any open batch.
/// The exclusion makes the split idempotent per line; a line whose prior
/// batch was closed (received) while the line itself never arrived becomes
/// eligible again (the re-order path).
///
/// Pure: the caller opens/appends the planned batches and applies the status
/// change against current aggregate state.
pub fn split_into_supplier_orders(
    order: &Order,
    open_batches: &[SupplierOrder],
    today: NaiveDate,
) -> SplitOutcome {
    let order_id = order.id_typed();

    // BTreeMap keeps plan order deterministic across runs.
    let mut plans: BTreeMap<String, Vec<SupplierOrderItem>> = BTreeMap::new();

    for line in order.lines() {
        if !line.is_ordered() || line.is_received() {
            continue;
        }
        let Some(supplier) = line.effective_supplier() else {
            continue;
        };
        let attached = open_batches
            .iter()
            .any(|b| b.is_open() && b.contains_line(order_id, line.line_no));
        if attached {
            continue;
        }

        plans.entry(supplier.to_string()).or_default().push(SupplierOrderItem {
            order_id,
            line_no: line.line_no,
            quantity_ordered: line.quantity,
            quantity_received: Decimal::ZERO,
            unit_cost: line.net_cost.unwrap_or_default(),
        });
    }

    let batches = plans
        .into_iter()
        .map(|(supplier_name, items)| {
            let batch_id = open_batches
                .iter()
                .find(|b| {
                    b.is_open() && b.supplier_name() == supplier_name && b.order_date() == today
                })
                .map(|b| b.id_typed());
            BatchPlan {
                batch_id,
                supplier_name,
                order_date: today,
                items,
            }
        })
        .collect();

    let stages: Vec<_> = order.lines().iter().map(|l| l.stage).collect();
    SplitOutcome {
        batches,
        new_order_status: infer_status(order.status(), &stages),
    }
}
