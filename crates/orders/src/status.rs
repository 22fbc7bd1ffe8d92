//! Order status lifecycle: manual transition table + automatic inference
//! from aggregate line fulfillment.

use serde::{Deserialize, Serialize};

use bridgecart_core::{DomainError, DomainResult};

use crate::line::FulfillmentStage;

/// Order status lifecycle.
///
/// Manual path: Draft -> Submitted -> Confirmed -> Paid -> ... -> Delivered.
/// The procurement/receiving/packing statuses in between are inferred from
/// line stages, never set directly by an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Draft,
    Submitted,
    Confirmed,
    Paid,
    PartiallyOrdered,
    Ordered,
    PartiallyReceived,
    ReadyToShip,
    PartiallyPacked,
    Packed,
    PartiallyDispatched,
    Dispatched,
    Delivered,
    Cancelled,
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            OrderStatus::Draft => "draft",
            OrderStatus::Submitted => "submitted",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Paid => "paid",
            OrderStatus::PartiallyOrdered => "partially_ordered",
            OrderStatus::Ordered => "ordered",
            OrderStatus::PartiallyReceived => "partially_received",
            OrderStatus::ReadyToShip => "ready_to_ship",
            OrderStatus::PartiallyPacked => "partially_packed",
            OrderStatus::Packed => "packed",
            OrderStatus::PartiallyDispatched => "partially_dispatched",
            OrderStatus::Dispatched => "dispatched",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Operator-invoked status actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderAction {
    Submit,
    RevertToDraft,
    Confirm,
    MarkPaid,
    MarkPartiallyDispatched,
    MarkDispatched,
    MarkDelivered,
    Cancel,
}

impl core::fmt::Display for OrderAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            OrderAction::Submit => "submit",
            OrderAction::RevertToDraft => "revert_to_draft",
            OrderAction::Confirm => "confirm",
            OrderAction::MarkPaid => "mark_paid",
            OrderAction::MarkPartiallyDispatched => "mark_partially_dispatched",
            OrderAction::MarkDispatched => "mark_dispatched",
            OrderAction::MarkDelivered => "mark_delivered",
            OrderAction::Cancel => "cancel",
        };
        write!(f, "{s}")
    }
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// Cancellation is allowed from any state before the dispatch phase.
    pub fn is_cancellable(&self) -> bool {
        !matches!(
            self,
            OrderStatus::PartiallyDispatched
                | OrderStatus::Dispatched
                | OrderStatus::Delivered
                | OrderStatus::Cancelled
        )
    }

    /// Procurement-phase statuses: ordering inference may move between them.
    pub fn in_ordering_phase(&self) -> bool {
        matches!(
            self,
            OrderStatus::Confirmed | OrderStatus::PartiallyOrdered | OrderStatus::Ordered
        )
    }

    /// Receiving-phase statuses: receipt inference may move between them.
    /// `Paid` is deliberately excluded - a receipt toggle must not silently
    /// erase payment status.
    pub fn in_receiving_phase(&self) -> bool {
        matches!(
            self,
            OrderStatus::Confirmed
                | OrderStatus::PartiallyOrdered
                | OrderStatus::Ordered
                | OrderStatus::PartiallyReceived
                | OrderStatus::ReadyToShip
        )
    }

    /// Packing-phase statuses: packing inference may move between them.
    pub fn in_packing_phase(&self) -> bool {
        matches!(self, OrderStatus::Paid | OrderStatus::PartiallyPacked)
    }

    /// Target status for a manual action from this state, if allowed.
    pub fn next_for(&self, action: OrderAction) -> Option<OrderStatus> {
        use OrderAction::*;
        use OrderStatus::*;

        match (self, action) {
            (Draft, Submit) => Some(Submitted),
            (Submitted, RevertToDraft) => Some(Draft),
            (Submitted, Confirm) => Some(Confirmed),
            (
                Confirmed | PartiallyOrdered | Ordered | PartiallyReceived | ReadyToShip,
                MarkPaid,
            ) => Some(Paid),
            (Packed, MarkPartiallyDispatched) => Some(PartiallyDispatched),
            (Packed | PartiallyDispatched, MarkDispatched) => Some(Dispatched),
            (Dispatched, MarkDelivered) => Some(Delivered),
            (from, Cancel) if from.is_cancellable() => Some(Cancelled),
            _ => None,
        }
    }

    /// All actions valid from this state (for transition-rejected reporting).
    pub fn valid_actions(&self) -> Vec<OrderAction> {
        use OrderAction::*;
        [
            Submit,
            RevertToDraft,
            Confirm,
            MarkPaid,
            MarkPartiallyDispatched,
            MarkDispatched,
            MarkDelivered,
            Cancel,
        ]
        .into_iter()
        .filter(|a| self.next_for(*a).is_some())
        .collect()
    }
}

/// Validate a manual action and return the target status.
///
/// A rejected action reports the actions that are valid from `from`, and the
/// order is left unchanged by the caller.
pub fn transition(from: OrderStatus, action: OrderAction) -> DomainResult<OrderStatus> {
    from.next_for(action).ok_or_else(|| {
        DomainError::transition_rejected(
            action.to_string(),
            from.to_string(),
            from.valid_actions()
                .into_iter()
                .map(|a| a.to_string())
                .collect(),
        )
    })
}

/// Recompute the order status from the full, current set of line stages.
///
/// Returns `Some(new_status)` when the aggregate line state implies a status
/// different from `current`, `None` otherwise. Forward-only per phase:
/// nothing is inferred for Draft/Submitted/Paid-adjacent manual statuses
/// outside their phase, for the dispatch phase, or for terminal states.
/// The receiving floor is `Confirmed` - zero received lines never demote an
/// order below it.
pub fn infer_status(current: OrderStatus, stages: &[FulfillmentStage]) -> Option<OrderStatus> {
    if stages.is_empty() {
        return None;
    }

    let total = stages.len();
    let ordered = stages.iter().filter(|s| **s >= FulfillmentStage::Ordered).count();
    let received = stages
        .iter()
        .filter(|s| **s >= FulfillmentStage::Received)
        .count();
    let packed = stages.iter().filter(|s| **s == FulfillmentStage::Packed).count();

    let inferred = if current.in_packing_phase() {
        if packed == total {
            OrderStatus::Packed
        } else if packed > 0 {
            OrderStatus::PartiallyPacked
        } else {
            // Floor: never regress below Paid within the packing phase.
            OrderStatus::Paid
        }
    } else if current.in_receiving_phase() {
        if received == total {
            OrderStatus::ReadyToShip
        } else if received > 0 {
            OrderStatus::PartiallyReceived
        } else if ordered == total {
            OrderStatus::Ordered
        } else if ordered > 0 {
            OrderStatus::PartiallyOrdered
        } else {
            // Floor: never regress below Confirmed.
            OrderStatus::Confirmed
        }
    } else {
        return None;
    };

    (inferred != current).then_some(inferred)
}
