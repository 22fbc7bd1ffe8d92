mod order_totals;

pub use order_totals::{OrderTotalsProjection, OrderTotalsProjectionError, ORDER_AGGREGATE_TYPE};
