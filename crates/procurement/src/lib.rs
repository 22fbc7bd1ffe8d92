//! Procurement: supplier purchase batches and the splitter that groups an
//! order's lines into them.

pub mod split;
pub mod supplier_order;

pub use split::{split_into_supplier_orders, BatchPlan, SplitOutcome};
pub use supplier_order::{
    AddItems, MarkReceived, OpenBatch, RecordReceipt, SupplierOrder, SupplierOrderCommand,
    SupplierOrderEvent, SupplierOrderId, SupplierOrderItem, SupplierOrderStatus,
};
