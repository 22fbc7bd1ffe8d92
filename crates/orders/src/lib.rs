//! Order domain: the client order aggregate, its lines, and the status
//! state machine (manual transitions + inference from line fulfillment).

pub mod line;
pub mod order;
pub mod status;

pub use line::{FulfillmentChange, FulfillmentStage, LineDraft, OrderLine, UnitOfMeasure};
pub use order::{
    AddLine, CacheLinePrices, CachedLinePrice, CreateOrder, Order, OrderCommand, OrderEvent,
    OrderId, ReconcileStatus, RemoveLine, SetHeaderPricing, SetLineProcurement,
    TransitionStatus, UpdateLine, UpdateLineFulfillment,
};
pub use status::{infer_status, transition, OrderAction, OrderStatus};
