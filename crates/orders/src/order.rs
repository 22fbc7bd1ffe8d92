use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use bridgecart_core::{
    Aggregate, AggregateId, AggregateRoot, Currency, DomainError, HeaderDiscount, Percent,
    TenantId, VatRate,
};
use bridgecart_events::Event;

use crate::line::{
    validate_quantity, validate_unit_price, FulfillmentChange, FulfillmentStage, LineDraft,
    OrderLine,
};
use crate::status::{infer_status, transition, OrderAction, OrderStatus};

/// Order identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub AggregateId);

impl OrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for OrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: a client order.
///
/// The header carries the presentation currency, VAT rate, shipping cost and
/// the header-level discount/markup; `transport_cost`/`logistics_cost` are
/// internal figures never shown to the client. Lines are dense and 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    tenant_id: Option<TenantId>,
    currency: Currency,
    vat_rate: VatRate,
    shipping_cost: Decimal,
    discount: HeaderDiscount,
    markup: Percent,
    transport_cost: Decimal,
    logistics_cost: Decimal,
    status: OrderStatus,
    lines: Vec<OrderLine>,
    created_at: Option<DateTime<Utc>>,
    submitted_at: Option<DateTime<Utc>>,
    confirmed_at: Option<DateTime<Utc>>,
    dispatched_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Order {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: OrderId) -> Self {
        Self {
            id,
            tenant_id: None,
            currency: Currency::Eur,
            vat_rate: VatRate::Standard,
            shipping_cost: Decimal::ZERO,
            discount: HeaderDiscount::None,
            markup: Percent::ZERO,
            transport_cost: Decimal::ZERO,
            logistics_cost: Decimal::ZERO,
            status: OrderStatus::Draft,
            lines: Vec::new(),
            created_at: None,
            submitted_at: None,
            confirmed_at: None,
            dispatched_at: None,
            delivered_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn vat_rate(&self) -> VatRate {
        self.vat_rate
    }

    pub fn shipping_cost(&self) -> Decimal {
        self.shipping_cost
    }

    pub fn discount(&self) -> HeaderDiscount {
        self.discount
    }

    pub fn markup(&self) -> Percent {
        self.markup
    }

    pub fn transport_cost(&self) -> Decimal {
        self.transport_cost
    }

    pub fn logistics_cost(&self) -> Decimal {
        self.logistics_cost
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    pub fn line(&self, line_no: u32) -> Option<&OrderLine> {
        self.lines.iter().find(|l| l.line_no == line_no)
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn submitted_at(&self) -> Option<DateTime<Utc>> {
        self.submitted_at
    }

    pub fn confirmed_at(&self) -> Option<DateTime<Utc>> {
        self.confirmed_at
    }

    pub fn dispatched_at(&self) -> Option<DateTime<Utc>> {
        self.dispatched_at
    }

    pub fn delivered_at(&self) -> Option<DateTime<Utc>> {
        self.delivered_at
    }

    /// The calendar date used for rate lookups: the order's creation date.
    /// One policy, everywhere - display estimates and authoritative totals
    /// must resolve the same rate.
    pub fn pricing_date(&self) -> Option<NaiveDate> {
        self.created_at.map(|t| t.date_naive())
    }

    /// Basket-shaping edits (lines, prices, discounts) are draft-only.
    pub fn is_modifiable(&self) -> bool {
        matches!(self.status, OrderStatus::Draft)
    }

    /// Header pricing and price-cache writes stay open until dispatch begins.
    pub fn is_pre_dispatch(&self) -> bool {
        !matches!(
            self.status,
            OrderStatus::PartiallyDispatched
                | OrderStatus::Dispatched
                | OrderStatus::Delivered
                | OrderStatus::Cancelled
        )
    }

    /// Fulfillment flags only move once the order is confirmed and before
    /// dispatch begins.
    pub fn is_in_fulfillment(&self) -> bool {
        self.is_pre_dispatch() && !matches!(self.status, OrderStatus::Draft | OrderStatus::Submitted)
    }
}

impl AggregateRoot for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOrder {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub currency: Currency,
    pub vat_rate: VatRate,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddLine (only allowed in Draft).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddLine {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub line: LineDraft,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateLine. `None` fields are left untouched. Updating
/// `unit_price` does not move totals while the line's original net price is
/// cached; only a fresh "save basket" does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateLine {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub line_no: u32,
    pub product_name: Option<String>,
    pub quantity: Option<Decimal>,
    pub unit_price: Option<Decimal>,
    pub line_discount: Option<Percent>,
    pub supplier_name: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemoveLine. Remaining lines are renumbered densely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveLine {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub line_no: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetHeaderPricing (full replacement of header pricing fields).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetHeaderPricing {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub vat_rate: VatRate,
    pub shipping_cost: Decimal,
    pub discount: HeaderDiscount,
    pub markup: Percent,
    pub transport_cost: Decimal,
    pub logistics_cost: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// One frozen per-unit net price, in the order's header currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedLinePrice {
    pub line_no: u32,
    pub net_price: Decimal,
}

/// Command: CacheLinePrices ("save basket"). The only way totals pick up a
/// changed unit price once a cache value exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheLinePrices {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub prices: Vec<CachedLinePrice>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetLineProcurement (staff-side costs, from Confirmed onward).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetLineProcurement {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub line_no: u32,
    pub actual_supplier: Option<String>,
    pub net_cost: Option<Decimal>,
    pub logistics_cost: Option<Decimal>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: TransitionStatus (operator-invoked manual action).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionStatus {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub action: OrderAction,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReconcileStatus. Re-runs status inference against the current
/// line set and emits a status change only when one is implied. Used after
/// flows that may leave the stored status behind the line state (e.g. a
/// procurement split against a stale snapshot).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileStatus {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateLineFulfillment (warehouse flag change; may also emit an
/// inferred status change computed from the full current line set).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateLineFulfillment {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub line_no: u32,
    pub change: FulfillmentChange,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderCommand {
    CreateOrder(CreateOrder),
    AddLine(AddLine),
    UpdateLine(UpdateLine),
    RemoveLine(RemoveLine),
    SetHeaderPricing(SetHeaderPricing),
    CacheLinePrices(CacheLinePrices),
    SetLineProcurement(SetLineProcurement),
    TransitionStatus(TransitionStatus),
    ReconcileStatus(ReconcileStatus),
    UpdateLineFulfillment(UpdateLineFulfillment),
}

/// Event: OrderCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreated {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub currency: Currency,
    pub vat_rate: VatRate,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LineAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineAdded {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub line_no: u32,
    pub line: LineDraft,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LineUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineUpdated {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub line_no: u32,
    pub product_name: Option<String>,
    pub quantity: Option<Decimal>,
    pub unit_price: Option<Decimal>,
    pub line_discount: Option<Percent>,
    pub supplier_name: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LineRemoved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRemoved {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub line_no: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Event: HeaderPricingChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderPricingChanged {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub vat_rate: VatRate,
    pub shipping_cost: Decimal,
    pub discount: HeaderDiscount,
    pub markup: Percent,
    pub transport_cost: Decimal,
    pub logistics_cost: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LinePricesCached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinePricesCached {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub prices: Vec<CachedLinePrice>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LineProcurementChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineProcurementChanged {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub line_no: u32,
    pub actual_supplier: Option<String>,
    pub net_cost: Option<Decimal>,
    pub logistics_cost: Option<Decimal>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LineFulfillmentChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineFulfillmentChanged {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub line_no: u32,
    pub change: FulfillmentChange,
    pub stage: FulfillmentStage,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StatusChanged. `action` is `None` for inferred transitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChanged {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub action: Option<OrderAction>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEvent {
    OrderCreated(OrderCreated),
    LineAdded(LineAdded),
    LineUpdated(LineUpdated),
    LineRemoved(LineRemoved),
    HeaderPricingChanged(HeaderPricingChanged),
    LinePricesCached(LinePricesCached),
    LineProcurementChanged(LineProcurementChanged),
    LineFulfillmentChanged(LineFulfillmentChanged),
    StatusChanged(StatusChanged),
}

impl Event for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderCreated(_) => "orders.order.created",
            OrderEvent::LineAdded(_) => "orders.order.line_added",
            OrderEvent::LineUpdated(_) => "orders.order.line_updated",
            OrderEvent::LineRemoved(_) => "orders.order.line_removed",
            OrderEvent::HeaderPricingChanged(_) => "orders.order.header_pricing_changed",
            OrderEvent::LinePricesCached(_) => "orders.order.line_prices_cached",
            OrderEvent::LineProcurementChanged(_) => "orders.order.line_procurement_changed",
            OrderEvent::LineFulfillmentChanged(_) => "orders.order.line_fulfillment_changed",
            OrderEvent::StatusChanged(_) => "orders.order.status_changed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::OrderCreated(e) => e.occurred_at,
            OrderEvent::LineAdded(e) => e.occurred_at,
            OrderEvent::LineUpdated(e) => e.occurred_at,
            OrderEvent::LineRemoved(e) => e.occurred_at,
            OrderEvent::HeaderPricingChanged(e) => e.occurred_at,
            OrderEvent::LinePricesCached(e) => e.occurred_at,
            OrderEvent::LineProcurementChanged(e) => e.occurred_at,
            OrderEvent::LineFulfillmentChanged(e) => e.occurred_at,
            OrderEvent::StatusChanged(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Order {
    type Command = OrderCommand;
    type Event = OrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OrderEvent::OrderCreated(e) => {
                self.id = e.order_id;
                self.tenant_id = Some(e.tenant_id);
                self.currency = e.currency;
                self.vat_rate = e.vat_rate;
                self.status = OrderStatus::Draft;
                self.lines.clear();
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            OrderEvent::LineAdded(e) => {
                self.lines.push(OrderLine::from_draft(e.line_no, &e.line));
            }
            OrderEvent::LineUpdated(e) => {
                if let Some(line) = self.lines.iter_mut().find(|l| l.line_no == e.line_no) {
                    if let Some(name) = &e.product_name {
                        line.product_name = name.clone();
                    }
                    if let Some(q) = e.quantity {
                        line.quantity = q;
                    }
                    if let Some(p) = e.unit_price {
                        line.unit_price = p;
                    }
                    if let Some(d) = e.line_discount {
                        line.line_discount = d;
                    }
                    if let Some(s) = &e.supplier_name {
                        line.supplier_name = Some(s.clone());
                    }
                }
            }
            OrderEvent::LineRemoved(e) => {
                self.lines.retain(|l| l.line_no != e.line_no);
                // Keep line numbers dense and 1-based.
                for (idx, line) in self.lines.iter_mut().enumerate() {
                    line.line_no = (idx as u32) + 1;
                }
            }
            OrderEvent::HeaderPricingChanged(e) => {
                self.vat_rate = e.vat_rate;
                self.shipping_cost = e.shipping_cost;
                self.discount = e.discount;
                self.markup = e.markup;
                self.transport_cost = e.transport_cost;
                self.logistics_cost = e.logistics_cost;
            }
            OrderEvent::LinePricesCached(e) => {
                for price in &e.prices {
                    if let Some(line) = self.lines.iter_mut().find(|l| l.line_no == price.line_no)
                    {
                        line.original_net_price = Some(price.net_price);
                    }
                }
            }
            OrderEvent::LineProcurementChanged(e) => {
                if let Some(line) = self.lines.iter_mut().find(|l| l.line_no == e.line_no) {
                    if let Some(s) = &e.actual_supplier {
                        line.actual_supplier = Some(s.clone());
                    }
                    if let Some(c) = e.net_cost {
                        line.net_cost = Some(c);
                    }
                    if let Some(c) = e.logistics_cost {
                        line.logistics_cost = Some(c);
                    }
                }
            }
            OrderEvent::LineFulfillmentChanged(e) => {
                if let Some(line) = self.lines.iter_mut().find(|l| l.line_no == e.line_no) {
                    line.stage = e.stage;
                    match e.change {
                        FulfillmentChange::Ordered => line.ordered_at = Some(e.occurred_at),
                        FulfillmentChange::Received => line.received_at = Some(e.occurred_at),
                        FulfillmentChange::ReceiptReverted => line.received_at = None,
                        FulfillmentChange::Packed => line.packed_at = Some(e.occurred_at),
                        FulfillmentChange::PackingReverted => line.packed_at = None,
                    }
                }
            }
            OrderEvent::StatusChanged(e) => {
                self.status = e.to;
                match e.to {
                    OrderStatus::Submitted => self.submitted_at = Some(e.occurred_at),
                    // Explicit revert clears the submission timestamp.
                    OrderStatus::Draft => self.submitted_at = None,
                    OrderStatus::Confirmed if e.action == Some(OrderAction::Confirm) => {
                        self.confirmed_at = Some(e.occurred_at)
                    }
                    OrderStatus::Dispatched => self.dispatched_at = Some(e.occurred_at),
                    OrderStatus::Delivered => self.delivered_at = Some(e.occurred_at),
                    _ => {}
                }
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::CreateOrder(cmd) => self.handle_create(cmd),
            OrderCommand::AddLine(cmd) => self.handle_add_line(cmd),
            OrderCommand::UpdateLine(cmd) => self.handle_update_line(cmd),
            OrderCommand::RemoveLine(cmd) => self.handle_remove_line(cmd),
            OrderCommand::SetHeaderPricing(cmd) => self.handle_set_header_pricing(cmd),
            OrderCommand::CacheLinePrices(cmd) => self.handle_cache_line_prices(cmd),
            OrderCommand::SetLineProcurement(cmd) => self.handle_set_line_procurement(cmd),
            OrderCommand::TransitionStatus(cmd) => self.handle_transition_status(cmd),
            OrderCommand::ReconcileStatus(cmd) => self.handle_reconcile_status(cmd),
            OrderCommand::UpdateLineFulfillment(cmd) => self.handle_update_line_fulfillment(cmd),
        }
    }
}

impl Order {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_order_id(&self, order_id: OrderId) -> Result<(), DomainError> {
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    fn ensure_exists(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        Ok(())
    }

    fn ensure_line_exists(&self, line_no: u32) -> Result<&OrderLine, DomainError> {
        self.line(line_no).ok_or_else(|| {
            DomainError::validation(format!("order has no line {line_no}"))
        })
    }

    fn handle_create(&self, cmd: &CreateOrder) -> Result<Vec<OrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("order already exists"));
        }

        Ok(vec![OrderEvent::OrderCreated(OrderCreated {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            currency: cmd.currency,
            vat_rate: cmd.vat_rate,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_line(&self, cmd: &AddLine) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_order_id(cmd.order_id)?;

        if !self.is_modifiable() {
            return Err(DomainError::invariant(
                "basket can only be edited while the order is a draft",
            ));
        }

        validate_quantity(cmd.line.quantity, cmd.line.unit_of_measure)?;
        validate_unit_price(cmd.line.unit_price)?;

        let next_line_no = (self.lines.len() as u32) + 1;

        Ok(vec![OrderEvent::LineAdded(LineAdded {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            line_no: next_line_no,
            line: cmd.line.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_line(&self, cmd: &UpdateLine) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_order_id(cmd.order_id)?;

        if !self.is_modifiable() {
            return Err(DomainError::invariant(
                "basket can only be edited while the order is a draft",
            ));
        }

        let line = self.ensure_line_exists(cmd.line_no)?;

        if let Some(q) = cmd.quantity {
            validate_quantity(q, line.unit_of_measure)?;
        }
        if let Some(p) = cmd.unit_price {
            validate_unit_price(p)?;
        }

        Ok(vec![OrderEvent::LineUpdated(LineUpdated {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            line_no: cmd.line_no,
            product_name: cmd.product_name.clone(),
            quantity: cmd.quantity,
            unit_price: cmd.unit_price,
            line_discount: cmd.line_discount,
            supplier_name: cmd.supplier_name.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove_line(&self, cmd: &RemoveLine) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_order_id(cmd.order_id)?;

        if !self.is_modifiable() {
            return Err(DomainError::invariant(
                "basket can only be edited while the order is a draft",
            ));
        }

        self.ensure_line_exists(cmd.line_no)?;

        Ok(vec![OrderEvent::LineRemoved(LineRemoved {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            line_no: cmd.line_no,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_header_pricing(
        &self,
        cmd: &SetHeaderPricing,
    ) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_order_id(cmd.order_id)?;

        if !self.is_pre_dispatch() {
            return Err(DomainError::invariant(
                "header pricing cannot change once dispatch began",
            ));
        }

        for (name, value) in [
            ("shipping_cost", cmd.shipping_cost),
            ("transport_cost", cmd.transport_cost),
            ("logistics_cost", cmd.logistics_cost),
        ] {
            if value < Decimal::ZERO {
                return Err(DomainError::validation(format!(
                    "{name} must not be negative, got {value}"
                )));
            }
        }

        Ok(vec![OrderEvent::HeaderPricingChanged(HeaderPricingChanged {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            vat_rate: cmd.vat_rate,
            shipping_cost: cmd.shipping_cost,
            discount: cmd.discount,
            markup: cmd.markup,
            transport_cost: cmd.transport_cost,
            logistics_cost: cmd.logistics_cost,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cache_line_prices(
        &self,
        cmd: &CacheLinePrices,
    ) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_order_id(cmd.order_id)?;

        if !self.is_pre_dispatch() {
            return Err(DomainError::invariant(
                "line prices cannot be recomputed once dispatch began",
            ));
        }

        for price in &cmd.prices {
            self.ensure_line_exists(price.line_no)?;
            if price.net_price <= Decimal::ZERO {
                return Err(DomainError::validation(format!(
                    "cached net price for line {} must be positive, got {}",
                    price.line_no, price.net_price
                )));
            }
        }

        Ok(vec![OrderEvent::LinePricesCached(LinePricesCached {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            prices: cmd.prices.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_line_procurement(
        &self,
        cmd: &SetLineProcurement,
    ) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_order_id(cmd.order_id)?;

        if !self.is_in_fulfillment() {
            return Err(DomainError::invariant(
                "procurement fields are only editable between confirmation and dispatch",
            ));
        }

        self.ensure_line_exists(cmd.line_no)?;

        if let Some(cost) = cmd.net_cost {
            if cost < Decimal::ZERO {
                return Err(DomainError::validation(format!(
                    "net cost must not be negative, got {cost}"
                )));
            }
        }
        if let Some(cost) = cmd.logistics_cost {
            if cost < Decimal::ZERO {
                return Err(DomainError::validation(format!(
                    "logistics cost must not be negative, got {cost}"
                )));
            }
        }

        Ok(vec![OrderEvent::LineProcurementChanged(
            LineProcurementChanged {
                tenant_id: cmd.tenant_id,
                order_id: cmd.order_id,
                line_no: cmd.line_no,
                actual_supplier: cmd.actual_supplier.clone(),
                net_cost: cmd.net_cost,
                logistics_cost: cmd.logistics_cost,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_transition_status(
        &self,
        cmd: &TransitionStatus,
    ) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_order_id(cmd.order_id)?;

        if cmd.action == OrderAction::Submit && self.lines.is_empty() {
            return Err(DomainError::validation(
                "cannot submit an order without lines",
            ));
        }

        let to = transition(self.status, cmd.action)?;

        Ok(vec![OrderEvent::StatusChanged(StatusChanged {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            from: self.status,
            to,
            action: Some(cmd.action),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reconcile_status(
        &self,
        cmd: &ReconcileStatus,
    ) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_order_id(cmd.order_id)?;

        let stages: Vec<FulfillmentStage> = self.lines.iter().map(|l| l.stage).collect();
        let Some(to) = infer_status(self.status, &stages) else {
            return Ok(vec![]);
        };

        Ok(vec![OrderEvent::StatusChanged(StatusChanged {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            from: self.status,
            to,
            action: None,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_line_fulfillment(
        &self,
        cmd: &UpdateLineFulfillment,
    ) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_order_id(cmd.order_id)?;

        if !self.is_in_fulfillment() {
            return Err(DomainError::invariant(
                "fulfillment flags only move between confirmation and dispatch",
            ));
        }

        let line = self.ensure_line_exists(cmd.line_no)?;
        let new_stage = line.stage_after(cmd.change)?;

        let mut events = vec![OrderEvent::LineFulfillmentChanged(LineFulfillmentChanged {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            line_no: cmd.line_no,
            change: cmd.change,
            stage: new_stage,
            occurred_at: cmd.occurred_at,
        })];

        // Inference always reads the full, current line set with this one
        // change applied - never a stale snapshot of a single flag.
        let stages: Vec<FulfillmentStage> = self
            .lines
            .iter()
            .map(|l| if l.line_no == cmd.line_no { new_stage } else { l.stage })
            .collect();

        if let Some(to) = infer_status(self.status, &stages) {
            events.push(OrderEvent::StatusChanged(StatusChanged {
                tenant_id: cmd.tenant_id,
                order_id: cmd.order_id,
                from: self.status,
                to,
                action: None,
                occurred_at: cmd.occurred_at,
            }));
        }

        Ok(events)
    }
}
