//! Supplier purchase batch aggregate.
//!
//! A batch groups lines bought together from one supplier on one date. It
//! holds non-owning references to client order lines (order id + line number)
//! and tracks partial receipt per item.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use bridgecart_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use bridgecart_events::Event;
use bridgecart_orders::OrderId;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SupplierOrderId(pub AggregateId);

impl SupplierOrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for SupplierOrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SupplierOrderStatus {
    Ordered,
    Received,
}

/// One client order line attached to a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierOrderItem {
    pub order_id: OrderId,
    pub line_no: u32,
    pub quantity_ordered: Decimal,
    pub quantity_received: Decimal,
    /// Per-unit net cost in the source currency.
    pub unit_cost: Decimal,
}

impl SupplierOrderItem {
    pub fn cost(&self) -> Decimal {
        self.unit_cost * self.quantity_ordered
    }
}

/// Aggregate root: one supplier purchase batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierOrder {
    id: SupplierOrderId,
    tenant_id: Option<TenantId>,
    supplier_name: String,
    order_date: NaiveDate,
    items: Vec<SupplierOrderItem>,
    status: SupplierOrderStatus,
    received_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl SupplierOrder {
    pub fn empty(id: SupplierOrderId) -> Self {
        Self {
            id,
            tenant_id: None,
            supplier_name: String::new(),
            order_date: NaiveDate::MIN,
            items: Vec::new(),
            status: SupplierOrderStatus::Ordered,
            received_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> SupplierOrderId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn supplier_name(&self) -> &str {
        &self.supplier_name
    }

    pub fn order_date(&self) -> NaiveDate {
        self.order_date
    }

    pub fn items(&self) -> &[SupplierOrderItem] {
        &self.items
    }

    pub fn status(&self) -> SupplierOrderStatus {
        self.status
    }

    pub fn received_at(&self) -> Option<DateTime<Utc>> {
        self.received_at
    }

    /// Open batches still accept items; received ones are closed for good.
    pub fn is_open(&self) -> bool {
        self.status == SupplierOrderStatus::Ordered
    }

    pub fn contains_line(&self, order_id: OrderId, line_no: u32) -> bool {
        self.items
            .iter()
            .any(|i| i.order_id == order_id && i.line_no == line_no)
    }

    /// Sum of `unit_cost * quantity_ordered` over all items, source currency.
    pub fn total_cost(&self) -> Decimal {
        self.items.iter().map(SupplierOrderItem::cost).sum()
    }
}

impl AggregateRoot for SupplierOrder {
    type Id = SupplierOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: OpenBatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenBatch {
    pub tenant_id: TenantId,
    pub batch_id: SupplierOrderId,
    pub supplier_name: String,
    pub order_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddItems. Rejects items already attached to this batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddItems {
    pub tenant_id: TenantId,
    pub batch_id: SupplierOrderId,
    pub items: Vec<SupplierOrderItem>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordReceipt (partial receipt of one item).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordReceipt {
    pub tenant_id: TenantId,
    pub batch_id: SupplierOrderId,
    pub order_id: OrderId,
    pub line_no: u32,
    pub quantity: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkReceived (close the batch).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkReceived {
    pub tenant_id: TenantId,
    pub batch_id: SupplierOrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SupplierOrderCommand {
    OpenBatch(OpenBatch),
    AddItems(AddItems),
    RecordReceipt(RecordReceipt),
    MarkReceived(MarkReceived),
}

/// Event: BatchOpened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOpened {
    pub tenant_id: TenantId,
    pub batch_id: SupplierOrderId,
    pub supplier_name: String,
    pub order_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemsAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemsAdded {
    pub tenant_id: TenantId,
    pub batch_id: SupplierOrderId,
    pub items: Vec<SupplierOrderItem>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReceiptRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptRecorded {
    pub tenant_id: TenantId,
    pub batch_id: SupplierOrderId,
    pub order_id: OrderId,
    pub line_no: u32,
    pub quantity: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BatchReceived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReceived {
    pub tenant_id: TenantId,
    pub batch_id: SupplierOrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SupplierOrderEvent {
    BatchOpened(BatchOpened),
    ItemsAdded(ItemsAdded),
    ReceiptRecorded(ReceiptRecorded),
    BatchReceived(BatchReceived),
}

impl Event for SupplierOrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SupplierOrderEvent::BatchOpened(_) => "procurement.batch.opened",
            SupplierOrderEvent::ItemsAdded(_) => "procurement.batch.items_added",
            SupplierOrderEvent::ReceiptRecorded(_) => "procurement.batch.receipt_recorded",
            SupplierOrderEvent::BatchReceived(_) => "procurement.batch.received",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SupplierOrderEvent::BatchOpened(e) => e.occurred_at,
            SupplierOrderEvent::ItemsAdded(e) => e.occurred_at,
            SupplierOrderEvent::ReceiptRecorded(e) => e.occurred_at,
            SupplierOrderEvent::BatchReceived(e) => e.occurred_at,
        }
    }
}

impl Aggregate for SupplierOrder {
    type Command = SupplierOrderCommand;
    type Event = SupplierOrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            SupplierOrderEvent::BatchOpened(e) => {
                self.id = e.batch_id;
                self.tenant_id = Some(e.tenant_id);
                self.supplier_name = e.supplier_name.clone();
                self.order_date = e.order_date;
                self.status = SupplierOrderStatus::Ordered;
                self.created = true;
            }
            SupplierOrderEvent::ItemsAdded(e) => {
                self.items.extend(e.items.iter().cloned());
            }
            SupplierOrderEvent::ReceiptRecorded(e) => {
                if let Some(item) = self
                    .items
                    .iter_mut()
                    .find(|i| i.order_id == e.order_id && i.line_no == e.line_no)
                {
                    item.quantity_received += e.quantity;
                }
            }
            SupplierOrderEvent::BatchReceived(e) => {
                self.status = SupplierOrderStatus::Received;
                self.received_at = Some(e.occurred_at);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            SupplierOrderCommand::OpenBatch(cmd) => self.handle_open(cmd),
            SupplierOrderCommand::AddItems(cmd) => self.handle_add_items(cmd),
            SupplierOrderCommand::RecordReceipt(cmd) => self.handle_record_receipt(cmd),
            SupplierOrderCommand::MarkReceived(cmd) => self.handle_mark_received(cmd),
        }
    }
}

impl SupplierOrder {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if !self.is_open() {
            return Err(DomainError::invariant("batch is already received"));
        }
        Ok(())
    }

    fn handle_open(&self, cmd: &OpenBatch) -> Result<Vec<SupplierOrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("batch already exists"));
        }
        if cmd.supplier_name.trim().is_empty() {
            return Err(DomainError::validation("supplier name must not be blank"));
        }

        Ok(vec![SupplierOrderEvent::BatchOpened(BatchOpened {
            tenant_id: cmd.tenant_id,
            batch_id: cmd.batch_id,
            supplier_name: cmd.supplier_name.clone(),
            order_date: cmd.order_date,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_items(&self, cmd: &AddItems) -> Result<Vec<SupplierOrderEvent>, DomainError> {
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_open()?;

        if cmd.items.is_empty() {
            return Err(DomainError::validation("no items to add"));
        }

        for (idx, item) in cmd.items.iter().enumerate() {
            if item.quantity_ordered <= Decimal::ZERO {
                return Err(DomainError::validation(format!(
                    "quantity ordered must be positive, got {}",
                    item.quantity_ordered
                )));
            }
            if item.quantity_received != Decimal::ZERO {
                return Err(DomainError::validation(
                    "items are added before any receipt",
                ));
            }
            if item.unit_cost < Decimal::ZERO {
                return Err(DomainError::validation(format!(
                    "unit cost must not be negative, got {}",
                    item.unit_cost
                )));
            }
            // Each line is attached at most once, within this command and
            // against items already in the batch.
            let duplicate = self.contains_line(item.order_id, item.line_no)
                || cmd.items[..idx]
                    .iter()
                    .any(|other| other.order_id == item.order_id && other.line_no == item.line_no);
            if duplicate {
                return Err(DomainError::invariant(format!(
                    "line {} of order {} is already attached to this batch",
                    item.line_no, item.order_id
                )));
            }
        }

        Ok(vec![SupplierOrderEvent::ItemsAdded(ItemsAdded {
            tenant_id: cmd.tenant_id,
            batch_id: cmd.batch_id,
            items: cmd.items.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_record_receipt(
        &self,
        cmd: &RecordReceipt,
    ) -> Result<Vec<SupplierOrderEvent>, DomainError> {
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_open()?;

        let item = self
            .items
            .iter()
            .find(|i| i.order_id == cmd.order_id && i.line_no == cmd.line_no)
            .ok_or_else(|| {
                DomainError::validation(format!(
                    "batch has no item for line {} of order {}",
                    cmd.line_no, cmd.order_id
                ))
            })?;

        if cmd.quantity <= Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "received quantity must be positive, got {}",
                cmd.quantity
            )));
        }
        if item.quantity_received + cmd.quantity > item.quantity_ordered {
            return Err(DomainError::validation(format!(
                "receiving {} would exceed the {} ordered ({} already received)",
                cmd.quantity, item.quantity_ordered, item.quantity_received
            )));
        }

        Ok(vec![SupplierOrderEvent::ReceiptRecorded(ReceiptRecorded {
            tenant_id: cmd.tenant_id,
            batch_id: cmd.batch_id,
            order_id: cmd.order_id,
            line_no: cmd.line_no,
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_mark_received(
        &self,
        cmd: &MarkReceived,
    ) -> Result<Vec<SupplierOrderEvent>, DomainError> {
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_open()?;

        Ok(vec![SupplierOrderEvent::BatchReceived(BatchReceived {
            tenant_id: cmd.tenant_id,
            batch_id: cmd.batch_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}
