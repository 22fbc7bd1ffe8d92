//! Order lines and their per-line fulfillment stage.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use bridgecart_core::{Currency, DomainError, DomainResult, Percent, VatRate};

/// Unit of measure for a line. Fractional quantities are only meaningful for
/// area-priced goods (e.g. fabric, flooring).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitOfMeasure {
    Unit,
    Area,
}

/// Per-line fulfillment stage.
///
/// Replaces the ordered/received/packed boolean triple: a line is always at
/// exactly one stage, so packed-but-not-received cannot be represented.
/// Variant order matters - stage comparisons use the derived `Ord`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FulfillmentStage {
    Unordered,
    Ordered,
    Received,
    Packed,
}

/// A single step applied to a line's fulfillment stage.
///
/// Forward moves advance one stage; the two reverts exist for warehouse
/// corrections (mis-scanned receipt, unpacked carton).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentChange {
    Ordered,
    Received,
    ReceiptReverted,
    Packed,
    PackingReverted,
}

/// Client-entered fields of a new line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineDraft {
    pub product_name: String,
    pub quantity: Decimal,
    pub unit_of_measure: UnitOfMeasure,
    /// Gross unit price in the source currency (inclusive of VAT and
    /// source-side markup).
    pub unit_price: Decimal,
    pub currency: Currency,
    pub line_discount: Percent,
    /// Line-level VAT override; `None` means the order's rate applies.
    pub vat_rate_override: Option<VatRate>,
    pub supplier_name: Option<String>,
}

/// One line of a client order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    /// 1-based, dense; defines display/processing order. Renumbered on
    /// removal so there are never gaps.
    pub line_no: u32,
    pub product_name: String,
    pub quantity: Decimal,
    pub unit_of_measure: UnitOfMeasure,
    /// Gross unit price in the source currency.
    pub unit_price: Decimal,
    pub currency: Currency,
    pub line_discount: Percent,
    pub vat_rate_override: Option<VatRate>,
    /// Frozen per-unit net price in the order's header currency. While set,
    /// totals ignore `unit_price` entirely (see the pricing crate).
    pub original_net_price: Option<Decimal>,
    pub supplier_name: Option<String>,

    // Procurement-side fields, staff-maintained after confirmation.
    pub actual_supplier: Option<String>,
    /// Per-unit net cost in the source currency (what we actually pay).
    pub net_cost: Option<Decimal>,
    /// Line share of logistics cost in the source currency.
    pub logistics_cost: Option<Decimal>,

    pub stage: FulfillmentStage,
    pub ordered_at: Option<DateTime<Utc>>,
    pub received_at: Option<DateTime<Utc>>,
    pub packed_at: Option<DateTime<Utc>>,
}

impl OrderLine {
    pub fn from_draft(line_no: u32, draft: &LineDraft) -> Self {
        Self {
            line_no,
            product_name: draft.product_name.clone(),
            quantity: draft.quantity,
            unit_of_measure: draft.unit_of_measure,
            unit_price: draft.unit_price,
            currency: draft.currency,
            line_discount: draft.line_discount,
            vat_rate_override: draft.vat_rate_override,
            original_net_price: None,
            supplier_name: draft.supplier_name.clone(),
            actual_supplier: None,
            net_cost: None,
            logistics_cost: None,
            stage: FulfillmentStage::Unordered,
            ordered_at: None,
            received_at: None,
            packed_at: None,
        }
    }

    /// Supplier used for procurement batching: the staff-corrected supplier
    /// when present, else the client-entered one. Blank names count as none.
    pub fn effective_supplier(&self) -> Option<&str> {
        self.actual_supplier
            .as_deref()
            .or(self.supplier_name.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn is_ordered(&self) -> bool {
        self.stage >= FulfillmentStage::Ordered
    }

    pub fn is_received(&self) -> bool {
        self.stage >= FulfillmentStage::Received
    }

    pub fn is_packed(&self) -> bool {
        self.stage == FulfillmentStage::Packed
    }

    /// Stage after `change`, or an error if the step is not valid from the
    /// current stage.
    pub fn stage_after(&self, change: FulfillmentChange) -> DomainResult<FulfillmentStage> {
        let next = match (self.stage, change) {
            (FulfillmentStage::Unordered, FulfillmentChange::Ordered) => FulfillmentStage::Ordered,
            (FulfillmentStage::Ordered, FulfillmentChange::Received) => FulfillmentStage::Received,
            (FulfillmentStage::Received, FulfillmentChange::ReceiptReverted) => {
                FulfillmentStage::Ordered
            }
            (FulfillmentStage::Received, FulfillmentChange::Packed) => FulfillmentStage::Packed,
            (FulfillmentStage::Packed, FulfillmentChange::PackingReverted) => {
                FulfillmentStage::Received
            }
            (stage, change) => {
                return Err(DomainError::invariant(format!(
                    "line {} cannot apply {change:?} at stage {stage:?}",
                    self.line_no
                )));
            }
        };
        Ok(next)
    }
}

/// Quantity must be positive, and whole unless the unit of measure is area.
pub fn validate_quantity(quantity: Decimal, unit_of_measure: UnitOfMeasure) -> DomainResult<()> {
    if quantity <= Decimal::ZERO {
        return Err(DomainError::validation(format!(
            "quantity must be positive, got {quantity}"
        )));
    }
    if unit_of_measure == UnitOfMeasure::Unit && quantity.fract() != Decimal::ZERO {
        return Err(DomainError::validation(format!(
            "fractional quantity {quantity} requires an area unit of measure"
        )));
    }
    Ok(())
}

/// Unit prices are gross and must be strictly positive.
pub fn validate_unit_price(unit_price: Decimal) -> DomainResult<()> {
    if unit_price <= Decimal::ZERO {
        return Err(DomainError::validation(format!(
            "unit price must be positive, got {unit_price}"
        )));
    }
    Ok(())
}
