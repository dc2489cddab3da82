use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::InvoiceError;

/// Decimal places amounts are stored with (`DECIMAL(18,4)`).
pub const AMOUNT_SCALE: u32 = 4;

/// Largest magnitude a stored amount can hold: 99,999,999,999,999.9999.
pub fn max_amount() -> Decimal {
    Decimal::new(999_999_999_999_999_999, AMOUNT_SCALE)
}

/// Rejects arithmetic that overflowed or left the storable range.
pub(crate) fn checked_amount(value: Option<Decimal>) -> Result<Decimal, InvoiceError> {
    value
        .filter(|v| v.abs() <= max_amount())
        .ok_or(InvoiceError::AmountOverflow)
}

pub(crate) fn to_amount_scale(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// One row of an invoice being edited.
///
/// `line_total` is kept equal to `quantity * unit_price` by every
/// [`InvoiceDraft`](super::InvoiceDraft) mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub catalog_ref: Option<String>,
    pub description: String,
    pub quantity: i64,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

impl Default for LineItem {
    fn default() -> Self {
        Self {
            catalog_ref: None,
            description: String::new(),
            quantity: 1,
            unit_price: Decimal::ZERO,
            line_total: Decimal::ZERO,
        }
    }
}

impl LineItem {
    pub(crate) fn total_for(quantity: i64, unit_price: Decimal) -> Result<Decimal, InvoiceError> {
        checked_amount(Decimal::from(quantity).checked_mul(unit_price))
    }

    pub fn is_billable(&self) -> bool {
        !self.description.is_empty() && self.quantity > 0
    }
}

/// A single field edit on a line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum LineField {
    CatalogRef(Option<String>),
    Description(String),
    Quantity(i64),
    UnitPrice(Decimal),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceTotals {
    pub subtotal: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub discount_amount: Decimal,
    pub grand_total: Decimal,
}
