use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use super::catalog::Catalog;
use super::models::{checked_amount, max_amount, to_amount_scale, InvoiceTotals, LineField, LineItem};
use super::InvoiceError;

/// Sums the lines and applies tax and discount.
///
/// Tax is rounded half away from zero to [`AMOUNT_SCALE`](super::AMOUNT_SCALE) places so the
/// stored figures add up. The grand total is not floored at zero: a discount
/// larger than subtotal plus tax yields a negative total. Any amount past
/// [`max_amount`] is `AmountOverflow`.
pub fn compute_totals(
    items: &[LineItem],
    tax_rate: Decimal,
    discount_amount: Decimal,
) -> Result<InvoiceTotals, InvoiceError> {
    let subtotal = items.iter().try_fold(Decimal::ZERO, |acc, item| {
        checked_amount(acc.checked_add(item.line_total))
    })?;
    let tax_amount = checked_amount(
        subtotal
            .checked_mul(tax_rate)
            .and_then(|t| t.checked_div(Decimal::ONE_HUNDRED))
            .map(to_amount_scale),
    )?;
    let grand_total = checked_amount(
        subtotal
            .checked_add(tax_amount)
            .and_then(|t| t.checked_sub(discount_amount)),
    )?;

    Ok(InvoiceTotals {
        subtotal,
        tax_rate,
        tax_amount,
        discount_amount,
        grand_total,
    })
}

/// An invoice being filled in. Always holds at least one line.
#[derive(Debug, Clone, Serialize)]
pub struct InvoiceDraft {
    pub customer_id: Option<String>,
    pub issue_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
    items: Vec<LineItem>,
    tax_rate: Decimal,
    discount_amount: Decimal,
}

/// What gets persisted: the billable lines and totals computed over them.
#[derive(Debug, Clone, Serialize)]
pub struct InvoiceSubmission {
    pub customer_id: Option<String>,
    pub issue_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub items: Vec<LineItem>,
    pub totals: InvoiceTotals,
}

impl InvoiceDraft {
    pub fn new(issue_date: NaiveDate, tax_rate: Decimal) -> Self {
        Self {
            customer_id: None,
            issue_date,
            due_date: None,
            notes: None,
            items: vec![LineItem::default()],
            tax_rate,
            discount_amount: Decimal::ZERO,
        }
    }

    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    pub fn tax_rate(&self) -> Decimal {
        self.tax_rate
    }

    pub fn discount_amount(&self) -> Decimal {
        self.discount_amount
    }

    pub fn set_tax_rate(&mut self, rate: Decimal) -> Result<(), InvoiceError> {
        if rate < Decimal::ZERO || rate > Decimal::ONE_HUNDRED {
            return Err(InvoiceError::TaxRateOutOfRange(rate));
        }
        self.tax_rate = rate;
        Ok(())
    }

    pub fn set_discount(&mut self, amount: Decimal) -> Result<(), InvoiceError> {
        if amount < Decimal::ZERO {
            return Err(InvoiceError::NegativeDiscount(amount));
        }
        if amount > max_amount() {
            return Err(InvoiceError::AmountOverflow);
        }
        self.discount_amount = amount;
        Ok(())
    }

    /// Applies one edit to line `index`, recomputing that line's total only.
    ///
    /// Linking a known catalog entry copies its name and price onto the line.
    /// An unknown reference is stored as-is and nothing else changes. Prices
    /// are rounded to [`AMOUNT_SCALE`](super::AMOUNT_SCALE) places. A failed edit leaves the line
    /// as it was.
    pub fn set_line_field<C: Catalog + ?Sized>(
        &mut self,
        index: usize,
        field: LineField,
        catalog: &C,
    ) -> Result<(), InvoiceError> {
        let len = self.items.len();
        let item = self
            .items
            .get_mut(index)
            .ok_or(InvoiceError::IndexOutOfRange { index, len })?;

        match field {
            LineField::CatalogRef(reference) => {
                let entry = reference.as_deref().and_then(|id| catalog.lookup(id));
                if let Some(entry) = entry {
                    let unit_price = to_amount_scale(entry.unit_price);
                    item.line_total = LineItem::total_for(item.quantity, unit_price)?;
                    item.description = entry.description;
                    item.unit_price = unit_price;
                }
                item.catalog_ref = reference;
            }
            LineField::Description(description) => item.description = description,
            LineField::Quantity(quantity) => {
                item.line_total = LineItem::total_for(quantity, item.unit_price)?;
                item.quantity = quantity;
            }
            LineField::UnitPrice(price) => {
                let unit_price = to_amount_scale(price);
                item.line_total = LineItem::total_for(item.quantity, unit_price)?;
                item.unit_price = unit_price;
            }
        }
        Ok(())
    }

    pub fn add_line_item(&mut self) -> usize {
        self.items.push(LineItem::default());
        self.items.len() - 1
    }

    /// Removes line `index`. Removing the only line is a no-op.
    pub fn remove_line_item(&mut self, index: usize) -> Result<(), InvoiceError> {
        let len = self.items.len();
        if index >= len {
            return Err(InvoiceError::IndexOutOfRange { index, len });
        }
        if len > 1 {
            self.items.remove(index);
        }
        Ok(())
    }

    pub fn totals(&self) -> Result<InvoiceTotals, InvoiceError> {
        compute_totals(&self.items, self.tax_rate, self.discount_amount)
    }

    pub fn prepare_submission(&self) -> Result<InvoiceSubmission, InvoiceError> {
        let items: Vec<LineItem> = self
            .items
            .iter()
            .filter(|item| item.is_billable())
            .cloned()
            .collect();
        if items.is_empty() {
            return Err(InvoiceError::NoValidItems);
        }

        let totals = compute_totals(&items, self.tax_rate, self.discount_amount)?;
        Ok(InvoiceSubmission {
            customer_id: self.customer_id.clone(),
            issue_date: self.issue_date,
            due_date: self.due_date,
            notes: self.notes.clone(),
            items,
            totals,
        })
    }
}
