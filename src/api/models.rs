use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{InventoryItem, Invoice, InvoiceLine, InvoiceStatus, StockStatus};
use crate::invoice::{Catalog, InvoiceDraft, InvoiceError, LineField};

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

impl SearchQuery {
    pub fn needle(&self) -> Option<&str> {
        self.q.as_deref().map(str::trim).filter(|q| !q.is_empty())
    }
}

/// One line of a new invoice. Every field is optional; a line linked to an
/// inventory item takes its name and price unless they are given explicitly.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LineRequest {
    pub inventory_id: Option<String>,
    pub description: Option<String>,
    pub quantity: Option<i64>,
    pub unit_price: Option<Decimal>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateInvoiceRequest {
    pub customer_id: Option<Uuid>,
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub tax_rate: Option<Decimal>,
    #[serde(default)]
    pub discount_amount: Decimal,
    pub notes: Option<String>,
    #[serde(default)]
    pub lines: Vec<LineRequest>,
}

impl CreateInvoiceRequest {
    /// Replays the request as the edits a user would make on the invoice form.
    pub fn into_draft<C: Catalog + ?Sized>(
        self,
        catalog: &C,
        default_tax_rate: Decimal,
        today: NaiveDate,
    ) -> Result<InvoiceDraft, InvoiceError> {
        let mut draft = InvoiceDraft::new(self.issue_date.unwrap_or(today), default_tax_rate);
        draft.customer_id = self.customer_id.map(|id| id.to_string());
        draft.due_date = self.due_date;
        draft.notes = self.notes;
        if let Some(rate) = self.tax_rate {
            draft.set_tax_rate(rate)?;
        }
        draft.set_discount(self.discount_amount)?;

        for (n, line) in self.lines.into_iter().enumerate() {
            let index = if n == 0 { 0 } else { draft.add_line_item() };
            if let Some(quantity) = line.quantity {
                draft.set_line_field(index, LineField::Quantity(quantity), catalog)?;
            }
            if line.inventory_id.is_some() {
                draft.set_line_field(index, LineField::CatalogRef(line.inventory_id), catalog)?;
            }
            if let Some(description) = line.description {
                draft.set_line_field(index, LineField::Description(description), catalog)?;
            }
            if let Some(price) = line.unit_price {
                draft.set_line_field(index, LineField::UnitPrice(price), catalog)?;
            }
        }
        Ok(draft)
    }
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: InvoiceStatus,
}

#[derive(Debug, Serialize)]
pub struct InventoryView {
    #[serde(flatten)]
    pub item: InventoryItem,
    pub stock_status: StockStatus,
}

impl From<InventoryItem> for InventoryView {
    fn from(item: InventoryItem) -> Self {
        let stock_status = item.stock_status();
        Self { item, stock_status }
    }
}

#[derive(Debug, Serialize)]
pub struct InvoiceDetail {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub items: Vec<InvoiceLine>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(message: impl ToString) -> Self {
        Self {
            error: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoice::CatalogEntry;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    #[test]
    fn request_lines_replay_as_form_edits() {
        let mut catalog = HashMap::new();
        catalog.insert(
            "inv-1".to_string(),
            CatalogEntry {
                description: "Steel bottle".to_string(),
                unit_price: dec!(100),
            },
        );
        let req: CreateInvoiceRequest = serde_json::from_value(serde_json::json!({
            "discount_amount": 10,
            "lines": [
                {"inventory_id": "inv-1", "quantity": 2},
                {"description": "Gift wrap", "quantity": 1, "unit_price": "50"}
            ]
        }))
        .unwrap();

        let draft = req.into_draft(&catalog, dec!(18), today()).unwrap();
        assert_eq!(draft.items().len(), 2);
        assert_eq!(draft.items()[0].description, "Steel bottle");
        assert_eq!(draft.items()[0].line_total, dec!(200));
        assert_eq!(draft.totals().unwrap().grand_total, dec!(285));
        assert_eq!(draft.issue_date, today());
    }

    #[test]
    fn invalid_tax_rate_is_rejected() {
        let req = CreateInvoiceRequest {
            tax_rate: Some(dec!(150)),
            ..Default::default()
        };
        let catalog: HashMap<String, CatalogEntry> = HashMap::new();
        assert!(matches!(
            req.into_draft(&catalog, dec!(18), today()),
            Err(InvoiceError::TaxRateOutOfRange(_))
        ));
    }

    #[test]
    fn oversized_line_is_a_validation_error() {
        let req: CreateInvoiceRequest = serde_json::from_value(serde_json::json!({
            "lines": [
                {"description": "Bulk", "quantity": i64::MAX, "unit_price": "100000000000"}
            ]
        }))
        .unwrap();
        let catalog: HashMap<String, CatalogEntry> = HashMap::new();
        assert_eq!(
            req.into_draft(&catalog, dec!(18), today()).unwrap_err(),
            InvoiceError::AmountOverflow
        );
    }
}
