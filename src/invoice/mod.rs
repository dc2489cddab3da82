pub mod catalog;
pub mod engine;
pub mod models;
pub mod number;

pub use catalog::{Catalog, CatalogEntry};
pub use engine::{compute_totals, InvoiceDraft, InvoiceSubmission};
pub use models::{max_amount, InvoiceTotals, LineField, LineItem, AMOUNT_SCALE};
pub use number::generate_invoice_number;

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum InvoiceError {
    #[error("Line {index} does not exist (invoice has {len} lines)")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("Add at least one item")]
    NoValidItems,
    #[error("Tax rate must be between 0 and 100, got {0}")]
    TaxRateOutOfRange(Decimal),
    #[error("Discount cannot be negative, got {0}")]
    NegativeDiscount(Decimal),
    #[error("Amount is too large to store")]
    AmountOverflow,
}
