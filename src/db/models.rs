use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

fn contains_ci(field: Option<&str>, needle: &str) -> bool {
    field.is_some_and(|f| f.to_lowercase().contains(needle))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub gst_number: Option<String>,
    pub total_purchases: Decimal,
    pub outstanding_balance: Decimal,
    pub created_at: DateTime<Utc>,
}

impl Customer {
    /// Name and email match case-insensitively, phone by plain substring.
    pub fn matches(&self, query: &str) -> bool {
        let needle = query.to_lowercase();
        self.name.to_lowercase().contains(&needle)
            || contains_ci(self.email.as_deref(), &needle)
            || self.phone.as_deref().is_some_and(|p| p.contains(query))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewCustomer {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub gst_number: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StockStatus {
    #[serde(rename = "Out of Stock")]
    OutOfStock,
    #[serde(rename = "Low Stock")]
    LowStock,
    #[serde(rename = "In Stock")]
    InStock,
}

impl fmt::Display for StockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StockStatus::OutOfStock => "Out of Stock",
            StockStatus::LowStock => "Low Stock",
            StockStatus::InStock => "In Stock",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: Uuid,
    pub name: String,
    pub sku: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub quantity: i64,
    pub unit: String,
    pub purchase_price: Decimal,
    pub selling_price: Decimal,
    pub low_stock_threshold: i64,
    pub created_at: DateTime<Utc>,
}

impl InventoryItem {
    pub fn stock_status(&self) -> StockStatus {
        if self.quantity == 0 {
            StockStatus::OutOfStock
        } else if self.quantity <= self.low_stock_threshold {
            StockStatus::LowStock
        } else {
            StockStatus::InStock
        }
    }

    pub fn matches(&self, query: &str) -> bool {
        let needle = query.to_lowercase();
        self.name.to_lowercase().contains(&needle)
            || contains_ci(self.sku.as_deref(), &needle)
            || contains_ci(self.category.as_deref(), &needle)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewInventoryItem {
    pub name: String,
    pub sku: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    #[serde(default)]
    pub quantity: i64,
    #[serde(default = "default_unit")]
    pub unit: String,
    #[serde(default)]
    pub purchase_price: Decimal,
    #[serde(default)]
    pub selling_price: Decimal,
    #[serde(default = "default_low_stock_threshold")]
    pub low_stock_threshold: i64,
}

fn default_unit() -> String {
    "pcs".to_string()
}

fn default_low_stock_threshold() -> i64 {
    10
}

impl Default for NewInventoryItem {
    fn default() -> Self {
        Self {
            name: String::new(),
            sku: None,
            description: None,
            category: None,
            quantity: 0,
            unit: default_unit(),
            purchase_price: Decimal::ZERO,
            selling_price: Decimal::ZERO,
            low_stock_threshold: default_low_stock_threshold(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Paid,
    Overdue,
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Overdue => "overdue",
            InvoiceStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvoiceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(InvoiceStatus::Draft),
            "sent" => Ok(InvoiceStatus::Sent),
            "paid" => Ok(InvoiceStatus::Paid),
            "overdue" => Ok(InvoiceStatus::Overdue),
            "cancelled" => Ok(InvoiceStatus::Cancelled),
            other => Err(format!("unknown invoice status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub invoice_number: String,
    pub customer_id: Option<Uuid>,
    pub customer_name: Option<String>,
    pub status: InvoiceStatus,
    pub issue_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub subtotal: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub discount_amount: Decimal,
    pub total_amount: Decimal,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Invoice {
    pub fn matches(&self, query: &str) -> bool {
        let needle = query.to_lowercase();
        self.invoice_number.to_lowercase().contains(&needle)
            || contains_ci(self.customer_name.as_deref(), &needle)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub inventory_id: Option<String>,
    pub description: String,
    pub quantity: i64,
    pub unit_price: Decimal,
    pub total_price: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: String,
    pub full_name: Option<String>,
    pub business_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn item(quantity: i64, threshold: i64) -> InventoryItem {
        InventoryItem {
            id: Uuid::new_v4(),
            name: "Notebook A5".to_string(),
            sku: Some("NB-A5".to_string()),
            description: None,
            category: Some("Office Supplies".to_string()),
            quantity,
            unit: "pcs".to_string(),
            purchase_price: dec!(20),
            selling_price: dec!(35),
            low_stock_threshold: threshold,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn stock_status_thresholds() {
        assert_eq!(item(0, 10).stock_status(), StockStatus::OutOfStock);
        assert_eq!(item(10, 10).stock_status(), StockStatus::LowStock);
        assert_eq!(item(11, 10).stock_status(), StockStatus::InStock);
        assert_eq!(StockStatus::LowStock.to_string(), "Low Stock");
    }

    #[test]
    fn inventory_search_covers_sku_and_category() {
        let it = item(5, 10);
        assert!(it.matches("notebook"));
        assert!(it.matches("nb-a5"));
        assert!(it.matches("office"));
        assert!(!it.matches("hardware"));
    }

    #[test]
    fn customer_search() {
        let c = Customer {
            id: Uuid::new_v4(),
            name: "Sharma Traders".to_string(),
            email: Some("Accounts@Sharma.in".to_string()),
            phone: Some("+91 98200 11111".to_string()),
            address: None,
            gst_number: None,
            total_purchases: Decimal::ZERO,
            outstanding_balance: Decimal::ZERO,
            created_at: Utc::now(),
        };
        assert!(c.matches("SHARMA"));
        assert!(c.matches("accounts@"));
        assert!(c.matches("98200"));
        assert!(!c.matches("gupta"));
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("Paid".parse::<InvoiceStatus>(), Ok(InvoiceStatus::Paid));
        assert!("refunded".parse::<InvoiceStatus>().is_err());
    }
}
