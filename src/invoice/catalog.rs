use std::collections::HashMap;

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::db::InventoryItem;

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub description: String,
    pub unit_price: Decimal,
}

/// Name and price lookup used when a line is linked to a product.
pub trait Catalog {
    fn lookup(&self, id: &str) -> Option<CatalogEntry>;
}

impl Catalog for HashMap<String, CatalogEntry> {
    fn lookup(&self, id: &str) -> Option<CatalogEntry> {
        self.get(id).cloned()
    }
}

impl Catalog for [InventoryItem] {
    fn lookup(&self, id: &str) -> Option<CatalogEntry> {
        let id: Uuid = id.parse().ok()?;
        self.iter().find(|item| item.id == id).map(|item| CatalogEntry {
            description: item.name.clone(),
            unit_price: item.selling_price,
        })
    }
}

impl Catalog for Vec<InventoryItem> {
    fn lookup(&self, id: &str) -> Option<CatalogEntry> {
        self.as_slice().lookup(id)
    }
}
