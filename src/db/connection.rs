use crate::config::DatabaseConfig;
use duckdb::{Connection, Result as DbResult};
use std::sync::{Arc, Mutex};
use tracing::info;

pub type DbPool = Arc<Mutex<Connection>>;

pub(crate) const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS customers (
    id VARCHAR PRIMARY KEY,
    name VARCHAR NOT NULL,
    email VARCHAR,
    phone VARCHAR,
    address VARCHAR,
    gst_number VARCHAR,
    total_purchases DECIMAL(18,4) DEFAULT 0,
    outstanding_balance DECIMAL(18,4) DEFAULT 0,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS inventory (
    id VARCHAR PRIMARY KEY,
    name VARCHAR NOT NULL,
    sku VARCHAR,
    description VARCHAR,
    category VARCHAR,
    quantity BIGINT NOT NULL DEFAULT 0,
    unit VARCHAR NOT NULL DEFAULT 'pcs',
    purchase_price DECIMAL(18,4) NOT NULL DEFAULT 0,
    selling_price DECIMAL(18,4) NOT NULL DEFAULT 0,
    low_stock_threshold BIGINT NOT NULL DEFAULT 10,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS invoices (
    id VARCHAR PRIMARY KEY,
    invoice_number VARCHAR NOT NULL UNIQUE,
    customer_id VARCHAR,
    status VARCHAR NOT NULL DEFAULT 'draft',
    issue_date DATE NOT NULL,
    due_date DATE,
    subtotal DECIMAL(18,4) NOT NULL,
    tax_rate DECIMAL(7,4) NOT NULL,
    tax_amount DECIMAL(18,4) NOT NULL,
    discount_amount DECIMAL(18,4) NOT NULL,
    total_amount DECIMAL(18,4) NOT NULL,
    notes VARCHAR,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS invoice_items (
    id VARCHAR PRIMARY KEY,
    invoice_id VARCHAR NOT NULL,
    inventory_id VARCHAR,
    description VARCHAR NOT NULL,
    quantity BIGINT NOT NULL,
    unit_price DECIMAL(18,4) NOT NULL,
    total_price DECIMAL(18,4) NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_invoice_items_invoice ON invoice_items(invoice_id);

CREATE TABLE IF NOT EXISTS profiles (
    user_id VARCHAR PRIMARY KEY,
    full_name VARCHAR,
    business_name VARCHAR,
    email VARCHAR,
    phone VARCHAR,
    address VARCHAR,
    updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);
"#;

pub fn get_connection(config: &DatabaseConfig) -> DbResult<DbPool> {
    info!("Connecting to DuckDB at {}", config.path);
    let conn = if config.path == ":memory:" {
        Connection::open_in_memory()?
    } else {
        Connection::open(&config.path)?
    };

    init_schema(&conn)?;

    Ok(Arc::new(Mutex::new(conn)))
}

pub fn init_schema(conn: &Connection) -> DbResult<()> {
    info!("Initializing database schema");
    conn.execute_batch(SCHEMA)?;
    Ok(())
}
