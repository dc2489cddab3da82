use crate::db::models::{
    Customer, InventoryItem, Invoice, InvoiceLine, InvoiceStatus, NewCustomer, NewInventoryItem,
    Profile,
};
use crate::invoice::{generate_invoice_number, InvoiceSubmission};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use duckdb::{params, types::Type, Connection, Result as DbResult, Row};
use rand::Rng;
use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

const CUSTOMER_SELECT: &str = "SELECT id, name, email, phone, address, gst_number, \
     CAST(total_purchases AS VARCHAR), CAST(outstanding_balance AS VARCHAR), \
     CAST(created_at AS VARCHAR) FROM customers";

const INVENTORY_SELECT: &str = "SELECT id, name, sku, description, category, quantity, unit, \
     CAST(purchase_price AS VARCHAR), CAST(selling_price AS VARCHAR), low_stock_threshold, \
     CAST(created_at AS VARCHAR) FROM inventory";

const INVOICE_SELECT: &str = "SELECT i.id, i.invoice_number, i.customer_id, c.name, i.status, \
     CAST(i.issue_date AS VARCHAR), CAST(i.due_date AS VARCHAR), \
     CAST(i.subtotal AS VARCHAR), CAST(i.tax_rate AS VARCHAR), CAST(i.tax_amount AS VARCHAR), \
     CAST(i.discount_amount AS VARCHAR), CAST(i.total_amount AS VARCHAR), i.notes, \
     CAST(i.created_at AS VARCHAR) \
     FROM invoices i LEFT JOIN customers c ON c.id = i.customer_id";

const ITEM_SELECT: &str = "SELECT id, invoice_id, inventory_id, description, quantity, \
     CAST(unit_price AS VARCHAR), CAST(total_price AS VARCHAR) FROM invoice_items";

fn conversion_error(idx: usize, err: impl std::error::Error + Send + Sync + 'static) -> duckdb::Error {
    duckdb::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

// Money and dates are selected AS VARCHAR and parsed here so the driver's
// native DECIMAL/DATE handling never comes into play.
fn decimal_at(row: &Row, idx: usize) -> DbResult<Decimal> {
    let text: String = row.get(idx)?;
    text.parse().map_err(|e| conversion_error(idx, e))
}

fn date_at(row: &Row, idx: usize) -> DbResult<NaiveDate> {
    let text: String = row.get(idx)?;
    text.parse().map_err(|e| conversion_error(idx, e))
}

fn optional_date_at(row: &Row, idx: usize) -> DbResult<Option<NaiveDate>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|t| t.parse().map_err(|e| conversion_error(idx, e)))
        .transpose()
}

fn timestamp_at(row: &Row, idx: usize) -> DbResult<DateTime<Utc>> {
    let text: Option<String> = row.get(idx)?;
    let text = text.ok_or_else(|| {
        duckdb::Error::InvalidColumnType(idx, "created_at".to_string(), Type::Null)
    })?;
    NaiveDateTime::parse_from_str(&text, "%Y-%m-%d %H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| conversion_error(idx, e))
}

fn uuid_at(row: &Row, idx: usize) -> DbResult<Uuid> {
    let text: String = row.get(idx)?;
    text.parse().map_err(|e| conversion_error(idx, e))
}

fn optional_uuid_at(row: &Row, idx: usize) -> DbResult<Option<Uuid>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|t| t.parse().map_err(|e| conversion_error(idx, e)))
        .transpose()
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// True when the store rejected a write because of a UNIQUE/PRIMARY KEY clash.
pub fn is_duplicate_key(err: &duckdb::Error) -> bool {
    let message = err.to_string().to_lowercase();
    message.contains("duplicate key") || message.contains("unique constraint")
}

pub struct DbService;

impl DbService {
    fn row_to_customer(row: &Row) -> DbResult<Customer> {
        Ok(Customer {
            id: uuid_at(row, 0)?,
            name: row.get(1)?,
            email: row.get(2)?,
            phone: row.get(3)?,
            address: row.get(4)?,
            gst_number: row.get(5)?,
            total_purchases: decimal_at(row, 6)?,
            outstanding_balance: decimal_at(row, 7)?,
            created_at: timestamp_at(row, 8)?,
        })
    }

    fn row_to_inventory(row: &Row) -> DbResult<InventoryItem> {
        Ok(InventoryItem {
            id: uuid_at(row, 0)?,
            name: row.get(1)?,
            sku: row.get(2)?,
            description: row.get(3)?,
            category: row.get(4)?,
            quantity: row.get(5)?,
            unit: row.get(6)?,
            purchase_price: decimal_at(row, 7)?,
            selling_price: decimal_at(row, 8)?,
            low_stock_threshold: row.get(9)?,
            created_at: timestamp_at(row, 10)?,
        })
    }

    fn row_to_invoice(row: &Row) -> DbResult<Invoice> {
        let status: String = row.get(4)?;
        let status = status
            .parse::<InvoiceStatus>()
            .map_err(|e| duckdb::Error::FromSqlConversionFailure(4, Type::Text, e.into()))?;

        Ok(Invoice {
            id: uuid_at(row, 0)?,
            invoice_number: row.get(1)?,
            customer_id: optional_uuid_at(row, 2)?,
            customer_name: row.get(3)?,
            status,
            issue_date: date_at(row, 5)?,
            due_date: optional_date_at(row, 6)?,
            subtotal: decimal_at(row, 7)?,
            tax_rate: decimal_at(row, 8)?,
            tax_amount: decimal_at(row, 9)?,
            discount_amount: decimal_at(row, 10)?,
            total_amount: decimal_at(row, 11)?,
            notes: row.get(12)?,
            created_at: timestamp_at(row, 13)?,
        })
    }

    fn row_to_line(row: &Row) -> DbResult<InvoiceLine> {
        Ok(InvoiceLine {
            id: uuid_at(row, 0)?,
            invoice_id: uuid_at(row, 1)?,
            inventory_id: row.get(2)?,
            description: row.get(3)?,
            quantity: row.get(4)?,
            unit_price: decimal_at(row, 5)?,
            total_price: decimal_at(row, 6)?,
        })
    }

    fn query_all<T>(
        conn: &Connection,
        sql: &str,
        params: &[&dyn duckdb::ToSql],
        map: fn(&Row) -> DbResult<T>,
    ) -> DbResult<Vec<T>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, map)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn query_one<T>(
        conn: &Connection,
        sql: &str,
        params: &[&dyn duckdb::ToSql],
        map: fn(&Row) -> DbResult<T>,
    ) -> DbResult<Option<T>> {
        Ok(Self::query_all(conn, sql, params, map)?.into_iter().next())
    }

    // --- Customers ---

    pub fn insert_customer(conn: &Connection, new: &NewCustomer) -> DbResult<Customer> {
        let id = Uuid::new_v4();
        conn.execute(
            "INSERT INTO customers (id, name, email, phone, address, gst_number) VALUES (?, ?, ?, ?, ?, ?)",
            params![
                id.to_string(),
                new.name.trim(),
                non_empty(&new.email),
                non_empty(&new.phone),
                non_empty(&new.address),
                non_empty(&new.gst_number)
            ],
        )?;
        info!("Created customer {}", id);

        Self::get_customer(conn, id)?.ok_or(duckdb::Error::QueryReturnedNoRows)
    }

    pub fn get_customer(conn: &Connection, id: Uuid) -> DbResult<Option<Customer>> {
        let sql = format!("{} WHERE id = ?", CUSTOMER_SELECT);
        Self::query_one(conn, &sql, &[&id.to_string()], Self::row_to_customer)
    }

    pub fn list_customers(conn: &Connection) -> DbResult<Vec<Customer>> {
        let sql = format!("{} ORDER BY created_at DESC", CUSTOMER_SELECT);
        Self::query_all(conn, &sql, &[], Self::row_to_customer)
    }

    pub fn count_customers(conn: &Connection) -> DbResult<i64> {
        conn.query_row("SELECT COUNT(*) FROM customers", [], |row| row.get(0))
    }

    pub fn update_customer(conn: &Connection, id: Uuid, new: &NewCustomer) -> DbResult<Option<Customer>> {
        let changed = conn.execute(
            "UPDATE customers SET name = ?, email = ?, phone = ?, address = ?, gst_number = ? WHERE id = ?",
            params![
                new.name.trim(),
                non_empty(&new.email),
                non_empty(&new.phone),
                non_empty(&new.address),
                non_empty(&new.gst_number),
                id.to_string()
            ],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        Self::get_customer(conn, id)
    }

    pub fn delete_customer(conn: &Connection, id: Uuid) -> DbResult<bool> {
        let removed = conn.execute("DELETE FROM customers WHERE id = ?", params![id.to_string()])?;
        Ok(removed > 0)
    }

    // --- Inventory ---

    pub fn insert_item(conn: &Connection, new: &NewInventoryItem) -> DbResult<InventoryItem> {
        let id = Uuid::new_v4();
        conn.execute(
            "INSERT INTO inventory (id, name, sku, description, category, quantity, unit, \
             purchase_price, selling_price, low_stock_threshold) \
             VALUES (?, ?, ?, ?, ?, ?, ?, CAST(? AS DECIMAL(18,4)), CAST(? AS DECIMAL(18,4)), ?)",
            params![
                id.to_string(),
                new.name.trim(),
                non_empty(&new.sku),
                non_empty(&new.description),
                non_empty(&new.category),
                new.quantity,
                new.unit,
                new.purchase_price.to_string(),
                new.selling_price.to_string(),
                new.low_stock_threshold
            ],
        )?;
        info!("Created inventory item {}", id);

        Self::get_item(conn, id)?.ok_or(duckdb::Error::QueryReturnedNoRows)
    }

    pub fn get_item(conn: &Connection, id: Uuid) -> DbResult<Option<InventoryItem>> {
        let sql = format!("{} WHERE id = ?", INVENTORY_SELECT);
        Self::query_one(conn, &sql, &[&id.to_string()], Self::row_to_inventory)
    }

    pub fn list_inventory(conn: &Connection) -> DbResult<Vec<InventoryItem>> {
        let sql = format!("{} ORDER BY created_at DESC", INVENTORY_SELECT);
        Self::query_all(conn, &sql, &[], Self::row_to_inventory)
    }

    pub fn update_item(conn: &Connection, id: Uuid, new: &NewInventoryItem) -> DbResult<Option<InventoryItem>> {
        let changed = conn.execute(
            "UPDATE inventory SET name = ?, sku = ?, description = ?, category = ?, quantity = ?, \
             unit = ?, purchase_price = CAST(? AS DECIMAL(18,4)), \
             selling_price = CAST(? AS DECIMAL(18,4)), low_stock_threshold = ? WHERE id = ?",
            params![
                new.name.trim(),
                non_empty(&new.sku),
                non_empty(&new.description),
                non_empty(&new.category),
                new.quantity,
                new.unit,
                new.purchase_price.to_string(),
                new.selling_price.to_string(),
                new.low_stock_threshold,
                id.to_string()
            ],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        Self::get_item(conn, id)
    }

    pub fn delete_item(conn: &Connection, id: Uuid) -> DbResult<bool> {
        let removed = conn.execute("DELETE FROM inventory WHERE id = ?", params![id.to_string()])?;
        Ok(removed > 0)
    }

    // --- Invoices ---

    /// Inserts the header and its lines in one transaction under `number`.
    pub fn insert_invoice(
        conn: &Connection,
        number: &str,
        submission: &InvoiceSubmission,
    ) -> DbResult<Invoice> {
        let id = Uuid::new_v4();
        conn.execute_batch("BEGIN TRANSACTION")?;

        if let Err(e) = Self::insert_invoice_rows(conn, id, number, submission) {
            let _ = conn.execute_batch("ROLLBACK");
            return Err(e);
        }

        conn.execute_batch("COMMIT")?;
        info!("Created invoice {} ({})", number, id);
        Self::get_invoice(conn, id)?.ok_or(duckdb::Error::QueryReturnedNoRows)
    }

    fn insert_invoice_rows(
        conn: &Connection,
        id: Uuid,
        number: &str,
        submission: &InvoiceSubmission,
    ) -> DbResult<()> {
        let totals = &submission.totals;
        conn.execute(
            "INSERT INTO invoices (id, invoice_number, customer_id, status, issue_date, due_date, \
             subtotal, tax_rate, tax_amount, discount_amount, total_amount, notes) \
             VALUES (?, ?, ?, ?, CAST(? AS DATE), CAST(? AS DATE), CAST(? AS DECIMAL(18,4)), \
             CAST(? AS DECIMAL(7,4)), CAST(? AS DECIMAL(18,4)), CAST(? AS DECIMAL(18,4)), \
             CAST(? AS DECIMAL(18,4)), ?)",
            params![
                id.to_string(),
                number,
                submission.customer_id.as_deref(),
                InvoiceStatus::Draft.as_str(),
                submission.issue_date.to_string(),
                submission.due_date.map(|d| d.to_string()),
                totals.subtotal.to_string(),
                totals.tax_rate.to_string(),
                totals.tax_amount.to_string(),
                totals.discount_amount.to_string(),
                totals.grand_total.to_string(),
                non_empty(&submission.notes)
            ],
        )?;

        for item in &submission.items {
            conn.execute(
                "INSERT INTO invoice_items (id, invoice_id, inventory_id, description, quantity, \
                 unit_price, total_price) \
                 VALUES (?, ?, ?, ?, ?, CAST(? AS DECIMAL(18,4)), CAST(? AS DECIMAL(18,4)))",
                params![
                    Uuid::new_v4().to_string(),
                    id.to_string(),
                    item.catalog_ref.as_deref(),
                    item.description,
                    item.quantity,
                    item.unit_price.to_string(),
                    item.line_total.to_string()
                ],
            )?;
        }
        Ok(())
    }

    /// Numbers and stores a submission, drawing a new number whenever the
    /// store already holds the one drawn.
    pub fn create_invoice<R: Rng>(
        conn: &Connection,
        submission: &InvoiceSubmission,
        prefix: &str,
        today: NaiveDate,
        retries: u32,
        rng: &mut R,
    ) -> DbResult<Invoice> {
        let mut attempt = 0;
        loop {
            let number = generate_invoice_number(prefix, &today, rng);
            match Self::insert_invoice(conn, &number, submission) {
                Err(e) if is_duplicate_key(&e) && attempt < retries => {
                    warn!("Invoice number {} already taken, drawing another", number);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    pub fn get_invoice(conn: &Connection, id: Uuid) -> DbResult<Option<Invoice>> {
        let sql = format!("{} WHERE i.id = ?", INVOICE_SELECT);
        Self::query_one(conn, &sql, &[&id.to_string()], Self::row_to_invoice)
    }

    pub fn list_invoices(conn: &Connection) -> DbResult<Vec<Invoice>> {
        let sql = format!("{} ORDER BY i.created_at DESC", INVOICE_SELECT);
        Self::query_all(conn, &sql, &[], Self::row_to_invoice)
    }

    pub fn get_invoice_lines(conn: &Connection, invoice_id: Uuid) -> DbResult<Vec<InvoiceLine>> {
        let sql = format!("{} WHERE invoice_id = ? ORDER BY rowid", ITEM_SELECT);
        Self::query_all(conn, &sql, &[&invoice_id.to_string()], Self::row_to_line)
    }

    pub fn update_invoice_status(
        conn: &Connection,
        id: Uuid,
        status: InvoiceStatus,
    ) -> DbResult<Option<Invoice>> {
        let changed = conn.execute(
            "UPDATE invoices SET status = ? WHERE id = ?",
            params![status.as_str(), id.to_string()],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        Self::get_invoice(conn, id)
    }

    pub fn delete_invoice(conn: &Connection, id: Uuid) -> DbResult<bool> {
        conn.execute_batch("BEGIN TRANSACTION")?;

        let id_str = id.to_string();

        // Lines first, then the header
        if let Err(e) = conn.execute("DELETE FROM invoice_items WHERE invoice_id = ?", params![id_str]) {
            let _ = conn.execute_batch("ROLLBACK");
            return Err(e);
        }

        let removed = match conn.execute("DELETE FROM invoices WHERE id = ?", params![id_str]) {
            Ok(n) => n,
            Err(e) => {
                let _ = conn.execute_batch("ROLLBACK");
                return Err(e);
            }
        };

        conn.execute_batch("COMMIT")?;
        Ok(removed > 0)
    }

    // --- Profiles ---

    pub fn get_profile(conn: &Connection, user_id: &str) -> DbResult<Option<Profile>> {
        Self::query_one(
            conn,
            "SELECT user_id, full_name, business_name, email, phone, address FROM profiles WHERE user_id = ?",
            &[&user_id],
            |row| {
                Ok(Profile {
                    user_id: row.get(0)?,
                    full_name: row.get(1)?,
                    business_name: row.get(2)?,
                    email: row.get(3)?,
                    phone: row.get(4)?,
                    address: row.get(5)?,
                })
            },
        )
    }

    pub fn upsert_profile(conn: &Connection, profile: &Profile) -> DbResult<Profile> {
        conn.execute(
            "INSERT INTO profiles (user_id, full_name, business_name, email, phone, address) \
             VALUES (?, ?, ?, ?, ?, ?) \
             ON CONFLICT (user_id) DO UPDATE SET full_name = excluded.full_name, \
             business_name = excluded.business_name, email = excluded.email, \
             phone = excluded.phone, address = excluded.address, updated_at = CURRENT_TIMESTAMP",
            params![
                profile.user_id,
                non_empty(&profile.full_name),
                non_empty(&profile.business_name),
                non_empty(&profile.email),
                non_empty(&profile.phone),
                non_empty(&profile.address)
            ],
        )?;

        Self::get_profile(conn, &profile.user_id)?.ok_or(duckdb::Error::QueryReturnedNoRows)
    }
}
