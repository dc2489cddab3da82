use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::api::models::LineRequest;
use crate::db::InvoiceStatus;

#[derive(Parser)]
#[command(name = "vyapar", version, about = "Vyapar small-business back office", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Override the config file path globally
    #[arg(short, long, global = true, default_value = "config.yaml")]
    pub config: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP API
    Serve,

    /// Talk to the AI assistant in the terminal
    Chat {
        /// What the conversation is about (e.g. "invoice", "inventory")
        #[arg(long)]
        context_type: Option<String>,
        /// JSON forwarded to the assistant as-is
        #[arg(long)]
        context_data: Option<String>,
        /// User id sent along with every request
        #[arg(short, long)]
        user: Option<String>,
    },

    /// Manage customers
    Customer {
        #[command(subcommand)]
        action: CustomerAction,
    },

    /// Manage stock
    Inventory {
        #[command(subcommand)]
        action: InventoryAction,
    },

    /// Create and track invoices
    Invoice {
        #[command(subcommand)]
        action: InvoiceAction,
    },

    /// Print business totals
    Dashboard,

    /// Show or edit the business profile
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },
}

#[derive(Subcommand)]
pub enum CustomerAction {
    Add {
        #[arg(short, long)]
        name: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        address: Option<String>,
        #[arg(long)]
        gst: Option<String>,
    },
    List {
        #[arg(short, long)]
        search: Option<String>,
    },
    Delete {
        id: Uuid,
    },
}

#[derive(Subcommand)]
pub enum InventoryAction {
    Add {
        #[arg(short, long)]
        name: String,
        #[arg(long)]
        sku: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(short, long, default_value_t = 0)]
        quantity: i64,
        #[arg(long, default_value = "pcs")]
        unit: String,
        #[arg(long, default_value = "0")]
        purchase_price: Decimal,
        #[arg(long, default_value = "0")]
        selling_price: Decimal,
        #[arg(long, default_value_t = 10)]
        low_stock_threshold: i64,
    },
    List {
        #[arg(short, long)]
        search: Option<String>,
    },
    Delete {
        id: Uuid,
    },
}

#[derive(Subcommand)]
pub enum InvoiceAction {
    /// Create a draft invoice from stock items and free-form lines
    Create {
        #[arg(long)]
        customer: Option<Uuid>,
        /// Stock item as ITEM_ID:QTY (repeatable)
        #[arg(long = "product", value_parser = parse_product)]
        products: Vec<LineRequest>,
        /// Free-form line as DESCRIPTION:QTY:PRICE (repeatable)
        #[arg(long = "line", value_parser = parse_line)]
        lines: Vec<LineRequest>,
        /// Tax rate in percent; defaults to invoice.default_tax_rate
        #[arg(long)]
        tax: Option<Decimal>,
        #[arg(long, default_value = "0")]
        discount: Decimal,
        #[arg(long)]
        due: Option<NaiveDate>,
        #[arg(long)]
        notes: Option<String>,
    },
    List {
        #[arg(short, long)]
        search: Option<String>,
    },
    Show {
        id: Uuid,
    },
    Status {
        id: Uuid,
        status: InvoiceStatus,
    },
    Delete {
        id: Uuid,
    },
}

#[derive(Subcommand)]
pub enum ProfileAction {
    Show {
        #[arg(short, long)]
        user: String,
    },
    Set {
        #[arg(short, long)]
        user: String,
        #[arg(long)]
        full_name: Option<String>,
        #[arg(long)]
        business_name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        address: Option<String>,
    },
}

fn parse_product(raw: &str) -> Result<LineRequest, String> {
    let (id, qty) = raw
        .rsplit_once(':')
        .ok_or_else(|| format!("expected ITEM_ID:QTY, got '{}'", raw))?;
    let quantity = qty
        .parse::<i64>()
        .map_err(|e| format!("bad quantity '{}': {}", qty, e))?;

    Ok(LineRequest {
        inventory_id: Some(id.to_string()),
        quantity: Some(quantity),
        ..Default::default()
    })
}

fn parse_line(raw: &str) -> Result<LineRequest, String> {
    // Description may itself contain ':'
    let mut parts = raw.rsplitn(3, ':');
    let (price, qty, description) = match (parts.next(), parts.next(), parts.next()) {
        (Some(p), Some(q), Some(d)) => (p, q, d),
        _ => return Err(format!("expected DESCRIPTION:QTY:PRICE, got '{}'", raw)),
    };

    Ok(LineRequest {
        inventory_id: None,
        description: Some(description.to_string()),
        quantity: Some(
            qty.parse()
                .map_err(|e| format!("bad quantity '{}': {}", qty, e))?,
        ),
        unit_price: Some(
            price
                .parse()
                .map_err(|e| format!("bad price '{}': {}", price, e))?,
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn line_description_may_contain_colons() {
        let line = parse_line("Cable 2m: USB-C:3:149.50").unwrap();
        assert_eq!(line.description.as_deref(), Some("Cable 2m: USB-C"));
        assert_eq!(line.quantity, Some(3));
        assert_eq!(line.unit_price, Some(dec!(149.50)));
    }

    #[test]
    fn malformed_arguments_are_rejected() {
        assert!(parse_line("just words").is_err());
        assert!(parse_line("Pen:two:10").is_err());
        assert!(parse_product("abc").is_err());
        assert_eq!(parse_product("abc:4").unwrap().quantity, Some(4));
    }

    #[test]
    fn cli_parses_invoice_create() {
        let cli = Cli::try_parse_from([
            "vyapar",
            "invoice",
            "create",
            "--line",
            "Delivery:1:40",
            "--line",
            "Packing:2:5",
            "--tax",
            "5",
        ])
        .unwrap();
        match cli.command {
            Commands::Invoice {
                action: InvoiceAction::Create { lines, tax, .. },
            } => {
                assert_eq!(lines.len(), 2);
                assert_eq!(tax, Some(dec!(5)));
            }
            _ => panic!("expected invoice create"),
        }
    }
}
