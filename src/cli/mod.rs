pub mod commands;

use std::io::{self, Write};
use std::sync::Arc;

use chrono::Local;
use thiserror::Error;
use tracing::warn;

use crate::api::models::CreateInvoiceRequest;
use crate::assistant::{ChatError, ChatRequestContext, ChatSession, HttpCompletionTransport, Role};
use crate::cli::commands::{Commands, CustomerAction, InventoryAction, InvoiceAction, ProfileAction};
use crate::config::AppConfig;
use crate::dashboard::{format_inr, DashboardStats};
use crate::db::{service::DbService, ChangeKind, Collection, NewCustomer, NewInventoryItem, Profile, Store};
use crate::invoice::InvoiceError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Failed to load config: {0}")]
    Config(#[from] ::config::ConfigError),
    #[error("Database error: {0}")]
    Db(#[from] duckdb::Error),
    #[error("{0}")]
    Invoice(#[from] InvoiceError),
    #[error("{0}")]
    Chat(#[from] ChatError),
    #[error("Invalid context JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("{0} not found")]
    NotFound(String),
    #[error("Serve is started from main, not run_cli")]
    Serve,
}

pub async fn run_cli(command: Commands, config_path: String) -> Result<(), CliError> {
    let config = AppConfig::load(&config_path)?;

    match command {
        Commands::Serve => Err(CliError::Serve),
        Commands::Chat {
            context_type,
            context_data,
            user,
        } => {
            let context = ChatRequestContext {
                context_type,
                context_data: context_data.as_deref().map(serde_json::from_str).transpose()?,
                user_id: user,
            };
            run_repl(&config, context).await
        }
        Commands::Customer { action } => {
            let store = Store::open(&config.database)?;
            run_customer(&store, action)
        }
        Commands::Inventory { action } => {
            let store = Store::open(&config.database)?;
            run_inventory(&store, action)
        }
        Commands::Invoice { action } => {
            let store = Store::open(&config.database)?;
            run_invoice(&store, &config, action)
        }
        Commands::Dashboard => {
            let store = Store::open(&config.database)?;
            run_dashboard(&store, &config)
        }
        Commands::Profile { action } => {
            let store = Store::open(&config.database)?;
            run_profile(&store, action)
        }
    }
}

fn run_customer(store: &Store, action: CustomerAction) -> Result<(), CliError> {
    match action {
        CustomerAction::Add {
            name,
            email,
            phone,
            address,
            gst,
        } => {
            let new = NewCustomer {
                name,
                email,
                phone,
                address,
                gst_number: gst,
            };
            let customer = store.write(Collection::Customers, ChangeKind::Insert, |conn| {
                DbService::insert_customer(conn, &new)
            })?;
            println!("Added customer {} ({})", customer.name, customer.id);
        }
        CustomerAction::List { search } => {
            let customers = store.read(DbService::list_customers)?;
            let shown: Vec<_> = customers
                .iter()
                .filter(|c| search.as_deref().map_or(true, |q| c.matches(q)))
                .collect();
            if shown.is_empty() {
                println!("No customers found.");
                return Ok(());
            }
            println!("{:<36} | {:<24} | {:<16} | {}", "ID", "Name", "Phone", "Email");
            println!("{:-<36}-+-{:-<24}-+-{:-<16}-+-{:-<20}", "", "", "", "");
            for c in shown {
                println!(
                    "{:<36} | {:<24} | {:<16} | {}",
                    c.id,
                    c.name,
                    c.phone.as_deref().unwrap_or("-"),
                    c.email.as_deref().unwrap_or("-")
                );
            }
        }
        CustomerAction::Delete { id } => {
            let removed = store.write(Collection::Customers, ChangeKind::Delete, |conn| {
                DbService::delete_customer(conn, id)
            })?;
            if !removed {
                return Err(CliError::NotFound(format!("Customer {}", id)));
            }
            println!("Deleted customer {}", id);
        }
    }
    Ok(())
}

fn run_inventory(store: &Store, action: InventoryAction) -> Result<(), CliError> {
    match action {
        InventoryAction::Add {
            name,
            sku,
            category,
            quantity,
            unit,
            purchase_price,
            selling_price,
            low_stock_threshold,
        } => {
            let new = NewInventoryItem {
                name,
                sku,
                description: None,
                category,
                quantity,
                unit,
                purchase_price,
                selling_price,
                low_stock_threshold,
            };
            let item = store.write(Collection::Inventory, ChangeKind::Insert, |conn| {
                DbService::insert_item(conn, &new)
            })?;
            println!("Added {} x{} ({})", item.name, item.quantity, item.id);
        }
        InventoryAction::List { search } => {
            let items = store.read(DbService::list_inventory)?;
            let shown: Vec<_> = items
                .iter()
                .filter(|i| search.as_deref().map_or(true, |q| i.matches(q)))
                .collect();
            if shown.is_empty() {
                println!("No items found.");
                return Ok(());
            }
            println!(
                "{:<36} | {:<24} | {:>8} | {:>12} | {}",
                "ID", "Name", "Qty", "Price", "Status"
            );
            println!("{:-<36}-+-{:-<24}-+-{:-<8}-+-{:-<12}-+-{:-<12}", "", "", "", "", "");
            for i in shown {
                println!(
                    "{:<36} | {:<24} | {:>8} | {:>12} | {}",
                    i.id,
                    i.name,
                    format!("{} {}", i.quantity, i.unit),
                    format_inr(i.selling_price),
                    i.stock_status()
                );
            }
        }
        InventoryAction::Delete { id } => {
            let removed = store.write(Collection::Inventory, ChangeKind::Delete, |conn| {
                DbService::delete_item(conn, id)
            })?;
            if !removed {
                return Err(CliError::NotFound(format!("Item {}", id)));
            }
            println!("Deleted item {}", id);
        }
    }
    Ok(())
}

fn run_invoice(store: &Store, config: &AppConfig, action: InvoiceAction) -> Result<(), CliError> {
    match action {
        InvoiceAction::Create {
            customer,
            products,
            lines,
            tax,
            discount,
            due,
            notes,
        } => {
            let request = CreateInvoiceRequest {
                customer_id: customer,
                issue_date: None,
                due_date: due,
                tax_rate: tax,
                discount_amount: discount,
                notes,
                lines: products.into_iter().chain(lines).collect(),
            };

            let catalog = store.read(DbService::list_inventory)?;
            let today = Local::now().date_naive();
            let draft = request.into_draft(&catalog, config.invoice.default_tax_rate, today)?;
            let submission = draft.prepare_submission()?;

            let invoice =
                store.create_invoice(&submission, &config.invoice, today, &mut rand::thread_rng())?;

            let totals = &submission.totals;
            println!("Created invoice {} ({})", invoice.invoice_number, invoice.id);
            println!("  Subtotal:  {}", format_inr(totals.subtotal));
            println!("  Tax ({}%): {}", totals.tax_rate, format_inr(totals.tax_amount));
            println!("  Discount:  {}", format_inr(totals.discount_amount));
            println!("  Total:     {}", format_inr(totals.grand_total));
        }
        InvoiceAction::List { search } => {
            let invoices = store.read(DbService::list_invoices)?;
            let shown: Vec<_> = invoices
                .iter()
                .filter(|i| search.as_deref().map_or(true, |q| i.matches(q)))
                .collect();
            if shown.is_empty() {
                println!("No invoices found.");
                return Ok(());
            }
            println!(
                "{:<14} | {:<24} | {:<10} | {:<9} | {:>12}",
                "Number", "Customer", "Issued", "Status", "Total"
            );
            println!("{:-<14}-+-{:-<24}-+-{:-<10}-+-{:-<9}-+-{:-<12}", "", "", "", "", "");
            for i in shown {
                println!(
                    "{:<14} | {:<24} | {:<10} | {:<9} | {:>12}",
                    i.invoice_number,
                    i.customer_name.as_deref().unwrap_or("Walk-in"),
                    i.issue_date,
                    i.status,
                    format_inr(i.total_amount)
                );
            }
        }
        InvoiceAction::Show { id } => {
            let (invoice, lines) = store.read(|conn| {
                let invoice = DbService::get_invoice(conn, id)?;
                let lines = DbService::get_invoice_lines(conn, id)?;
                Ok((invoice, lines))
            })?;
            let invoice = invoice.ok_or_else(|| CliError::NotFound(format!("Invoice {}", id)))?;

            println!("Invoice {} [{}]", invoice.invoice_number, invoice.status);
            println!("Customer: {}", invoice.customer_name.as_deref().unwrap_or("Walk-in"));
            println!("Issued:   {}", invoice.issue_date);
            if let Some(due) = invoice.due_date {
                println!("Due:      {}", due);
            }
            println!("---");
            for line in &lines {
                println!(
                    "{:<30} {:>5} x {:>10} = {:>12}",
                    line.description,
                    line.quantity,
                    format_inr(line.unit_price),
                    format_inr(line.total_price)
                );
            }
            println!("---");
            println!("Subtotal: {}", format_inr(invoice.subtotal));
            println!("Tax ({}%): {}", invoice.tax_rate.normalize(), format_inr(invoice.tax_amount));
            println!("Discount: {}", format_inr(invoice.discount_amount));
            println!("Total:    {}", format_inr(invoice.total_amount));
            if let Some(notes) = &invoice.notes {
                println!("Notes: {}", notes);
            }
        }
        InvoiceAction::Status { id, status } => {
            let updated = store.write(Collection::Invoices, ChangeKind::Update, |conn| {
                DbService::update_invoice_status(conn, id, status)
            })?;
            let invoice = updated.ok_or_else(|| CliError::NotFound(format!("Invoice {}", id)))?;
            println!("Invoice {} is now {}", invoice.invoice_number, invoice.status);
        }
        InvoiceAction::Delete { id } => {
            let removed = store.delete_invoice(id)?;
            if !removed {
                return Err(CliError::NotFound(format!("Invoice {}", id)));
            }
            println!("Deleted invoice {}", id);
        }
    }
    Ok(())
}

fn run_dashboard(store: &Store, config: &AppConfig) -> Result<(), CliError> {
    let stats = store.read(|conn| {
        let customers = DbService::count_customers(conn)?;
        let invoices = DbService::list_invoices(conn)?;
        let inventory = DbService::list_inventory(conn)?;
        Ok(DashboardStats::compute(
            customers,
            &invoices,
            &inventory,
            &config.dashboard,
            Local::now().date_naive(),
        ))
    })?;

    println!("Total revenue:    {}", format_inr(stats.total_revenue));
    println!("Customers:        {}", stats.total_customers);
    println!("Invoices:         {} ({} pending)", stats.total_invoices, stats.pending_invoices);
    println!("Low stock items:  {}", stats.low_stock_items);

    if !stats.invoice_status.is_empty() {
        println!("\nBy status:");
        for bucket in &stats.invoice_status {
            println!("  {:<8} {}", bucket.name, bucket.value);
        }
    }

    println!("\nRevenue by month:");
    for month in &stats.monthly_revenue {
        println!("  {:<4} {:>12}", month.month, format_inr(month.revenue));
    }

    if !stats.recent_invoices.is_empty() {
        println!("\nRecent invoices:");
        for i in &stats.recent_invoices {
            println!(
                "  {:<14} {:<9} {:>12}",
                i.invoice_number,
                i.status,
                format_inr(i.total_amount)
            );
        }
    }
    Ok(())
}

fn run_profile(store: &Store, action: ProfileAction) -> Result<(), CliError> {
    match action {
        ProfileAction::Show { user } => {
            let profile = store
                .read(|conn| DbService::get_profile(conn, &user))?
                .ok_or_else(|| CliError::NotFound(format!("Profile for {}", user)))?;
            println!("User:     {}", profile.user_id);
            println!("Name:     {}", profile.full_name.as_deref().unwrap_or("-"));
            println!("Business: {}", profile.business_name.as_deref().unwrap_or("-"));
            println!("Email:    {}", profile.email.as_deref().unwrap_or("-"));
            println!("Phone:    {}", profile.phone.as_deref().unwrap_or("-"));
            println!("Address:  {}", profile.address.as_deref().unwrap_or("-"));
        }
        ProfileAction::Set {
            user,
            full_name,
            business_name,
            email,
            phone,
            address,
        } => {
            let profile = store.write(Collection::Profiles, ChangeKind::Update, |conn| {
                // Unset flags keep what is already stored
                let current = DbService::get_profile(conn, &user)?.unwrap_or_default();
                let merged = Profile {
                    user_id: user.clone(),
                    full_name: full_name.or(current.full_name),
                    business_name: business_name.or(current.business_name),
                    email: email.or(current.email),
                    phone: phone.or(current.phone),
                    address: address.or(current.address),
                };
                DbService::upsert_profile(conn, &merged)
            })?;
            println!("Saved profile for {}", profile.user_id);
        }
    }
    Ok(())
}

async fn run_repl(config: &AppConfig, context: ChatRequestContext) -> Result<(), CliError> {
    if config.assistant.api_key.is_empty() {
        warn!("assistant.api_key is empty; the endpoint will probably refuse requests");
    }
    let transport = HttpCompletionTransport::from_config(&config.assistant)?;
    let session = ChatSession::new(Arc::new(transport), config.assistant.greeting.clone());

    println!("--- Vyapar Assistant ---");
    println!("Type /exit to quit.");
    println!("------------------------");
    println!("\nAssistant> {}", config.assistant.greeting);

    loop {
        print!("\nYou> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let text = input.trim();
        if text.is_empty() {
            continue;
        }
        if text == "/exit" || text == "/quit" {
            break;
        }

        print!("Assistant> ");
        io::stdout().flush()?;

        // User message lands at `base`, the reply (or a failure notice) right after it
        let base = session.transcript().len();
        let mut updates = session.subscribe();
        let mut printed = 0;

        let submit = session.submit(text, &context);
        tokio::pin!(submit);

        let result = loop {
            tokio::select! {
                result = &mut submit => break result,
                Ok(()) = updates.changed() => {
                    let snapshot = updates.borrow_and_update().clone();
                    printed = print_reply_tail(&snapshot, base + 1, printed)?;
                }
            }
        };

        let snapshot = session.transcript();
        print_reply_tail(&snapshot, base + 1, printed)?;
        // A stream that failed midway leaves its partial reply plus a notice
        for extra in snapshot.iter().skip(base + 2) {
            print!("\n{}", extra.content);
        }
        println!();

        if let Err(e) = result {
            warn!("Exchange failed: {}", e);
        }
    }
    Ok(())
}

/// Prints whatever the reply at `index` gained since `printed` bytes.
fn print_reply_tail(
    snapshot: &[crate::assistant::ChatMessage],
    index: usize,
    printed: usize,
) -> io::Result<usize> {
    let Some(reply) = snapshot.get(index).filter(|m| m.role == Role::Assistant) else {
        return Ok(printed);
    };
    if reply.content.len() > printed {
        print!("{}", &reply.content[printed..]);
        io::stdout().flush()?;
    }
    Ok(reply.content.len().max(printed))
}
