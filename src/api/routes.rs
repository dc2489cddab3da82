use actix_web::{delete, get, patch, post, put, web, HttpResponse, Result as WebResult};
use bytes::Bytes;
use chrono::Local;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, warn};
use uuid::Uuid;

use crate::api::models::{
    CreateInvoiceRequest, ErrorBody, InventoryView, InvoiceDetail, SearchQuery,
    StatusUpdateRequest,
};
use crate::config::AppConfig;
use crate::dashboard::DashboardStats;
use crate::db::{
    service::DbService, ChangeKind, Collection, NewCustomer, NewInventoryItem, Profile, Store,
};

fn db_error(e: duckdb::Error) -> HttpResponse {
    error!("Database error: {}", e);
    HttpResponse::InternalServerError().json(ErrorBody::new(e))
}

fn bad_request(message: impl ToString) -> HttpResponse {
    HttpResponse::BadRequest().json(ErrorBody::new(message))
}

// --- Customers ---

#[get("")]
pub async fn list_customers(store: web::Data<Store>, query: web::Query<SearchQuery>) -> WebResult<HttpResponse> {
    match store.read(DbService::list_customers) {
        Ok(mut customers) => {
            if let Some(needle) = query.needle() {
                customers.retain(|c| c.matches(needle));
            }
            Ok(HttpResponse::Ok().json(customers))
        }
        Err(e) => Ok(db_error(e)),
    }
}

#[post("")]
pub async fn create_customer(store: web::Data<Store>, req: web::Json<NewCustomer>) -> WebResult<HttpResponse> {
    let req = req.into_inner();
    if req.name.trim().is_empty() {
        return Ok(bad_request("Customer name is required"));
    }

    match store.write(Collection::Customers, ChangeKind::Insert, |conn| {
        DbService::insert_customer(conn, &req)
    }) {
        Ok(customer) => Ok(HttpResponse::Created().json(customer)),
        Err(e) => Ok(db_error(e)),
    }
}

#[get("/{id}")]
pub async fn get_customer(store: web::Data<Store>, id: web::Path<Uuid>) -> WebResult<HttpResponse> {
    match store.read(|conn| DbService::get_customer(conn, *id)) {
        Ok(Some(customer)) => Ok(HttpResponse::Ok().json(customer)),
        Ok(None) => Ok(HttpResponse::NotFound().finish()),
        Err(e) => Ok(db_error(e)),
    }
}

#[put("/{id}")]
pub async fn update_customer(
    store: web::Data<Store>,
    id: web::Path<Uuid>,
    req: web::Json<NewCustomer>,
) -> WebResult<HttpResponse> {
    let req = req.into_inner();
    if req.name.trim().is_empty() {
        return Ok(bad_request("Customer name is required"));
    }

    match store.write(Collection::Customers, ChangeKind::Update, |conn| {
        DbService::update_customer(conn, *id, &req)
    }) {
        Ok(Some(customer)) => Ok(HttpResponse::Ok().json(customer)),
        Ok(None) => Ok(HttpResponse::NotFound().finish()),
        Err(e) => Ok(db_error(e)),
    }
}

#[delete("/{id}")]
pub async fn delete_customer(store: web::Data<Store>, id: web::Path<Uuid>) -> WebResult<HttpResponse> {
    match store.write(Collection::Customers, ChangeKind::Delete, |conn| {
        DbService::delete_customer(conn, *id)
    }) {
        Ok(true) => Ok(HttpResponse::NoContent().finish()),
        Ok(false) => Ok(HttpResponse::NotFound().finish()),
        Err(e) => Ok(db_error(e)),
    }
}

// --- Inventory ---

#[get("")]
pub async fn list_inventory(store: web::Data<Store>, query: web::Query<SearchQuery>) -> WebResult<HttpResponse> {
    match store.read(DbService::list_inventory) {
        Ok(items) => {
            let items: Vec<InventoryView> = items
                .into_iter()
                .filter(|item| query.needle().map_or(true, |needle| item.matches(needle)))
                .map(InventoryView::from)
                .collect();
            Ok(HttpResponse::Ok().json(items))
        }
        Err(e) => Ok(db_error(e)),
    }
}

#[post("")]
pub async fn create_item(store: web::Data<Store>, req: web::Json<NewInventoryItem>) -> WebResult<HttpResponse> {
    let req = req.into_inner();
    if req.name.trim().is_empty() {
        return Ok(bad_request("Item name is required"));
    }

    match store.write(Collection::Inventory, ChangeKind::Insert, |conn| {
        DbService::insert_item(conn, &req)
    }) {
        Ok(item) => Ok(HttpResponse::Created().json(InventoryView::from(item))),
        Err(e) => Ok(db_error(e)),
    }
}

#[put("/{id}")]
pub async fn update_item(
    store: web::Data<Store>,
    id: web::Path<Uuid>,
    req: web::Json<NewInventoryItem>,
) -> WebResult<HttpResponse> {
    let req = req.into_inner();
    if req.name.trim().is_empty() {
        return Ok(bad_request("Item name is required"));
    }

    match store.write(Collection::Inventory, ChangeKind::Update, |conn| {
        DbService::update_item(conn, *id, &req)
    }) {
        Ok(Some(item)) => Ok(HttpResponse::Ok().json(InventoryView::from(item))),
        Ok(None) => Ok(HttpResponse::NotFound().finish()),
        Err(e) => Ok(db_error(e)),
    }
}

#[delete("/{id}")]
pub async fn delete_item(store: web::Data<Store>, id: web::Path<Uuid>) -> WebResult<HttpResponse> {
    match store.write(Collection::Inventory, ChangeKind::Delete, |conn| {
        DbService::delete_item(conn, *id)
    }) {
        Ok(true) => Ok(HttpResponse::NoContent().finish()),
        Ok(false) => Ok(HttpResponse::NotFound().finish()),
        Err(e) => Ok(db_error(e)),
    }
}

// --- Invoices ---

#[get("")]
pub async fn list_invoices(store: web::Data<Store>, query: web::Query<SearchQuery>) -> WebResult<HttpResponse> {
    match store.read(DbService::list_invoices) {
        Ok(mut invoices) => {
            if let Some(needle) = query.needle() {
                invoices.retain(|i| i.matches(needle));
            }
            Ok(HttpResponse::Ok().json(invoices))
        }
        Err(e) => Ok(db_error(e)),
    }
}

#[post("")]
pub async fn create_invoice(
    store: web::Data<Store>,
    config: web::Data<AppConfig>,
    req: web::Json<CreateInvoiceRequest>,
) -> WebResult<HttpResponse> {
    let catalog = match store.read(DbService::list_inventory) {
        Ok(items) => items,
        Err(e) => return Ok(db_error(e)),
    };

    let today = Local::now().date_naive();
    let submission = match req
        .into_inner()
        .into_draft(&catalog, config.invoice.default_tax_rate, today)
        .and_then(|draft| draft.prepare_submission())
    {
        Ok(s) => s,
        Err(e) => return Ok(bad_request(e)),
    };

    match store.create_invoice(&submission, &config.invoice, today, &mut rand::thread_rng()) {
        Ok(invoice) => Ok(HttpResponse::Created().json(invoice)),
        Err(e) => Ok(db_error(e)),
    }
}

#[get("/{id}")]
pub async fn get_invoice(store: web::Data<Store>, id: web::Path<Uuid>) -> WebResult<HttpResponse> {
    let id = id.into_inner();
    let detail = store.read(|conn| {
        let Some(invoice) = DbService::get_invoice(conn, id)? else {
            return Ok(None);
        };
        let items = DbService::get_invoice_lines(conn, id)?;
        Ok(Some(InvoiceDetail { invoice, items }))
    });

    match detail {
        Ok(Some(detail)) => Ok(HttpResponse::Ok().json(detail)),
        Ok(None) => Ok(HttpResponse::NotFound().finish()),
        Err(e) => Ok(db_error(e)),
    }
}

#[patch("/{id}/status")]
pub async fn update_invoice_status(
    store: web::Data<Store>,
    id: web::Path<Uuid>,
    req: web::Json<StatusUpdateRequest>,
) -> WebResult<HttpResponse> {
    match store.write(Collection::Invoices, ChangeKind::Update, |conn| {
        DbService::update_invoice_status(conn, *id, req.status)
    }) {
        Ok(Some(invoice)) => Ok(HttpResponse::Ok().json(invoice)),
        Ok(None) => Ok(HttpResponse::NotFound().finish()),
        Err(e) => Ok(db_error(e)),
    }
}

#[delete("/{id}")]
pub async fn delete_invoice(store: web::Data<Store>, id: web::Path<Uuid>) -> WebResult<HttpResponse> {
    match store.delete_invoice(*id) {
        Ok(true) => Ok(HttpResponse::NoContent().finish()),
        Ok(false) => Ok(HttpResponse::NotFound().finish()),
        Err(e) => Ok(db_error(e)),
    }
}

// --- Dashboard, profile, change feed ---

#[get("/dashboard")]
pub async fn dashboard(store: web::Data<Store>, config: web::Data<AppConfig>) -> WebResult<HttpResponse> {
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
    });

    match stats {
        Ok(stats) => Ok(HttpResponse::Ok().json(stats)),
        Err(e) => Ok(db_error(e)),
    }
}

#[get("/profile/{user_id}")]
pub async fn get_profile(store: web::Data<Store>, user_id: web::Path<String>) -> WebResult<HttpResponse> {
    match store.read(|conn| DbService::get_profile(conn, &user_id)) {
        Ok(Some(profile)) => Ok(HttpResponse::Ok().json(profile)),
        Ok(None) => Ok(HttpResponse::NotFound().finish()),
        Err(e) => Ok(db_error(e)),
    }
}

#[put("/profile/{user_id}")]
pub async fn put_profile(
    store: web::Data<Store>,
    user_id: web::Path<String>,
    req: web::Json<Profile>,
) -> WebResult<HttpResponse> {
    let mut profile = req.into_inner();
    profile.user_id = user_id.into_inner();

    match store.write(Collection::Profiles, ChangeKind::Update, |conn| {
        DbService::upsert_profile(conn, &profile)
    }) {
        Ok(profile) => Ok(HttpResponse::Ok().json(profile)),
        Err(e) => Ok(db_error(e)),
    }
}

/// Server-sent events, one `data: {"collection":..,"kind":..}` per store write.
#[get("/changes")]
pub async fn changes(store: web::Data<Store>) -> WebResult<HttpResponse> {
    let mut rx = store.subscribe();

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(change) => {
                    let payload = serde_json::to_string(&change).unwrap_or_default();
                    yield Ok::<Bytes, actix_web::Error>(Bytes::from(format!("data: {}\n\n", payload)));
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!("Change listener lagged by {} events", missed);
                    // Client re-reads everything it shows
                    yield Ok(Bytes::from(format!("event: lagged\ndata: {}\n\n", missed)));
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Ok(HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .streaming(stream))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/customers")
            .service(list_customers)
            .service(create_customer)
            .service(get_customer)
            .service(update_customer)
            .service(delete_customer),
    )
    .service(
        web::scope("/inventory")
            .service(list_inventory)
            .service(create_item)
            .service(update_item)
            .service(delete_item),
    )
    .service(
        web::scope("/invoices")
            .service(list_invoices)
            .service(create_invoice)
            .service(get_invoice)
            .service(update_invoice_status)
            .service(delete_invoice),
    )
    .service(dashboard)
    .service(get_profile)
    .service(put_profile)
    .service(changes);
}
