use chrono::NaiveDate;
use duckdb::{Connection, Result as DbResult};
use rand::Rng;
use std::sync::MutexGuard;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::changes::{Change, ChangeFeed, ChangeKind, Collection};
use super::connection::{get_connection, DbPool};
use super::models::Invoice;
use super::service::DbService;
use crate::config::{DatabaseConfig, InvoiceConfig};
use crate::invoice::InvoiceSubmission;

/// An invoice write touches its header and its lines.
const INVOICE_COLLECTIONS: &[Collection] = &[Collection::Invoices, Collection::InvoiceItems];

/// Shared handle to the database plus its change feed.
///
/// Handed explicitly to every route and command that needs data; writes made
/// through [`Store::write`] are announced to subscribers once they succeed.
#[derive(Clone)]
pub struct Store {
    pool: DbPool,
    changes: ChangeFeed,
}

impl Store {
    pub fn open(config: &DatabaseConfig) -> DbResult<Self> {
        Ok(Self::from_pool(get_connection(config)?))
    }

    pub fn from_pool(pool: DbPool) -> Self {
        Self {
            pool,
            changes: ChangeFeed::default(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Change> {
        self.changes.subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-statement leaves the connection itself usable
        self.pool.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn read<T>(&self, f: impl FnOnce(&Connection) -> DbResult<T>) -> DbResult<T> {
        let conn = self.lock();
        f(&conn)
    }

    pub fn write<T>(
        &self,
        collection: Collection,
        kind: ChangeKind,
        f: impl FnOnce(&Connection) -> DbResult<T>,
    ) -> DbResult<T> {
        self.write_all(&[collection], kind, f)
    }

    /// Like [`Store::write`] for a write spanning several collections;
    /// one change per collection is published once `f` succeeds.
    pub fn write_all<T>(
        &self,
        collections: &[Collection],
        kind: ChangeKind,
        f: impl FnOnce(&Connection) -> DbResult<T>,
    ) -> DbResult<T> {
        let result = {
            let conn = self.lock();
            f(&conn)?
        };
        for collection in collections {
            self.changes.publish(*collection, kind);
        }
        Ok(result)
    }

    /// Numbers and stores a submission (see [`DbService::create_invoice`]).
    pub fn create_invoice<R: Rng>(
        &self,
        submission: &InvoiceSubmission,
        options: &InvoiceConfig,
        today: NaiveDate,
        rng: &mut R,
    ) -> DbResult<Invoice> {
        self.write_all(INVOICE_COLLECTIONS, ChangeKind::Insert, |conn| {
            DbService::create_invoice(
                conn,
                submission,
                &options.number_prefix,
                today,
                options.number_retries,
                rng,
            )
        })
    }

    pub fn delete_invoice(&self, id: Uuid) -> DbResult<bool> {
        self.write_all(INVOICE_COLLECTIONS, ChangeKind::Delete, |conn| {
            DbService::delete_invoice(conn, id)
        })
    }
}
