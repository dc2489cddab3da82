pub mod changes;
pub mod connection;
pub mod models;
pub mod service;
pub mod store;

pub use changes::{Change, ChangeFeed, ChangeKind, Collection};
pub use connection::{get_connection, DbPool};
pub use models::*;
pub use store::Store;
