// Corpora Infrastructure - SQLite Adapter
// Implements: EngineStore, TransactionalStore / StoreTransaction

mod connection;
mod migration;
mod rows;
mod store;
mod transaction;

pub use connection::create_pool;
pub use migration::run_migrations;
pub use store::SqliteEngineStore;
pub use transaction::SqliteStoreTransaction;

// Note: sqlx::Error conversion is wrapped in helper functions due to
// Rust's orphan rules (cannot implement From<sqlx::Error> for AppError here)
