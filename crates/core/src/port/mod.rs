// Port Layer - Interfaces for external dependencies

pub mod store;
pub mod time_provider;
pub mod transaction;

// Re-exports
pub use store::{AnnotationExport, EngineStore};
pub use time_provider::{SystemTimeProvider, TimeProvider};
pub use transaction::{StoreTransaction, Transaction, TransactionalStore};
