//! SQLite persistence: connection handling, query building, schema setup
//! and the entity repositories.

pub mod connection;
pub mod query;
pub mod repositories;
pub mod schema;
pub mod traits;

pub use connection::DbConnection;
pub use query::{QueryBuilder, SqlValue};
pub use repositories::{
    AtmRepository, AuditRepository, SupervisorRepository, TransactionRepository,
};
pub use schema::SchemaInitializer;
pub use traits::Repository;
