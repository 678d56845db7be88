pub mod atm_repository;
pub mod audit_repository;
pub mod supervisor_repository;
pub mod transaction_repository;

pub use atm_repository::AtmRepository;
pub use audit_repository::AuditRepository;
pub use supervisor_repository::SupervisorRepository;
pub use transaction_repository::TransactionRepository;

use crate::error::DataError;

/// A stored value that no longer maps onto the domain model (unknown enum
/// text, malformed date). Surfaced as a database error since it means the
/// row, not the caller's input, is bad.
pub(crate) fn corrupt_row(context: &str, detail: String) -> DataError {
    DataError::Database {
        context: context.to_string(),
        source: sqlx::Error::Decode(detail.into()),
    }
}
