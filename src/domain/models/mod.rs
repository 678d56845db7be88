//! Domain entities persisted by the storage layer.

pub mod atm;
pub mod audit;
pub mod supervisor;
pub mod transaction;

pub use atm::{Atm, AtmType};
pub use audit::{AuditAction, AuditEntry};
pub use supervisor::{Supervisor, UserRole};
pub use transaction::{AtmTransaction, ReconciliationStatus};
