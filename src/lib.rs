//! Branch ATM cash reconciliation backend.
//!
//! Supervisors record each ATM's daily cash movements and count the ending
//! cash; the backend computes the expected position, classifies the variance
//! against tolerance, and keeps the reconciliation history in a local SQLite
//! database. The `domain` layer holds the entities and services, `storage`
//! the connection, query builder, schema and repositories.

pub mod config;
pub mod domain;
pub mod error;
pub mod storage;

pub use error::{DataError, Result};
