//! Error taxonomy for the data core.
//!
//! Three categories, matching how callers are expected to react:
//! validation errors are caught before any I/O, invalid-operation errors are
//! business-rule conflicts whose message is shown to the user verbatim, and
//! database errors wrap driver failures with a contextual message.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataError {
    /// Malformed or missing input, rejected before touching the database.
    #[error("{0}")]
    Validation(String),

    /// Domain-rule violation: duplicate keys, referential breaches,
    /// reconciled-record deletion and the like.
    #[error("{0}")]
    InvalidOperation(String),

    /// Driver or connection failure, wrapped with context.
    #[error("{context}: {source}")]
    Database {
        context: String,
        #[source]
        source: sqlx::Error,
    },
}

impl DataError {
    pub fn validation(msg: impl Into<String>) -> Self {
        DataError::Validation(msg.into())
    }

    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        DataError::InvalidOperation(msg.into())
    }

    /// Adapter for `map_err` call sites: wraps a driver error with context.
    pub fn db(context: impl Into<String>) -> impl FnOnce(sqlx::Error) -> Self {
        let context = context.into();
        move |source| DataError::Database { context, source }
    }

    pub fn is_invalid_operation(&self) -> bool {
        matches!(self, DataError::InvalidOperation(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, DataError::Validation(_))
    }
}

pub type Result<T> = std::result::Result<T, DataError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_is_verbatim() {
        let err = DataError::validation("ATM number is required");
        assert_eq!(err.to_string(), "ATM number is required");
        assert!(err.is_validation());
        assert!(!err.is_invalid_operation());
    }

    #[test]
    fn database_error_carries_context() {
        let err = DataError::db("retrieving transaction 7")(sqlx::Error::RowNotFound);
        let msg = err.to_string();
        assert!(msg.starts_with("retrieving transaction 7: "));
    }
}
