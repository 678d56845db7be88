//! Database connection handle and execution primitives.
//!
//! The handle is constructed explicitly and passed by clone; there is no
//! global instance. Each operation borrows a pooled connection and returns
//! it on every exit path.

use sqlx::sqlite::{SqliteConnectOptions, SqliteRow};
use sqlx::{Row as _, Sqlite, SqlitePool, Transaction};
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{DataError, Result};
use crate::storage::query::{bind_values, SqlValue};
use crate::storage::schema::SchemaInitializer;

/// Shared handle to the SQLite database.
#[derive(Clone)]
pub struct DbConnection {
    pool: Arc<SqlitePool>,
}

impl DbConnection {
    /// Open (creating the database file if needed) without touching the
    /// schema.
    pub async fn new(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(DataError::db("parsing database url"))?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(DataError::db("connecting to database"))?;

        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Open and bring the schema up: idempotent table/index creation plus
    /// first-run seeding.
    pub async fn init(url: &str) -> Result<Self> {
        let db = Self::new(url).await?;
        let initializer = SchemaInitializer::new(db.clone());
        initializer.initialize_schema().await?;
        initializer.seed_sample_data().await?;
        Ok(db)
    }

    /// Initialize a unique in-memory database for a test.
    #[cfg(test)]
    pub async fn init_test() -> Result<Self> {
        let test_id = uuid::Uuid::new_v4().to_string();
        let url = format!("sqlite:file:memdb_{test_id}?mode=memory&cache=shared");
        Self::init(&url).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Begin a transaction for a multi-statement write. Dropping the
    /// returned guard without committing rolls back.
    pub async fn begin(&self) -> Result<Transaction<'_, Sqlite>> {
        self.pool
            .begin()
            .await
            .map_err(DataError::db("beginning transaction"))
    }

    /// Execute a statement, returning the number of affected rows.
    pub async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let result = bind_values(sqlx::query(sql), params)
            .execute(&*self.pool)
            .await
            .map_err(DataError::db("executing statement"))?;
        Ok(result.rows_affected())
    }

    /// Execute a query expected to yield a single value; NULL or an absent
    /// row decodes to the type's default.
    pub async fn execute_scalar<T>(&self, sql: &str, params: &[SqlValue]) -> Result<T>
    where
        T: Default + Send + Unpin + sqlx::Type<Sqlite> + for<'r> sqlx::Decode<'r, Sqlite>,
    {
        let row = bind_values(sqlx::query(sql), params)
            .fetch_optional(&*self.pool)
            .await
            .map_err(DataError::db("executing scalar query"))?;
        match row {
            Some(row) => {
                let value: Option<T> = row
                    .try_get(0)
                    .map_err(DataError::db("decoding scalar value"))?;
                Ok(value.unwrap_or_default())
            }
            None => Ok(T::default()),
        }
    }

    /// Run a query and map each row through `mapper`, preserving order.
    pub async fn fetch_all<T, F>(&self, sql: &str, params: &[SqlValue], mapper: F) -> Result<Vec<T>>
    where
        F: Fn(&SqliteRow) -> Result<T>,
    {
        let rows = bind_values(sqlx::query(sql), params)
            .fetch_all(&*self.pool)
            .await
            .map_err(DataError::db("executing query"))?;
        rows.iter().map(&mapper).collect()
    }

    /// Like `fetch_all` but for at most one row.
    pub async fn fetch_optional<T, F>(
        &self,
        sql: &str,
        params: &[SqlValue],
        mapper: F,
    ) -> Result<Option<T>>
    where
        F: Fn(&SqliteRow) -> Result<T>,
    {
        let row = bind_values(sqlx::query(sql), params)
            .fetch_optional(&*self.pool)
            .await
            .map_err(DataError::db("executing query"))?;
        row.as_ref().map(&mapper).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_test() -> DbConnection {
        DbConnection::init_test()
            .await
            .expect("Failed to create test database")
    }

    #[tokio::test]
    async fn scalar_defaults_when_no_row_matches() {
        let db = setup_test().await;
        let count: i64 = db
            .execute_scalar(
                "SELECT SUM(variance) FROM atm_transactions WHERE atm_id = ?",
                &[SqlValue::Integer(999_999)],
            )
            .await
            .expect("Failed to run scalar query");
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn execute_reports_affected_rows() {
        let db = setup_test().await;
        let affected = db
            .execute(
                "UPDATE supervisors SET department = ? WHERE 1 = 0",
                &[SqlValue::Text("Nowhere".into())],
            )
            .await
            .expect("Failed to execute update");
        assert_eq!(affected, 0);
    }

    #[tokio::test]
    async fn fetch_all_applies_mapper_in_order() {
        let db = setup_test().await;
        let usernames: Vec<String> = db
            .fetch_all(
                "SELECT username FROM supervisors ORDER BY username ASC",
                &[],
                |row| {
                    row.try_get::<String, _>("username")
                        .map_err(DataError::db("decoding username"))
                },
            )
            .await
            .expect("Failed to fetch supervisors");
        assert!(!usernames.is_empty());
        let mut sorted = usernames.clone();
        sorted.sort();
        assert_eq!(usernames, sorted);
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let db = setup_test().await;
        let before: i64 = db
            .execute_scalar("SELECT COUNT(*) FROM audit_log", &[])
            .await
            .unwrap();

        {
            let mut tx = db.begin().await.unwrap();
            sqlx::query(
                "INSERT INTO audit_log (table_name, record_id, action, created_at) \
                 VALUES ('atms', 1, 'Insert', '2025-01-01T00:00:00Z')",
            )
            .execute(&mut *tx)
            .await
            .unwrap();
            // dropped without commit
        }

        let after: i64 = db
            .execute_scalar("SELECT COUNT(*) FROM audit_log", &[])
            .await
            .unwrap();
        assert_eq!(before, after);
    }
}
