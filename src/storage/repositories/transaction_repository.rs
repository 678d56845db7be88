//! Reconciliation records: one row per ATM per calendar date.
//!
//! Writes recompute the stored variance and status from the cash fields, so
//! the persisted classification can never disagree with the arithmetic.
//! Manual overrides go through `update_reconciliation_status`.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::{Row as _, SqliteConnection};
use tracing::info;

use crate::config::NOTES_MAX_LENGTH;
use crate::domain::models::{AtmTransaction, ReconciliationStatus};
use crate::error::{DataError, Result};
use crate::storage::connection::DbConnection;
use crate::storage::query::{QueryBuilder, Row};
use crate::storage::traits::Repository;

const TABLE: &str = "atm_transactions";
const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Clone)]
pub struct TransactionRepository {
    db: DbConnection,
}

impl TransactionRepository {
    pub fn new(db: DbConnection) -> Self {
        Self { db }
    }

    /// Record a day's cash movements. The ATM must exist and be active, and
    /// no other record may exist for the same ATM and date. Variance and
    /// status are computed here, not taken from the caller.
    pub async fn create(&self, transaction: &AtmTransaction) -> Result<i64> {
        validate_transaction(transaction)?;
        let day = format_date(transaction.transaction_date);
        let (variance, status) = classify(transaction);

        let mut tx = self.db.begin().await?;

        ensure_active_atm(&mut tx, transaction.atm_id).await?;
        if date_taken(&mut tx, transaction.atm_id, &day, None).await? {
            return Err(DataError::invalid_operation(format!(
                "A transaction for ATM {} on {} already exists",
                transaction.atm_id, day
            )));
        }

        let result = sqlx::query(
            "INSERT INTO atm_transactions \
             (atm_id, transaction_date, beginning_cash, added_cash, recycled_cash, \
              ending_cash, deposited_cash, gl_balance, is_reconciled, \
              reconciliation_status, variance, notes, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(transaction.atm_id)
        .bind(&day)
        .bind(transaction.beginning_cash)
        .bind(transaction.added_cash)
        .bind(transaction.recycled_cash)
        .bind(transaction.ending_cash)
        .bind(transaction.deposited_cash)
        .bind(transaction.gl_balance)
        .bind(status != ReconciliationStatus::Pending)
        .bind(status.as_str())
        .bind(variance)
        .bind(transaction.notes.as_deref())
        .bind(&transaction.created_at)
        .execute(&mut *tx)
        .await
        .map_err(DataError::db("inserting transaction"))?;

        tx.commit()
            .await
            .map_err(DataError::db("committing transaction insert"))?;

        info!(
            "Recorded transaction for ATM {} on {} ({})",
            transaction.atm_id,
            day,
            status.as_str()
        );
        Ok(result.last_insert_rowid())
    }

    /// Rewrite a record's cash fields, reclassifying from the new values.
    /// Moving to another date checks uniqueness against every other row.
    pub async fn update(&self, transaction: &AtmTransaction) -> Result<bool> {
        validate_transaction(transaction)?;
        let day = format_date(transaction.transaction_date);
        let (variance, status) = classify(transaction);

        let mut tx = self.db.begin().await?;

        ensure_active_atm(&mut tx, transaction.atm_id).await?;
        if date_taken(&mut tx, transaction.atm_id, &day, Some(transaction.id)).await? {
            return Err(DataError::invalid_operation(format!(
                "A transaction for ATM {} on {} already exists",
                transaction.atm_id, day
            )));
        }

        let affected = sqlx::query(
            "UPDATE atm_transactions SET \
             atm_id = ?, transaction_date = ?, beginning_cash = ?, added_cash = ?, \
             recycled_cash = ?, ending_cash = ?, deposited_cash = ?, gl_balance = ?, \
             is_reconciled = ?, reconciliation_status = ?, variance = ?, notes = ? \
             WHERE id = ?",
        )
        .bind(transaction.atm_id)
        .bind(&day)
        .bind(transaction.beginning_cash)
        .bind(transaction.added_cash)
        .bind(transaction.recycled_cash)
        .bind(transaction.ending_cash)
        .bind(transaction.deposited_cash)
        .bind(transaction.gl_balance)
        .bind(status != ReconciliationStatus::Pending)
        .bind(status.as_str())
        .bind(variance)
        .bind(transaction.notes.as_deref())
        .bind(transaction.id)
        .execute(&mut *tx)
        .await
        .map_err(DataError::db("updating transaction"))?
        .rows_affected();

        tx.commit()
            .await
            .map_err(DataError::db("committing transaction update"))?;
        Ok(affected > 0)
    }

    pub async fn get_by_atm_id(&self, atm_id: i64) -> Result<Vec<AtmTransaction>> {
        let (sql, params) = QueryBuilder::new(TABLE)
            .select(&[])
            .where_("atm_id", "=", atm_id)
            .order_by("transaction_date", true)
            .build()?;
        self.db.fetch_all(&sql, &params, map_transaction).await
    }

    pub async fn get_by_atm_and_date(
        &self,
        atm_id: i64,
        date: NaiveDate,
    ) -> Result<Option<AtmTransaction>> {
        let (sql, params) = QueryBuilder::new(TABLE)
            .select(&[])
            .where_("atm_id", "=", atm_id)
            .and("transaction_date", "=", format_date(date))
            .build()?;
        self.db.fetch_optional(&sql, &params, map_transaction).await
    }

    /// All records between two dates, both ends inclusive.
    pub async fn get_by_date_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<AtmTransaction>> {
        let (sql, params) = QueryBuilder::new(TABLE)
            .select(&[])
            .where_("transaction_date", ">=", format_date(from))
            .and("transaction_date", "<=", format_date(to))
            .order_by("transaction_date", false)
            .order_by("atm_id", false)
            .build()?;
        self.db.fetch_all(&sql, &params, map_transaction).await
    }

    pub async fn get_by_atm_and_date_range(
        &self,
        atm_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<AtmTransaction>> {
        let (sql, params) = QueryBuilder::new(TABLE)
            .select(&[])
            .where_("atm_id", "=", atm_id)
            .and("transaction_date", ">=", format_date(from))
            .and("transaction_date", "<=", format_date(to))
            .order_by("transaction_date", false)
            .build()?;
        self.db.fetch_all(&sql, &params, map_transaction).await
    }

    pub async fn get_by_status(
        &self,
        status: ReconciliationStatus,
    ) -> Result<Vec<AtmTransaction>> {
        let (sql, params) = QueryBuilder::new(TABLE)
            .select(&[])
            .where_("reconciliation_status", "=", status.as_str())
            .order_by("transaction_date", true)
            .build()?;
        self.db.fetch_all(&sql, &params, map_transaction).await
    }

    pub async fn get_unreconciled(&self) -> Result<Vec<AtmTransaction>> {
        let (sql, params) = QueryBuilder::new(TABLE)
            .select(&[])
            .where_("is_reconciled", "=", false)
            .order_by("transaction_date", false)
            .build()?;
        self.db.fetch_all(&sql, &params, map_transaction).await
    }

    /// Most recently recorded transactions, newest first.
    pub async fn get_recent(&self, count: i64) -> Result<Vec<AtmTransaction>> {
        if count <= 0 {
            return Err(DataError::validation("Count must be positive"));
        }
        let (sql, params) = QueryBuilder::new(TABLE)
            .select(&[])
            .order_by("created_at", true)
            .order_by("id", true)
            .limit(count)
            .build()?;
        self.db.fetch_all(&sql, &params, map_transaction).await
    }

    /// Records whose absolute variance meets a threshold, largest first.
    pub async fn get_with_min_variance(&self, min_variance: f64) -> Result<Vec<AtmTransaction>> {
        if min_variance < 0.0 {
            return Err(DataError::validation("Variance threshold cannot be negative"));
        }
        let (sql, params) = QueryBuilder::new(TABLE)
            .select(&[])
            .where_("ABS(variance)", ">=", min_variance)
            .order_by("ABS(variance)", true)
            .build()?;
        self.db.fetch_all(&sql, &params, map_transaction).await
    }

    /// Sum of stored variances for an ATM, optionally bounded by dates.
    /// Zero when no rows match.
    pub async fn total_variance_by_atm(
        &self,
        atm_id: i64,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<f64> {
        let mut builder = QueryBuilder::new(TABLE)
            .select(&["COALESCE(SUM(variance), 0.0)"])
            .where_("atm_id", "=", atm_id);
        if let Some(from) = from {
            builder = builder.and("transaction_date", ">=", format_date(from));
        }
        if let Some(to) = to {
            builder = builder.and("transaction_date", "<=", format_date(to));
        }
        let (sql, params) = builder.build()?;
        self.db.execute_scalar(&sql, &params).await
    }

    pub async fn count_by_status(&self, status: ReconciliationStatus) -> Result<i64> {
        self.db
            .execute_scalar(
                "SELECT COUNT(*) FROM atm_transactions WHERE reconciliation_status = ?",
                &[status.as_str().into()],
            )
            .await
    }

    /// Whether a record exists for the ATM and date, optionally ignoring
    /// one row (the record being edited).
    pub async fn has_transaction_for_date(
        &self,
        atm_id: i64,
        date: NaiveDate,
        exclude_id: Option<i64>,
    ) -> Result<bool> {
        let mut builder = QueryBuilder::new(TABLE)
            .select(&["COUNT(*)"])
            .where_("atm_id", "=", atm_id)
            .and("transaction_date", "=", format_date(date));
        if let Some(id) = exclude_id {
            builder = builder.and("id", "!=", id);
        }
        let (sql, params) = builder.build()?;
        let count: i64 = self.db.execute_scalar(&sql, &params).await?;
        Ok(count > 0)
    }

    /// Manual status override. Any non-pending status marks the record
    /// reconciled; moving back to pending reopens it.
    pub async fn update_reconciliation_status(
        &self,
        id: i64,
        status: ReconciliationStatus,
    ) -> Result<bool> {
        let affected = self
            .db
            .execute(
                "UPDATE atm_transactions SET reconciliation_status = ?, is_reconciled = ? \
                 WHERE id = ?",
                &[
                    status.as_str().into(),
                    (status != ReconciliationStatus::Pending).into(),
                    id.into(),
                ],
            )
            .await?;
        Ok(affected > 0)
    }
}

#[async_trait]
impl Repository<AtmTransaction> for TransactionRepository {
    async fn get_by_id(&self, id: i64) -> Result<Option<AtmTransaction>> {
        let (sql, params) = QueryBuilder::new(TABLE)
            .select(&[])
            .where_("id", "=", id)
            .build()?;
        self.db.fetch_optional(&sql, &params, map_transaction).await
    }

    async fn get_all(&self) -> Result<Vec<AtmTransaction>> {
        let (sql, params) = QueryBuilder::new(TABLE)
            .select(&[])
            .order_by("transaction_date", true)
            .order_by("atm_id", false)
            .build()?;
        self.db.fetch_all(&sql, &params, map_transaction).await
    }

    async fn get_paged(&self, offset: i64, limit: i64) -> Result<Vec<AtmTransaction>> {
        if offset < 0 {
            return Err(DataError::validation("Offset must be non-negative"));
        }
        if limit <= 0 {
            return Err(DataError::validation("Limit must be positive"));
        }
        let (sql, params) = QueryBuilder::new(TABLE)
            .select(&[])
            .order_by("transaction_date", true)
            .order_by("atm_id", false)
            .limit(limit)
            .offset(offset)
            .build()?;
        self.db.fetch_all(&sql, &params, map_transaction).await
    }

    async fn get_count(&self) -> Result<i64> {
        self.db
            .execute_scalar("SELECT COUNT(*) FROM atm_transactions", &[])
            .await
    }

    async fn exists(&self, id: i64) -> Result<bool> {
        let count: i64 = self
            .db
            .execute_scalar(
                "SELECT COUNT(*) FROM atm_transactions WHERE id = ?",
                &[id.into()],
            )
            .await?;
        Ok(count > 0)
    }

    /// Reconciled records are part of the audit trail and cannot be deleted.
    async fn delete(&self, id: i64) -> Result<bool> {
        let mut tx = self.db.begin().await?;

        let reconciled: Option<bool> =
            sqlx::query("SELECT is_reconciled FROM atm_transactions WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(DataError::db(format!("loading transaction {id}")))?
                .map(|row| row.try_get(0).map_err(DataError::db("decoding is_reconciled")))
                .transpose()?;

        match reconciled {
            None => return Ok(false),
            Some(true) => {
                return Err(DataError::invalid_operation(format!(
                    "Cannot delete transaction {id}: it has been reconciled"
                )))
            }
            Some(false) => {}
        }

        let affected = sqlx::query("DELETE FROM atm_transactions WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(DataError::db(format!("deleting transaction {id}")))?
            .rows_affected();

        tx.commit()
            .await
            .map_err(DataError::db("committing transaction delete"))?;
        Ok(affected > 0)
    }
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Stored variance and status implied by the cash fields.
fn classify(transaction: &AtmTransaction) -> (Option<f64>, ReconciliationStatus) {
    let variance = transaction
        .ending_cash
        .map(|_| transaction.calculated_variance());
    (variance, ReconciliationStatus::from_variance(variance))
}

async fn ensure_active_atm(conn: &mut SqliteConnection, atm_id: i64) -> Result<()> {
    let count: i64 = sqlx::query("SELECT COUNT(*) FROM atms WHERE id = ? AND is_active = 1")
        .bind(atm_id)
        .fetch_one(&mut *conn)
        .await
        .map_err(DataError::db("checking ATM"))?
        .try_get(0)
        .map_err(DataError::db("decoding ATM count"))?;
    if count == 0 {
        return Err(DataError::invalid_operation(format!(
            "ATM {atm_id} does not exist or is inactive"
        )));
    }
    Ok(())
}

async fn date_taken(
    conn: &mut SqliteConnection,
    atm_id: i64,
    day: &str,
    exclude_id: Option<i64>,
) -> Result<bool> {
    let count: i64 = match exclude_id {
        Some(id) => sqlx::query(
            "SELECT COUNT(*) FROM atm_transactions \
             WHERE atm_id = ? AND transaction_date = ? AND id != ?",
        )
        .bind(atm_id)
        .bind(day)
        .bind(id)
        .fetch_one(&mut *conn)
        .await,
        None => sqlx::query(
            "SELECT COUNT(*) FROM atm_transactions WHERE atm_id = ? AND transaction_date = ?",
        )
        .bind(atm_id)
        .bind(day)
        .fetch_one(&mut *conn)
        .await,
    }
    .map_err(DataError::db("checking transaction date uniqueness"))?
    .try_get(0)
    .map_err(DataError::db("decoding transaction count"))?;
    Ok(count > 0)
}

fn validate_transaction(transaction: &AtmTransaction) -> Result<()> {
    if transaction.atm_id <= 0 {
        return Err(DataError::validation("A valid ATM is required"));
    }
    if transaction.transaction_date > Utc::now().date_naive() {
        return Err(DataError::validation(
            "Transaction date cannot be in the future",
        ));
    }
    let cash_fields = [
        ("Beginning cash", transaction.beginning_cash),
        ("Added cash", transaction.added_cash),
        ("Recycled cash", transaction.recycled_cash),
        ("Ending cash", transaction.ending_cash),
        ("Deposited cash", transaction.deposited_cash),
    ];
    for (label, value) in cash_fields {
        if let Some(v) = value {
            if v < 0.0 {
                return Err(DataError::validation(format!("{label} cannot be negative")));
            }
        }
    }
    if let Some(notes) = &transaction.notes {
        if notes.len() > NOTES_MAX_LENGTH {
            return Err(DataError::validation(format!(
                "Notes cannot exceed {NOTES_MAX_LENGTH} characters"
            )));
        }
    }
    Ok(())
}

pub(crate) fn map_transaction(row: &Row) -> Result<AtmTransaction> {
    let date_text: String = row
        .try_get("transaction_date")
        .map_err(DataError::db("decoding transaction_date"))?;
    let transaction_date = NaiveDate::parse_from_str(&date_text, DATE_FORMAT).map_err(|_| {
        super::corrupt_row(
            "mapping transaction row",
            format!("malformed date '{date_text}'"),
        )
    })?;

    let status_text: String = row
        .try_get("reconciliation_status")
        .map_err(DataError::db("decoding reconciliation_status"))?;
    let status = ReconciliationStatus::parse(&status_text).ok_or_else(|| {
        super::corrupt_row(
            "mapping transaction row",
            format!("unknown status '{status_text}'"),
        )
    })?;

    Ok(AtmTransaction {
        id: row.try_get("id").map_err(DataError::db("decoding id"))?,
        atm_id: row
            .try_get("atm_id")
            .map_err(DataError::db("decoding atm_id"))?,
        transaction_date,
        beginning_cash: row
            .try_get("beginning_cash")
            .map_err(DataError::db("decoding beginning_cash"))?,
        added_cash: row
            .try_get("added_cash")
            .map_err(DataError::db("decoding added_cash"))?,
        recycled_cash: row
            .try_get("recycled_cash")
            .map_err(DataError::db("decoding recycled_cash"))?,
        ending_cash: row
            .try_get("ending_cash")
            .map_err(DataError::db("decoding ending_cash"))?,
        deposited_cash: row
            .try_get("deposited_cash")
            .map_err(DataError::db("decoding deposited_cash"))?,
        gl_balance: row
            .try_get("gl_balance")
            .map_err(DataError::db("decoding gl_balance"))?,
        is_reconciled: row
            .try_get("is_reconciled")
            .map_err(DataError::db("decoding is_reconciled"))?,
        status,
        variance: row
            .try_get("variance")
            .map_err(DataError::db("decoding variance"))?,
        notes: row
            .try_get("notes")
            .map_err(DataError::db("decoding notes"))?,
        created_at: row
            .try_get("created_at")
            .map_err(DataError::db("decoding created_at"))?,
    })
}
