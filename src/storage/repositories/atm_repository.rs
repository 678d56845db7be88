//! ATM registry: lookups by number, supervisor, and branch, plus the
//! referential checks that keep every ATM tied to an active supervisor.

use async_trait::async_trait;
use sqlx::{Row as _, SqliteConnection};
use tracing::info;

use crate::domain::models::{Atm, AtmType};
use crate::error::{DataError, Result};
use crate::storage::connection::DbConnection;
use crate::storage::query::{QueryBuilder, Row};
use crate::storage::traits::Repository;

const TABLE: &str = "atms";

#[derive(Clone)]
pub struct AtmRepository {
    db: DbConnection,
}

impl AtmRepository {
    pub fn new(db: DbConnection) -> Self {
        Self { db }
    }

    /// Register an ATM. The number must be unused and the owning
    /// supervisor must exist and be active.
    pub async fn create(&self, atm: &Atm) -> Result<i64> {
        validate_atm(atm)?;
        let atm_number = atm.atm_number.trim();
        let supervisor = atm.supervisor_username.trim();

        let mut tx = self.db.begin().await?;

        if atm_number_taken(&mut tx, atm_number, None).await? {
            return Err(DataError::invalid_operation(format!(
                "ATM '{atm_number}' already exists"
            )));
        }
        ensure_active_supervisor(&mut tx, supervisor).await?;

        let result = sqlx::query(
            "INSERT INTO atms \
             (atm_number, atm_type, gl_account, branch_code, branch_name, \
              cassette1_denomination, cassette2_denomination, cassette3_denomination, \
              cassette4_denomination, is_active, supervisor_username, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(atm_number)
        .bind(atm.atm_type.as_str())
        .bind(atm.gl_account.as_deref())
        .bind(atm.branch_code.trim())
        .bind(atm.branch_name.as_deref())
        .bind(atm.cassette1_denomination)
        .bind(atm.cassette2_denomination)
        .bind(atm.cassette3_denomination)
        .bind(atm.cassette4_denomination)
        .bind(atm.is_active)
        .bind(supervisor)
        .bind(&atm.created_at)
        .execute(&mut *tx)
        .await
        .map_err(DataError::db(format!("inserting ATM '{atm_number}'")))?;

        tx.commit()
            .await
            .map_err(DataError::db("committing ATM insert"))?;

        info!("Registered ATM {} at branch {}", atm_number, atm.branch_code);
        Ok(result.last_insert_rowid())
    }

    /// Update an ATM. Renumbering checks uniqueness against every other
    /// row; reassignment checks the new supervisor is active.
    pub async fn update(&self, atm: &Atm) -> Result<bool> {
        validate_atm(atm)?;
        let atm_number = atm.atm_number.trim();
        let supervisor = atm.supervisor_username.trim();

        let mut tx = self.db.begin().await?;

        if atm_number_taken(&mut tx, atm_number, Some(atm.id)).await? {
            return Err(DataError::invalid_operation(format!(
                "ATM '{atm_number}' already exists"
            )));
        }
        ensure_active_supervisor(&mut tx, supervisor).await?;

        let affected = sqlx::query(
            "UPDATE atms SET \
             atm_number = ?, atm_type = ?, gl_account = ?, branch_code = ?, branch_name = ?, \
             cassette1_denomination = ?, cassette2_denomination = ?, \
             cassette3_denomination = ?, cassette4_denomination = ?, \
             is_active = ?, supervisor_username = ? \
             WHERE id = ?",
        )
        .bind(atm_number)
        .bind(atm.atm_type.as_str())
        .bind(atm.gl_account.as_deref())
        .bind(atm.branch_code.trim())
        .bind(atm.branch_name.as_deref())
        .bind(atm.cassette1_denomination)
        .bind(atm.cassette2_denomination)
        .bind(atm.cassette3_denomination)
        .bind(atm.cassette4_denomination)
        .bind(atm.is_active)
        .bind(supervisor)
        .bind(atm.id)
        .execute(&mut *tx)
        .await
        .map_err(DataError::db(format!("updating ATM '{atm_number}'")))?
        .rows_affected();

        tx.commit()
            .await
            .map_err(DataError::db("committing ATM update"))?;
        Ok(affected > 0)
    }

    pub async fn get_by_atm_number(&self, atm_number: &str) -> Result<Option<Atm>> {
        let (sql, params) = QueryBuilder::new(TABLE)
            .select(&[])
            .where_("atm_number", "=", atm_number.trim())
            .build()?;
        self.db.fetch_optional(&sql, &params, map_atm).await
    }

    /// Active ATMs assigned to a supervisor.
    pub async fn get_by_username(&self, username: &str) -> Result<Vec<Atm>> {
        let (sql, params) = QueryBuilder::new(TABLE)
            .select(&[])
            .where_("supervisor_username", "=", username.trim())
            .and("is_active", "=", true)
            .order_by("atm_number", false)
            .build()?;
        self.db.fetch_all(&sql, &params, map_atm).await
    }

    /// Active ATMs at a branch.
    pub async fn get_by_branch(&self, branch_code: &str) -> Result<Vec<Atm>> {
        let (sql, params) = QueryBuilder::new(TABLE)
            .select(&[])
            .where_("branch_code", "=", branch_code.trim())
            .and("is_active", "=", true)
            .order_by("atm_number", false)
            .build()?;
        self.db.fetch_all(&sql, &params, map_atm).await
    }

    /// Soft delete: the ATM keeps its transaction history but drops out of
    /// the active registry.
    pub async fn deactivate(&self, id: i64) -> Result<bool> {
        let affected = self
            .db
            .execute("UPDATE atms SET is_active = 0 WHERE id = ?", &[id.into()])
            .await?;
        Ok(affected > 0)
    }
}

#[async_trait]
impl Repository<Atm> for AtmRepository {
    async fn get_by_id(&self, id: i64) -> Result<Option<Atm>> {
        let (sql, params) = QueryBuilder::new(TABLE)
            .select(&[])
            .where_("id", "=", id)
            .build()?;
        self.db.fetch_optional(&sql, &params, map_atm).await
    }

    async fn get_all(&self) -> Result<Vec<Atm>> {
        let (sql, params) = QueryBuilder::new(TABLE)
            .select(&[])
            .order_by("atm_number", false)
            .build()?;
        self.db.fetch_all(&sql, &params, map_atm).await
    }

    async fn get_paged(&self, offset: i64, limit: i64) -> Result<Vec<Atm>> {
        if offset < 0 {
            return Err(DataError::validation("Offset must be non-negative"));
        }
        if limit <= 0 {
            return Err(DataError::validation("Limit must be positive"));
        }
        let (sql, params) = QueryBuilder::new(TABLE)
            .select(&[])
            .order_by("atm_number", false)
            .limit(limit)
            .offset(offset)
            .build()?;
        self.db.fetch_all(&sql, &params, map_atm).await
    }

    async fn get_count(&self) -> Result<i64> {
        self.db.execute_scalar("SELECT COUNT(*) FROM atms", &[]).await
    }

    async fn exists(&self, id: i64) -> Result<bool> {
        let count: i64 = self
            .db
            .execute_scalar("SELECT COUNT(*) FROM atms WHERE id = ?", &[id.into()])
            .await?;
        Ok(count > 0)
    }

    /// Hard delete, refused while reconciliation history exists for the
    /// ATM. Use `deactivate` to retire an ATM with history.
    async fn delete(&self, id: i64) -> Result<bool> {
        let mut tx = self.db.begin().await?;

        let transactions: i64 =
            sqlx::query("SELECT COUNT(*) FROM atm_transactions WHERE atm_id = ?")
                .bind(id)
                .fetch_one(&mut *tx)
                .await
                .map_err(DataError::db("counting ATM transactions"))?
                .try_get(0)
                .map_err(DataError::db("decoding transaction count"))?;

        if transactions > 0 {
            return Err(DataError::invalid_operation(format!(
                "Cannot delete ATM {id}: {transactions} transaction(s) reference it"
            )));
        }

        let affected = sqlx::query("DELETE FROM atms WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(DataError::db(format!("deleting ATM {id}")))?
            .rows_affected();

        tx.commit()
            .await
            .map_err(DataError::db("committing ATM delete"))?;
        Ok(affected > 0)
    }
}

async fn atm_number_taken(
    conn: &mut SqliteConnection,
    atm_number: &str,
    exclude_id: Option<i64>,
) -> Result<bool> {
    let count: i64 = match exclude_id {
        Some(id) => sqlx::query("SELECT COUNT(*) FROM atms WHERE atm_number = ? AND id != ?")
            .bind(atm_number)
            .bind(id)
            .fetch_one(&mut *conn)
            .await,
        None => sqlx::query("SELECT COUNT(*) FROM atms WHERE atm_number = ?")
            .bind(atm_number)
            .fetch_one(&mut *conn)
            .await,
    }
    .map_err(DataError::db("checking ATM number uniqueness"))?
    .try_get(0)
    .map_err(DataError::db("decoding ATM count"))?;
    Ok(count > 0)
}

async fn ensure_active_supervisor(conn: &mut SqliteConnection, username: &str) -> Result<()> {
    let count: i64 =
        sqlx::query("SELECT COUNT(*) FROM supervisors WHERE username = ? AND is_active = 1")
            .bind(username)
            .fetch_one(&mut *conn)
            .await
            .map_err(DataError::db("checking supervisor"))?
            .try_get(0)
            .map_err(DataError::db("decoding supervisor count"))?;
    if count == 0 {
        return Err(DataError::invalid_operation(format!(
            "Supervisor '{username}' does not exist or is inactive"
        )));
    }
    Ok(())
}

fn validate_atm(atm: &Atm) -> Result<()> {
    if atm.atm_number.trim().is_empty() {
        return Err(DataError::validation("ATM number is required"));
    }
    if atm.branch_code.trim().is_empty() {
        return Err(DataError::validation("Branch code is required"));
    }
    if atm.supervisor_username.trim().is_empty() {
        return Err(DataError::validation("Supervisor username is required"));
    }
    if atm.cassette_denominations().iter().any(|d| *d < 0) {
        return Err(DataError::validation(
            "Cassette denominations cannot be negative",
        ));
    }
    Ok(())
}

pub(crate) fn map_atm(row: &Row) -> Result<Atm> {
    let type_text: String = row
        .try_get("atm_type")
        .map_err(DataError::db("decoding atm_type"))?;
    let atm_type = AtmType::parse(&type_text).ok_or_else(|| {
        super::corrupt_row("mapping ATM row", format!("unknown ATM type '{type_text}'"))
    })?;

    Ok(Atm {
        id: row.try_get("id").map_err(DataError::db("decoding id"))?,
        atm_number: row
            .try_get("atm_number")
            .map_err(DataError::db("decoding atm_number"))?,
        atm_type,
        gl_account: row
            .try_get("gl_account")
            .map_err(DataError::db("decoding gl_account"))?,
        branch_code: row
            .try_get("branch_code")
            .map_err(DataError::db("decoding branch_code"))?,
        branch_name: row
            .try_get("branch_name")
            .map_err(DataError::db("decoding branch_name"))?,
        cassette1_denomination: row
            .try_get("cassette1_denomination")
            .map_err(DataError::db("decoding cassette1_denomination"))?,
        cassette2_denomination: row
            .try_get("cassette2_denomination")
            .map_err(DataError::db("decoding cassette2_denomination"))?,
        cassette3_denomination: row
            .try_get("cassette3_denomination")
            .map_err(DataError::db("decoding cassette3_denomination"))?,
        cassette4_denomination: row
            .try_get("cassette4_denomination")
            .map_err(DataError::db("decoding cassette4_denomination"))?,
        is_active: row
            .try_get("is_active")
            .map_err(DataError::db("decoding is_active"))?,
        supervisor_username: row
            .try_get("supervisor_username")
            .map_err(DataError::db("decoding supervisor_username"))?,
        created_at: row
            .try_get("created_at")
            .map_err(DataError::db("decoding created_at"))?,
    })
}
