//! Supervisor/user accounts: CRUD, credential validation, and the
//! deletion guard against accounts that still own active ATMs.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row as _, SqliteConnection};
use tracing::info;

use crate::config::{PASSWORD_MIN_LENGTH, USERNAME_MAX_LENGTH};
use crate::domain::models::{Supervisor, UserRole};
use crate::domain::password;
use crate::error::{DataError, Result};
use crate::storage::connection::DbConnection;
use crate::storage::query::{QueryBuilder, Row};
use crate::storage::traits::Repository;

const TABLE: &str = "supervisors";

#[derive(Clone)]
pub struct SupervisorRepository {
    db: DbConnection,
}

impl SupervisorRepository {
    pub fn new(db: DbConnection) -> Self {
        Self { db }
    }

    /// Create an account with a freshly hashed password, refusing
    /// usernames that already exist in any letter case.
    pub async fn create(&self, supervisor: &Supervisor, plain_password: &str) -> Result<i64> {
        validate_supervisor(supervisor)?;
        if plain_password.len() < PASSWORD_MIN_LENGTH {
            return Err(DataError::validation(format!(
                "Password must be at least {PASSWORD_MIN_LENGTH} characters"
            )));
        }

        let username = supervisor.username.trim();
        let password_hash = password::hash(plain_password)?;

        let mut tx = self.db.begin().await?;

        if username_taken(&mut tx, username, None).await? {
            return Err(DataError::invalid_operation(format!(
                "A user named '{username}' already exists"
            )));
        }

        let result = sqlx::query(
            "INSERT INTO supervisors \
             (username, password_hash, display_name, email, department, branch_code, \
              branch_name, role, is_active, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(username)
        .bind(&password_hash)
        .bind(supervisor.display_name.trim())
        .bind(supervisor.email.as_deref())
        .bind(supervisor.department.as_deref())
        .bind(supervisor.branch_code.as_deref())
        .bind(supervisor.branch_name.as_deref())
        .bind(supervisor.role.as_str())
        .bind(supervisor.is_active)
        .bind(&supervisor.created_at)
        .execute(&mut *tx)
        .await
        .map_err(DataError::db(format!("inserting supervisor '{username}'")))?;

        tx.commit()
            .await
            .map_err(DataError::db("committing supervisor insert"))?;

        info!("Created supervisor {}", username);
        Ok(result.last_insert_rowid())
    }

    /// Update the mutable profile fields of an existing account. The
    /// username and password are not touched here.
    pub async fn update(&self, supervisor: &Supervisor) -> Result<bool> {
        validate_supervisor(supervisor)?;

        let (sql, params) = QueryBuilder::new(TABLE)
            .update(vec![
                ("display_name", supervisor.display_name.trim().into()),
                ("email", supervisor.email.clone().into()),
                ("department", supervisor.department.clone().into()),
                ("branch_code", supervisor.branch_code.clone().into()),
                ("branch_name", supervisor.branch_name.clone().into()),
                ("role", supervisor.role.as_str().into()),
                ("is_active", supervisor.is_active.into()),
            ])
            .where_("id", "=", supervisor.id)
            .build()?;

        let affected = self.db.execute(&sql, &params).await?;
        Ok(affected > 0)
    }

    pub async fn get_by_username(&self, username: &str) -> Result<Option<Supervisor>> {
        let (sql, params) = QueryBuilder::new(TABLE)
            .select(&[])
            .where_("username", "=", username.trim())
            .build()?;
        self.db.fetch_optional(&sql, &params, map_supervisor).await
    }

    /// Check a password against the stored hash; `None` for unknown,
    /// inactive, or mismatching credentials.
    pub async fn validate_credentials(
        &self,
        username: &str,
        plain_password: &str,
    ) -> Result<Option<Supervisor>> {
        let supervisor = match self.get_by_username(username).await? {
            Some(s) if s.is_active => s,
            _ => return Ok(None),
        };

        let stored_hash: String = self
            .db
            .execute_scalar(
                "SELECT password_hash FROM supervisors WHERE username = ?",
                &[username.trim().into()],
            )
            .await?;

        if password::verify(plain_password, &stored_hash) {
            Ok(Some(supervisor))
        } else {
            Ok(None)
        }
    }

    /// Change an account's password, re-hashing with a fresh salt.
    pub async fn update_password(&self, username: &str, new_password: &str) -> Result<bool> {
        if new_password.len() < PASSWORD_MIN_LENGTH {
            return Err(DataError::validation(format!(
                "Password must be at least {PASSWORD_MIN_LENGTH} characters"
            )));
        }
        let hash = password::hash(new_password)?;
        let affected = self
            .db
            .execute(
                "UPDATE supervisors SET password_hash = ? WHERE username = ?",
                &[hash.into(), username.trim().into()],
            )
            .await?;
        Ok(affected > 0)
    }

    /// Stamp the last successful login.
    pub async fn update_last_login(&self, username: &str) -> Result<bool> {
        let affected = self
            .db
            .execute(
                "UPDATE supervisors SET last_login = ? WHERE username = ?",
                &[Utc::now().to_rfc3339().into(), username.trim().into()],
            )
            .await?;
        Ok(affected > 0)
    }

    /// Soft delete: the account stays for referential integrity but can no
    /// longer log in or own new ATMs.
    pub async fn deactivate(&self, id: i64) -> Result<bool> {
        let affected = self
            .db
            .execute(
                "UPDATE supervisors SET is_active = 0 WHERE id = ?",
                &[id.into()],
            )
            .await?;
        Ok(affected > 0)
    }
}

#[async_trait]
impl Repository<Supervisor> for SupervisorRepository {
    async fn get_by_id(&self, id: i64) -> Result<Option<Supervisor>> {
        let (sql, params) = QueryBuilder::new(TABLE)
            .select(&[])
            .where_("id", "=", id)
            .build()?;
        self.db.fetch_optional(&sql, &params, map_supervisor).await
    }

    async fn get_all(&self) -> Result<Vec<Supervisor>> {
        let (sql, params) = QueryBuilder::new(TABLE)
            .select(&[])
            .order_by("username", false)
            .build()?;
        self.db.fetch_all(&sql, &params, map_supervisor).await
    }

    async fn get_paged(&self, offset: i64, limit: i64) -> Result<Vec<Supervisor>> {
        if offset < 0 {
            return Err(DataError::validation("Offset must be non-negative"));
        }
        if limit <= 0 {
            return Err(DataError::validation("Limit must be positive"));
        }
        let (sql, params) = QueryBuilder::new(TABLE)
            .select(&[])
            .order_by("username", false)
            .limit(limit)
            .offset(offset)
            .build()?;
        self.db.fetch_all(&sql, &params, map_supervisor).await
    }

    async fn get_count(&self) -> Result<i64> {
        self.db
            .execute_scalar("SELECT COUNT(*) FROM supervisors", &[])
            .await
    }

    async fn exists(&self, id: i64) -> Result<bool> {
        let count: i64 = self
            .db
            .execute_scalar(
                "SELECT COUNT(*) FROM supervisors WHERE id = ?",
                &[id.into()],
            )
            .await?;
        Ok(count > 0)
    }

    /// Hard delete, refused while the account still owns active ATMs.
    async fn delete(&self, id: i64) -> Result<bool> {
        let mut tx = self.db.begin().await?;

        let username: Option<String> = {
            let row = sqlx::query("SELECT username FROM supervisors WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(DataError::db(format!("loading supervisor {id}")))?;
            match row {
                Some(row) => Some(
                    row.try_get("username")
                        .map_err(DataError::db("decoding username"))?,
                ),
                None => None,
            }
        };
        let Some(username) = username else {
            return Ok(false);
        };

        let active_atms: i64 = sqlx::query(
            "SELECT COUNT(*) FROM atms WHERE supervisor_username = ? AND is_active = 1",
        )
        .bind(&username)
        .fetch_one(&mut *tx)
        .await
        .map_err(DataError::db("counting assigned ATMs"))?
        .try_get(0)
        .map_err(DataError::db("decoding ATM count"))?;

        if active_atms > 0 {
            return Err(DataError::invalid_operation(format!(
                "Cannot delete supervisor '{username}': {active_atms} active ATM(s) are still assigned"
            )));
        }

        let affected = sqlx::query("DELETE FROM supervisors WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(DataError::db(format!("deleting supervisor {id}")))?
            .rows_affected();

        tx.commit()
            .await
            .map_err(DataError::db("committing supervisor delete"))?;
        Ok(affected > 0)
    }
}

/// Case-insensitive username collision check; the column collates NOCASE so
/// plain equality covers every letter case.
async fn username_taken(
    conn: &mut SqliteConnection,
    username: &str,
    exclude_id: Option<i64>,
) -> Result<bool> {
    let count: i64 = match exclude_id {
        Some(id) => sqlx::query("SELECT COUNT(*) FROM supervisors WHERE username = ? AND id != ?")
            .bind(username)
            .bind(id)
            .fetch_one(&mut *conn)
            .await,
        None => sqlx::query("SELECT COUNT(*) FROM supervisors WHERE username = ?")
            .bind(username)
            .fetch_one(&mut *conn)
            .await,
    }
    .map_err(DataError::db("checking username uniqueness"))?
    .try_get(0)
    .map_err(DataError::db("decoding username count"))?;
    Ok(count > 0)
}

fn validate_supervisor(supervisor: &Supervisor) -> Result<()> {
    let username = supervisor.username.trim();
    if username.is_empty() {
        return Err(DataError::validation("Username is required"));
    }
    if username.len() > USERNAME_MAX_LENGTH {
        return Err(DataError::validation(format!(
            "Username cannot exceed {USERNAME_MAX_LENGTH} characters"
        )));
    }
    if supervisor.display_name.trim().is_empty() {
        return Err(DataError::validation("Display name is required"));
    }
    Ok(())
}

pub(crate) fn map_supervisor(row: &Row) -> Result<Supervisor> {
    let role_text: String = row.try_get("role").map_err(DataError::db("decoding role"))?;
    let role = UserRole::parse(&role_text).ok_or_else(|| {
        super::corrupt_row("mapping supervisor row", format!("unknown role '{role_text}'"))
    })?;

    Ok(Supervisor {
        id: row.try_get("id").map_err(DataError::db("decoding id"))?,
        username: row
            .try_get("username")
            .map_err(DataError::db("decoding username"))?,
        display_name: row
            .try_get("display_name")
            .map_err(DataError::db("decoding display_name"))?,
        email: row
            .try_get("email")
            .map_err(DataError::db("decoding email"))?,
        department: row
            .try_get("department")
            .map_err(DataError::db("decoding department"))?,
        branch_code: row
            .try_get("branch_code")
            .map_err(DataError::db("decoding branch_code"))?,
        branch_name: row
            .try_get("branch_name")
            .map_err(DataError::db("decoding branch_name"))?,
        role,
        is_active: row
            .try_get("is_active")
            .map_err(DataError::db("decoding is_active"))?,
        created_at: row
            .try_get("created_at")
            .map_err(DataError::db("decoding created_at"))?,
        last_login: row
            .try_get("last_login")
            .map_err(DataError::db("decoding last_login"))?,
    })
}
