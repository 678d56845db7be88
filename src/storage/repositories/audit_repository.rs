//! Append-only audit trail of entity changes.

use chrono::Utc;
use serde::Serialize;

use crate::domain::models::{AuditAction, AuditEntry};
use crate::error::{DataError, Result};
use crate::storage::connection::DbConnection;
use crate::storage::query::{bind_values, QueryBuilder, Row};

const TABLE: &str = "audit_log";

#[derive(Clone)]
pub struct AuditRepository {
    db: DbConnection,
}

impl AuditRepository {
    pub fn new(db: DbConnection) -> Self {
        Self { db }
    }

    /// Append an entry. The trail never updates or deletes rows.
    pub async fn record(&self, entry: &AuditEntry) -> Result<i64> {
        if entry.table_name.trim().is_empty() {
            return Err(DataError::validation("Table name is required"));
        }

        let (sql, params) = QueryBuilder::new(TABLE)
            .insert(vec![
                ("table_name", entry.table_name.trim().into()),
                ("record_id", entry.record_id.into()),
                ("action", entry.action.as_str().into()),
                ("old_values", entry.old_values.clone().into()),
                ("new_values", entry.new_values.clone().into()),
                ("user_id", entry.user_id.into()),
                ("created_at", entry.created_at.clone().into()),
            ])
            .build()?;
        let result = bind_values(sqlx::query(&sql), &params)
            .execute(self.db.pool())
            .await
            .map_err(DataError::db("inserting audit entry"))?;
        Ok(result.last_insert_rowid())
    }

    /// Serialize before/after images and append in one step.
    pub async fn record_change<T: Serialize>(
        &self,
        table_name: &str,
        record_id: i64,
        action: AuditAction,
        old: Option<&T>,
        new: Option<&T>,
        user_id: Option<i64>,
    ) -> Result<i64> {
        let mut entry = AuditEntry::new(table_name, record_id, action);
        entry.old_values = old
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| DataError::validation(format!("serializing old values: {e}")))?;
        entry.new_values = new
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| DataError::validation(format!("serializing new values: {e}")))?;
        entry.user_id = user_id;
        entry.created_at = Utc::now().to_rfc3339();
        self.record(&entry).await
    }

    /// Full history of one record, oldest first.
    pub async fn get_by_record(&self, table_name: &str, record_id: i64) -> Result<Vec<AuditEntry>> {
        let (sql, params) = QueryBuilder::new(TABLE)
            .select(&[])
            .where_("table_name", "=", table_name)
            .and("record_id", "=", record_id)
            .order_by("id", false)
            .build()?;
        self.db.fetch_all(&sql, &params, map_entry).await
    }

    /// Latest entries across all tables, newest first.
    pub async fn get_recent(&self, count: i64) -> Result<Vec<AuditEntry>> {
        if count <= 0 {
            return Err(DataError::validation("Count must be positive"));
        }
        let (sql, params) = QueryBuilder::new(TABLE)
            .select(&[])
            .order_by("id", true)
            .limit(count)
            .build()?;
        self.db.fetch_all(&sql, &params, map_entry).await
    }

    pub async fn get_count(&self) -> Result<i64> {
        self.db
            .execute_scalar("SELECT COUNT(*) FROM audit_log", &[])
            .await
    }
}

fn map_entry(row: &Row) -> Result<AuditEntry> {
    use sqlx::Row as _;

    let action_text: String = row
        .try_get("action")
        .map_err(DataError::db("decoding action"))?;
    let action = AuditAction::parse(&action_text).ok_or_else(|| {
        super::corrupt_row("mapping audit row", format!("unknown action '{action_text}'"))
    })?;

    Ok(AuditEntry {
        id: row.try_get("id").map_err(DataError::db("decoding id"))?,
        table_name: row
            .try_get("table_name")
            .map_err(DataError::db("decoding table_name"))?,
        record_id: row
            .try_get("record_id")
            .map_err(DataError::db("decoding record_id"))?,
        action,
        old_values: row
            .try_get("old_values")
            .map_err(DataError::db("decoding old_values"))?,
        new_values: row
            .try_get("new_values")
            .map_err(DataError::db("decoding new_values"))?,
        user_id: row
            .try_get("user_id")
            .map_err(DataError::db("decoding user_id"))?,
        created_at: row
            .try_get("created_at")
            .map_err(DataError::db("decoding created_at"))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Atm, AtmType};

    async fn setup() -> AuditRepository {
        let db = DbConnection::init_test()
            .await
            .expect("Failed to create test database");
        AuditRepository::new(db)
    }

    #[tokio::test]
    async fn record_then_read_back_round_trips() {
        let repo = setup().await;

        let mut entry = AuditEntry::new("atms", 1, AuditAction::Update);
        entry.old_values = Some(r#"{"is_active":true}"#.into());
        entry.new_values = Some(r#"{"is_active":false}"#.into());
        entry.user_id = Some(2);
        let id = repo.record(&entry).await.unwrap();
        assert!(id > 0);

        let history = repo.get_by_record("atms", 1).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].action, AuditAction::Update);
        assert_eq!(history[0].old_values, entry.old_values);
        assert_eq!(history[0].user_id, Some(2));
    }

    #[tokio::test]
    async fn record_change_serializes_entity_images() {
        let repo = setup().await;

        let old = Atm::new("ATM-5001", AtmType::Ncr, "707", "supervisor1");
        let mut new = old.clone();
        new.is_active = false;
        repo.record_change("atms", 42, AuditAction::Update, Some(&old), Some(&new), None)
            .await
            .unwrap();

        let history = repo.get_by_record("atms", 42).await.unwrap();
        assert_eq!(history.len(), 1);

        let old_json: serde_json::Value =
            serde_json::from_str(history[0].old_values.as_ref().unwrap()).unwrap();
        assert_eq!(old_json["atm_number"], "ATM-5001");
        let new_json: serde_json::Value =
            serde_json::from_str(history[0].new_values.as_ref().unwrap()).unwrap();
        assert_eq!(new_json["is_active"], false);
    }

    #[tokio::test]
    async fn history_is_oldest_first_and_scoped_to_the_record() {
        let repo = setup().await;

        repo.record(&AuditEntry::new("atms", 7, AuditAction::Insert))
            .await
            .unwrap();
        repo.record(&AuditEntry::new("atms", 7, AuditAction::Update))
            .await
            .unwrap();
        repo.record(&AuditEntry::new("supervisors", 7, AuditAction::Delete))
            .await
            .unwrap();

        let history = repo.get_by_record("atms", 7).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].action, AuditAction::Insert);
        assert_eq!(history[1].action, AuditAction::Update);
    }

    #[tokio::test]
    async fn recent_returns_newest_first() {
        let repo = setup().await;

        for record_id in 1..=3 {
            repo.record(&AuditEntry::new("atm_transactions", record_id, AuditAction::Insert))
                .await
                .unwrap();
        }

        let recent = repo.get_recent(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].record_id, 3);
        assert_eq!(recent[1].record_id, 2);
        assert!(repo.get_recent(0).await.is_err());
    }

    #[tokio::test]
    async fn blank_table_name_is_rejected() {
        let repo = setup().await;
        let entry = AuditEntry::new("  ", 1, AuditAction::Insert);
        assert!(repo.record(&entry).await.unwrap_err().is_validation());
    }
}
