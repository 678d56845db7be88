use serde::{Deserialize, Serialize};

/// Kind of change an audit row records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    Insert,
    Update,
    Delete,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Insert => "Insert",
            AuditAction::Update => "Update",
            AuditAction::Delete => "Delete",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Insert" => Some(AuditAction::Insert),
            "Update" => Some(AuditAction::Update),
            "Delete" => Some(AuditAction::Delete),
            _ => None,
        }
    }
}

/// One row of the audit trail. Before/after images are JSON blobs of the
/// affected entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub table_name: String,
    pub record_id: i64,
    pub action: AuditAction,
    pub old_values: Option<String>,
    pub new_values: Option<String>,
    /// Acting supervisor id, when known.
    pub user_id: Option<i64>,
    /// RFC 3339 timestamp.
    pub created_at: String,
}

impl AuditEntry {
    pub fn new(table_name: impl Into<String>, record_id: i64, action: AuditAction) -> Self {
        Self {
            id: 0,
            table_name: table_name.into(),
            record_id,
            action,
            old_values: None,
            new_values: None,
            user_id: None,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}
