use serde::{Deserialize, Serialize};

/// Access level of a user account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserRole {
    Administrator,
    Supervisor,
    Operator,
    ReadOnly,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Administrator => "Administrator",
            UserRole::Supervisor => "Supervisor",
            UserRole::Operator => "Operator",
            UserRole::ReadOnly => "ReadOnly",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Administrator" => Some(UserRole::Administrator),
            "Supervisor" => Some(UserRole::Supervisor),
            "Operator" => Some(UserRole::Operator),
            "ReadOnly" => Some(UserRole::ReadOnly),
            _ => None,
        }
    }
}

/// A supervisor/user account. The password hash never leaves the storage
/// layer; this entity carries only displayable fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Supervisor {
    pub id: i64,
    /// Unique, case-insensitive.
    pub username: String,
    pub display_name: String,
    pub email: Option<String>,
    pub department: Option<String>,
    pub branch_code: Option<String>,
    pub branch_name: Option<String>,
    pub role: UserRole,
    pub is_active: bool,
    /// RFC 3339 timestamp.
    pub created_at: String,
    /// RFC 3339 timestamp of the most recent successful login.
    pub last_login: Option<String>,
}

impl Supervisor {
    /// A blank active supervisor-role account, for callers that fill in
    /// fields before `create`.
    pub fn new(username: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: 0,
            username: username.into(),
            display_name: display_name.into(),
            email: None,
            department: None,
            branch_code: None,
            branch_name: None,
            role: UserRole::Supervisor,
            is_active: true,
            created_at: chrono::Utc::now().to_rfc3339(),
            last_login: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_str() {
        for role in [
            UserRole::Administrator,
            UserRole::Supervisor,
            UserRole::Operator,
            UserRole::ReadOnly,
        ] {
            assert_eq!(UserRole::parse(role.as_str()), Some(role));
        }
        assert_eq!(UserRole::parse("Janitor"), None);
    }
}
