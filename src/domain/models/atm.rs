use serde::{Deserialize, Serialize};

/// ATM hardware vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AtmType {
    Ncr,
    Dn,
    Wincor,
    Hyosung,
}

impl AtmType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AtmType::Ncr => "NCR",
            AtmType::Dn => "DN",
            AtmType::Wincor => "Wincor",
            AtmType::Hyosung => "Hyosung",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "NCR" => Some(AtmType::Ncr),
            "DN" => Some(AtmType::Dn),
            "Wincor" => Some(AtmType::Wincor),
            "Hyosung" => Some(AtmType::Hyosung),
            _ => None,
        }
    }

    /// Vendor name for display.
    pub fn display_name(&self) -> &'static str {
        match self {
            AtmType::Ncr => "NCR",
            AtmType::Dn => "Diebold Nixdorf",
            AtmType::Wincor => "Wincor Nixdorf",
            AtmType::Hyosung => "Hyosung",
        }
    }
}

/// A branch ATM and its cash-cassette layout. Each ATM belongs to an active
/// supervisor account, referenced by username.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Atm {
    pub id: i64,
    /// Unique across all branches.
    pub atm_number: String,
    pub atm_type: AtmType,
    /// General-ledger account this ATM's cash position reconciles against.
    pub gl_account: Option<String>,
    pub branch_code: String,
    pub branch_name: Option<String>,
    pub cassette1_denomination: i64,
    pub cassette2_denomination: i64,
    pub cassette3_denomination: i64,
    pub cassette4_denomination: i64,
    pub is_active: bool,
    /// Owning supervisor's username.
    pub supervisor_username: String,
    /// RFC 3339 timestamp.
    pub created_at: String,
}

impl Atm {
    pub fn new(
        atm_number: impl Into<String>,
        atm_type: AtmType,
        branch_code: impl Into<String>,
        supervisor_username: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            atm_number: atm_number.into(),
            atm_type,
            gl_account: None,
            branch_code: branch_code.into(),
            branch_name: None,
            cassette1_denomination: 0,
            cassette2_denomination: 0,
            cassette3_denomination: 0,
            cassette4_denomination: 0,
            is_active: true,
            supervisor_username: supervisor_username.into(),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Denominations in cassette order, zeros for unused slots.
    pub fn cassette_denominations(&self) -> [i64; 4] {
        [
            self.cassette1_denomination,
            self.cassette2_denomination,
            self.cassette3_denomination,
            self.cassette4_denomination,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atm_type_round_trips_through_str() {
        for t in [AtmType::Ncr, AtmType::Dn, AtmType::Wincor, AtmType::Hyosung] {
            assert_eq!(AtmType::parse(t.as_str()), Some(t));
        }
        assert_eq!(AtmType::parse("Olivetti"), None);
    }

    #[test]
    fn new_atm_defaults_to_active_with_empty_cassettes() {
        let atm = Atm::new("ATM-0001", AtmType::Dn, "707", "supervisor1");
        assert!(atm.is_active);
        assert_eq!(atm.cassette_denominations(), [0, 0, 0, 0]);
    }
}
