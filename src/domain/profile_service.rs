//! Supervisor profile composition: the account joined with the ATMs the
//! supervisor works, ready for a profile screen.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::models::{Atm, Supervisor};
use crate::error::{DataError, Result};
use crate::storage::repositories::{AtmRepository, SupervisorRepository};
use crate::storage::traits::Repository;

/// An account together with its working set of ATMs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupervisorProfile {
    pub supervisor: Supervisor,
    pub atms: Vec<Atm>,
}

impl SupervisorProfile {
    /// Count of active ATMs in the working set.
    pub fn active_atm_count(&self) -> usize {
        self.atms.iter().filter(|a| a.is_active).count()
    }
}

#[derive(Clone)]
pub struct ProfileService {
    supervisor_repository: SupervisorRepository,
    atm_repository: AtmRepository,
}

impl ProfileService {
    pub fn new(
        supervisor_repository: SupervisorRepository,
        atm_repository: AtmRepository,
    ) -> Self {
        Self {
            supervisor_repository,
            atm_repository,
        }
    }

    /// Load a profile. The ATM set is the supervisor's branch fleet when a
    /// branch code is on file, otherwise the ATMs assigned directly to them.
    pub async fn get_profile(&self, username: &str) -> Result<Option<SupervisorProfile>> {
        let username = username.trim();
        if username.is_empty() {
            return Err(DataError::validation("Username is required"));
        }

        let Some(supervisor) = self.supervisor_repository.get_by_username(username).await? else {
            return Ok(None);
        };

        let atms = match &supervisor.branch_code {
            Some(branch_code) => self.atm_repository.get_by_branch(branch_code).await?,
            None => self.atm_repository.get_by_username(username).await?,
        };

        Ok(Some(SupervisorProfile { supervisor, atms }))
    }

    /// Persist edits to the account part of a profile.
    pub async fn update_profile(&self, supervisor: &Supervisor) -> Result<bool> {
        let updated = self.supervisor_repository.update(supervisor).await?;
        if updated {
            info!("Updated profile for {}", supervisor.username);
        }
        Ok(updated)
    }

    /// Every account with its ATM working set.
    pub async fn get_all_profiles(&self) -> Result<Vec<SupervisorProfile>> {
        let supervisors = self.supervisor_repository.get_all().await?;
        let mut profiles = Vec::with_capacity(supervisors.len());
        for supervisor in supervisors {
            let atms = match &supervisor.branch_code {
                Some(branch_code) => self.atm_repository.get_by_branch(branch_code).await?,
                None => {
                    self.atm_repository
                        .get_by_username(&supervisor.username)
                        .await?
                }
            };
            profiles.push(SupervisorProfile { supervisor, atms });
        }
        Ok(profiles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::connection::DbConnection;

    async fn setup() -> (DbConnection, ProfileService) {
        let db = DbConnection::init_test()
            .await
            .expect("Failed to create test database");
        let service = ProfileService::new(
            SupervisorRepository::new(db.clone()),
            AtmRepository::new(db.clone()),
        );
        (db, service)
    }

    #[tokio::test]
    async fn profile_carries_the_branch_fleet() {
        let (_db, service) = setup().await;
        let profile = service
            .get_profile("supervisor1")
            .await
            .unwrap()
            .expect("seeded account");
        assert_eq!(profile.supervisor.branch_code.as_deref(), Some("707"));
        assert_eq!(profile.atms.len(), 4);
        assert_eq!(profile.active_atm_count(), 4);
    }

    #[tokio::test]
    async fn profile_falls_back_to_assigned_atms_without_a_branch() {
        let (db, service) = setup().await;
        db.execute(
            "UPDATE supervisors SET branch_code = NULL WHERE username = 'supervisor2'",
            &[],
        )
        .await
        .unwrap();

        let profile = service
            .get_profile("supervisor2")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(profile.atms.len(), 3);
        assert!(profile
            .atms
            .iter()
            .all(|a| a.supervisor_username == "supervisor2"));
    }

    #[tokio::test]
    async fn unknown_username_yields_none_and_blank_is_rejected() {
        let (_db, service) = setup().await;
        assert!(service.get_profile("nobody").await.unwrap().is_none());
        assert!(service.get_profile("  ").await.unwrap_err().is_validation());
    }

    #[tokio::test]
    async fn update_profile_persists_account_edits() {
        let (_db, service) = setup().await;
        let mut profile = service.get_profile("supervisor1").await.unwrap().unwrap();
        profile.supervisor.department = Some("Cash Operations".into());
        assert!(service.update_profile(&profile.supervisor).await.unwrap());

        let reloaded = service.get_profile("supervisor1").await.unwrap().unwrap();
        assert_eq!(
            reloaded.supervisor.department.as_deref(),
            Some("Cash Operations")
        );
    }

    #[tokio::test]
    async fn all_profiles_cover_every_account() {
        let (_db, service) = setup().await;
        let profiles = service.get_all_profiles().await.unwrap();
        assert_eq!(profiles.len(), 3);
        assert!(profiles
            .iter()
            .any(|p| p.supervisor.username == "admin" && p.atms.is_empty()));
    }
}
