//! ATM fleet operations for the UI layer. Guards the obvious bad inputs,
//! then delegates to the repository, which owns the referential rules.

use tracing::info;

use crate::domain::models::Atm;
use crate::error::{DataError, Result};
use crate::storage::repositories::AtmRepository;
use crate::storage::traits::Repository;

#[derive(Clone)]
pub struct AtmService {
    atm_repository: AtmRepository,
}

impl AtmService {
    pub fn new(atm_repository: AtmRepository) -> Self {
        Self { atm_repository }
    }

    pub async fn get_atms_by_username(&self, username: &str) -> Result<Vec<Atm>> {
        if username.trim().is_empty() {
            return Err(DataError::validation("Username is required"));
        }
        self.atm_repository.get_by_username(username).await
    }

    pub async fn get_atms_by_branch(&self, branch_code: &str) -> Result<Vec<Atm>> {
        if branch_code.trim().is_empty() {
            return Err(DataError::validation("Branch code is required"));
        }
        self.atm_repository.get_by_branch(branch_code).await
    }

    pub async fn get_atm_by_number(&self, atm_number: &str) -> Result<Option<Atm>> {
        if atm_number.trim().is_empty() {
            return Err(DataError::validation("ATM number is required"));
        }
        self.atm_repository.get_by_atm_number(atm_number).await
    }

    pub async fn get_all_atms(&self) -> Result<Vec<Atm>> {
        self.atm_repository.get_all().await
    }

    pub async fn create_atm(&self, atm: &Atm) -> Result<i64> {
        let id = self.atm_repository.create(atm).await?;
        info!("ATM {} registered with id {}", atm.atm_number, id);
        Ok(id)
    }

    pub async fn update_atm(&self, atm: &Atm) -> Result<bool> {
        if atm.id <= 0 {
            return Err(DataError::validation("A persisted ATM is required"));
        }
        self.atm_repository.update(atm).await
    }

    pub async fn deactivate_atm(&self, id: i64) -> Result<bool> {
        if id <= 0 {
            return Err(DataError::validation("A persisted ATM is required"));
        }
        let done = self.atm_repository.deactivate(id).await?;
        if done {
            info!("ATM {} deactivated", id);
        }
        Ok(done)
    }
}
