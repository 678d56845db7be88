//! Login flow with per-account failed-attempt lockout.
//!
//! Failure counters live in process memory, keyed by lowercased username.
//! A restart clears them; the persistent is_active flag is the durable way
//! to bar an account.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{LOCKOUT_MINUTES, MAX_FAILED_ATTEMPTS};
use crate::domain::models::Supervisor;
use crate::error::DataError;
use crate::storage::repositories::SupervisorRepository;

/// Why a login was refused. Each variant maps to a distinct message the
/// frontend can show.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Username is required")]
    EmptyUsername,
    #[error("Password is required")]
    EmptyPassword,
    #[error("Unknown username")]
    UserNotFound,
    #[error("This account has been deactivated")]
    UserInactive,
    #[error("Invalid password ({remaining} attempt(s) remaining)")]
    InvalidCredentials { remaining: u32 },
    #[error("Account locked; try again in {minutes} minute(s)")]
    LockedOut { minutes: i64 },
    #[error(transparent)]
    Data(#[from] DataError),
}

#[derive(Debug, Clone, Copy)]
struct FailedAttempts {
    count: u32,
    last_attempt: DateTime<Utc>,
}

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Authentication and account administration.
#[derive(Clone)]
pub struct AuthService {
    supervisor_repository: SupervisorRepository,
    attempts: Arc<Mutex<HashMap<String, FailedAttempts>>>,
    clock: Clock,
}

impl AuthService {
    pub fn new(supervisor_repository: SupervisorRepository) -> Self {
        Self::with_clock(supervisor_repository, Arc::new(Utc::now))
    }

    /// Construct with an explicit time source so lockout windows can be
    /// exercised without waiting.
    pub fn with_clock(supervisor_repository: SupervisorRepository, clock: Clock) -> Self {
        Self {
            supervisor_repository,
            attempts: Arc::new(Mutex::new(HashMap::new())),
            clock,
        }
    }

    /// Validate credentials and stamp the login. A locked account rejects
    /// even the correct password until the window lapses.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Supervisor, AuthError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(AuthError::EmptyUsername);
        }
        if password.is_empty() {
            return Err(AuthError::EmptyPassword);
        }

        let key = username.to_lowercase();
        if let Some(minutes) = self.lockout_remaining(&key) {
            warn!("Login rejected for locked account {}", username);
            return Err(AuthError::LockedOut { minutes });
        }

        let supervisor = match self.supervisor_repository.get_by_username(username).await? {
            Some(s) => s,
            None => {
                warn!("Login attempt for unknown username {}", username);
                return Err(AuthError::UserNotFound);
            }
        };
        if !supervisor.is_active {
            warn!("Login attempt for inactive account {}", username);
            return Err(AuthError::UserInactive);
        }

        let validated = self
            .supervisor_repository
            .validate_credentials(username, password)
            .await?;
        match validated {
            Some(supervisor) => {
                self.clear_attempts(&key);
                self.supervisor_repository.update_last_login(username).await?;
                info!("Login succeeded for {}", username);
                Ok(supervisor)
            }
            None => {
                let count = self.record_failure(&key);
                warn!("Login failed for {} (attempt {})", username, count);
                if count >= MAX_FAILED_ATTEMPTS {
                    Err(AuthError::LockedOut {
                        minutes: LOCKOUT_MINUTES,
                    })
                } else {
                    Err(AuthError::InvalidCredentials {
                        remaining: MAX_FAILED_ATTEMPTS - count,
                    })
                }
            }
        }
    }

    /// Current failure count for an account, zero when none recorded.
    pub fn failed_attempts(&self, username: &str) -> u32 {
        let attempts = self.attempts.lock().unwrap_or_else(|e| e.into_inner());
        attempts
            .get(&username.trim().to_lowercase())
            .map(|a| a.count)
            .unwrap_or(0)
    }

    /// Administrative unlock.
    pub fn reset_failed_attempts(&self, username: &str) {
        self.clear_attempts(&username.trim().to_lowercase());
    }

    pub async fn create_user(
        &self,
        supervisor: &Supervisor,
        password: &str,
    ) -> Result<i64, AuthError> {
        Ok(self.supervisor_repository.create(supervisor, password).await?)
    }

    pub async fn update_user(&self, supervisor: &Supervisor) -> Result<bool, AuthError> {
        Ok(self.supervisor_repository.update(supervisor).await?)
    }

    pub async fn change_password(
        &self,
        username: &str,
        new_password: &str,
    ) -> Result<bool, AuthError> {
        Ok(self
            .supervisor_repository
            .update_password(username, new_password)
            .await?)
    }

    pub async fn get_all_users(&self) -> Result<Vec<Supervisor>, AuthError> {
        use crate::storage::traits::Repository;
        Ok(self.supervisor_repository.get_all().await?)
    }

    /// Minutes left on an active lockout, clearing expired entries.
    fn lockout_remaining(&self, key: &str) -> Option<i64> {
        let mut attempts = self.attempts.lock().unwrap_or_else(|e| e.into_inner());
        let entry = attempts.get(key).copied()?;
        if entry.count < MAX_FAILED_ATTEMPTS {
            return None;
        }
        let elapsed = (self.clock)() - entry.last_attempt;
        let window = Duration::minutes(LOCKOUT_MINUTES);
        if elapsed < window {
            Some((window - elapsed).num_minutes().max(1))
        } else {
            attempts.remove(key);
            None
        }
    }

    fn record_failure(&self, key: &str) -> u32 {
        let mut attempts = self.attempts.lock().unwrap_or_else(|e| e.into_inner());
        let now = (self.clock)();
        let entry = attempts.entry(key.to_string()).or_insert(FailedAttempts {
            count: 0,
            last_attempt: now,
        });
        entry.count += 1;
        entry.last_attempt = now;
        entry.count
    }

    fn clear_attempts(&self, key: &str) {
        let mut attempts = self.attempts.lock().unwrap_or_else(|e| e.into_inner());
        attempts.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::connection::DbConnection;

    async fn setup() -> AuthService {
        let db = DbConnection::init_test()
            .await
            .expect("Failed to create test database");
        AuthService::new(SupervisorRepository::new(db))
    }

    async fn setup_with_clock(clock: Clock) -> AuthService {
        let db = DbConnection::init_test()
            .await
            .expect("Failed to create test database");
        AuthService::with_clock(SupervisorRepository::new(db), clock)
    }

    #[tokio::test]
    async fn seeded_admin_can_log_in() {
        let service = setup().await;
        let supervisor = service.authenticate("admin", "password").await.unwrap();
        assert_eq!(supervisor.username, "admin");

        // The first login stamped last_login, visible on the next one.
        let reloaded = service.authenticate("admin", "password").await.unwrap();
        assert!(reloaded.last_login.is_some());
    }

    #[tokio::test]
    async fn empty_fields_are_rejected_before_any_lookup() {
        let service = setup().await;
        assert!(matches!(
            service.authenticate("  ", "password").await,
            Err(AuthError::EmptyUsername)
        ));
        assert!(matches!(
            service.authenticate("admin", "").await,
            Err(AuthError::EmptyPassword)
        ));
    }

    #[tokio::test]
    async fn unknown_and_inactive_users_get_distinct_errors() {
        let service = setup().await;
        assert!(matches!(
            service.authenticate("nobody", "password").await,
            Err(AuthError::UserNotFound)
        ));

        let mut supervisor1 = service
            .supervisor_repository
            .get_by_username("supervisor1")
            .await
            .unwrap()
            .unwrap();
        supervisor1.is_active = false;
        service.supervisor_repository.update(&supervisor1).await.unwrap();
        assert!(matches!(
            service.authenticate("supervisor1", "supervisor123").await,
            Err(AuthError::UserInactive)
        ));
    }

    #[tokio::test]
    async fn failures_count_down_then_lock() {
        let service = setup().await;

        for expected_remaining in (1..MAX_FAILED_ATTEMPTS).rev() {
            match service.authenticate("admin", "wrong").await {
                Err(AuthError::InvalidCredentials { remaining }) => {
                    assert_eq!(remaining, expected_remaining)
                }
                other => panic!("expected InvalidCredentials, got {other:?}"),
            }
        }

        // Fifth failure trips the lockout.
        assert!(matches!(
            service.authenticate("admin", "wrong").await,
            Err(AuthError::LockedOut { .. })
        ));

        // Even the correct password is refused while locked.
        assert!(matches!(
            service.authenticate("admin", "password").await,
            Err(AuthError::LockedOut { .. })
        ));
    }

    #[tokio::test]
    async fn lockout_key_is_case_insensitive() {
        let service = setup().await;
        for _ in 0..MAX_FAILED_ATTEMPTS {
            let _ = service.authenticate("Admin", "wrong").await;
        }
        assert!(matches!(
            service.authenticate("ADMIN", "password").await,
            Err(AuthError::LockedOut { .. })
        ));
        assert_eq!(service.failed_attempts("admin"), MAX_FAILED_ATTEMPTS);
    }

    #[tokio::test]
    async fn success_resets_the_failure_counter() {
        let service = setup().await;
        let _ = service.authenticate("admin", "wrong").await;
        let _ = service.authenticate("admin", "wrong").await;
        assert_eq!(service.failed_attempts("admin"), 2);

        service.authenticate("admin", "password").await.unwrap();
        assert_eq!(service.failed_attempts("admin"), 0);
    }

    #[tokio::test]
    async fn manual_reset_unlocks_immediately() {
        let service = setup().await;
        for _ in 0..MAX_FAILED_ATTEMPTS {
            let _ = service.authenticate("admin", "wrong").await;
        }
        service.reset_failed_attempts("admin");
        service.authenticate("admin", "password").await.unwrap();
    }

    #[tokio::test]
    async fn lockout_expires_after_the_window() {
        let now = Arc::new(Mutex::new(Utc::now()));
        let clock_now = Arc::clone(&now);
        let service =
            setup_with_clock(Arc::new(move || *clock_now.lock().unwrap())).await;

        for _ in 0..MAX_FAILED_ATTEMPTS {
            let _ = service.authenticate("admin", "wrong").await;
        }
        assert!(matches!(
            service.authenticate("admin", "password").await,
            Err(AuthError::LockedOut { .. })
        ));

        *now.lock().unwrap() += Duration::minutes(LOCKOUT_MINUTES + 1);
        service.authenticate("admin", "password").await.unwrap();
    }

    #[tokio::test]
    async fn account_management_round_trips_through_the_service() {
        let service = setup().await;

        let new_user = Supervisor::new("teller1", "Branch Teller");
        service.create_user(&new_user, "teller-pass").await.unwrap();
        service.authenticate("teller1", "teller-pass").await.unwrap();

        service.change_password("teller1", "rotated-pass").await.unwrap();
        assert!(matches!(
            service.authenticate("teller1", "teller-pass").await,
            Err(AuthError::InvalidCredentials { .. })
        ));
        service.authenticate("teller1", "rotated-pass").await.unwrap();

        let users = service.get_all_users().await.unwrap();
        assert!(users.iter().any(|u| u.username == "teller1"));
    }
}
