//! Application-wide constants and path resolution.

use std::path::{Path, PathBuf};

/// Database file name inside the application data directory.
pub const DATABASE_FILENAME: &str = "atm-recon.db";

/// Cash reconciliation tolerance: variances at or below this magnitude are
/// considered balanced.
pub const CASH_TOLERANCE: f64 = 1.00;

/// Tolerance for GL balance comparisons.
pub const GL_TOLERANCE: f64 = 0.01;

/// Consecutive failed logins before an account locks.
pub const MAX_FAILED_ATTEMPTS: u32 = 5;

/// How long a locked account stays locked.
pub const LOCKOUT_MINUTES: i64 = 15;

pub const PASSWORD_MIN_LENGTH: usize = 6;
pub const USERNAME_MAX_LENGTH: usize = 64;
pub const NOTES_MAX_LENGTH: usize = 1000;

/// sqlx connection URL for a database file at `path`.
pub fn db_url(path: &Path) -> String {
    format!("sqlite:{}", path.display())
}

/// Resolve the application data directory, falling back to the current
/// directory when the platform offers none.
pub fn data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("atm-recon"))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Full path of the production database file.
pub fn database_path() -> PathBuf {
    data_dir().join(DATABASE_FILENAME)
}
