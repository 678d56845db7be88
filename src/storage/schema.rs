//! Idempotent schema creation and first-run seeding.
//!
//! Tables are created in foreign-key dependency order (supervisors before
//! atms, atms before atm_transactions), each batch inside a single
//! transaction so a failure leaves no partial schema behind. Seeding only
//! runs against an empty supervisors table.

use chrono::Utc;
use sqlx::{Row as _, SqliteConnection};
use tracing::info;

use crate::domain::models::{AtmType, ReconciliationStatus, UserRole};
use crate::domain::password;
use crate::error::{DataError, Result};
use crate::storage::connection::DbConnection;

const CREATE_SUPERVISORS: &str = "\
    CREATE TABLE supervisors (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE COLLATE NOCASE,
        password_hash TEXT NOT NULL,
        display_name TEXT NOT NULL,
        email TEXT,
        department TEXT,
        branch_code TEXT,
        branch_name TEXT,
        role TEXT NOT NULL DEFAULT 'Supervisor',
        is_active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL,
        last_login TEXT
    )";

const CREATE_ATMS: &str = "\
    CREATE TABLE atms (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        atm_number TEXT NOT NULL UNIQUE,
        atm_type TEXT NOT NULL,
        gl_account TEXT,
        branch_code TEXT NOT NULL,
        branch_name TEXT,
        cassette1_denomination INTEGER NOT NULL DEFAULT 0,
        cassette2_denomination INTEGER NOT NULL DEFAULT 0,
        cassette3_denomination INTEGER NOT NULL DEFAULT 0,
        cassette4_denomination INTEGER NOT NULL DEFAULT 0,
        is_active INTEGER NOT NULL DEFAULT 1,
        supervisor_username TEXT NOT NULL,
        created_at TEXT NOT NULL,
        FOREIGN KEY (supervisor_username) REFERENCES supervisors(username)
    )";

const CREATE_ATM_TRANSACTIONS: &str = "\
    CREATE TABLE atm_transactions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        atm_id INTEGER NOT NULL,
        transaction_date TEXT NOT NULL,
        beginning_cash REAL,
        added_cash REAL,
        recycled_cash REAL,
        ending_cash REAL,
        deposited_cash REAL,
        gl_balance REAL,
        is_reconciled INTEGER NOT NULL DEFAULT 0,
        reconciliation_status TEXT NOT NULL DEFAULT 'Pending',
        variance REAL,
        notes TEXT,
        created_at TEXT NOT NULL,
        FOREIGN KEY (atm_id) REFERENCES atms(id)
    )";

const CREATE_AUDIT_LOG: &str = "\
    CREATE TABLE audit_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        table_name TEXT NOT NULL,
        record_id INTEGER NOT NULL,
        action TEXT NOT NULL,
        old_values TEXT,
        new_values TEXT,
        user_id INTEGER,
        created_at TEXT NOT NULL,
        FOREIGN KEY (user_id) REFERENCES supervisors(id)
    )";

/// (table name, DDL) in creation order.
const TABLES: &[(&str, &str)] = &[
    ("supervisors", CREATE_SUPERVISORS),
    ("atms", CREATE_ATMS),
    ("atm_transactions", CREATE_ATM_TRANSACTIONS),
    ("audit_log", CREATE_AUDIT_LOG),
];

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_supervisors_username ON supervisors(username)",
    "CREATE INDEX IF NOT EXISTS idx_supervisors_is_active ON supervisors(is_active)",
    "CREATE INDEX IF NOT EXISTS idx_atms_supervisor_username ON atms(supervisor_username)",
    "CREATE INDEX IF NOT EXISTS idx_atms_branch_code ON atms(branch_code)",
    "CREATE INDEX IF NOT EXISTS idx_atms_gl_account ON atms(gl_account)",
    "CREATE INDEX IF NOT EXISTS idx_atms_is_active ON atms(is_active)",
    "CREATE INDEX IF NOT EXISTS idx_atm_transactions_atm_id ON atm_transactions(atm_id)",
    "CREATE INDEX IF NOT EXISTS idx_atm_transactions_date ON atm_transactions(transaction_date)",
    "CREATE INDEX IF NOT EXISTS idx_atm_transactions_status \
     ON atm_transactions(reconciliation_status)",
    "CREATE INDEX IF NOT EXISTS idx_atm_transactions_is_reconciled \
     ON atm_transactions(is_reconciled)",
    "CREATE INDEX IF NOT EXISTS idx_audit_log_record ON audit_log(table_name, record_id)",
    "CREATE INDEX IF NOT EXISTS idx_audit_log_created_at ON audit_log(created_at)",
];

pub struct SchemaInitializer {
    db: DbConnection,
}

impl SchemaInitializer {
    pub fn new(db: DbConnection) -> Self {
        Self { db }
    }

    /// Create missing tables and all indexes. Safe to call on every start;
    /// a failure rolls the whole batch back.
    pub async fn initialize_schema(&self) -> Result<()> {
        let mut tx = self.db.begin().await?;

        for (name, ddl) in TABLES {
            if !table_exists(&mut tx, name).await? {
                info!("Creating table {}", name);
                sqlx::query(ddl)
                    .execute(&mut *tx)
                    .await
                    .map_err(DataError::db(format!("creating table {name}")))?;
            }
        }

        for index_sql in INDEXES {
            sqlx::query(index_sql)
                .execute(&mut *tx)
                .await
                .map_err(DataError::db("creating index"))?;
        }

        tx.commit()
            .await
            .map_err(DataError::db("committing schema batch"))?;
        Ok(())
    }

    /// Insert sample supervisors, ATMs and transactions, but only when the
    /// supervisors table is empty.
    pub async fn seed_sample_data(&self) -> Result<()> {
        let existing: i64 = self
            .db
            .execute_scalar("SELECT COUNT(*) FROM supervisors", &[])
            .await?;
        if existing > 0 {
            return Ok(());
        }

        info!("Seeding sample data");
        let mut tx = self.db.begin().await?;
        seed_supervisors(&mut tx).await?;
        seed_atms(&mut tx).await?;
        seed_transactions(&mut tx).await?;
        tx.commit()
            .await
            .map_err(DataError::db("committing seed batch"))?;
        Ok(())
    }

    /// Drop every application table. Reverse dependency order.
    pub async fn drop_all_tables(&self) -> Result<()> {
        let mut tx = self.db.begin().await?;
        for table in ["audit_log", "atm_transactions", "atms", "supervisors"] {
            sqlx::query(&format!("DROP TABLE IF EXISTS {table}"))
                .execute(&mut *tx)
                .await
                .map_err(DataError::db(format!("dropping table {table}")))?;
        }
        tx.commit()
            .await
            .map_err(DataError::db("committing drop batch"))?;
        Ok(())
    }

    /// Drop, recreate and reseed.
    pub async fn recreate_database(&self) -> Result<()> {
        self.drop_all_tables().await?;
        self.initialize_schema().await?;
        self.seed_sample_data().await
    }
}

/// Catalog lookup against sqlite_master.
async fn table_exists(conn: &mut SqliteConnection, name: &str) -> Result<bool> {
    let row = sqlx::query("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?")
        .bind(name)
        .fetch_one(&mut *conn)
        .await
        .map_err(DataError::db("checking table catalog"))?;
    let count: i64 = row
        .try_get(0)
        .map_err(DataError::db("decoding catalog count"))?;
    Ok(count > 0)
}

async fn seed_supervisors(conn: &mut SqliteConnection) -> Result<()> {
    let supervisors = [
        (
            "admin",
            "password",
            "Administrator",
            "admin@example.com",
            "IT",
            "001",
            "Main Branch",
            UserRole::Administrator,
        ),
        (
            "supervisor1",
            "supervisor123",
            "Branch Supervisor One",
            "supervisor1@example.com",
            "Operations",
            "707",
            "Hotel District Branch",
            UserRole::Supervisor,
        ),
        (
            "supervisor2",
            "supervisor123",
            "Branch Supervisor Two",
            "supervisor2@example.com",
            "Operations",
            "150",
            "Airport Branch",
            UserRole::Supervisor,
        ),
    ];

    for (username, pw, display, email, dept, branch_code, branch_name, role) in supervisors {
        let hash = password::hash(pw)?;
        sqlx::query(
            "INSERT INTO supervisors \
             (username, password_hash, display_name, email, department, branch_code, \
              branch_name, role, is_active, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1, ?)",
        )
        .bind(username)
        .bind(&hash)
        .bind(display)
        .bind(email)
        .bind(dept)
        .bind(branch_code)
        .bind(branch_name)
        .bind(role.as_str())
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *conn)
        .await
        .map_err(DataError::db(format!("seeding supervisor {username}")))?;
    }
    Ok(())
}

async fn seed_atms(conn: &mut SqliteConnection) -> Result<()> {
    let atms = [
        ("ATM-7001", AtmType::Dn, "101103576", "707", "supervisor1", [200, 100, 50, 20]),
        ("ATM-7002", AtmType::Ncr, "101103577", "707", "supervisor1", [200, 100, 50, 20]),
        ("ATM-7003", AtmType::Dn, "101103578", "707", "supervisor1", [200, 200, 100, 50]),
        ("ATM-7004", AtmType::Wincor, "101103579", "707", "supervisor1", [100, 50, 20, 0]),
        ("ATM-1501", AtmType::Wincor, "101105001", "150", "supervisor2", [200, 100, 50, 20]),
        ("ATM-1502", AtmType::Hyosung, "101105002", "150", "supervisor2", [200, 100, 50, 20]),
        ("ATM-1503", AtmType::Ncr, "101105003", "150", "supervisor2", [100, 100, 50, 20]),
    ];

    for (number, atm_type, gl_account, branch_code, username, cassettes) in atms {
        sqlx::query(
            "INSERT INTO atms \
             (atm_number, atm_type, gl_account, branch_code, branch_name, \
              cassette1_denomination, cassette2_denomination, cassette3_denomination, \
              cassette4_denomination, is_active, supervisor_username, created_at) \
             VALUES (?, ?, ?, ?, NULL, ?, ?, ?, ?, 1, ?, ?)",
        )
        .bind(number)
        .bind(atm_type.as_str())
        .bind(gl_account)
        .bind(branch_code)
        .bind(cassettes[0])
        .bind(cassettes[1])
        .bind(cassettes[2])
        .bind(cassettes[3])
        .bind(username)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *conn)
        .await
        .map_err(DataError::db(format!("seeding ATM {number}")))?;
    }
    Ok(())
}

async fn seed_transactions(conn: &mut SqliteConnection) -> Result<()> {
    // Fixed rows covering each status so seeded data is assertable.
    // (atm_id, date, beginning, added, recycled, ending, deposited)
    let rows: [(i64, &str, f64, f64, f64, Option<f64>, f64); 4] = [
        (1, "2025-06-01", 120_000.0, 30_000.0, 5_000.0, Some(115_000.5), 40_000.0),
        (1, "2025-06-02", 115_000.5, 0.0, 2_000.0, Some(96_975.5), 20_000.0),
        (2, "2025-06-01", 80_000.0, 20_000.0, 0.0, Some(90_040.0), 10_000.0),
        (3, "2025-06-01", 60_000.0, 0.0, 0.0, None, 0.0),
    ];

    for (atm_id, day, beginning, added, recycled, ending, deposited) in rows {
        let expected = beginning + added + recycled - deposited;
        let variance = ending.map(|e| e - expected);
        let status = ReconciliationStatus::from_variance(variance);
        sqlx::query(
            "INSERT INTO atm_transactions \
             (atm_id, transaction_date, beginning_cash, added_cash, recycled_cash, \
              ending_cash, deposited_cash, is_reconciled, reconciliation_status, \
              variance, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(atm_id)
        .bind(day)
        .bind(beginning)
        .bind(added)
        .bind(recycled)
        .bind(ending)
        .bind(deposited)
        .bind(status != ReconciliationStatus::Pending)
        .bind(status.as_str())
        .bind(variance)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *conn)
        .await
        .map_err(DataError::db("seeding sample transaction"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn initialize_is_idempotent() {
        let db = DbConnection::init_test().await.unwrap();
        let initializer = SchemaInitializer::new(db.clone());
        // init_test already initialized once; a second pass must not fail.
        initializer.initialize_schema().await.unwrap();

        for (name, _) in TABLES {
            let count: i64 = db
                .execute_scalar(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
                    &[(*name).into()],
                )
                .await
                .unwrap();
            assert_eq!(count, 1, "table {name} should exist exactly once");
        }
    }

    #[tokio::test]
    async fn seeding_runs_only_against_empty_database() {
        let db = DbConnection::init_test().await.unwrap();
        let initializer = SchemaInitializer::new(db.clone());

        let first: i64 = db
            .execute_scalar("SELECT COUNT(*) FROM supervisors", &[])
            .await
            .unwrap();
        assert_eq!(first, 3);

        initializer.seed_sample_data().await.unwrap();
        let second: i64 = db
            .execute_scalar("SELECT COUNT(*) FROM supervisors", &[])
            .await
            .unwrap();
        assert_eq!(second, first, "reseeding must not duplicate rows");
    }

    #[tokio::test]
    async fn seeded_transactions_cover_every_status() {
        let db = DbConnection::init_test().await.unwrap();
        for status in ["Balanced", "Shortage", "Over", "Pending"] {
            let count: i64 = db
                .execute_scalar(
                    "SELECT COUNT(*) FROM atm_transactions WHERE reconciliation_status = ?",
                    &[status.into()],
                )
                .await
                .unwrap();
            assert!(count > 0, "expected at least one {status} sample row");
        }
    }

    #[tokio::test]
    async fn recreate_resets_to_seeded_state() {
        let db = DbConnection::init_test().await.unwrap();
        let initializer = SchemaInitializer::new(db.clone());

        db.execute("DELETE FROM atm_transactions", &[]).await.unwrap();
        initializer.recreate_database().await.unwrap();

        let supervisors: i64 = db
            .execute_scalar("SELECT COUNT(*) FROM supervisors", &[])
            .await
            .unwrap();
        let atms: i64 = db.execute_scalar("SELECT COUNT(*) FROM atms", &[]).await.unwrap();
        assert_eq!(supervisors, 3);
        assert_eq!(atms, 7);
    }

    #[tokio::test]
    async fn initializes_on_disk_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema-test.db");
        let url = crate::config::db_url(&path);

        let db = DbConnection::init(&url).await.unwrap();
        assert!(path.exists());

        let count: i64 = db.execute_scalar("SELECT COUNT(*) FROM atms", &[]).await.unwrap();
        assert_eq!(count, 7);
    }
}
