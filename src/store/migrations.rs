//! Version-tracked database migrations for the libSQL backend.
//!
//! Each migration has a version number and SQL. `run_migrations()` reads the
//! highest applied version from `_migrations` and applies only newer ones,
//! in order.

use libsql::Connection;

use crate::error::DatabaseError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_schema",
        sql: r#"
            CREATE TABLE IF NOT EXISTS sessions (
                external_id TEXT PRIMARY KEY,
                current_step TEXT NOT NULL,
                locale TEXT NOT NULL DEFAULT 'en',
                mode TEXT NOT NULL DEFAULT 'flow',
                name TEXT,
                phone TEXT,
                age INTEGER,
                loan_amount REAL,
                loan_tenure INTEGER,
                monthly_repayment REAL,
                interest_rate REAL,
                remaining_tenure INTEGER,
                query_count INTEGER NOT NULL DEFAULT 0,
                query_window_start TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS leads (
                id TEXT PRIMARY KEY,
                external_id TEXT NOT NULL,
                name TEXT,
                phone TEXT,
                loan_amount REAL NOT NULL,
                loan_tenure INTEGER NOT NULL,
                current_repayment TEXT NOT NULL,
                new_repayment TEXT NOT NULL,
                monthly_savings TEXT NOT NULL,
                yearly_savings TEXT NOT NULL,
                lifetime_savings TEXT NOT NULL,
                years_saved INTEGER NOT NULL,
                months_saved INTEGER NOT NULL,
                bank_name TEXT NOT NULL,
                interest_rate REAL NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_leads_external_id ON leads(external_id);
            CREATE INDEX IF NOT EXISTS idx_leads_created ON leads(created_at);

            CREATE TABLE IF NOT EXISTS bank_rates (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                bank_name TEXT NOT NULL,
                min_amount REAL NOT NULL,
                max_amount REAL,
                interest_rate REAL NOT NULL
            );
        "#,
    },
    Migration {
        version: 2,
        name: "chat_logs",
        sql: r#"
            CREATE TABLE IF NOT EXISTS chat_logs (
                id TEXT PRIMARY KEY,
                external_id TEXT NOT NULL,
                question TEXT NOT NULL,
                answer TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_chat_logs_external_id ON chat_logs(external_id);
        "#,
    },
    Migration {
        version: 3,
        name: "inquiry_leads",
        sql: r#"
            CREATE TABLE IF NOT EXISTS inquiry_leads (
                id TEXT PRIMARY KEY,
                external_id TEXT NOT NULL,
                name TEXT,
                phone TEXT,
                question TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_inquiry_leads_external_id ON inquiry_leads(external_id);
        "#,
    },
];

/// Version of the newest migration.
pub fn latest_version() -> i64 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}

/// Run all pending migrations against the given connection.
///
/// Creates the `_migrations` table if it doesn't exist.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to create _migrations table: {e}")))?;

    let current_version = get_current_version(conn).await?;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            conn.execute_batch(migration.sql).await.map_err(|e| {
                DatabaseError::Migration(format!(
                    "Migration V{} ({}) failed: {e}",
                    migration.version, migration.name
                ))
            })?;
            seed_version(conn, migration.version, migration.name).await?;
        }
    }

    tracing::debug!(version = latest_version(), "Database migrations complete");
    Ok(())
}

/// Get the highest applied migration version, or 0 if none.
async fn get_current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to query migration version: {e}")))?;

    let row = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to read migration version: {e}")))?;

    match row {
        Some(row) => {
            let version: i64 = row.get(0).map_err(|e| {
                DatabaseError::Migration(format!("Failed to parse migration version: {e}"))
            })?;
            Ok(version)
        }
        None => Ok(0),
    }
}

/// Insert a version record into `_migrations`.
async fn seed_version(conn: &Connection, version: i64, name: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
        libsql::params![version, name],
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to record migration V{version}: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_conn() -> Connection {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .unwrap();
        db.connect().unwrap()
    }

    async fn table_exists(conn: &Connection, table: &str) -> bool {
        let mut rows = conn
            .query(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                libsql::params![table],
            )
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        let count: i64 = row.get(0).unwrap();
        count == 1
    }

    #[tokio::test]
    async fn migrations_create_all_tables() {
        let conn = test_conn().await;
        run_migrations(&conn).await.unwrap();
        for table in [
            "sessions",
            "leads",
            "bank_rates",
            "chat_logs",
            "inquiry_leads",
            "_migrations",
        ] {
            assert!(table_exists(&conn, table).await, "Table '{table}' should exist");
        }
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let conn = test_conn().await;
        run_migrations(&conn).await.unwrap();
        run_migrations(&conn).await.unwrap();
        assert_eq!(get_current_version(&conn).await.unwrap(), latest_version());
    }

    #[tokio::test]
    async fn partial_database_gets_only_new_migrations() {
        let conn = test_conn().await;
        conn.execute(
            "CREATE TABLE _migrations (version INTEGER PRIMARY KEY, name TEXT NOT NULL, applied_at TEXT NOT NULL DEFAULT (datetime('now')))",
            (),
        )
        .await
        .unwrap();
        conn.execute_batch(MIGRATIONS[0].sql).await.unwrap();
        seed_version(&conn, 1, "initial_schema").await.unwrap();
        assert!(!table_exists(&conn, "chat_logs").await);

        run_migrations(&conn).await.unwrap();
        assert!(table_exists(&conn, "chat_logs").await);
        assert!(table_exists(&conn, "inquiry_leads").await);
        assert_eq!(get_current_version(&conn).await.unwrap(), latest_version());
    }

    #[tokio::test]
    async fn version_tracking() {
        let conn = test_conn().await;
        run_migrations(&conn).await.unwrap();

        let mut rows = conn
            .query("SELECT version, name FROM _migrations ORDER BY version", ())
            .await
            .unwrap();
        let row1 = rows.next().await.unwrap().unwrap();
        assert_eq!(row1.get::<i64>(0).unwrap(), 1);
        assert_eq!(row1.get::<String>(1).unwrap(), "initial_schema");

        let row2 = rows.next().await.unwrap().unwrap();
        assert_eq!(row2.get::<i64>(0).unwrap(), 2);
        assert_eq!(row2.get::<String>(1).unwrap(), "chat_logs");

        let row3 = rows.next().await.unwrap().unwrap();
        assert_eq!(row3.get::<i64>(0).unwrap(), 3);
        assert_eq!(row3.get::<String>(1).unwrap(), "inquiry_leads");
    }
}
