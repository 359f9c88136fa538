//! Connection pool construction and schema migrations.

use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use tracing::{debug, info};

use crate::errors::Result;

/// Pooled SQLite connections.
pub type ConnectionPool = r2d2::Pool<SqliteConnectionManager>;

/// A single pooled connection.
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Pool configuration.
#[derive(Clone, Copy, Debug)]
pub struct ConnectionConfig {
    /// Maximum pooled connections.
    pub max_connections: u32,
    /// SQLite busy timeout in milliseconds.
    pub busy_timeout_ms: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_connections: 8,
            busy_timeout_ms: 5_000,
        }
    }
}

fn configure(conn: &Connection, config: &ConnectionConfig) -> rusqlite::Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "busy_timeout", config.busy_timeout_ms)?;
    Ok(())
}

/// Open (or create) a database file and build a pool around it.
pub fn new_file(path: &std::path::Path, config: &ConnectionConfig) -> Result<ConnectionPool> {
    let cfg = *config;
    let manager =
        SqliteConnectionManager::file(path).with_init(move |conn| configure(conn, &cfg));
    let pool = r2d2::Pool::builder()
        .max_size(config.max_connections)
        .build(manager)?;
    info!(?path, "opened state database");
    Ok(pool)
}

/// Build a pool over a private in-memory database (tests).
///
/// The pool is capped at one connection — each in-memory connection would
/// otherwise see its own empty database.
pub fn new_in_memory(config: &ConnectionConfig) -> Result<ConnectionPool> {
    let cfg = *config;
    let manager = SqliteConnectionManager::memory().with_init(move |conn| configure(conn, &cfg));
    let pool = r2d2::Pool::builder().max_size(1).build(manager)?;
    Ok(pool)
}

/// Schema migrations, applied in order via `PRAGMA user_version`.
const MIGRATIONS: &[&str] = &[
    // v1: one row per thread, full state snapshot as JSON.
    "CREATE TABLE IF NOT EXISTS threads (
        thread_id      TEXT PRIMARY KEY,
        schema_version INTEGER NOT NULL,
        state          TEXT NOT NULL,
        created        TEXT NOT NULL,
        updated        TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_threads_updated ON threads(updated);",
];

/// Run pending migrations. Returns the number applied.
pub fn run_migrations(conn: &Connection) -> Result<usize> {
    let current: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    let mut applied = 0;
    for (idx, sql) in MIGRATIONS.iter().enumerate() {
        let version = (idx + 1) as u32;
        if version <= current {
            continue;
        }
        conn.execute_batch(sql)?;
        conn.pragma_update(None, "user_version", version)?;
        debug!(version, "applied migration");
        applied += 1;
    }
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_apply_once() {
        let pool = new_in_memory(&ConnectionConfig::default()).unwrap();
        let conn = pool.get().unwrap();
        assert_eq!(run_migrations(&conn).unwrap(), 1);
        assert_eq!(run_migrations(&conn).unwrap(), 0);

        let version: u32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0)).unwrap();
        assert_eq!(version, MIGRATIONS.len() as u32);
    }

    #[test]
    fn file_pool_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trek.db");
        {
            let pool = new_file(&path, &ConnectionConfig::default()).unwrap();
            let conn = pool.get().unwrap();
            let _ = run_migrations(&conn).unwrap();
            let _ = conn
                .execute(
                    "INSERT INTO threads (thread_id, schema_version, state, created, updated)
                     VALUES ('thr_t', 1, '{}', 'now', 'now')",
                    [],
                )
                .unwrap();
        }
        let pool = new_file(&path, &ConnectionConfig::default()).unwrap();
        let conn = pool.get().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM threads", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
