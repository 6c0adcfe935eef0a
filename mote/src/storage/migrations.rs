//! Embedded numbered SQL migrations, applied in ascending version order
//! inside one transaction each. The applied version is recorded on success.

use rusqlite::Connection;

use crate::error::EngineError;

/// Each entry is `(version, sql)`. New migrations are appended; existing
/// entries are never edited once released.
pub static SCRIPTS: &[(i64, &str)] = &[
    (
        1,
        r#"
        CREATE TABLE sessions (
            id TEXT PRIMARY KEY,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            model TEXT,
            scenario TEXT NOT NULL,
            selected_skills TEXT NOT NULL DEFAULT '[]',
            workspace TEXT,
            metadata TEXT NOT NULL DEFAULT '{}'
        );
        "#,
    ),
    (
        2,
        r#"
        CREATE TABLE messages (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
            role TEXT NOT NULL,
            content TEXT NOT NULL,
            tool_calls TEXT NOT NULL DEFAULT '[]',
            tool_call_id TEXT,
            created_at TEXT NOT NULL,
            seq INTEGER NOT NULL
        );
        CREATE INDEX messages_session_seq ON messages(session_id, seq);
        "#,
    ),
    (
        3,
        r#"
        CREATE TABLE kv (
            k TEXT PRIMARY KEY,
            v TEXT NOT NULL
        );
        CREATE TABLE cron_jobs (
            name TEXT PRIMARY KEY,
            schedule TEXT NOT NULL,
            session_id TEXT,
            enabled INTEGER NOT NULL DEFAULT 1,
            last_run_at TEXT
        );
        "#,
    ),
    (
        4,
        r#"
        CREATE TABLE runs (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
            state TEXT NOT NULL,
            input TEXT NOT NULL,
            output TEXT,
            error TEXT,
            created_at TEXT NOT NULL,
            started_at TEXT,
            completed_at TEXT
        );
        CREATE INDEX runs_session_created ON runs(session_id, created_at);
        "#,
    ),
];

/// Applies every script in `SCRIPTS` whose version is greater than the
/// current `_migrations` max version. Running on an already-current database
/// is a no-op (idempotent).
pub fn run_migrations(conn: &Connection) -> Result<(), EngineError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (version INTEGER PRIMARY KEY, applied_at TEXT NOT NULL)",
        [],
    )?;
    let current: i64 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |r| r.get(0))?;

    for (version, sql) in SCRIPTS {
        if *version <= current {
            continue;
        }
        conn.execute_batch("BEGIN IMMEDIATE;")?;
        let result = (|| -> Result<(), EngineError> {
            conn.execute_batch(sql)?;
            conn.execute(
                "INSERT INTO _migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, chrono::Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })();
        match result {
            Ok(()) => conn.execute_batch("COMMIT;")?,
            Err(e) => {
                conn.execute_batch("ROLLBACK;")?;
                return Err(e);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_twice_on_fresh_db_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, SCRIPTS.len() as i64);
    }

    #[test]
    fn final_version_matches_script_count() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM _migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, SCRIPTS.len() as i64);
    }
}
