//! Shared SQLite plumbing: connection configuration and the embedded
//! migration runner. The concrete storage engine choice is an external
//! collaborator's concern; this module only fixes rusqlite as the pack's
//! bundled implementation and the migration bookkeeping shape.

mod migrations;

pub use migrations::run_migrations;

use rusqlite::Connection;

use crate::error::EngineError;

/// Opens a connection configured the way the spec's persisted-state section
/// requires: WAL journal, foreign keys on, a generous busy timeout, normal
/// synchronous mode, and migrations applied.
pub fn open_connection(path: impl AsRef<std::path::Path>) -> Result<Connection, EngineError> {
    let conn = Connection::open(path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", true)?;
    conn.pragma_update(None, "busy_timeout", 30_000i64)?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    run_migrations(&conn)?;
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_connection_applies_migrations_idempotently() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mote.db");
        {
            let conn = open_connection(&path).unwrap();
            let version: i64 = conn
                .query_row("SELECT MAX(version) FROM _migrations", [], |r| r.get(0))
                .unwrap();
            assert_eq!(version, migrations::SCRIPTS.len() as i64);
        }
        {
            let conn = open_connection(&path).unwrap();
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM _migrations", [], |r| r.get(0))
                .unwrap();
            assert_eq!(count, migrations::SCRIPTS.len() as i64);
        }
    }
}
