//! Persistence boundary for sessions and messages.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::params;
use tokio::sync::Mutex;

use crate::error::EngineError;
use crate::message::{Message, Role, ToolCall};

use super::types::{Run, RunState, Scenario, Session};

/// Storage boundary the session manager persists through. Grounded on the
/// teacher's `Checkpointer<S>` shape: a narrow async trait with one
/// implementation backed by SQLite and `spawn_blocking`.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get_session(&self, id: &str) -> Result<Option<Session>, EngineError>;
    async fn create_session(&self, session: Session) -> Result<Session, EngineError>;
    async fn delete_session(&self, id: &str) -> Result<(), EngineError>;
    async fn add_message(&self, message: Message) -> Result<Message, EngineError>;
    async fn get_messages(&self, session_id: &str) -> Result<Vec<Message>, EngineError>;
    /// Transactional replace: the observer sees either the full pre- or
    /// post-compaction list, never a mixture.
    async fn replace_messages(
        &self,
        session_id: &str,
        messages: Vec<Message>,
    ) -> Result<(), EngineError>;
    /// Overwrites a session's `metadata` column, used by the PDA engine to
    /// checkpoint its frame stack between ticks.
    async fn update_metadata(
        &self,
        session_id: &str,
        metadata: serde_json::Value,
    ) -> Result<(), EngineError>;
    /// Persists a newly created run (`Pending`), enqueued on the session's
    /// worker but not yet started.
    async fn create_run(&self, run: Run) -> Result<Run, EngineError>;
    /// Moves a run to `next`, recording `output`/`error` when the transition
    /// is terminal. `started_at`/`completed_at` are stamped the same way
    /// [`Run::transition`] stamps them in memory.
    async fn transition_run(
        &self,
        run_id: &str,
        next: RunState,
        output: Option<String>,
        error: Option<String>,
    ) -> Result<(), EngineError>;
    async fn get_run(&self, run_id: &str) -> Result<Option<Run>, EngineError>;
}

/// SQLite-backed [`SessionStore`]. Opens a fresh connection per operation
/// inside `spawn_blocking`, the same idiom as the teacher's `SqliteSaver`.
pub struct SqliteSessionStore {
    db_path: PathBuf,
    // Serializes writers beyond SQLite's own locking so `replace_messages`'s
    // delete+reinsert pair is observed atomically by concurrent readers.
    write_lock: Arc<Mutex<()>>,
}

impl SqliteSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let db_path = path.into();
        // Ensure the file exists and migrations are applied before any
        // spawn_blocking call opens its own connection.
        crate::storage::open_connection(&db_path)?;
        Ok(Self {
            db_path,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

}

fn role_to_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

fn str_to_role(s: &str) -> Role {
    match s {
        "system" => Role::System,
        "user" => Role::User,
        "tool" => Role::Tool,
        _ => Role::Assistant,
    }
}

fn scenario_to_str(s: Scenario) -> &'static str {
    match s {
        Scenario::Chat => "chat",
        Scenario::Cron => "cron",
        Scenario::Channel => "channel",
    }
}

fn str_to_scenario(s: &str) -> Scenario {
    match s {
        "cron" => Scenario::Cron,
        "channel" => Scenario::Channel,
        _ => Scenario::Chat,
    }
}

fn run_state_to_str(s: RunState) -> &'static str {
    match s {
        RunState::Pending => "pending",
        RunState::Running => "running",
        RunState::Completed => "completed",
        RunState::Failed => "failed",
        RunState::Cancelled => "cancelled",
    }
}

fn str_to_run_state(s: &str) -> RunState {
    match s {
        "running" => RunState::Running,
        "completed" => RunState::Completed,
        "failed" => RunState::Failed,
        "cancelled" => RunState::Cancelled,
        _ => RunState::Pending,
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn get_session(&self, id: &str) -> Result<Option<Session>, EngineError> {
        let db_path = self.db_path.clone();
        let id = id.to_string();
        tokio::task::spawn_blocking(move || -> Result<Option<Session>, EngineError> {
            let conn = crate::storage::open_connection(&db_path)?;
            let mut stmt = conn.prepare(
                "SELECT id, created_at, updated_at, model, scenario, selected_skills, workspace, metadata
                 FROM sessions WHERE id = ?1",
            )?;
            let mut rows = stmt.query(params![id])?;
            let Some(row) = rows.next()? else {
                return Ok(None);
            };
            let selected_skills: String = row.get(5)?;
            let metadata: String = row.get(7)?;
            Ok(Some(Session {
                id: row.get(0)?,
                created_at: row.get::<_, String>(1)?.parse().map_err(|e: chrono::ParseError| {
                    EngineError::Storage(e.to_string())
                })?,
                updated_at: row.get::<_, String>(2)?.parse().map_err(|e: chrono::ParseError| {
                    EngineError::Storage(e.to_string())
                })?,
                model: row.get(3)?,
                scenario: str_to_scenario(&row.get::<_, String>(4)?),
                selected_skills: serde_json::from_str(&selected_skills)?,
                workspace: row.get(6)?,
                metadata: serde_json::from_str(&metadata)?,
            }))
        })
        .await
        .map_err(|e| EngineError::Storage(e.to_string()))?
    }

    async fn create_session(&self, session: Session) -> Result<Session, EngineError> {
        let db_path = self.db_path.clone();
        let s = session.clone();
        tokio::task::spawn_blocking(move || -> Result<(), EngineError> {
            let conn = crate::storage::open_connection(&db_path)?;
            conn.execute(
                "INSERT INTO sessions (id, created_at, updated_at, model, scenario, selected_skills, workspace, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    s.id,
                    s.created_at.to_rfc3339(),
                    s.updated_at.to_rfc3339(),
                    s.model,
                    scenario_to_str(s.scenario),
                    serde_json::to_string(&s.selected_skills)?,
                    s.workspace,
                    serde_json::to_string(&s.metadata)?,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(|e| EngineError::Storage(e.to_string()))??;
        Ok(session)
    }

    async fn delete_session(&self, id: &str) -> Result<(), EngineError> {
        let db_path = self.db_path.clone();
        let id = id.to_string();
        tokio::task::spawn_blocking(move || -> Result<(), EngineError> {
            let conn = crate::storage::open_connection(&db_path)?;
            conn.execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
            Ok(())
        })
        .await
        .map_err(|e| EngineError::Storage(e.to_string()))?
    }

    async fn add_message(&self, message: Message) -> Result<Message, EngineError> {
        let db_path = self.db_path.clone();
        let m = message.clone();
        let lock = self.write_lock.clone();
        tokio::task::spawn_blocking(move || -> Result<(), EngineError> {
            let _guard = lock.blocking_lock();
            let conn = crate::storage::open_connection(&db_path)?;
            let seq: i64 = conn.query_row(
                "SELECT COALESCE(MAX(seq), -1) + 1 FROM messages WHERE session_id = ?1",
                params![m.session_id],
                |r| r.get(0),
            )?;
            conn.execute(
                "INSERT INTO messages (id, session_id, role, content, tool_calls, tool_call_id, created_at, seq)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    m.id,
                    m.session_id,
                    role_to_str(m.role),
                    m.content,
                    serde_json::to_string(&m.tool_calls)?,
                    m.tool_call_id,
                    m.created_at.to_rfc3339(),
                    seq,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(|e| EngineError::Storage(e.to_string()))??;
        Ok(message)
    }

    async fn get_messages(&self, session_id: &str) -> Result<Vec<Message>, EngineError> {
        let db_path = self.db_path.clone();
        let session_id = session_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<Vec<Message>, EngineError> {
            let conn = crate::storage::open_connection(&db_path)?;
            let mut stmt = conn.prepare(
                "SELECT id, session_id, role, content, tool_calls, tool_call_id, created_at
                 FROM messages WHERE session_id = ?1 ORDER BY seq ASC",
            )?;
            let rows = stmt.query_map(params![session_id], |row| {
                let tool_calls_json: String = row.get(4)?;
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    tool_calls_json,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, String>(6)?,
                ))
            })?;
            let mut messages = Vec::new();
            for row in rows {
                let (id, session_id, role, content, tool_calls_json, tool_call_id, created_at) =
                    row?;
                let tool_calls: Vec<ToolCall> = serde_json::from_str(&tool_calls_json)?;
                messages.push(Message {
                    id,
                    session_id,
                    role: str_to_role(&role),
                    content,
                    tool_calls,
                    tool_call_id,
                    created_at: created_at
                        .parse()
                        .map_err(|e: chrono::ParseError| EngineError::Storage(e.to_string()))?,
                });
            }
            Ok(messages)
        })
        .await
        .map_err(|e| EngineError::Storage(e.to_string()))?
    }

    async fn replace_messages(
        &self,
        session_id: &str,
        messages: Vec<Message>,
    ) -> Result<(), EngineError> {
        let db_path = self.db_path.clone();
        let session_id = session_id.to_string();
        let lock = self.write_lock.clone();
        tokio::task::spawn_blocking(move || -> Result<(), EngineError> {
            let _guard = lock.blocking_lock();
            let mut conn = crate::storage::open_connection(&db_path)?;
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM messages WHERE session_id = ?1", params![session_id])?;
            for (seq, m) in messages.iter().enumerate() {
                tx.execute(
                    "INSERT INTO messages (id, session_id, role, content, tool_calls, tool_call_id, created_at, seq)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        m.id,
                        m.session_id,
                        role_to_str(m.role),
                        m.content,
                        serde_json::to_string(&m.tool_calls)?,
                        m.tool_call_id,
                        m.created_at.to_rfc3339(),
                        seq as i64,
                    ],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(|e| EngineError::Storage(e.to_string()))?
    }

    async fn update_metadata(
        &self,
        session_id: &str,
        metadata: serde_json::Value,
    ) -> Result<(), EngineError> {
        let db_path = self.db_path.clone();
        let session_id = session_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<(), EngineError> {
            let conn = crate::storage::open_connection(&db_path)?;
            conn.execute(
                "UPDATE sessions SET metadata = ?1, updated_at = ?2 WHERE id = ?3",
                params![
                    serde_json::to_string(&metadata)?,
                    chrono::Utc::now().to_rfc3339(),
                    session_id,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(|e| EngineError::Storage(e.to_string()))?
    }

    async fn create_run(&self, run: Run) -> Result<Run, EngineError> {
        let db_path = self.db_path.clone();
        let r = run.clone();
        tokio::task::spawn_blocking(move || -> Result<(), EngineError> {
            let conn = crate::storage::open_connection(&db_path)?;
            conn.execute(
                "INSERT INTO runs (id, session_id, state, input, output, error, created_at, started_at, completed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    r.id,
                    r.session_id,
                    run_state_to_str(r.state),
                    r.input,
                    r.output,
                    r.error,
                    r.created_at.to_rfc3339(),
                    r.started_at.map(|t| t.to_rfc3339()),
                    r.completed_at.map(|t| t.to_rfc3339()),
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(|e| EngineError::Storage(e.to_string()))??;
        Ok(run)
    }

    async fn transition_run(
        &self,
        run_id: &str,
        next: RunState,
        output: Option<String>,
        error: Option<String>,
    ) -> Result<(), EngineError> {
        let db_path = self.db_path.clone();
        let run_id = run_id.to_string();
        let now = chrono::Utc::now().to_rfc3339();
        tokio::task::spawn_blocking(move || -> Result<(), EngineError> {
            let conn = crate::storage::open_connection(&db_path)?;
            match next {
                RunState::Running => {
                    conn.execute(
                        "UPDATE runs SET state = ?1, started_at = ?2 WHERE id = ?3",
                        params![run_state_to_str(next), now, run_id],
                    )?;
                }
                RunState::Completed | RunState::Failed | RunState::Cancelled => {
                    conn.execute(
                        "UPDATE runs SET state = ?1, output = ?2, error = ?3, completed_at = ?4 WHERE id = ?5",
                        params![run_state_to_str(next), output, error, now, run_id],
                    )?;
                }
                RunState::Pending => {
                    conn.execute(
                        "UPDATE runs SET state = ?1 WHERE id = ?2",
                        params![run_state_to_str(next), run_id],
                    )?;
                }
            }
            Ok(())
        })
        .await
        .map_err(|e| EngineError::Storage(e.to_string()))?
    }

    async fn get_run(&self, run_id: &str) -> Result<Option<Run>, EngineError> {
        let db_path = self.db_path.clone();
        let run_id = run_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<Option<Run>, EngineError> {
            let conn = crate::storage::open_connection(&db_path)?;
            let mut stmt = conn.prepare(
                "SELECT id, session_id, state, input, output, error, created_at, started_at, completed_at
                 FROM runs WHERE id = ?1",
            )?;
            let mut rows = stmt.query(params![run_id])?;
            let Some(row) = rows.next()? else {
                return Ok(None);
            };
            let parse_ts = |s: String| -> Result<DateTime<Utc>, EngineError> {
                s.parse()
                    .map_err(|e: chrono::ParseError| EngineError::Storage(e.to_string()))
            };
            let started_at: Option<String> = row.get(7)?;
            let completed_at: Option<String> = row.get(8)?;
            Ok(Some(Run {
                id: row.get(0)?,
                session_id: row.get(1)?,
                state: str_to_run_state(&row.get::<_, String>(2)?),
                input: row.get(3)?,
                output: row.get(4)?,
                error: row.get(5)?,
                created_at: parse_ts(row.get(6)?)?,
                started_at: started_at.map(parse_ts).transpose()?,
                completed_at: completed_at.map(parse_ts).transpose()?,
            }))
        })
        .await
        .map_err(|e| EngineError::Storage(e.to_string()))?
    }
}
