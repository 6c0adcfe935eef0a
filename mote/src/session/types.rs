//! Session and run data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of input produced a run on this session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    Chat,
    Cron,
    Channel,
}

/// Persistent conversational state keyed by an opaque id.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub model: Option<String>,
    pub scenario: Scenario,
    #[serde(default)]
    pub selected_skills: Vec<String>,
    pub workspace: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl Session {
    pub fn new(id: impl Into<String>, scenario: Scenario) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            created_at: now,
            updated_at: now,
            model: None,
            scenario,
            selected_skills: Vec::new(),
            workspace: None,
            metadata: serde_json::Value::Object(Default::default()),
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Terminal or in-flight state of one run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunState {
    /// True for `completed`, `failed`, `cancelled` — once entered, a run never leaves it.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Completed | RunState::Failed | RunState::Cancelled
        )
    }

    /// Whether a transition from `self` to `next` is legal under the monotone
    /// `pending -> running -> {completed, failed, cancelled}` ordering.
    pub fn can_transition_to(&self, next: RunState) -> bool {
        use RunState::*;
        match (self, next) {
            (Pending, Running) => true,
            (Pending, Cancelled) => true,
            (Running, Completed) | (Running, Failed) | (Running, Cancelled) => true,
            _ => false,
        }
    }
}

/// One user-input-to-terminal-event execution on a session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub session_id: String,
    pub state: RunState,
    pub input: String,
    pub output: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Run {
    pub fn new(session_id: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            state: RunState::Pending,
            input: input.into(),
            output: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Transitions to `next`, panicking on an illegal transition — callers are
    /// expected to check `RunState::can_transition_to` first in contexts where
    /// an illegal request is reachable from outside the engine.
    pub fn transition(&mut self, next: RunState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal run state transition: {:?} -> {:?}",
            self.state,
            next
        );
        let now = Utc::now();
        match next {
            RunState::Running => self.started_at = Some(now),
            RunState::Completed | RunState::Failed | RunState::Cancelled => {
                self.completed_at = Some(now)
            }
            RunState::Pending => {}
        }
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_state_transitions_are_monotone() {
        assert!(RunState::Pending.can_transition_to(RunState::Running));
        assert!(RunState::Running.can_transition_to(RunState::Completed));
        assert!(!RunState::Completed.can_transition_to(RunState::Running));
        assert!(!RunState::Running.can_transition_to(RunState::Pending));
    }

    #[test]
    fn new_run_starts_pending_and_not_terminal() {
        let run = Run::new("s1", "hello");
        assert_eq!(run.state, RunState::Pending);
        assert!(!run.state.is_terminal());
    }

    #[test]
    fn transition_to_completed_sets_completed_at() {
        let mut run = Run::new("s1", "hello");
        run.transition(RunState::Running);
        run.transition(RunState::Completed);
        assert!(run.completed_at.is_some());
        assert!(run.state.is_terminal());
    }
}
