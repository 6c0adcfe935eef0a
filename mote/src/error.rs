//! Engine-wide error type.

use thiserror::Error;

/// Errors raised by the core engine. Control-plane errors abort the call that
/// raised them; run-scoped errors (`RetryableProviderError`, `ContextWindowExceeded`,
/// `PolicyDenied`, `ApprovalTimedOut`, `ToolExecutionError`) are recovered locally by the
/// orchestrator and never escape `run_once`.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("session closed: {0}")]
    SessionClosed(String),

    #[error("run queue full for session {0}")]
    QueueFull(String),

    #[error("run cancelled: {0}")]
    RunCancelled(String),

    #[error("run not found: {0}")]
    RunNotFound(String),

    #[error("context window exceeded")]
    ContextWindowExceeded,

    #[error("transient provider error: {0}")]
    RetryableProviderError(String),

    #[error("fatal provider error: {0}")]
    FatalProviderError(String),

    #[error("policy denied tool {tool}: {reason}")]
    PolicyDenied { tool: String, reason: String },

    #[error("approval timed out for request {0}")]
    ApprovalTimedOut(String),

    #[error("tool execution error: {0}")]
    ToolExecutionError(String),

    #[error("hook interrupted the run: {0}")]
    HookInterrupted(String),

    #[error("run was cancelled by the caller")]
    ContextCancelled,

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("max iterations reached")]
    MaxIterationsReached,

    #[error("recursion limit exceeded for agent {agent} (max_recursion={max})")]
    RecursionLimitExceeded { agent: String, max: u32 },

    #[error("agent not found: {0}")]
    AgentNotFound(String),

    #[error("compaction rejected: result would drop all conversational messages")]
    CompactionRejected,
}

impl From<rusqlite::Error> for EngineError {
    fn from(e: rusqlite::Error) -> Self {
        EngineError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Serialization(e.to_string())
    }
}
