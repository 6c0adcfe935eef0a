//! Policy engine and approval gate for tool dispatch. Generalized from the
//! teacher's `helve::prompt::{ApprovalPolicy, tools_requiring_approval}`
//! (a fixed destructive/always policy baked into the system prompt) into the
//! full `allow`/`deny`/`require_approval` outcome set the tool dispatch
//! pipeline needs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::oneshot;

use crate::error::EngineError;

/// What the policy engine decided for one tool call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PolicyDecision {
    Allow,
    Deny { reason: String },
    RequireApproval,
}

/// A rule mapping a tool name to the decision it always produces. Tools with
/// no matching rule default to `Allow`.
#[derive(Clone, Debug)]
pub enum ToolPolicy {
    Allow,
    Deny { reason: String },
    RequireApproval,
}

/// Per-tool policy table. An embedder builds this once at startup from
/// whatever approval policy it wants (the teacher's `DestructiveOnly`/
/// `Always` presets are expressible as a handful of `RequireApproval`
/// entries).
#[derive(Clone, Default)]
pub struct PolicyEngine {
    rules: HashMap<String, ToolPolicy>,
}

impl PolicyEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule(mut self, tool_name: impl Into<String>, policy: ToolPolicy) -> Self {
        self.rules.insert(tool_name.into(), policy);
        self
    }

    pub fn decide(&self, tool_name: &str) -> PolicyDecision {
        match self.rules.get(tool_name) {
            None | Some(ToolPolicy::Allow) => PolicyDecision::Allow,
            Some(ToolPolicy::Deny { reason }) => PolicyDecision::Deny {
                reason: reason.clone(),
            },
            Some(ToolPolicy::RequireApproval) => PolicyDecision::RequireApproval,
        }
    }
}

/// A pending approval request surfaced to the hub (`ApprovalRequest` event)
/// and resolved by the matching `ApprovalResolved` inbound message.
#[derive(Clone, Debug)]
pub struct ApprovalRequest {
    pub id: String,
    pub session_id: String,
    pub tool_name: String,
    pub arguments: serde_json::Value,
}

/// Resolves approval requests via a `oneshot` channel keyed by request id.
/// Decided in-memory only (not persisted across restarts): an approval
/// outstanding when the process restarts is lost and will time out, which is
/// acceptable since the session's run itself does not survive a restart
/// either.
#[derive(Clone, Default)]
pub struct ApprovalGate {
    pending: Arc<DashMap<String, oneshot::Sender<bool>>>,
}

impl ApprovalGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new request and returns the receiver the caller awaits
    /// (with a deadline) for the resolution.
    pub fn register(&self, request_id: impl Into<String>) -> oneshot::Receiver<bool> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(request_id.into(), tx);
        rx
    }

    /// Resolves a pending request. Returns `false` if no request with that
    /// id is outstanding (already resolved, timed out, or never registered).
    pub fn resolve(&self, request_id: &str, approved: bool) -> bool {
        match self.pending.remove(request_id) {
            Some((_, tx)) => tx.send(approved).is_ok(),
            None => false,
        }
    }

    /// Awaits resolution up to `timeout`; denial or timeout both become an
    /// error tool-result at the call site, per the tool dispatch pipeline.
    pub async fn await_resolution(
        &self,
        request_id: &str,
        rx: oneshot::Receiver<bool>,
        timeout: Duration,
    ) -> Result<bool, EngineError> {
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(approved)) => Ok(approved),
            Ok(Err(_)) => Err(EngineError::ApprovalTimedOut(request_id.to_string())),
            Err(_) => {
                self.pending.remove(request_id);
                Err(EngineError::ApprovalTimedOut(request_id.to_string()))
            }
        }
    }
}
