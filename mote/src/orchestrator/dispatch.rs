//! Tool dispatch pipeline. Per-call sequence: parse arguments, `before_tool`
//! hook, policy decision (allow/deny/approval), heartbeat while the tool
//! runs, invoke, truncate, `after_tool` hook, emit `tool_result`. Grounded on
//! the same `NodeMiddleware`-style "wrap the call" idiom as [`crate::hooks`],
//! generalized to the richer allow/deny/approval outcome set.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::interval;

use crate::error::EngineError;
use crate::events::{EngineEvent, EventSink};
use crate::hooks::HookDispatcher;
use crate::message::{Message, ToolCall};
use crate::policy::{ApprovalGate, ApprovalRequest, PolicyDecision, PolicyEngine};
use crate::tools::{ToolCallContext, ToolOutput, ToolRegistry};

/// Display truncation limit for tool output kept for a UI summary; the full
/// content is retained for the LLM unless the caller enforces its own cap.
pub const DISPLAY_TRUNCATE_BYTES: usize = 500;

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// How long a `require_approval` tool call waits for a decision before the
/// request is treated as denied.
pub const APPROVAL_TIMEOUT: Duration = Duration::from_secs(300);

pub struct ToolDispatcher {
    pub tools: Arc<ToolRegistry>,
    pub policy: Arc<PolicyEngine>,
    pub approvals: Arc<ApprovalGate>,
    pub hooks: Arc<HookDispatcher>,
    pub events: EventSink,
}

impl ToolDispatcher {
    /// Runs the full pipeline for one tool call, always returning `Ok` with a
    /// tool-role message: failures are carried in the message content as an
    /// error tool-result, per spec, rather than surfaced as an `Err`.
    pub async fn dispatch(&self, session_id: &str, call: &ToolCall) -> DispatchOutcome {
        if call.arguments_malformed {
            return self
                .finish(
                    session_id,
                    call,
                    ToolOutput::error("malformed tool arguments: provider sent invalid JSON"),
                )
                .await;
        }
        if !call.arguments.is_object() && !call.arguments.is_null() {
            return self
                .finish(
                    session_id,
                    call,
                    ToolOutput::error("malformed tool arguments: expected a JSON object"),
                )
                .await;
        }

        let before = self.hooks.before_tool(session_id, call).await;
        if !before.proceed {
            let reason = before
                .cancellation_reason
                .unwrap_or_else(|| "tool call cancelled by hook".to_string());
            return self.finish(session_id, call, ToolOutput::error(reason)).await;
        }

        match self.policy.decide(&call.name) {
            PolicyDecision::Deny { reason } => {
                return self
                    .finish(
                        session_id,
                        call,
                        ToolOutput::error(format!("denied by policy: {reason}")),
                    )
                    .await;
            }
            PolicyDecision::RequireApproval => {
                if let Err(output) = self.await_approval(session_id, call).await {
                    return self.finish(session_id, call, output).await;
                }
            }
            PolicyDecision::Allow => {}
        }

        let started = Instant::now();
        let output = self.invoke_with_heartbeat(session_id, call).await;
        tracing::debug!(tool = %call.name, elapsed_ms = started.elapsed().as_millis(), "tool call finished");
        self.finish(session_id, call, output).await
    }

    async fn await_approval(
        &self,
        session_id: &str,
        call: &ToolCall,
    ) -> Result<(), ToolOutput> {
        let request_id = format!("{}:{}", session_id, call.id);
        let rx = self.approvals.register(request_id.clone());
        self.events.emit(EngineEvent::ApprovalRequest {
            request: serde_json::to_value(ApprovalRequest {
                id: request_id.clone(),
                session_id: session_id.to_string(),
                tool_name: call.name.clone(),
                arguments: call.arguments.clone(),
            })
            .unwrap_or_default(),
        });

        match self
            .approvals
            .await_resolution(&request_id, rx, APPROVAL_TIMEOUT)
            .await
        {
            Ok(true) => {
                self.events.emit(EngineEvent::ApprovalResolved {
                    request_id,
                    approved: true,
                });
                Ok(())
            }
            Ok(false) => {
                self.events.emit(EngineEvent::ApprovalResolved {
                    request_id,
                    approved: false,
                });
                Err(ToolOutput::error("tool call denied by approver"))
            }
            Err(EngineError::ApprovalTimedOut(_)) => {
                Err(ToolOutput::error("approval request timed out"))
            }
            Err(other) => Err(ToolOutput::error(other.to_string())),
        }
    }

    async fn invoke_with_heartbeat(&self, session_id: &str, call: &ToolCall) -> ToolOutput {
        let ctx = ToolCallContext {
            session_id: session_id.to_string(),
        };
        let args = if call.arguments.is_null() {
            serde_json::json!({})
        } else {
            call.arguments.clone()
        };
        let name = call.name.clone();
        let tools = self.tools.clone();

        let call_fut = tools.call(&name, args, &ctx);
        tokio::pin!(call_fut);

        let mut ticker = interval(HEARTBEAT_INTERVAL);
        ticker.tick().await; // first tick fires immediately; discard

        loop {
            tokio::select! {
                result = &mut call_fut => {
                    return match result {
                        Ok(output) => output,
                        Err(e) => ToolOutput::error(e.to_string()),
                    };
                }
                _ = ticker.tick() => {
                    self.events.emit(EngineEvent::Heartbeat { tool_call_id: call.id.clone() });
                }
            }
        }
    }

    async fn finish(
        &self,
        session_id: &str,
        call: &ToolCall,
        output: ToolOutput,
    ) -> DispatchOutcome {
        let output = self.hooks.after_tool(session_id, call, output).await;

        self.events.emit(EngineEvent::ToolResult {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            content: display_summary(&output.content),
            is_error: output.is_error,
        });

        DispatchOutcome {
            message: Message::tool(session_id, output.content.clone(), call.id.clone()),
            is_error: output.is_error,
        }
    }
}

pub struct DispatchOutcome {
    pub message: Message,
    pub is_error: bool,
}

/// Truncates only the event-facing summary; the message persisted for the
/// LLM keeps the full content, per §4.4 item 6.
fn display_summary(content: &str) -> String {
    if content.len() <= DISPLAY_TRUNCATE_BYTES {
        content.to_string()
    } else {
        let mut cut = DISPLAY_TRUNCATE_BYTES;
        while !content.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}…", &content[..cut])
    }
}

/// Tracks consecutive tool-execution errors across one orchestrator loop,
/// failing the run once `max` is reached (§4.3 step h).
pub struct ConsecutiveErrorBudget {
    count: u32,
    max: u32,
}

impl ConsecutiveErrorBudget {
    pub fn new(max: u32) -> Self {
        Self { count: 0, max }
    }

    /// Records one dispatch outcome; returns `true` if the budget is now
    /// exhausted.
    pub fn record(&mut self, is_error: bool) -> bool {
        if is_error {
            self.count += 1;
        } else {
            self.count = 0;
        }
        self.count >= self.max
    }
}
