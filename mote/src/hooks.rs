//! Hook dispatcher: the spec's own addition, with no teacher counterpart.
//! Grounded on the general async-trait "wrap the inner call" idiom the
//! teacher uses for `graph::node_middleware::NodeMiddleware` — here
//! generalized from a single around-node wrapper into five named call sites
//! a hook may observe or short-circuit.

use async_trait::async_trait;

use crate::message::{Message, ToolCall};
use crate::tools::ToolOutput;

/// Whether the orchestrator should proceed past this hook point.
#[derive(Clone, Debug)]
pub struct HookOutcome {
    pub proceed: bool,
    /// Set by `before_tool` to short-circuit with a specific tool-result
    /// message instead of the default "cancelled" text.
    pub cancellation_reason: Option<String>,
}

impl HookOutcome {
    pub fn proceed() -> Self {
        Self {
            proceed: true,
            cancellation_reason: None,
        }
    }

    pub fn cancel(reason: impl Into<String>) -> Self {
        Self {
            proceed: false,
            cancellation_reason: Some(reason.into()),
        }
    }
}

/// One registered hook. Every method has a default no-op/pass-through
/// implementation so an implementor only overrides the points it cares
/// about.
#[async_trait]
pub trait Hook: Send + Sync {
    async fn session_create(&self, _session_id: &str) {}

    async fn before_message(&self, _session_id: &str, _message: &Message) -> HookOutcome {
        HookOutcome::proceed()
    }

    async fn before_tool(
        &self,
        _session_id: &str,
        _tool_call: &ToolCall,
    ) -> HookOutcome {
        HookOutcome::proceed()
    }

    /// May rewrite the tool's output before it becomes a tool-role message.
    async fn after_tool(
        &self,
        _session_id: &str,
        _tool_call: &ToolCall,
        output: ToolOutput,
    ) -> ToolOutput {
        output
    }

    async fn after_message(&self, _session_id: &str, _message: &Message) {}
}

/// Runs every registered hook, in registration order, at each of the five
/// named call sites. `before_message`/`before_tool` stop at the first hook
/// that returns `proceed: false`.
#[derive(Default)]
pub struct HookDispatcher {
    hooks: Vec<std::sync::Arc<dyn Hook>>,
}

impl HookDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, hook: std::sync::Arc<dyn Hook>) {
        self.hooks.push(hook);
    }

    pub async fn session_create(&self, session_id: &str) {
        for hook in &self.hooks {
            hook.session_create(session_id).await;
        }
    }

    pub async fn before_message(&self, session_id: &str, message: &Message) -> HookOutcome {
        for hook in &self.hooks {
            let outcome = hook.before_message(session_id, message).await;
            if !outcome.proceed {
                return outcome;
            }
        }
        HookOutcome::proceed()
    }

    pub async fn before_tool(&self, session_id: &str, tool_call: &ToolCall) -> HookOutcome {
        for hook in &self.hooks {
            let outcome = hook.before_tool(session_id, tool_call).await;
            if !outcome.proceed {
                return outcome;
            }
        }
        HookOutcome::proceed()
    }

    pub async fn after_tool(
        &self,
        session_id: &str,
        tool_call: &ToolCall,
        mut output: ToolOutput,
    ) -> ToolOutput {
        for hook in &self.hooks {
            output = hook.after_tool(session_id, tool_call, output).await;
        }
        output
    }

    pub async fn after_message(&self, session_id: &str, message: &Message) {
        for hook in &self.hooks {
            hook.after_message(session_id, message).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct BlockingHook;

    #[async_trait]
    impl Hook for BlockingHook {
        async fn before_tool(&self, _session_id: &str, _tool_call: &ToolCall) -> HookOutcome {
            HookOutcome::cancel("blocked by policy hook")
        }
    }

    struct RewritingHook;

    #[async_trait]
    impl Hook for RewritingHook {
        async fn after_tool(
            &self,
            _session_id: &str,
            _tool_call: &ToolCall,
            mut output: ToolOutput,
        ) -> ToolOutput {
            output.content = format!("[rewritten] {}", output.content);
            output
        }
    }

    struct FlagOnCreate(Arc<AtomicBool>);

    #[async_trait]
    impl Hook for FlagOnCreate {
        async fn session_create(&self, _session_id: &str) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    fn call() -> ToolCall {
        ToolCall {
            id: "c1".to_string(),
            name: "clock".to_string(),
            arguments: serde_json::json!({}),
            arguments_malformed: false,
        }
    }

    #[tokio::test]
    async fn before_tool_short_circuits_on_first_blocking_hook() {
        let mut dispatcher = HookDispatcher::new();
        dispatcher.register(Arc::new(BlockingHook));
        let outcome = dispatcher.before_tool("s1", &call()).await;
        assert!(!outcome.proceed);
        assert_eq!(outcome.cancellation_reason.as_deref(), Some("blocked by policy hook"));
    }

    #[tokio::test]
    async fn after_tool_applies_rewrites_in_order() {
        let mut dispatcher = HookDispatcher::new();
        dispatcher.register(Arc::new(RewritingHook));
        let out = dispatcher
            .after_tool("s1", &call(), ToolOutput::ok("hi"))
            .await;
        assert_eq!(out.content, "[rewritten] hi");
    }

    #[tokio::test]
    async fn session_create_runs_every_registered_hook() {
        let flag = Arc::new(AtomicBool::new(false));
        let mut dispatcher = HookDispatcher::new();
        dispatcher.register(Arc::new(FlagOnCreate(flag.clone())));
        dispatcher.session_create("s1").await;
        assert!(flag.load(Ordering::SeqCst));
    }
}
