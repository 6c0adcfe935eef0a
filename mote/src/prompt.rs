//! Message / system-prompt builder. Grounded on
//! `helve::{assemble_system_prompt, ApprovalPolicy}`'s base-prompt-plus-
//! sections assembly, generalized from "workdir + approval" wording to the
//! richer builder/override/static/default priority chain and per-iteration
//! MCP tool-description mode the orchestrator needs.

use async_trait::async_trait;

use crate::message::{Message, Role};
use crate::session::Session;
use crate::tools::ToolSpec;

/// Whether the system prompt should carry full MCP tool descriptions (first
/// iteration) or just a name summary (subsequent iterations), set per
/// iteration by the orchestrator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum McpToolMode {
    Full,
    Summary,
}

/// The richest system-prompt source: injects memory-search hits on the
/// user's input, the active skill/MCP tool lists, prompt fragments, and the
/// workspace path slot. An embedder supplies a concrete implementation;
/// `PromptBuilder` falls back to lower-priority sources when this returns
/// `None` or is absent entirely.
#[async_trait]
pub trait SystemPromptBuilder: Send + Sync {
    async fn build(
        &self,
        session: &Session,
        user_input: &str,
        mcp_tools: &[ToolSpec],
        mcp_mode: McpToolMode,
    ) -> Option<String>;
}

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// Resolves a selected skill id to its prompt fragment. The skill/prompt
/// manifest parser itself is out of scope; an embedder that scans skill
/// manifests at startup supplies a concrete implementation.
pub trait SkillPromptSource: Send + Sync {
    fn prompt_fragment(&self, skill_id: &str) -> Option<String>;
}

/// Resolves a session's selected-skill set to prompt sections, in selection
/// order, dropping any id the source does not recognize.
pub fn skill_sections(session: &Session, source: &dyn SkillPromptSource) -> Vec<String> {
    session
        .selected_skills
        .iter()
        .filter_map(|id| source.prompt_fragment(id))
        .collect()
}

/// Assembles the ordered message list the provider call and the compactor
/// both operate on, per the builder/override/static/default priority chain.
pub struct PromptBuilder {
    pub builder: Option<std::sync::Arc<dyn SystemPromptBuilder>>,
    pub static_prompt: Option<String>,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self {
            builder: None,
            static_prompt: None,
        }
    }
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// `skill_sections` are the already-loaded content of the session's
    /// selected skills, appended verbatim after the system prompt.
    #[allow(clippy::too_many_arguments)]
    pub async fn build(
        &self,
        session: &Session,
        history: &[Message],
        user_input: &str,
        per_request_override: Option<&str>,
        skill_sections: &[String],
        mcp_tools: &[ToolSpec],
        mcp_mode: McpToolMode,
    ) -> Vec<Message> {
        let system_prompt = self
            .system_prompt(session, user_input, mcp_tools, mcp_mode, per_request_override)
            .await;

        let mut messages = Vec::with_capacity(history.len() + 2);
        let mut system_text = system_prompt;
        for section in skill_sections {
            system_text.push_str("\n\n");
            system_text.push_str(section);
        }
        messages.push(Message::system(session.id.clone(), system_text));
        messages.extend_from_slice(history);
        messages.push(Message::user(session.id.clone(), user_input));

        sanitize(messages)
    }

    /// Exposed so the orchestrator can rebuild just the system-prompt text
    /// when the MCP tool-description mode changes between iterations,
    /// without re-running the whole message assembly.
    pub(crate) async fn system_prompt(
        &self,
        session: &Session,
        user_input: &str,
        mcp_tools: &[ToolSpec],
        mcp_mode: McpToolMode,
        per_request_override: Option<&str>,
    ) -> String {
        if let Some(builder) = &self.builder {
            if let Some(prompt) = builder.build(session, user_input, mcp_tools, mcp_mode).await {
                return prompt;
            }
        }
        if let Some(override_prompt) = per_request_override {
            return override_prompt.to_string();
        }
        if let Some(static_prompt) = &self.static_prompt {
            return static_prompt.clone();
        }
        DEFAULT_SYSTEM_PROMPT.to_string()
    }
}

/// Drops tool-role messages whose `tool_call_id` does not match an earlier
/// assistant tool call in the same list, and drops malformed tool-call
/// entries (empty name or id) from assistant messages. Idempotent: running
/// it again on its own output is a no-op.
fn sanitize(messages: Vec<Message>) -> Vec<Message> {
    let mut known_call_ids = std::collections::HashSet::new();
    let mut out = Vec::with_capacity(messages.len());

    for mut message in messages {
        if message.role == Role::Assistant && !message.tool_calls.is_empty() {
            message
                .tool_calls
                .retain(|tc| !tc.id.is_empty() && !tc.name.is_empty());
            for tc in &message.tool_calls {
                known_call_ids.insert(tc.id.clone());
            }
        }
        if message.role == Role::Tool {
            match &message.tool_call_id {
                Some(id) if known_call_ids.contains(id) => {}
                _ => continue,
            }
        }
        out.push(message);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ToolCall;
    use crate::session::Scenario;

    fn session() -> Session {
        Session::new("s1", Scenario::Chat)
    }

    #[tokio::test]
    async fn default_prompt_is_used_when_no_other_source_is_configured() {
        let builder = PromptBuilder::new();
        let messages = builder
            .build(&session(), &[], "hi", None, &[], &[], McpToolMode::Summary)
            .await;
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[0].content, DEFAULT_SYSTEM_PROMPT);
        assert_eq!(messages.last().unwrap().content, "hi");
    }

    #[tokio::test]
    async fn per_request_override_beats_static_prompt() {
        let builder = PromptBuilder {
            builder: None,
            static_prompt: Some("static".to_string()),
        };
        let messages = builder
            .build(&session(), &[], "hi", Some("override"), &[], &[], McpToolMode::Summary)
            .await;
        assert_eq!(messages[0].content, "override");
    }

    #[tokio::test]
    async fn skill_sections_are_appended_after_the_base_prompt() {
        let builder = PromptBuilder::new();
        let messages = builder
            .build(
                &session(),
                &[],
                "hi",
                None,
                &["SKILL: frobnicate".to_string()],
                &[],
                McpToolMode::Summary,
            )
            .await;
        assert!(messages[0].content.contains("SKILL: frobnicate"));
    }

    #[test]
    fn sanitize_drops_orphaned_tool_results() {
        let messages = vec![
            Message::user("s1", "hi"),
            Message::tool("s1", "result", "missing-call-id"),
        ];
        let out = sanitize(messages);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn sanitize_keeps_tool_results_matching_a_known_call() {
        let messages = vec![
            Message::assistant(
                "s1",
                "",
                vec![ToolCall {
                    id: "c1".to_string(),
                    name: "clock".to_string(),
                    arguments: serde_json::json!({}),
                    arguments_malformed: false,
                }],
            ),
            Message::tool("s1", "12:00", "c1"),
        ];
        let out = sanitize(messages);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn sanitize_drops_malformed_tool_call_entries() {
        let messages = vec![Message::assistant(
            "s1",
            "",
            vec![
                ToolCall {
                    id: String::new(),
                    name: "clock".to_string(),
                    arguments: serde_json::json!({}),
                    arguments_malformed: false,
                },
                ToolCall {
                    id: "c1".to_string(),
                    name: "clock".to_string(),
                    arguments: serde_json::json!({}),
                    arguments_malformed: false,
                },
            ],
        )];
        let out = sanitize(messages);
        assert_eq!(out[0].tool_calls.len(), 1);
        assert_eq!(out[0].tool_calls[0].id, "c1");
    }

    struct MapSkillSource(std::collections::HashMap<&'static str, &'static str>);

    impl SkillPromptSource for MapSkillSource {
        fn prompt_fragment(&self, skill_id: &str) -> Option<String> {
            self.0.get(skill_id).map(|s| s.to_string())
        }
    }

    #[test]
    fn skill_sections_are_filtered_by_the_selected_set() {
        let mut session = session();
        session.selected_skills = vec!["known".to_string(), "unknown".to_string()];
        let mut map = std::collections::HashMap::new();
        map.insert("known", "SKILL: known");
        let source = MapSkillSource(map);
        let sections = skill_sections(&session, &source);
        assert_eq!(sections, vec!["SKILL: known".to_string()]);
    }

    #[test]
    fn sanitize_is_idempotent() {
        let messages = vec![
            Message::user("s1", "hi"),
            Message::tool("s1", "result", "missing-call-id"),
        ];
        let once = sanitize(messages);
        let twice = sanitize(once.clone());
        assert_eq!(once.len(), twice.len());
    }
}
