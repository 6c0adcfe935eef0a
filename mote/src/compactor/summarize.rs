//! Summarization mode: replace the oldest portion of history with one
//! provider-generated summary message.

use std::sync::Arc;

use crate::error::EngineError;
use crate::message::{Message, Role};
use crate::provider::{LlmClient, LlmRequest, ToolChoiceMode};

use super::config::CompactionConfig;

const SUMMARIZE_INSTRUCTION: &str =
    "Summarize the conversation so far in a few sentences, preserving any facts, \
     decisions, or open tasks a reader would need to continue it.";

/// Summarizes the oldest non-system portion of `messages` (everything before
/// the most recent `compact_keep_recent`) via one non-streaming provider
/// call, and replaces it with a single synthetic `[summary] ...` assistant
/// message. System messages are preserved in place regardless of position.
pub async fn summarize(
    messages: &[Message],
    llm: &Arc<dyn LlmClient>,
    config: &CompactionConfig,
) -> Result<Vec<Message>, EngineError> {
    if messages.len() <= config.compact_keep_recent {
        return Ok(messages.to_vec());
    }

    let split = messages.len() - config.compact_keep_recent;
    let (old, recent) = messages.split_at(split);

    let system: Vec<Message> = old.iter().filter(|m| m.role == Role::System).cloned().collect();
    let to_summarize: Vec<Message> = old.iter().filter(|m| m.role != Role::System).cloned().collect();

    if to_summarize.is_empty() {
        return Ok(messages.to_vec());
    }

    let mut request_messages = to_summarize.clone();
    let session_id = messages
        .first()
        .map(|m| m.session_id.clone())
        .unwrap_or_default();
    request_messages.push(Message::user(&session_id, SUMMARIZE_INSTRUCTION));

    let response = llm
        .invoke(
            LlmRequest {
                messages: &request_messages,
                tools: &[],
                tool_choice: ToolChoiceMode::None,
                streaming: false,
            },
            None,
            None,
        )
        .await?;

    let summary = Message::assistant(
        &session_id,
        format!("[summary] {}", response.content),
        Vec::new(),
    );

    let mut result = Vec::with_capacity(system.len() + 1 + recent.len());
    result.extend(system);
    result.push(summary);
    result.extend(recent.iter().cloned());
    Ok(result)
}
