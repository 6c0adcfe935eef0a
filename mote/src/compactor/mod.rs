//! Context compactor: keeps a session's message list within a provider's
//! context window, by summarization or truncation.

mod config;
mod context_window;
mod prune;
mod summarize;
mod truncate;

pub use config::CompactionConfig;
pub use context_window::{estimate_total, is_overflow, ContextWindowCheck};

use std::sync::Arc;

use crate::error::EngineError;
use crate::message::{Message, Role};
use crate::provider::LlmClient;

/// Which compaction strategy to use. The standard orchestrator uses
/// [`CompactionMode::Summarize`]; the ACP orchestrator, which talks to a
/// provider that manages its own server-side context, uses
/// [`CompactionMode::TruncateOnly`] to avoid billing a wasted summarization
/// call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompactionMode {
    Summarize,
    TruncateOnly,
}

/// Outcome of one compaction attempt.
pub struct CompactionOutcome {
    pub messages: Vec<Message>,
    /// False when the sanity check rejected the result and the original list
    /// was returned unchanged.
    pub applied: bool,
}

/// Prunes old tool results (if `config.prune`), then compacts the message
/// list using `mode`. Rejects the result and falls back to the original list
/// (with pruning still applied) if the compacted list would contain no
/// user- or assistant-role message.
pub async fn compact(
    messages: &[Message],
    llm: &Arc<dyn LlmClient>,
    config: &CompactionConfig,
    mode: CompactionMode,
) -> Result<CompactionOutcome, EngineError> {
    let pruned = prune::prune_tool_results(messages, config);

    let candidate = match mode {
        CompactionMode::Summarize => summarize::summarize(&pruned, llm, config).await?,
        CompactionMode::TruncateOnly => truncate::truncate(&pruned, config),
    };

    if is_rejectable(&candidate) {
        return Ok(CompactionOutcome {
            messages: pruned,
            applied: false,
        });
    }

    Ok(CompactionOutcome {
        messages: candidate,
        applied: true,
    })
}

/// True when the candidate list has dropped every user- or assistant-role
/// message (the sanity check that guards compaction monotonicity).
fn is_rejectable(candidate: &[Message]) -> bool {
    !candidate
        .iter()
        .any(|m| matches!(m.role, Role::User | Role::Assistant))
}
