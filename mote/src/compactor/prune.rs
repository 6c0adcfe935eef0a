//! Tool-result pruning: drop old tool output bodies while keeping the
//! surrounding conversational shape intact.

use crate::message::{Message, Role};

use super::config::CompactionConfig;
use super::context_window::estimate_tokens;

const PRUNED_PLACEHOLDER: &str = "[tool output pruned]";

/// Replaces the content of old tool-role messages with a placeholder once the
/// running total of tool-result tokens (oldest-first) exceeds
/// `prune_keep_tokens`. Below `prune_minimum` total tool-result tokens, does
/// nothing (not worth the churn). System, user, and assistant messages are
/// never touched; only their `content` is replaced, so tool-call ids in
/// earlier assistant messages still match.
pub fn prune_tool_results(messages: &[Message], config: &CompactionConfig) -> Vec<Message> {
    if !config.prune {
        return messages.to_vec();
    }

    let tool_total: u32 = messages
        .iter()
        .filter(|m| m.role == Role::Tool)
        .map(estimate_tokens)
        .sum();
    if let Some(minimum) = config.prune_minimum {
        if tool_total < minimum {
            return messages.to_vec();
        }
    }

    // Walk newest-first, keeping tool results until the budget is spent, then
    // replace everything older with the placeholder.
    let mut kept_tokens = 0u32;
    let mut keep_index = messages.len();
    for (i, m) in messages.iter().enumerate().rev() {
        if m.role != Role::Tool {
            continue;
        }
        let cost = estimate_tokens(m);
        if kept_tokens + cost > config.prune_keep_tokens {
            keep_index = i + 1;
            break;
        }
        kept_tokens += cost;
        keep_index = i;
    }

    messages
        .iter()
        .enumerate()
        .map(|(i, m)| {
            if m.role == Role::Tool && i < keep_index && m.content != PRUNED_PLACEHOLDER {
                let mut pruned = m.clone();
                pruned.content = PRUNED_PLACEHOLDER.to_string();
                pruned
            } else {
                m.clone()
            }
        })
        .collect()
}
