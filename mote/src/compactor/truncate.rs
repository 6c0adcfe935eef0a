//! Truncate-only mode: drop oldest non-system messages until under the
//! low-water mark. Used for ACP providers that manage their own server-side
//! context, where an LLM summarization round-trip would be wasted.

use crate::message::{Message, Role};

use super::config::CompactionConfig;
use super::context_window::estimate_tokens;

/// Drops oldest non-system messages until the estimated remaining token count
/// is at or below `prune_keep_tokens` (reused here as the low-water mark), or
/// until only `compact_keep_recent` non-system messages remain, whichever
/// stops first. System messages are always preserved.
pub fn truncate(messages: &[Message], config: &CompactionConfig) -> Vec<Message> {
    let system: Vec<Message> = messages.iter().filter(|m| m.role == Role::System).cloned().collect();
    let rest: Vec<Message> = messages.iter().filter(|m| m.role != Role::System).cloned().collect();

    let mut start = 0;
    loop {
        let remaining = &rest[start..];
        if remaining.len() <= config.compact_keep_recent {
            break;
        }
        let total: u32 = remaining.iter().map(estimate_tokens).sum();
        if total <= config.prune_keep_tokens {
            break;
        }
        start += 1;
    }

    let mut result = Vec::with_capacity(system.len() + rest.len() - start);
    result.extend(system);
    result.extend(rest[start..].iter().cloned());
    result
}
