//! Token-budget estimate used to decide whether a message list has overflowed.

use crate::message::Message;

/// Rough token estimate for one message: content length plus a fixed overhead
/// for role/tool-call framing, divided by an average-bytes-per-token constant.
/// Good enough for a high-water-mark trigger; not a tokenizer.
const BYTES_PER_TOKEN: usize = 4;
const MESSAGE_OVERHEAD_TOKENS: u32 = 4;

pub fn estimate_tokens(message: &Message) -> u32 {
    let content_tokens = (message.content.len() / BYTES_PER_TOKEN) as u32;
    let tool_call_tokens: u32 = message
        .tool_calls
        .iter()
        .map(|tc| (tc.arguments.to_string().len() / BYTES_PER_TOKEN) as u32 + MESSAGE_OVERHEAD_TOKENS)
        .sum();
    content_tokens + tool_call_tokens + MESSAGE_OVERHEAD_TOKENS
}

pub fn estimate_total(messages: &[Message]) -> u32 {
    messages.iter().map(estimate_tokens).sum()
}

/// Inputs needed to decide whether the context has overflowed.
pub struct ContextWindowCheck<'a> {
    pub messages: &'a [Message],
    /// Usage reported by the last provider call, if any: (prompt, completion).
    pub usage: Option<(u32, u32)>,
    pub max_context_tokens: u32,
    pub reserve_tokens: u32,
}

/// True when the best available estimate of current context size plus the
/// reserved generation budget exceeds `max_context_tokens`. Prefers the
/// provider-reported usage (authoritative) over the local estimate.
pub fn is_overflow(check: &ContextWindowCheck<'_>) -> bool {
    let current = match check.usage {
        Some((prompt, completion)) => prompt + completion,
        None => estimate_total(check.messages),
    };
    current.saturating_add(check.reserve_tokens) > check.max_context_tokens
}
