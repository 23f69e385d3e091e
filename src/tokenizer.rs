//! Heuristic token estimation.
//!
//! Used only when an upstream response carries no usage block or for manual
//! entries that supply raw text. The estimate is the common four-characters-
//! per-token approximation; real counts always win when available.

/// Estimated token count for a piece of text.
pub fn estimate_tokens(text: &str) -> i64 {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return 0;
    }
    (trimmed.len() as i64 + 3) / 4
}

/// Estimated token count for a chat conversation. Each message carries a
/// small framing overhead on top of its content, plus a fixed priming cost
/// for the reply.
pub fn estimate_chat_tokens(messages: &[String]) -> i64 {
    if messages.is_empty() {
        return 0;
    }
    let content: i64 = messages.iter().map(|m| estimate_tokens(m)).sum();
    content + messages.len() as i64 * 4 + 2
}
