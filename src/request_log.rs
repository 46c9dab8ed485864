//! Request logging formatter

use crate::rewrite::{RewriteSummary, SystemPromptAction};

/// Format a one-line summary of an outbound (already rewritten) request
pub fn format_request_log(request_json: &serde_json::Value, summary: &RewriteSummary) -> String {
    let model = request_json.get("model").and_then(|m| m.as_str()).unwrap_or("unknown");

    let msg_count = request_json
        .get("messages")
        .and_then(|m| m.as_array())
        .map(|a| a.len())
        .unwrap_or(0);

    let is_streaming = request_json.get("stream").and_then(|s| s.as_bool()).unwrap_or(false);

    let mut parts = vec![format!("model={}", model)];

    if summary.model_overridden {
        if let Some(ref requested) = summary.requested_model {
            if requested != model {
                parts.push(format!("(was {})", requested));
            }
        }
    }

    parts.push(format!("msgs={}", msg_count));

    if is_streaming {
        parts.push("stream".to_string());
    }

    if summary.system_prompt != SystemPromptAction::Unchanged {
        parts.push(format!("system={}", summary.system_prompt.as_str()));
    }

    format!("→ {}", parts.join(" "))
}

/// First user message, whitespace-normalised and truncated, for debug logging.
/// Never part of the `info` summary.
pub fn first_user_message_preview(request_json: &serde_json::Value) -> Option<String> {
    let messages = request_json.get("messages")?.as_array()?;

    let msg = messages
        .iter()
        .find(|msg| msg.get("role").and_then(|r| r.as_str()) == Some("user"))?;

    let content = extract_message_content(msg)?;
    Some(truncate_message(&normalize_whitespace(&content)))
}

/// Extract text content from a message (handles string or array content)
fn extract_message_content(msg: &serde_json::Value) -> Option<String> {
    let content = msg.get("content")?;

    if let Some(text) = content.as_str() {
        return Some(text.to_string());
    }

    let texts: Vec<&str> = content
        .as_array()?
        .iter()
        .filter(|part| part.get("type").and_then(|t| t.as_str()) == Some("text"))
        .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
        .collect();

    if texts.is_empty() {
        None
    } else {
        Some(texts.join(" "))
    }
}

/// Collapse newlines, tabs and runs of spaces into single spaces
fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncate message according to rules:
/// - If <= 100 chars: show all
/// - If > 100 chars: first 25 + " ... " + last 75
///
/// Counts chars, not bytes, so multi-byte text never splits mid-character.
fn truncate_message(s: &str) -> String {
    const MAX_TOTAL: usize = 100;
    const PREFIX_LEN: usize = 25;
    const SUFFIX_LEN: usize = 75;
    const ELLIPSIS: &str = " ... ";

    let char_count = s.chars().count();
    if char_count <= MAX_TOTAL {
        return s.to_string();
    }

    let prefix: String = s.chars().take(PREFIX_LEN).collect();
    let suffix: String = s.chars().skip(char_count - SUFFIX_LEN).collect();

    format!("{}{}{}", prefix, ELLIPSIS, suffix)
}
