//! Chat request rewriting (model override and system prompt injection)

use serde_json::{json, Value};

use crate::config::AppConfig;

/// What happened to the system prompt of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemPromptAction {
    Unchanged,
    /// Content of the leading system message was replaced
    Replaced,
    /// A new system message was inserted at the front
    Prepended,
    /// Text was appended to the first message
    Appended,
}

impl SystemPromptAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SystemPromptAction::Unchanged => "unchanged",
            SystemPromptAction::Replaced => "replaced",
            SystemPromptAction::Prepended => "prepended",
            SystemPromptAction::Appended => "appended",
        }
    }
}

/// Result of a successful rewrite
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteSummary {
    /// Model the client asked for, when it was overridden
    pub requested_model: Option<String>,
    pub model_overridden: bool,
    pub system_prompt: SystemPromptAction,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RewriteError {
    #[error("request body must be a JSON object")]
    NotAnObject,

    #[error("request has no `messages` array")]
    MissingMessages,

    #[error("`messages` must contain at least one message")]
    EmptyMessages,

    #[error("`messages[0]` must be an object")]
    InvalidMessage,

    #[error("`messages[0]` has no `role`")]
    MissingRole,

    #[error("`messages[0].content` must be a string")]
    MissingContent,
}

/// Applies the configured rewrites to inbound chat requests
///
/// Rules, in order:
/// 1. a configured default model replaces `model`
/// 2. an overwrite prompt replaces the leading system message or is prepended as one
/// 3. otherwise an append prompt is joined to `messages[0].content` with a newline
#[derive(Debug, Clone, Default)]
pub struct RequestRewriter {
    default_model: Option<String>,
    overwrite_system_prompt: Option<String>,
    append_system_prompt: Option<String>,
}

impl RequestRewriter {
    pub fn new(
        default_model: Option<String>,
        overwrite_system_prompt: Option<String>,
        append_system_prompt: Option<String>,
    ) -> Self {
        let non_empty = |value: Option<String>| value.filter(|v| !v.is_empty());
        Self {
            default_model: non_empty(default_model),
            overwrite_system_prompt: non_empty(overwrite_system_prompt),
            append_system_prompt: non_empty(append_system_prompt),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.upstream.default_model.clone(),
            config.prompts.overwrite_system_prompt.clone(),
            config.prompts.append_system_prompt.clone(),
        )
    }

    /// Returns true if no rule would ever touch a request
    pub fn is_noop(&self) -> bool {
        self.default_model.is_none()
            && self.overwrite_system_prompt.is_none()
            && self.append_system_prompt.is_none()
    }

    /// Rewrite `request` in place
    ///
    /// On error the request may be partially rewritten and must not be forwarded.
    pub fn rewrite(&self, request: &mut Value) -> Result<RewriteSummary, RewriteError> {
        let body = request.as_object_mut().ok_or(RewriteError::NotAnObject)?;

        let mut summary = RewriteSummary {
            requested_model: None,
            model_overridden: false,
            system_prompt: SystemPromptAction::Unchanged,
        };

        if let Some(ref model) = self.default_model {
            let previous = body.insert("model".to_string(), Value::String(model.clone()));
            summary.requested_model = previous.and_then(|m| m.as_str().map(str::to_string));
            summary.model_overridden = true;
        }

        if let Some(ref prompt) = self.overwrite_system_prompt {
            let messages = messages_mut(body)?;
            let first = first_message(messages)?;
            let role = first.get("role").ok_or(RewriteError::MissingRole)?;

            if role.as_str() == Some("system") {
                first.insert("content".to_string(), Value::String(prompt.clone()));
                summary.system_prompt = SystemPromptAction::Replaced;
            } else {
                messages.insert(0, json!({ "role": "system", "content": prompt }));
                summary.system_prompt = SystemPromptAction::Prepended;
            }
        } else if let Some(ref suffix) = self.append_system_prompt {
            let messages = messages_mut(body)?;
            let first = first_message(messages)?;
            let content = first
                .get_mut("content")
                .ok_or(RewriteError::MissingContent)?;

            match content {
                Value::String(text) => {
                    text.push('\n');
                    text.push_str(suffix);
                }
                _ => return Err(RewriteError::MissingContent),
            }
            summary.system_prompt = SystemPromptAction::Appended;
        }

        Ok(summary)
    }
}

fn messages_mut(
    body: &mut serde_json::Map<String, Value>,
) -> Result<&mut Vec<Value>, RewriteError> {
    body.get_mut("messages")
        .and_then(Value::as_array_mut)
        .ok_or(RewriteError::MissingMessages)
}

fn first_message(
    messages: &mut [Value],
) -> Result<&mut serde_json::Map<String, Value>, RewriteError> {
    messages
        .first_mut()
        .ok_or(RewriteError::EmptyMessages)?
        .as_object_mut()
        .ok_or(RewriteError::InvalidMessage)
}
