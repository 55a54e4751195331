//! The success/error envelope every dispatched action returns.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::WorkdeskError;

const CONTEXT_MARKER: &str = "[context] ";

/// Normalized result of one tool call, in MCP tool-result shape:
///
/// ```json
/// { "content": [{ "type": "text", "text": "..." }], "isError": false }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub content: Vec<OutcomeContent>,
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

/// A single content item in an outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutcomeContent {
    Text { text: String },
}

/// Key/value hints a caller can carry into a follow-up call, such as a
/// workspace or sprint reference it should not have to resolve again.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutcomeContext {
    hints: BTreeMap<String, String>,
}

impl OutcomeContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.hints.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.hints.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.hints.get(key).map(String::as_str)
    }
}

impl ActionOutcome {
    /// Successful outcome carrying `payload` rendered as JSON.
    ///
    /// A bare string payload is used verbatim.
    pub fn success<T: Serialize + ?Sized>(payload: &T) -> Self {
        match serde_json::to_value(payload) {
            Ok(Value::String(text)) => Self::text(text),
            Ok(value) => match serde_json::to_string_pretty(&value) {
                Ok(text) => Self::text(text),
                Err(err) => Self::error(format!("Failed to serialize result: {err}")),
            },
            Err(err) => Self::error(format!("Failed to serialize result: {err}")),
        }
    }

    /// Successful outcome with a trailing `[context] {...}` line of hints.
    pub fn success_with_context<T: Serialize + ?Sized>(
        payload: &T,
        context: &OutcomeContext,
    ) -> Self {
        let mut outcome = Self::success(payload);
        if outcome.is_error || context.is_empty() {
            return outcome;
        }
        if let (Ok(trailer), Some(OutcomeContent::Text { text })) =
            (serde_json::to_string(&context.hints), outcome.content.last_mut())
        {
            text.push_str("\n\n");
            text.push_str(CONTEXT_MARKER);
            text.push_str(&trailer);
        }
        outcome
    }

    /// Plain successful text outcome.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![OutcomeContent::Text { text: text.into() }],
            is_error: false,
        }
    }

    /// Failed outcome with a human-readable message.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![OutcomeContent::Text {
                text: message.into(),
            }],
            is_error: true,
        }
    }

    /// Structured validation failure for a required argument.
    pub fn missing_field(field: &str) -> Self {
        Self::from_error(&WorkdeskError::missing_field(field))
    }

    pub fn from_error(error: &WorkdeskError) -> Self {
        Self::error(error.to_string())
    }

    pub fn is_error(&self) -> bool {
        self.is_error
    }

    /// All text content joined by newlines.
    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .map(|item| match item {
                OutcomeContent::Text { text } => text.as_str(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Recover the hints appended by [`ActionOutcome::success_with_context`].
    pub fn context(&self) -> Option<OutcomeContext> {
        let text = self.text_content();
        let (_, trailer) = text.rsplit_once(CONTEXT_MARKER)?;
        let hints: BTreeMap<String, String> = serde_json::from_str(trailer.trim()).ok()?;
        Some(OutcomeContext { hints })
    }

    /// The payload without any context trailer, parsed as JSON.
    pub fn payload(&self) -> Option<Value> {
        let text = self.text_content();
        let body = match text.rsplit_once(CONTEXT_MARKER) {
            Some((body, _)) => body.trim_end().to_string(),
            None => text,
        };
        serde_json::from_str(&body).ok()
    }
}

impl From<WorkdeskError> for ActionOutcome {
    fn from(error: WorkdeskError) -> Self {
        Self::from_error(&error)
    }
}
