//! Typed access to tool call arguments.

use serde_json::Value;

use crate::error::WorkdeskError;

/// Wrapper around a tool call's argument object providing typed extraction.
#[derive(Debug, Clone, Default)]
pub struct ToolArguments {
    value: Value,
}

impl ToolArguments {
    pub fn new(value: Value) -> Self {
        Self { value }
    }

    /// Get the raw JSON value.
    pub fn raw(&self) -> &Value {
        &self.value
    }

    /// Get a non-blank string argument, trimmed.
    pub fn str_opt(&self, key: &str) -> Option<&str> {
        self.value
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Get a required string argument.
    pub fn require_str(&self, key: &str) -> Result<&str, WorkdeskError> {
        self.str_opt(key)
            .ok_or_else(|| WorkdeskError::missing_field(key))
    }

    pub fn bool_opt(&self, key: &str) -> Option<bool> {
        self.value.get(key).and_then(Value::as_bool)
    }

    pub fn i64_opt(&self, key: &str) -> Option<i64> {
        self.value.get(key).and_then(Value::as_i64)
    }
}

impl From<Value> for ToolArguments {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}
