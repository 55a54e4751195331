//! Tool schemas: name, description, parameter shape and behavioural hints.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Behavioural hints advertised alongside a tool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolAnnotations {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub read_only_hint: bool,
    pub destructive_hint: bool,
    pub idempotent_hint: bool,
    pub open_world_hint: bool,
}

impl ToolAnnotations {
    /// Hints for a tool that only reads remote state.
    pub fn read_only() -> Self {
        Self {
            read_only_hint: true,
            idempotent_hint: true,
            open_world_hint: true,
            ..Self::default()
        }
    }

    /// Hints for a tool that may change or delete state.
    pub fn mutating(destructive: bool) -> Self {
        Self {
            destructive_hint: destructive,
            open_world_hint: true,
            ..Self::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// Externally visible description of one tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub annotations: ToolAnnotations,
}

impl ToolSchema {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            annotations: ToolAnnotations::default(),
        }
    }

    pub fn with_annotations(mut self, annotations: ToolAnnotations) -> Self {
        self.annotations = annotations;
        self
    }
}

/// Builder for JSON Schema object parameters.
#[derive(Debug, Default)]
pub struct ParameterBuilder {
    properties: serde_json::Map<String, Value>,
    required: Vec<String>,
}

impl ParameterBuilder {
    pub fn object() -> Self {
        Self::default()
    }

    /// Add a string property.
    pub fn string(self, name: &str, description: &str, required: bool) -> Self {
        self.property(name, serde_json::json!({ "type": "string", "description": description }), required)
    }

    /// Add a number property.
    pub fn number(self, name: &str, description: &str, required: bool) -> Self {
        self.property(name, serde_json::json!({ "type": "number", "description": description }), required)
    }

    /// Add a boolean property.
    pub fn boolean(self, name: &str, description: &str, required: bool) -> Self {
        self.property(name, serde_json::json!({ "type": "boolean", "description": description }), required)
    }

    /// Add an enum (string) property, typically a discriminator.
    pub fn string_enum(self, name: &str, description: &str, values: &[&str], required: bool) -> Self {
        self.property(
            name,
            serde_json::json!({ "type": "string", "description": description, "enum": values }),
            required,
        )
    }

    fn property(mut self, name: &str, schema: Value, required: bool) -> Self {
        self.properties.insert(name.to_string(), schema);
        if required {
            self.required.push(name.to_string());
        }
        self
    }

    pub fn build(self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": self.properties,
            "required": self.required,
        })
    }
}
