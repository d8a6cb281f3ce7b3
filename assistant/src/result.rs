use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use utoipa::ToSchema;
use uuid::Uuid;

use geopin_core::error::codes;

/// Uniform envelope returned by every tool execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ToolResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ToolResult {
    pub fn ok(data: Option<Value>, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data,
            error: None,
            message: Some(message.into()),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            message: None,
        }
    }

    /// Short human-readable line for logs, notices and chat history.
    pub fn summary(&self) -> String {
        match (&self.message, &self.error) {
            (Some(message), _) => message.clone(),
            (None, Some(error)) => error.clone(),
            (None, None) if self.success => "ok".to_string(),
            (None, None) => "failed".to_string(),
        }
    }
}

/// Failure raised while validating or executing a tool call. Never escapes
/// the executor: it is folded into a [`ToolResult`].
#[derive(Debug, Clone, PartialEq)]
pub struct ToolError {
    pub code: String,
    pub message: String,
    pub field: Option<String>,
}

impl ToolError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            field: None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(codes::VALIDATION_FAILED, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(codes::NOT_FOUND, message)
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn into_result(self) -> ToolResult {
        let mut details = json!({ "error_code": self.code });
        if let Some(field) = &self.field {
            details["field"] = Value::String(field.clone());
        }
        ToolResult {
            success: false,
            data: Some(details),
            error: Some(self.message),
            message: None,
        }
    }
}

impl std::fmt::Display for ToolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ToolError {}

/// Audit entry for one executed tool call. Immutable once produced; the
/// `call_id` identifies it when the record is replayed into a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallRecord {
    pub call_id: Uuid,
    pub name: String,
    #[schema(value_type = Object)]
    pub parameters: Value,
    pub result: ToolResult,
}

impl ToolCallRecord {
    pub fn new(name: impl Into<String>, parameters: Value, result: ToolResult) -> Self {
        Self {
            call_id: Uuid::now_v7(),
            name: name.into(),
            parameters,
            result,
        }
    }
}
