use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Structured error body shared by the HTTP API and the CLI.
/// Carries enough context for a caller (or the assistant) to explain
/// what went wrong and what to try next.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Machine-readable error code (e.g. "validation_failed", "not_found")
    pub error: String,
    /// Human-readable description of what went wrong
    pub message: String,
    /// Which field caused the error (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// The value that was received (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub received: Option<serde_json::Value>,
    /// Request ID for tracing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Hint about what the correct usage looks like
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs_hint: Option<String>,
}

impl ApiError {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            field: None,
            received: None,
            request_id: None,
            docs_hint: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_received(mut self, received: serde_json::Value) -> Self {
        self.received = Some(received);
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_docs_hint(mut self, docs_hint: impl Into<String>) -> Self {
        self.docs_hint = Some(docs_hint.into());
        self
    }
}

/// Error codes used across geopin
pub mod codes {
    pub const VALIDATION_FAILED: &str = "validation_failed";
    pub const NOT_FOUND: &str = "not_found";
    pub const CONFLICT: &str = "conflict";
    pub const UNKNOWN_TOOL: &str = "unknown_tool";
    pub const EXTERNAL_ERROR: &str = "external_error";
    pub const INTERNAL_ERROR: &str = "internal_error";
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn optional_fields_are_omitted_when_unset() {
        let err = ApiError::new(codes::NOT_FOUND, "marker not found");
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(
            value,
            json!({ "error": "not_found", "message": "marker not found" })
        );
    }

    #[test]
    fn builder_sets_field_and_hint() {
        let err = ApiError::new(codes::VALIDATION_FAILED, "latitude out of range")
            .with_field("latitude")
            .with_received(json!(95.0))
            .with_docs_hint("Latitude must be between -90 and 90.");
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["field"], "latitude");
        assert_eq!(value["received"], 95.0);
        assert!(value.get("request_id").is_none());
    }
}
