use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use geopin_assistant::{ModelError, OrchestratorError};
use geopin_core::error::{ApiError, codes};

/// Internal error type that converts to structured API responses
#[derive(Debug)]
pub enum AppError {
    /// Validation error (400)
    Validation {
        message: String,
        field: Option<String>,
        received: Option<serde_json::Value>,
        docs_hint: Option<String>,
    },
    /// The language model failed or answered garbage (502)
    Model(ModelError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let request_id = uuid::Uuid::now_v7().to_string();

        let (status, api_error) = match self {
            AppError::Validation {
                message,
                field,
                received,
                docs_hint,
            } => (
                StatusCode::BAD_REQUEST,
                ApiError {
                    error: codes::VALIDATION_FAILED.to_string(),
                    message,
                    field,
                    received,
                    request_id: Some(request_id),
                    docs_hint,
                },
            ),
            AppError::Model(ModelError::MissingApiKey) => {
                tracing::error!(request_id = %request_id, "GOOGLE_AI_API_KEY is not configured");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError::new(
                        codes::INTERNAL_ERROR,
                        "Server misconfigured: GOOGLE_AI_API_KEY is missing",
                    )
                    .with_request_id(request_id),
                )
            }
            AppError::Model(err) => {
                tracing::error!(request_id = %request_id, error = %err, "model call failed");
                (
                    StatusCode::BAD_GATEWAY,
                    ApiError::new(codes::EXTERNAL_ERROR, err.to_string())
                        .with_request_id(request_id)
                        .with_docs_hint("The assistant could not be reached. Try again shortly."),
                )
            }
        };

        (status, Json(api_error)).into_response()
    }
}

impl From<OrchestratorError> for AppError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::EmptyMessage => AppError::Validation {
                message: "userMessage is required".to_string(),
                field: Some("userMessage".to_string()),
                received: None,
                docs_hint: Some("Send a non-empty userMessage string.".to_string()),
            },
            OrchestratorError::Model { source, .. } => AppError::Model(source),
        }
    }
}
