use axum::extract::State;
use axum::{Json, Router, routing::post};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use geopin_assistant::chat::HistoryEntry;
use geopin_assistant::{StagedMarkers, ToolCallRecord};
use geopin_core::location::coerce_location;
use geopin_core::store::new_marker_id;
use geopin_core::{Coordinates, Location};

use crate::error::AppError;
use crate::extract::AppJson;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/chat", post(chat))
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub user_message: String,
    /// The client's saved markers; records missing fields are normalized,
    /// id-less records get a fresh id, records without usable coordinates
    /// are dropped.
    #[serde(default)]
    #[schema(value_type = Vec<Location>)]
    pub markers: Vec<Value>,
    /// Current view center
    #[serde(default)]
    pub center: Option<Coordinates>,
    #[serde(default)]
    pub conversation_history: Vec<HistoryEntry>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub text: String,
    /// Executed tool calls in order; the client replays these into its store.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools_used: Option<Vec<ToolCallRecord>>,
    /// Set when the tool round limit cut the turn short.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub depth_exhausted: bool,
}

/// Run one assistant turn against the client's markers
///
/// Tools act on a scratch copy of `markers`; nothing is stored server side.
/// The response lists every executed call so the client can apply them.
#[utoipa::path(
    post,
    path = "/api/chat",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Assistant reply", body = ChatResponse),
        (status = 400, description = "Missing or malformed userMessage", body = geopin_core::error::ApiError),
        (status = 500, description = "Model API key not configured", body = geopin_core::error::ApiError),
        (status = 502, description = "Model call failed", body = geopin_core::error::ApiError)
    ),
    tag = "chat"
)]
pub async fn chat(
    State(state): State<AppState>,
    AppJson(req): AppJson<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let received = req.markers.len();
    let markers: Vec<Location> = req
        .markers
        .iter()
        .filter_map(coerce_location)
        .map(|mut location| {
            if location.id.trim().is_empty() {
                location.id = new_marker_id();
            }
            location
        })
        .collect();
    if markers.len() != received {
        tracing::debug!(
            received,
            kept = markers.len(),
            "dropped markers without usable coordinates"
        );
    }

    let mut staged = StagedMarkers::new(markers, req.center);
    let outcome = state
        .chat
        .run_turn(&req.user_message, &req.conversation_history, &mut staged)
        .await?;

    tracing::info!(
        rounds = outcome.rounds,
        tool_calls = outcome.tool_calls.len(),
        depth_exhausted = outcome.depth_exhausted,
        "chat turn completed"
    );

    let tools_used = (!outcome.tool_calls.is_empty()).then_some(outcome.tool_calls);
    Ok(Json(ChatResponse {
        text: outcome.text,
        tools_used,
        depth_exhausted: outcome.depth_exhausted,
    }))
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use geopin_assistant::geocode::{GeocodeError, GeocodeHit, Geocoder};
    use geopin_assistant::model::{ChatModel, ModelError, ModelReply, ModelRequest, RequestedCall};
    use geopin_assistant::{Orchestrator, OrchestratorConfig, ToolExecutor};

    use crate::state::AppState;

    struct ScriptedModel {
        replies: Mutex<VecDeque<Result<ModelReply, ModelError>>>,
    }

    impl ChatModel for ScriptedModel {
        async fn send(&self, _request: ModelRequest<'_>) -> Result<ModelReply, ModelError> {
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(ModelReply::text("done")))
        }
    }

    struct NoGeocoder;

    impl Geocoder for NoGeocoder {
        async fn search(&self, _query: &str, _limit: u8) -> Result<Vec<GeocodeHit>, GeocodeError> {
            Ok(Vec::new())
        }
    }

    fn state(replies: Vec<Result<ModelReply, ModelError>>) -> AppState {
        let model = ScriptedModel {
            replies: Mutex::new(replies.into()),
        };
        let orchestrator = Orchestrator::new(
            model,
            ToolExecutor::new(NoGeocoder),
            OrchestratorConfig::default(),
        );
        AppState::new(Arc::new(orchestrator), true)
    }

    fn call(name: &str, args: Value) -> RequestedCall {
        RequestedCall {
            name: name.to_string(),
            args: args.as_object().cloned().unwrap_or_default(),
        }
    }

    async fn post_chat(state: AppState, body: Value) -> (StatusCode, Value) {
        let response = crate::app(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/chat")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .expect("request should build"),
            )
            .await
            .expect("request should succeed");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should read");
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn plain_reply_omits_tools_used() {
        let (status, body) = post_chat(
            state(vec![Ok(ModelReply::text("Hi there"))]),
            json!({ "userMessage": "hello" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "text": "Hi there" }));
    }

    #[tokio::test]
    async fn tool_calls_run_against_the_posted_markers() {
        let replies = vec![
            Ok(ModelReply {
                text: String::new(),
                calls: vec![call("remove_marker", json!({ "marker_id": "m-1" }))],
            }),
            Ok(ModelReply::text("Removed Old Dock.")),
        ];
        let (status, body) = post_chat(
            state(replies),
            json!({
                "userMessage": "remove the old dock",
                "markers": [
                    { "id": "m-1", "name": "Old Dock", "coordinates": { "lat": 28.1, "lng": -15.4 } },
                    { "id": "m-2", "name": "broken" }
                ],
                "center": { "lat": 28.1, "lng": -15.4 },
                "conversationHistory": [{ "role": "user", "parts": "hi" }]
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["text"], "Removed Old Dock.");
        let tools = body["toolsUsed"].as_array().expect("toolsUsed should be present");
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["name"], "remove_marker");
        assert_eq!(tools[0]["result"]["success"], true);
        assert_eq!(tools[0]["result"]["data"]["id"], "m-1");
        assert!(tools[0]["callId"].is_string());
    }

    #[tokio::test]
    async fn markers_without_ids_are_staged_with_distinct_ids() {
        let replies = vec![
            Ok(ModelReply {
                text: String::new(),
                calls: vec![call("list_markers", json!({}))],
            }),
            Ok(ModelReply::text("Two markers.")),
        ];
        let (status, body) = post_chat(
            state(replies),
            json!({
                "userMessage": "what is on the map?",
                "markers": [
                    { "name": "Pier", "coordinates": { "lat": 28.1, "lng": -15.4 } },
                    { "name": "Dunes", "coordinates": { "lat": 27.7, "lng": -15.6 } }
                ]
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let listed = body["toolsUsed"][0]["result"]["data"]
            .as_array()
            .expect("list_markers should return markers");
        let ids: Vec<&str> = listed.iter().filter_map(|m| m["id"].as_str()).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.iter().all(|id| !id.is_empty()));
        assert_ne!(ids[0], ids[1]);
    }

    #[tokio::test]
    async fn missing_user_message_is_rejected() {
        let (status, body) = post_chat(state(Vec::new()), json!({ "markers": [] })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_failed");
        assert_eq!(body["field"], "userMessage");
    }

    #[tokio::test]
    async fn malformed_body_is_a_structured_bad_request() {
        let (status, body) = post_chat(
            state(Vec::new()),
            json!({ "userMessage": "hi", "markers": "none" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_failed");
        assert!(body["request_id"].is_string());
    }

    #[tokio::test]
    async fn model_failure_is_a_bad_gateway() {
        let (status, body) = post_chat(
            state(vec![Err(ModelError::Status {
                status: 503,
                message: "overloaded".to_string(),
            })]),
            json!({ "userMessage": "hello" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], "external_error");
    }

    #[tokio::test]
    async fn round_limit_is_reported() {
        let looping: Vec<Result<ModelReply, ModelError>> = (0..6)
            .map(|_| {
                Ok(ModelReply {
                    text: "again".to_string(),
                    calls: vec![call("list_markers", json!({}))],
                })
            })
            .collect();
        let (status, body) =
            post_chat(state(looping), json!({ "userMessage": "loop" })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["depthExhausted"], true);
        assert_eq!(body["toolsUsed"].as_array().map(Vec::len), Some(5));
    }
}
