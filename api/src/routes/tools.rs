use axum::{Json, Router, routing::get};
use serde_json::Value;

use geopin_assistant::catalog_schema;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/tools", get(list_tools))
}

/// The tool catalog offered to the model, with JSON-schema parameters
#[utoipa::path(
    get,
    path = "/api/tools",
    responses(
        (status = 200, description = "Tool definitions", body = Vec<serde_json::Value>)
    ),
    tag = "chat"
)]
pub async fn list_tools() -> Json<Value> {
    Json(catalog_schema())
}
