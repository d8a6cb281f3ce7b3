use std::net::SocketAddr;

use axum::{Json, Router, routing::get};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;

mod cors;
mod error;
mod extract;
mod routes;
mod state;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "geopin API",
        version = "0.1.0",
        description = "Stateless assistant endpoint for geopin. Clients post their markers, the assistant runs map tools on a scratch copy, and the response lists every call for the client to apply."
    ),
    paths(
        routes::health::health_check,
        routes::tools::list_tools,
        routes::chat::chat,
    ),
    components(schemas(
        HealthResponse,
        routes::chat::ChatRequest,
        routes::chat::ChatResponse,
        geopin_core::error::ApiError,
        geopin_core::Coordinates,
        geopin_core::Location,
        geopin_assistant::chat::HistoryEntry,
        geopin_assistant::ToolCallRecord,
        geopin_assistant::ToolResult,
    ))
)]
struct ApiDoc;

#[derive(Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

pub fn app(app_state: state::AppState) -> Router {
    Router::new()
        .route("/api-doc/openapi.json", get(openapi_json))
        .merge(routes::health::router())
        .merge(routes::tools::router())
        .merge(routes::chat::router())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors::build_cors_layer()),
        )
        .with_state(app_state)
}

#[tokio::main]
async fn main() {
    // Load .env if present (dev only)
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "geopin_api=debug,geopin_assistant=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let app_state = match state::AppState::from_env() {
        Ok(state) => state,
        Err(err) => {
            tracing::error!(error = %err, "invalid geocoder configuration");
            std::process::exit(1);
        }
    };

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("geopin API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    axum::serve(
        listener,
        app(app_state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Server error");
}
