use axum::http::{HeaderName, HeaderValue, Method};
use tower_http::cors::CorsLayer;

pub const CORS_ORIGINS_ENV: &str = "GEOPIN_CORS_ORIGINS";

/// Build a CORS layer from `GEOPIN_CORS_ORIGINS`.
///
/// - Origins: comma-separated list (default: `http://localhost:5173`)
/// - Methods: GET, POST, OPTIONS
/// - Headers: Content-Type
/// - Max age: 3600s
pub fn build_cors_layer() -> CorsLayer {
    let origins_str = std::env::var(CORS_ORIGINS_ENV)
        .unwrap_or_else(|_| "http://localhost:5173".to_string());

    CorsLayer::new()
        .allow_origin(parse_origins(&origins_str))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([HeaderName::from_static("content-type")])
        .max_age(std::time::Duration::from_secs(3600))
}

fn parse_origins(raw: &str) -> Vec<HeaderValue> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect()
}
