use std::path::PathBuf;

use crate::gemini::GeminiConfig;
use crate::geocode::GeocoderConfig;
use crate::orchestrator::{DEFAULT_MAX_ROUNDS, MAX_ROUNDS_LIMIT, OrchestratorConfig};

pub const MAX_ROUNDS_ENV: &str = "GEOPIN_MAX_TOOL_ROUNDS";
pub const DATA_DIR_ENV: &str = "GEOPIN_DATA_DIR";

/// Everything the assistant reads from the environment.
#[derive(Debug, Clone)]
pub struct AssistantConfig {
    pub gemini: GeminiConfig,
    pub geocoder: GeocoderConfig,
    pub orchestrator: OrchestratorConfig,
}

impl AssistantConfig {
    pub fn from_env() -> Self {
        let (max_rounds, overridden) = parse_env_u32_with_bounds(
            std::env::var(MAX_ROUNDS_ENV).ok(),
            1,
            MAX_ROUNDS_LIMIT,
            DEFAULT_MAX_ROUNDS,
        );
        if overridden {
            tracing::debug!(max_rounds, "tool round limit overridden");
        }
        Self {
            gemini: GeminiConfig::from_env(),
            geocoder: GeocoderConfig::from_env(),
            orchestrator: OrchestratorConfig { max_rounds },
        }
    }
}

/// Parse a bounded integer setting; out-of-range values are clamped and
/// unparsable ones fall back to `default`. The flag tells whether the raw
/// value was used.
pub fn parse_env_u32_with_bounds(raw: Option<String>, min: u32, max: u32, default: u32) -> (u32, bool) {
    match raw.and_then(|value| value.trim().parse::<u32>().ok()) {
        Some(parsed) => (parsed.clamp(min, max), true),
        None => (default, false),
    }
}

/// Directory holding the persisted map and chat blobs.
pub fn data_dir(explicit: Option<PathBuf>) -> PathBuf {
    explicit
        .or_else(|| {
            std::env::var(DATA_DIR_ENV)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
        })
        .unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("geopin")
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_values_are_clamped() {
        assert_eq!(parse_env_u32_with_bounds(Some("3".into()), 1, 10, 5), (3, true));
        assert_eq!(parse_env_u32_with_bounds(Some("0".into()), 1, 10, 5), (1, true));
        assert_eq!(parse_env_u32_with_bounds(Some("99".into()), 1, 10, 5), (10, true));
        assert_eq!(parse_env_u32_with_bounds(Some("many".into()), 1, 10, 5), (5, false));
        assert_eq!(parse_env_u32_with_bounds(None, 1, 10, 5), (5, false));
    }

    #[test]
    fn explicit_data_dir_wins() {
        let dir = data_dir(Some(PathBuf::from("/tmp/geopin-test")));
        assert_eq!(dir, PathBuf::from("/tmp/geopin-test"));
    }
}
