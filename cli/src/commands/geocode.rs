use serde_json::Value;

use geopin_assistant::geocode::{Geocoder, GeocoderConfig, NominatimGeocoder};
use geopin_core::error::codes;

use crate::util::{exit_error, print_error, print_json};

pub async fn run(query: &str, limit: u8) -> i32 {
    let query = query.trim();
    if query.is_empty() {
        exit_error("Query must not be empty", None);
    }
    let geocoder = NominatimGeocoder::new(GeocoderConfig::from_env())
        .unwrap_or_else(|e| exit_error(&e.to_string(), Some("Check GEOPIN_GEOCODER_URL")));

    match geocoder.search(query, limit.max(1)).await {
        Ok(hits) => {
            let results: Vec<Value> = hits.iter().map(|hit| hit.to_value()).collect();
            print_json(&results)
        }
        Err(e) => print_error(codes::EXTERNAL_ERROR, &e.to_string(), 2),
    }
}
