use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use url::Url;

use geopin_core::{Coordinates, LocationInput};

pub const DEFAULT_GEOCODER_URL: &str = "https://nominatim.openstreetmap.org";

static POSTAL_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4,6}$").expect("valid postal code regex"));
static HOUSE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+[A-Za-z]?$").expect("valid house number regex"));

const ROAD_KEYS: [&str; 5] = ["road", "pedestrian", "footway", "street", "path"];
const POI_KEYS: [&str; 6] = ["amenity", "shop", "tourism", "building", "leisure", "office"];
const AREA_KEYS: [&[&str]; 4] = [
    &["suburb", "neighbourhood", "quarter"],
    &["city", "town", "village", "municipality"],
    &["state", "province"],
    &["country"],
];

#[derive(Debug, thiserror::Error)]
pub enum GeocodeError {
    #[error("geocoder request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("geocoder returned HTTP {status}")]
    Status { status: u16 },
    #[error("invalid geocoder URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// One geocoder match, as returned by Nominatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodeHit {
    pub display_name: String,
    #[serde(deserialize_with = "de_coordinate")]
    pub lat: f64,
    #[serde(deserialize_with = "de_coordinate")]
    pub lon: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub address: BTreeMap<String, String>,
}

fn de_coordinate<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    let parsed = match &raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .filter(|v| v.is_finite())
        .ok_or_else(|| serde::de::Error::custom(format!("invalid coordinate: {raw}")))
}

/// Address parts ready to become a marker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedPlace {
    pub name: String,
    pub address: String,
    #[serde(rename = "CP")]
    pub cp: String,
    pub description: String,
}

impl GeocodeHit {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.lat, self.lon)
    }

    fn address_part(&self, keys: &[&str]) -> Option<&str> {
        keys.iter()
            .filter_map(|key| self.address.get(*key))
            .map(|value| value.trim())
            .find(|value| !value.is_empty())
    }

    /// Split the hit into name/address/postal code/description. Structured
    /// address details win; otherwise `display_name` is split on commas.
    pub fn parsed(&self) -> ParsedPlace {
        if self.address.is_empty() {
            return parse_display_name(&self.display_name);
        }

        let road = self.address_part(&ROAD_KEYS);
        let house = self.address_part(&["house_number"]);
        let address = match (road, house) {
            (Some(road), Some(house)) => format!("{road}, {house}"),
            (Some(road), None) => road.to_string(),
            _ => String::new(),
        };
        let cp = self.address_part(&["postcode"]).unwrap_or_default().to_string();

        let name = self
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .or_else(|| self.address_part(&POI_KEYS))
            .map(str::to_string)
            .or_else(|| (!address.is_empty()).then(|| address.clone()))
            .unwrap_or_else(|| first_segment(&self.display_name));

        let mut areas: Vec<&str> = Vec::new();
        for keys in AREA_KEYS {
            if let Some(area) = self.address_part(keys) {
                if !areas.contains(&area) {
                    areas.push(area);
                }
            }
        }

        ParsedPlace {
            name,
            address,
            cp,
            description: areas.join(", "),
        }
    }

    /// Data returned to the model: the raw hit plus its parsed parts.
    pub fn to_value(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        if let Value::Object(map) = &mut value {
            map.insert(
                "parsed".to_string(),
                serde_json::to_value(self.parsed()).unwrap_or(Value::Null),
            );
        }
        value
    }

    pub fn to_location_input(&self) -> LocationInput {
        let parsed = self.parsed();
        LocationInput {
            description: parsed.description,
            address: parsed.address,
            cp: parsed.cp,
            ..LocationInput::new(parsed.name, self.coordinates())
        }
    }
}

fn first_segment(display_name: &str) -> String {
    display_name
        .split(',')
        .map(str::trim)
        .find(|part| !part.is_empty())
        .unwrap_or_default()
        .to_string()
}

fn parse_display_name(display_name: &str) -> ParsedPlace {
    let parts: Vec<&str> = display_name
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect();
    let Some((first, rest)) = parts.split_first() else {
        return ParsedPlace::default();
    };

    let (address, rest) = match rest.split_first() {
        Some((number, tail)) if HOUSE_NUMBER.is_match(number) => {
            (format!("{first}, {number}"), tail)
        }
        _ => (first.to_string(), rest),
    };
    let cp = rest
        .iter()
        .find(|part| POSTAL_CODE.is_match(part))
        .map(|part| part.to_string())
        .unwrap_or_default();
    let description = rest
        .iter()
        .filter(|part| **part != cp)
        .copied()
        .collect::<Vec<_>>()
        .join(", ");

    ParsedPlace {
        name: first.to_string(),
        address,
        cp,
        description,
    }
}

pub trait Geocoder: Send + Sync {
    fn search(
        &self,
        query: &str,
        limit: u8,
    ) -> impl Future<Output = Result<Vec<GeocodeHit>, GeocodeError>> + Send;
}

impl<T: Geocoder> Geocoder for Arc<T> {
    fn search(
        &self,
        query: &str,
        limit: u8,
    ) -> impl Future<Output = Result<Vec<GeocodeHit>, GeocodeError>> + Send {
        (**self).search(query, limit)
    }
}

#[derive(Debug, Clone)]
pub struct GeocoderConfig {
    pub base_url: String,
    pub user_agent: String,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_GEOCODER_URL.to_string(),
            user_agent: default_user_agent(),
        }
    }
}

impl GeocoderConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("GEOPIN_GEOCODER_URL")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.base_url),
            user_agent: std::env::var("GEOPIN_USER_AGENT")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.user_agent),
        }
    }
}

pub fn default_user_agent() -> String {
    format!("geopin/{}", env!("CARGO_PKG_VERSION"))
}

/// OpenStreetMap Nominatim client.
#[derive(Debug, Clone)]
pub struct NominatimGeocoder {
    http: reqwest::Client,
    search_url: Url,
    user_agent: String,
}

impl NominatimGeocoder {
    pub fn new(config: GeocoderConfig) -> Result<Self, GeocodeError> {
        let base = format!("{}/", config.base_url.trim_end_matches('/'));
        let search_url = Url::parse(&base)?.join("search")?;
        Ok(Self {
            http: reqwest::Client::new(),
            search_url,
            user_agent: config.user_agent,
        })
    }
}

impl Geocoder for NominatimGeocoder {
    async fn search(&self, query: &str, limit: u8) -> Result<Vec<GeocodeHit>, GeocodeError> {
        let limit = limit.max(1).to_string();
        let resp = self
            .http
            .get(self.search_url.clone())
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("limit", limit.as_str()),
                ("addressdetails", "1"),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(GeocodeError::Status {
                status: status.as_u16(),
            });
        }
        let hits: Vec<GeocodeHit> = resp.json().await?;
        tracing::debug!(query, hits = hits.len(), "geocoder search");
        Ok(hits)
    }
}
