use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

pub type MarkerId = String;

/// Group assigned to locations that were never categorized.
pub const DEFAULT_GROUP: &str = "Inbox";

/// Display label used when a record arrives without a usable name.
pub const UNTITLED: &str = "(untitled)";

pub const INBOX_COLOR: &str = "#6b7280";

pub const GROUP_COLORS: [&str; 10] = [
    "#ef4444", "#f97316", "#84cc16", "#10b981", "#06b6d4", "#3b82f6", "#8b5cf6", "#d946ef",
    "#ec4899", "#f59e0b",
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }

    /// True when both components are finite and inside the WGS84 ranges.
    pub fn in_range(&self) -> bool {
        self.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

/// A saved marker. Every value of this type is fully populated; records of
/// any other shape go through [`normalize`] first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Location {
    pub id: MarkerId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub address: String,
    /// Postal code
    #[serde(rename = "CP", default)]
    pub cp: String,
    pub coordinates: Coordinates,
    #[serde(default = "default_group")]
    pub group: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_group() -> String {
    DEFAULT_GROUP.to_string()
}

/// Creation payload: a location without an id, where id, group and tags may
/// be supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LocationInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MarkerId>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub address: String,
    #[serde(rename = "CP", default)]
    pub cp: String,
    pub coordinates: Coordinates,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl Default for Coordinates {
    fn default() -> Self {
        Self { lat: 0.0, lng: 0.0 }
    }
}

impl LocationInput {
    pub fn new(name: impl Into<String>, coordinates: Coordinates) -> Self {
        Self {
            name: name.into(),
            coordinates,
            ..Self::default()
        }
    }

    /// Build the stored record under the given id.
    pub fn into_location(self, id: MarkerId) -> Location {
        normalize(PartialLocation {
            id: Some(id),
            name: Some(self.name),
            description: Some(self.description),
            address: Some(self.address),
            cp: Some(self.cp),
            coordinates: Some(self.coordinates),
            group: self.group,
            tags: self.tags,
        })
    }
}

impl From<Location> for LocationInput {
    fn from(location: Location) -> Self {
        Self {
            id: Some(location.id),
            name: location.name,
            description: location.description,
            address: location.address,
            cp: location.cp,
            coordinates: location.coordinates,
            group: Some(location.group),
            tags: Some(location.tags),
        }
    }
}

/// Shallow patch over the mutable fields. Coordinates are deliberately
/// absent: moving a marker goes through `MapStore::move_marker`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LocationPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(rename = "CP", default, skip_serializing_if = "Option::is_none")]
    pub cp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl LocationPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.address.is_none()
            && self.cp.is_none()
            && self.group.is_none()
            && self.tags.is_none()
    }

    /// Merge into `location`, keeping name and group non-empty.
    pub fn apply_to(&self, location: &mut Location) {
        if let Some(name) = &self.name {
            location.name = non_blank_or(Some(name.clone()), UNTITLED);
        }
        if let Some(description) = &self.description {
            location.description = description.clone();
        }
        if let Some(address) = &self.address {
            location.address = address.clone();
        }
        if let Some(cp) = &self.cp {
            location.cp = cp.clone();
        }
        if let Some(group) = &self.group {
            location.group = non_blank_or(Some(group.clone()), DEFAULT_GROUP);
        }
        if let Some(tags) = &self.tags {
            location.tags = tags.clone();
        }
    }
}

/// A location of unknown provenance: every field may be missing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialLocation {
    pub id: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub address: Option<String>,
    pub cp: Option<String>,
    pub coordinates: Option<Coordinates>,
    pub group: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl PartialLocation {
    /// Read whatever is usable out of arbitrary JSON. Wrong-typed fields are
    /// treated as missing; non-string tag items are dropped.
    pub fn from_value(value: &Value) -> Self {
        let Some(obj) = value.as_object() else {
            return Self::default();
        };
        let text = |key: &str| obj.get(key).and_then(Value::as_str).map(str::to_string);
        Self {
            id: text("id"),
            name: text("name"),
            description: text("description"),
            address: text("address"),
            cp: text("CP"),
            coordinates: obj.get("coordinates").and_then(read_coordinates),
            group: text("group"),
            tags: obj.get("tags").and_then(Value::as_array).map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            }),
        }
    }
}

/// Coerce a partial record into a fully populated [`Location`].
/// Total and side-effect free: a missing id stays empty for the caller to assign.
pub fn normalize(partial: PartialLocation) -> Location {
    Location {
        id: partial.id.unwrap_or_default(),
        name: non_blank_or(partial.name, UNTITLED),
        description: partial.description.unwrap_or_default(),
        address: partial.address.unwrap_or_default(),
        cp: partial.cp.unwrap_or_default(),
        coordinates: partial
            .coordinates
            .filter(Coordinates::is_finite)
            .unwrap_or_default(),
        group: non_blank_or(partial.group, DEFAULT_GROUP),
        tags: partial.tags.unwrap_or_default(),
    }
}

/// Strict variant used for persisted and imported records: a record whose
/// coordinates cannot be recovered yields `None` instead of a marker at 0,0.
pub fn coerce_location(value: &Value) -> Option<Location> {
    if !value.is_object() {
        return None;
    }
    let partial = PartialLocation::from_value(value);
    partial.coordinates?;
    Some(normalize(partial))
}

/// Read `{lat, lng}` accepting numbers or numeric strings; non-finite values are rejected.
pub fn read_coordinates(value: &Value) -> Option<Coordinates> {
    let obj = value.as_object()?;
    let lat = read_finite_f64(obj.get("lat")?)?;
    let lng = read_finite_f64(obj.get("lng")?)?;
    Some(Coordinates { lat, lng })
}

pub fn read_finite_f64(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    parsed.is_finite().then_some(parsed)
}

fn non_blank_or(value: Option<String>, fallback: &str) -> String {
    match value {
        Some(v) if !v.trim().is_empty() => v,
        _ => fallback.to_string(),
    }
}

fn group_order(a: &str, b: &str) -> std::cmp::Ordering {
    match (a == DEFAULT_GROUP, b == DEFAULT_GROUP) {
        (true, false) => std::cmp::Ordering::Less,
        (false, true) => std::cmp::Ordering::Greater,
        _ => a.to_lowercase().cmp(&b.to_lowercase()).then_with(|| a.cmp(b)),
    }
}

/// Distinct groups, "Inbox" first, the rest alphabetically.
pub fn unique_groups(locations: &[Location]) -> Vec<String> {
    let mut groups: Vec<String> = Vec::new();
    for location in locations {
        if !groups.contains(&location.group) {
            groups.push(location.group.clone());
        }
    }
    groups.sort_by(|a, b| group_order(a, b));
    groups
}

pub fn group_stats(locations: &[Location]) -> BTreeMap<String, usize> {
    let mut stats = BTreeMap::new();
    for location in locations {
        *stats.entry(location.group.clone()).or_insert(0) += 1;
    }
    stats
}

/// Bucket locations by group in display order, keeping insertion order
/// inside each bucket.
pub fn group_locations(locations: &[Location]) -> Vec<(String, Vec<&Location>)> {
    unique_groups(locations)
        .into_iter()
        .map(|group| {
            let members = locations.iter().filter(|l| l.group == group).collect();
            (group, members)
        })
        .collect()
}

/// Deterministic marker color for a group name.
pub fn group_color(group: &str) -> &'static str {
    if group == DEFAULT_GROUP {
        return INBOX_COLOR;
    }
    let hash = group
        .encode_utf16()
        .fold(0_u64, |acc, unit| acc + u64::from(unit));
    GROUP_COLORS[(hash % GROUP_COLORS.len() as u64) as usize]
}

/// Darken a `#rrggbb` color by 20%. Malformed input is returned unchanged.
pub fn darker_shade(hex: &str) -> String {
    let channel = |range: std::ops::Range<usize>| {
        hex.get(range)
            .and_then(|raw| u8::from_str_radix(raw, 16).ok())
    };
    if hex.len() != 7 || !hex.starts_with('#') {
        return hex.to_string();
    }
    match (channel(1..3), channel(3..5), channel(5..7)) {
        (Some(r), Some(g), Some(b)) => {
            let darken = |c: u8| (f64::from(c) * 0.8).floor() as u8;
            format!("#{:02x}{:02x}{:02x}", darken(r), darken(g), darken(b))
        }
        _ => hex.to_string(),
    }
}
