use serde_json::{Map, Value, json};

use geopin_core::error::codes;
use geopin_core::store::new_marker_id;
use geopin_core::{Coordinates, Location, LocationInput, LocationPatch, MapStore, StoreError};

use crate::catalog::{
    AddMarkerArgs, CenterMapArgs, ModifyLocationArgs, QueryArgs, RemoveMarkerArgs, ToolCall,
};
use crate::geocode::Geocoder;
use crate::result::{ToolError, ToolResult};

pub const MIN_ZOOM: f64 = 1.0;
pub const MAX_ZOOM: f64 = 18.0;

/// Minimum normalized Levenshtein similarity for a fuzzy name match.
pub const NAME_SIMILARITY_THRESHOLD: f64 = 0.6;

/// What tool execution may read and change.
///
/// `MapStore` implements it for single-process deployments, where tools act
/// on the real store. `StagedMarkers` implements it for stateless ones, where
/// tools act on a scratch copy and the caller replays the records later.
pub trait MapCapabilities {
    fn markers(&self) -> Vec<Location>;
    fn view_center(&self) -> Option<Coordinates>;
    fn insert(&mut self, location: Location) -> Result<(), StoreError>;
    fn remove(&mut self, id: &str) -> bool;
    fn update(&mut self, id: &str, patch: &LocationPatch) -> Option<Location>;
    fn center(&mut self, center: Coordinates, zoom: Option<f64>);
}

impl MapCapabilities for MapStore {
    fn markers(&self) -> Vec<Location> {
        MapStore::markers(self).to_vec()
    }

    fn view_center(&self) -> Option<Coordinates> {
        self.state().center
    }

    fn insert(&mut self, location: Location) -> Result<(), StoreError> {
        self.add_marker(LocationInput::from(location)).map(|_| ())
    }

    fn remove(&mut self, id: &str) -> bool {
        self.remove_marker(id)
    }

    fn update(&mut self, id: &str, patch: &LocationPatch) -> Option<Location> {
        if !self.update_marker(id, patch) {
            return None;
        }
        self.marker(id).cloned()
    }

    fn center(&mut self, center: Coordinates, zoom: Option<f64>) {
        self.set_center(center.lat, center.lng);
        if let Some(zoom) = zoom {
            self.set_zoom(zoom);
        }
    }
}

/// Scratch copy of a client's markers for one stateless turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StagedMarkers {
    markers: Vec<Location>,
    center: Option<Coordinates>,
    zoom: Option<f64>,
}

impl StagedMarkers {
    pub fn new(markers: Vec<Location>, center: Option<Coordinates>) -> Self {
        Self {
            markers,
            center,
            zoom: None,
        }
    }

    pub fn staged(&self) -> &[Location] {
        &self.markers
    }

    pub fn zoom(&self) -> Option<f64> {
        self.zoom
    }
}

impl MapCapabilities for StagedMarkers {
    fn markers(&self) -> Vec<Location> {
        self.markers.clone()
    }

    fn view_center(&self) -> Option<Coordinates> {
        self.center
    }

    fn insert(&mut self, location: Location) -> Result<(), StoreError> {
        if self.markers.iter().any(|m| m.id == location.id) {
            return Err(StoreError::DuplicateId(location.id));
        }
        self.markers.push(location);
        Ok(())
    }

    fn remove(&mut self, id: &str) -> bool {
        let before = self.markers.len();
        self.markers.retain(|m| m.id != id);
        self.markers.len() != before
    }

    fn update(&mut self, id: &str, patch: &LocationPatch) -> Option<Location> {
        let location = self.markers.iter_mut().find(|m| m.id == id)?;
        patch.apply_to(location);
        Some(location.clone())
    }

    fn center(&mut self, center: Coordinates, zoom: Option<f64>) {
        self.center = Some(center);
        if zoom.is_some() {
            self.zoom = zoom;
        }
    }
}

/// Runs validated tool calls against a [`MapCapabilities`] target.
#[derive(Debug, Clone)]
pub struct ToolExecutor<G> {
    geocoder: G,
}

impl<G: Geocoder> ToolExecutor<G> {
    pub fn new(geocoder: G) -> Self {
        Self { geocoder }
    }

    pub fn geocoder(&self) -> &G {
        &self.geocoder
    }

    /// Validate and run one raw call. Every failure is folded into the
    /// returned [`ToolResult`].
    pub async fn execute<C>(&self, name: &str, args: &Map<String, Value>, caps: &mut C) -> ToolResult
    where
        C: MapCapabilities + Send + ?Sized,
    {
        let result = match ToolCall::parse(name, args) {
            Ok(call) => self.run(call, caps).await,
            Err(err) => err.into_result(),
        };
        if result.success {
            tracing::info!(tool = name, "tool call succeeded");
        } else {
            tracing::warn!(
                tool = name,
                error = result.error.as_deref().unwrap_or_default(),
                "tool call failed"
            );
        }
        result
    }

    pub async fn run<C>(&self, call: ToolCall, caps: &mut C) -> ToolResult
    where
        C: MapCapabilities + Send + ?Sized,
    {
        let outcome = match call {
            ToolCall::AddMarker(args) => add_marker(args, caps),
            ToolCall::RemoveMarker(args) => remove_marker(args, caps),
            ToolCall::ListMarkers => Ok(list_markers(&*caps)),
            ToolCall::CenterMap(args) => center_map(args, caps),
            ToolCall::SearchLocation(args) => Ok(self.search_location(args).await),
            ToolCall::SearchWeb(args) => Err(search_web(args)),
            ToolCall::ModifyLocation(args) => modify_location(args, caps),
        };
        outcome.unwrap_or_else(ToolError::into_result)
    }

    async fn search_location(&self, args: QueryArgs) -> ToolResult {
        let no_results = || ToolResult::failure(format!("no results for \"{}\"", args.query));
        match self.geocoder.search(&args.query, 1).await {
            Ok(hits) => match hits.first() {
                Some(hit) => ToolResult::ok(
                    Some(hit.to_value()),
                    format!("Found: {}", hit.display_name),
                ),
                None => no_results(),
            },
            Err(err) => {
                tracing::warn!(query = %args.query, error = %err, "geocoder search failed");
                no_results()
            }
        }
    }
}

fn validate_coordinates(latitude: f64, longitude: f64) -> Result<Coordinates, ToolError> {
    if !(-90.0..=90.0).contains(&latitude) {
        return Err(
            ToolError::validation("latitude must be between -90 and 90").with_field("latitude"),
        );
    }
    if !(-180.0..=180.0).contains(&longitude) {
        return Err(
            ToolError::validation("longitude must be between -180 and 180")
                .with_field("longitude"),
        );
    }
    Ok(Coordinates::new(latitude, longitude))
}

fn add_marker<C>(args: AddMarkerArgs, caps: &mut C) -> Result<ToolResult, ToolError>
where
    C: MapCapabilities + ?Sized,
{
    let coordinates = validate_coordinates(args.latitude, args.longitude)?;
    let input = LocationInput {
        description: args.description.unwrap_or_default(),
        address: args.address.unwrap_or_default(),
        cp: args.cp.unwrap_or_default(),
        ..LocationInput::new(args.name, coordinates)
    };
    let location = input.into_location(new_marker_id());
    caps.insert(location.clone())
        .map_err(|err| ToolError::new(codes::CONFLICT, err.to_string()))?;

    let message = format!(
        "Marker \"{}\" added at [{:.4}, {:.4}]",
        location.name, coordinates.lat, coordinates.lng
    );
    Ok(ToolResult::ok(Some(json!(location)), message))
}

fn remove_marker<C>(args: RemoveMarkerArgs, caps: &mut C) -> Result<ToolResult, ToolError>
where
    C: MapCapabilities + ?Sized,
{
    if !caps.remove(&args.marker_id) {
        return Err(
            ToolError::not_found(format!("no marker with id '{}'", args.marker_id))
                .with_field("marker_id"),
        );
    }
    Ok(ToolResult::ok(
        Some(json!({ "id": args.marker_id })),
        "Marker removed",
    ))
}

fn list_markers<C>(caps: &C) -> ToolResult
where
    C: MapCapabilities + ?Sized,
{
    let markers = caps.markers();
    let message = match markers.len() {
        0 => "No markers saved".to_string(),
        1 => "Found 1 marker".to_string(),
        n => format!("Found {n} markers"),
    };
    ToolResult::ok(Some(json!(markers)), message)
}

fn center_map<C>(args: CenterMapArgs, caps: &mut C) -> Result<ToolResult, ToolError>
where
    C: MapCapabilities + ?Sized,
{
    let center = validate_coordinates(args.latitude, args.longitude)?;
    let zoom = args.zoom.map(|z| z.clamp(MIN_ZOOM, MAX_ZOOM));
    caps.center(center, zoom);

    let mut data = json!({ "latitude": center.lat, "longitude": center.lng });
    if let Some(zoom) = zoom {
        data["zoom"] = json!(zoom);
    }
    Ok(ToolResult::ok(
        Some(data),
        format!("Map centered at [{:.4}, {:.4}]", center.lat, center.lng),
    ))
}

fn search_web(args: QueryArgs) -> ToolError {
    ToolError::new(
        codes::EXTERNAL_ERROR,
        format!(
            "search_web has no local implementation; web results for \"{}\" come from the model's built-in search",
            args.query
        ),
    )
}

fn modify_location<C>(args: ModifyLocationArgs, caps: &mut C) -> Result<ToolResult, ToolError>
where
    C: MapCapabilities + ?Sized,
{
    if args.new_group.is_none() && args.new_tags.is_none() && args.description.is_none() {
        return Err(ToolError::validation(
            "modify_location needs at least one of newGroup, newTags or description",
        ));
    }

    let markers = caps.markers();
    let target = match_marker_name(&markers, &args.target_name).ok_or_else(|| {
        ToolError::not_found(format!("no location matching \"{}\"", args.target_name))
            .with_field("targetName")
    })?;

    let tags = args.new_tags.map(|new_tags| {
        let mut tags = target.tags.clone();
        for tag in new_tags {
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }
        tags
    });
    let patch = LocationPatch {
        group: args.new_group,
        tags,
        description: args.description,
        ..LocationPatch::default()
    };

    let updated = caps.update(&target.id, &patch).ok_or_else(|| {
        ToolError::not_found(format!("marker '{}' disappeared during the update", target.id))
    })?;
    let message = format!("Updated \"{}\"", updated.name);
    Ok(ToolResult::ok(Some(json!(updated)), message))
}

/// Resolve a loosely typed marker name: exact (trimmed, case-insensitive),
/// then containment either way, then the closest name by normalized
/// Levenshtein similarity above [`NAME_SIMILARITY_THRESHOLD`].
pub fn match_marker_name<'a>(markers: &'a [Location], target: &str) -> Option<&'a Location> {
    let needle = target.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }
    let names: Vec<String> = markers.iter().map(|m| m.name.trim().to_lowercase()).collect();

    if let Some(index) = names.iter().position(|name| *name == needle) {
        return markers.get(index);
    }
    if let Some(index) = names
        .iter()
        .position(|name| !name.is_empty() && (name.contains(&needle) || needle.contains(name.as_str())))
    {
        return markers.get(index);
    }

    let mut best: Option<(usize, f64)> = None;
    for (index, name) in names.iter().enumerate() {
        let score = strsim::normalized_levenshtein(name, &needle);
        if score >= NAME_SIMILARITY_THRESHOLD && best.is_none_or(|(_, top)| score > top) {
            best = Some((index, score));
        }
    }
    best.and_then(|(index, _)| markers.get(index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geocode::{GeocodeError, GeocodeHit};
    use std::collections::BTreeMap;

    struct FixedGeocoder(Vec<GeocodeHit>);

    impl Geocoder for FixedGeocoder {
        async fn search(&self, _query: &str, _limit: u8) -> Result<Vec<GeocodeHit>, GeocodeError> {
            Ok(self.0.clone())
        }
    }

    struct FailingGeocoder;

    impl Geocoder for FailingGeocoder {
        async fn search(&self, _query: &str, _limit: u8) -> Result<Vec<GeocodeHit>, GeocodeError> {
            Err(GeocodeError::Status { status: 503 })
        }
    }

    fn executor() -> ToolExecutor<FixedGeocoder> {
        ToolExecutor::new(FixedGeocoder(vec![GeocodeHit {
            display_name: "Playa de las Canteras, Las Palmas, 35010, España".to_string(),
            lat: 28.14,
            lon: -15.43,
            name: None,
            class: None,
            kind: None,
            address: BTreeMap::new(),
        }]))
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn store_with(names: &[&str]) -> MapStore {
        let mut store = MapStore::new();
        for (i, name) in names.iter().enumerate() {
            store
                .add_marker(LocationInput::new(*name, Coordinates::new(i as f64, i as f64)))
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn add_marker_creates_normalized_location() {
        let mut store = MapStore::new();
        let result = executor()
            .execute(
                "add_marker",
                &args(json!({ "name": "Cafe", "latitude": 28.1, "longitude": -15.4 })),
                &mut store,
            )
            .await;
        assert!(result.success);
        let data = result.data.unwrap();
        assert_eq!(data["group"], "Inbox");
        assert_eq!(data["tags"], json!([]));
        assert_eq!(store.markers().len(), 1);
        assert_eq!(store.markers()[0].id, data["id"].as_str().unwrap());
    }

    #[tokio::test]
    async fn add_marker_rejects_out_of_range_latitude() {
        let mut store = MapStore::new();
        let result = executor()
            .execute(
                "add_marker",
                &args(json!({ "name": "X", "latitude": 95, "longitude": 0 })),
                &mut store,
            )
            .await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("latitude"));
        assert!(store.markers().is_empty());
    }

    #[tokio::test]
    async fn unknown_tool_is_a_failed_result() {
        let mut store = MapStore::new();
        let result = executor().execute("fly_to_moon", &Map::new(), &mut store).await;
        assert!(!result.success);
        assert_eq!(result.data.unwrap()["error_code"], "unknown_tool");
    }

    #[tokio::test]
    async fn remove_marker_reports_missing_id() {
        let mut store = store_with(&["Cafe"]);
        let id = store.markers()[0].id.clone();
        let exec = executor();

        let removed = exec
            .execute("remove_marker", &args(json!({ "marker_id": id })), &mut store)
            .await;
        assert!(removed.success);
        assert_eq!(removed.data.unwrap()["id"], id.as_str());
        assert!(store.markers().is_empty());

        let again = exec
            .execute("remove_marker", &args(json!({ "marker_id": id })), &mut store)
            .await;
        assert!(!again.success);
    }

    #[tokio::test]
    async fn list_markers_returns_snapshot() {
        let mut store = store_with(&["A", "B"]);
        let result = executor().execute("list_markers", &Map::new(), &mut store).await;
        assert!(result.success);
        assert_eq!(result.data.unwrap().as_array().unwrap().len(), 2);
        assert_eq!(result.message.as_deref(), Some("Found 2 markers"));
    }

    #[tokio::test]
    async fn center_map_clamps_zoom() {
        let mut store = MapStore::new();
        let result = executor()
            .execute(
                "center_map",
                &args(json!({ "latitude": 40.0, "longitude": -3.7, "zoom": 25 })),
                &mut store,
            )
            .await;
        assert!(result.success);
        assert_eq!(result.data.unwrap()["zoom"], json!(18.0));
        assert_eq!(store.state().center, Some(Coordinates::new(40.0, -3.7)));
        assert_eq!(store.state().zoom, Some(18.0));
    }

    #[tokio::test]
    async fn search_location_returns_hit_with_parsed_parts() {
        let mut store = MapStore::new();
        let result = executor()
            .execute("search_location", &args(json!({ "query": "canteras" })), &mut store)
            .await;
        assert!(result.success);
        let data = result.data.unwrap();
        assert_eq!(data["lat"], json!(28.14));
        assert_eq!(data["parsed"]["CP"], "35010");
    }

    #[tokio::test]
    async fn search_location_failures_read_as_no_results() {
        let mut store = MapStore::new();
        let empty = ToolExecutor::new(FixedGeocoder(Vec::new()))
            .execute("search_location", &args(json!({ "query": "nowhere" })), &mut store)
            .await;
        assert_eq!(empty.error.as_deref(), Some("no results for \"nowhere\""));

        let failed = ToolExecutor::new(FailingGeocoder)
            .execute("search_location", &args(json!({ "query": "nowhere" })), &mut store)
            .await;
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("no results for \"nowhere\""));
    }

    #[tokio::test]
    async fn search_web_has_no_local_implementation() {
        let mut store = MapStore::new();
        let result = executor()
            .execute("search_web", &args(json!({ "query": "opening hours" })), &mut store)
            .await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn modify_location_appends_tags_and_regroups() {
        let mut store = MapStore::new();
        store
            .add_marker(LocationInput {
                tags: Some(vec!["coffee".to_string()]),
                ..LocationInput::new("Cafe Regina", Coordinates::new(28.1, -15.4))
            })
            .unwrap();

        let result = executor()
            .execute(
                "modify_location",
                &args(json!({
                    "targetName": "cafe regina",
                    "newGroup": "Food",
                    "newTags": ["coffee", "wifi"]
                })),
                &mut store,
            )
            .await;
        assert!(result.success, "{result:?}");
        let marker = &store.markers()[0];
        assert_eq!(marker.group, "Food");
        assert_eq!(marker.tags, vec!["coffee".to_string(), "wifi".to_string()]);
        assert_eq!(result.data.unwrap()["group"], "Food");
    }

    #[tokio::test]
    async fn modify_location_reports_unmatched_name() {
        let mut store = store_with(&["Beach"]);
        let result = executor()
            .execute(
                "modify_location",
                &args(json!({ "targetName": "Museum", "newGroup": "Culture" })),
                &mut store,
            )
            .await;
        assert!(!result.success);
        assert_eq!(store.markers()[0].group, "Inbox");
    }

    #[test]
    fn name_matching_prefers_exact_then_substring_then_similarity() {
        let markers = store_with(&["Cafe Central", "Cafe", "Playa Chica"])
            .markers()
            .to_vec();

        assert_eq!(match_marker_name(&markers, "  CAFE ").unwrap().name, "Cafe");
        assert_eq!(match_marker_name(&markers, "central").unwrap().name, "Cafe Central");
        assert_eq!(match_marker_name(&markers, "Playa Chika").unwrap().name, "Playa Chica");
        assert!(match_marker_name(&markers, "Museum of Art").is_none());
        assert!(match_marker_name(&markers, "   ").is_none());
    }

    #[tokio::test]
    async fn staged_calls_see_earlier_effects() {
        let mut staged = StagedMarkers::new(Vec::new(), None);
        let exec = executor();
        let added = exec
            .execute(
                "add_marker",
                &args(json!({ "name": "Canteras", "latitude": 28.14, "longitude": -15.43 })),
                &mut staged,
            )
            .await;
        assert!(added.success);

        let modified = exec
            .execute(
                "modify_location",
                &args(json!({ "targetName": "Canteras", "newTags": ["beach"] })),
                &mut staged,
            )
            .await;
        assert!(modified.success);
        assert_eq!(staged.staged()[0].tags, vec!["beach".to_string()]);
    }

    #[tokio::test]
    async fn direct_and_staged_results_share_shape() {
        let exec = executor();
        let call = args(json!({ "latitude": 1.0, "longitude": 2.0, "zoom": 0 }));
        let mut store = MapStore::new();
        let mut staged = StagedMarkers::new(Vec::new(), None);
        let direct = exec.execute("center_map", &call, &mut store).await;
        let scratch = exec.execute("center_map", &call, &mut staged).await;
        assert_eq!(direct, scratch);
        assert_eq!(staged.zoom(), Some(1.0));
    }
}
