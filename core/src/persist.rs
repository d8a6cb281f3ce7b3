//! Versioned persistence of [`MapState`].
//!
//! The store is saved as a single JSON blob `{"state": {...}, "version": N}`
//! under [`STORE_KEY`]. Older blobs are migrated forward one version at a
//! time, then every marker is coerced through the normalizer. A marker that
//! cannot be recovered is dropped on its own; it never fails the load.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde_json::{Map, Value, json};

use crate::location::{Location, coerce_location, read_coordinates, read_finite_f64};
use crate::store::{MapState, MapStore, new_marker_id};

pub const STORE_KEY: &str = "map-store";

/// v1: `{id, lat, lng, title}` markers.
/// v2: address entries `{id, name, description, address, CP, coordinates}`.
/// v3: v2 plus `group` and `tags`.
pub const CURRENT_VERSION: u64 = 3;

type Migration = fn(Map<String, Value>) -> Map<String, Value>;

/// `MIGRATIONS[i]` lifts a state from version `i + 1` to `i + 2`.
const MIGRATIONS: [Migration; 2] = [migrate_v1_to_v2, migrate_v2_to_v3];

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("persisted blob is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid storage key '{0}'")]
    InvalidKey(String),
}

/// Result of bringing a persisted blob up to the current schema.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationOutcome {
    pub state: MapState,
    pub from_version: u64,
    pub dropped_markers: usize,
}

/// Serialize a state at the current version.
pub fn encode(state: &MapState) -> Value {
    json!({
        "state": state,
        "version": CURRENT_VERSION,
    })
}

/// Bring any persisted blob up to the current version. Total: unknown shapes
/// yield an empty state.
pub fn migrate(blob: &Value) -> MigrationOutcome {
    let from_version = blob_version(blob);
    let mut state = state_object(blob);

    let start = from_version.clamp(1, CURRENT_VERSION);
    for version in start..CURRENT_VERSION {
        state = MIGRATIONS[(version - 1) as usize](state);
        tracing::debug!(from = version, to = version + 1, "migrated map-store blob");
    }

    let raw_markers = state
        .get("markers")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let total = raw_markers.len();

    let mut seen = HashSet::new();
    let markers: Vec<Location> = raw_markers
        .iter()
        .filter_map(coerce_location)
        .map(|mut location| {
            if location.id.trim().is_empty() {
                location.id = new_marker_id();
            }
            location
        })
        .filter(|location| seen.insert(location.id.clone()))
        .collect();

    let dropped_markers = total - markers.len();
    if dropped_markers > 0 {
        tracing::warn!(
            dropped = dropped_markers,
            from_version,
            "dropped unrecoverable markers while loading map-store"
        );
    }

    let selected_id = state
        .get("selectedId")
        .and_then(Value::as_str)
        .filter(|id| markers.iter().any(|m| m.id == *id))
        .map(str::to_string);

    MigrationOutcome {
        state: MapState {
            markers,
            selected_id,
            center: state.get("center").and_then(read_coordinates),
            zoom: state.get("zoom").and_then(read_finite_f64),
        },
        from_version,
        dropped_markers,
    }
}

fn blob_version(blob: &Value) -> u64 {
    blob.get("version")
        .and_then(Value::as_u64)
        .filter(|v| *v >= 1)
        .unwrap_or(1)
}

fn state_object(blob: &Value) -> Map<String, Value> {
    match blob.get("state") {
        Some(Value::Object(state)) => state.clone(),
        // Pre-envelope saves stored the state at the top level.
        _ => blob
            .as_object()
            .filter(|obj| obj.contains_key("markers"))
            .cloned()
            .unwrap_or_default(),
    }
}

fn map_markers(
    mut state: Map<String, Value>,
    f: impl Fn(Map<String, Value>) -> Map<String, Value>,
) -> Map<String, Value> {
    if let Some(Value::Array(markers)) = state.remove("markers") {
        let migrated = markers
            .into_iter()
            .map(|marker| match marker {
                Value::Object(obj) => Value::Object(f(obj)),
                other => other,
            })
            .collect();
        state.insert("markers".to_string(), Value::Array(migrated));
    }
    state
}

fn migrate_v1_to_v2(state: Map<String, Value>) -> Map<String, Value> {
    map_markers(state, |mut marker| {
        if marker.contains_key("coordinates") {
            return marker;
        }
        let lat = marker.remove("lat");
        let lng = marker.remove("lng");
        let title = marker.remove("title");
        marker
            .entry("name")
            .or_insert_with(|| title.unwrap_or(Value::Null));
        marker.entry("description").or_insert_with(|| json!(""));
        marker.entry("address").or_insert_with(|| json!(""));
        marker.entry("CP").or_insert_with(|| json!(""));
        if let (Some(lat), Some(lng)) = (lat, lng) {
            marker.insert("coordinates".to_string(), json!({ "lat": lat, "lng": lng }));
        }
        marker
    })
}

fn migrate_v2_to_v3(state: Map<String, Value>) -> Map<String, Value> {
    map_markers(state, |mut marker| {
        marker
            .entry("group")
            .or_insert_with(|| json!(crate::location::DEFAULT_GROUP));
        marker.entry("tags").or_insert_with(|| json!([]));
        marker
    })
}

/// String key/value storage holding the persisted blob.
pub trait BlobStorage {
    fn get(&self, key: &str) -> Result<Option<String>, PersistError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), PersistError>;
    fn remove(&mut self, key: &str) -> Result<(), PersistError>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStorage {
    entries: HashMap<String, String>,
}

impl MemoryBlobStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStorage for MemoryBlobStorage {
    fn get(&self, key: &str) -> Result<Option<String>, PersistError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), PersistError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), PersistError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// One `<key>.json` file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileBlobStorage {
    dir: PathBuf,
}

impl FileBlobStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, PersistError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(PersistError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl BlobStorage for FileBlobStorage {
    fn get(&self, key: &str) -> Result<Option<String>, PersistError> {
        let path = self.path_for(key)?;
        match std::fs::read_to_string(&path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), PersistError> {
        let path = self.path_for(key)?;
        std::fs::create_dir_all(&self.dir)?;
        // Write-then-rename so a crash never leaves a truncated blob.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), PersistError> {
        let path = self.path_for(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Load and migrate the store. A missing blob is an empty store; a blob that
/// is not JSON at all is an error rather than a silent reset.
pub fn load_store(storage: &impl BlobStorage) -> Result<MapStore, PersistError> {
    let Some(raw) = storage.get(STORE_KEY)? else {
        return Ok(MapStore::new());
    };
    let blob: Value = serde_json::from_str(&raw)?;
    let outcome = migrate(&blob);
    if outcome.from_version < CURRENT_VERSION {
        tracing::info!(
            from_version = outcome.from_version,
            to_version = CURRENT_VERSION,
            markers = outcome.state.markers.len(),
            "upgraded persisted map-store"
        );
    }
    Ok(MapStore::from_state(outcome.state))
}

pub fn save_store(storage: &mut impl BlobStorage, store: &MapStore) -> Result<(), PersistError> {
    let raw = serde_json::to_string(&encode(store.state()))?;
    storage.set(STORE_KEY, &raw)
}
