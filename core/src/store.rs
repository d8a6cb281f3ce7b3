use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::location::{Coordinates, Location, LocationInput, LocationPatch, MarkerId};

pub type SubscriptionId = u64;

type Listener = Box<dyn Fn(&MapState) + Send + Sync>;

/// Everything the map needs to restore itself after a reload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MapState {
    pub markers: Vec<Location>,
    pub selected_id: Option<MarkerId>,
    pub center: Option<Coordinates>,
    pub zoom: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("marker id '{0}' already exists")]
    DuplicateId(MarkerId),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub added: usize,
    pub skipped_duplicates: usize,
}

/// Fresh, never-reused marker id.
pub fn new_marker_id() -> MarkerId {
    Uuid::now_v7().to_string()
}

/// Reactive container for markers, selection and viewport.
///
/// Mutations are synchronous and notify every subscriber with the new state.
/// Inputs are trusted: range checks belong to whoever calls the store on
/// behalf of an untrusted source (the tool executor).
pub struct MapStore {
    state: MapState,
    listeners: Vec<(SubscriptionId, Listener)>,
    next_subscription: SubscriptionId,
}

impl Default for MapStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MapStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapStore")
            .field("state", &self.state)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl MapStore {
    pub fn new() -> Self {
        Self::from_state(MapState::default())
    }

    /// Adopt a previously persisted state. A selection pointing at a missing
    /// marker is dropped.
    pub fn from_state(mut state: MapState) -> Self {
        if let Some(selected) = &state.selected_id {
            if !state.markers.iter().any(|m| &m.id == selected) {
                state.selected_id = None;
            }
        }
        Self {
            state,
            listeners: Vec::new(),
            next_subscription: 1,
        }
    }

    pub fn state(&self) -> &MapState {
        &self.state
    }

    pub fn markers(&self) -> &[Location] {
        &self.state.markers
    }

    pub fn marker(&self, id: &str) -> Option<&Location> {
        self.state.markers.iter().find(|m| m.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.marker(id).is_some()
    }

    pub fn selected_id(&self) -> Option<&str> {
        self.state.selected_id.as_deref()
    }

    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: Fn(&MapState) + Send + Sync + 'static,
    {
        let id = self.next_subscription;
        self.next_subscription += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(sid, _)| *sid != id);
        self.listeners.len() != before
    }

    fn notify(&self) {
        for (_, listener) in &self.listeners {
            listener(&self.state);
        }
    }

    /// Insert a marker, generating an id unless one is supplied.
    /// A supplied id that is already taken is rejected, never overwritten.
    pub fn add_marker(&mut self, input: LocationInput) -> Result<MarkerId, StoreError> {
        let id = match input.id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => new_marker_id(),
        };
        if self.contains(&id) {
            return Err(StoreError::DuplicateId(id));
        }
        let location = input.into_location(id.clone());
        self.state.markers.push(location);
        self.notify();
        Ok(id)
    }

    /// Remove a marker; absent ids are a no-op. Clears the selection when it
    /// pointed at the removed marker.
    pub fn remove_marker(&mut self, id: &str) -> bool {
        let before = self.state.markers.len();
        self.state.markers.retain(|m| m.id != id);
        if self.state.markers.len() == before {
            return false;
        }
        if self.state.selected_id.as_deref() == Some(id) {
            self.state.selected_id = None;
        }
        self.notify();
        true
    }

    pub fn rename_marker(&mut self, id: &str, name: impl Into<String>) -> bool {
        self.update_marker(
            id,
            &LocationPatch {
                name: Some(name.into()),
                ..LocationPatch::default()
            },
        )
    }

    pub fn update_marker(&mut self, id: &str, patch: &LocationPatch) -> bool {
        let Some(location) = self.state.markers.iter_mut().find(|m| m.id == id) else {
            return false;
        };
        patch.apply_to(location);
        self.notify();
        true
    }

    pub fn move_marker(&mut self, id: &str, coordinates: Coordinates) -> bool {
        let Some(location) = self.state.markers.iter_mut().find(|m| m.id == id) else {
            return false;
        };
        location.coordinates = coordinates;
        self.notify();
        true
    }

    pub fn set_center(&mut self, lat: f64, lng: f64) {
        self.state.center = Some(Coordinates { lat, lng });
        self.notify();
    }

    pub fn set_zoom(&mut self, zoom: f64) {
        self.state.zoom = Some(zoom);
        self.notify();
    }

    /// Select a marker, or clear the selection with `None`. Selecting an
    /// unknown id clears the selection.
    pub fn select_marker(&mut self, id: Option<&str>) {
        self.state.selected_id = id.filter(|id| self.contains(id)).map(str::to_string);
        self.notify();
    }

    pub fn clear(&mut self) {
        self.state.markers.clear();
        self.state.selected_id = None;
        self.notify();
    }

    /// Bulk insert of already-validated records (file import). Records
    /// without an id get one; ids already present are skipped.
    pub fn import(&mut self, locations: Vec<Location>) -> ImportSummary {
        let mut summary = ImportSummary::default();
        for mut location in locations {
            if location.id.trim().is_empty() {
                location.id = new_marker_id();
            }
            if self.contains(&location.id) {
                summary.skipped_duplicates += 1;
                continue;
            }
            self.state.markers.push(location);
            summary.added += 1;
        }
        if summary.added > 0 {
            self.notify();
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::location::DEFAULT_GROUP;

    fn cafe() -> LocationInput {
        LocationInput::new("Cafe", Coordinates::new(28.1, -15.4))
    }

    #[test]
    fn add_marker_assigns_id_and_defaults() {
        let mut store = MapStore::new();
        let id = store.add_marker(cafe()).unwrap();
        assert!(!id.is_empty());

        let matching: Vec<_> = store.markers().iter().filter(|m| m.id == id).collect();
        assert_eq!(matching.len(), 1);
        assert_eq!(matching[0].group, DEFAULT_GROUP);
        assert!(matching[0].tags.is_empty());
    }

    #[test]
    fn add_marker_rejects_taken_id() {
        let mut store = MapStore::new();
        let id = store.add_marker(cafe()).unwrap();
        let err = store
            .add_marker(LocationInput {
                id: Some(id.clone()),
                ..cafe()
            })
            .unwrap_err();
        assert_eq!(err, StoreError::DuplicateId(id));
        assert_eq!(store.markers().len(), 1);
    }

    #[test]
    fn removing_selected_marker_clears_selection() {
        let mut store = MapStore::new();
        let id = store.add_marker(cafe()).unwrap();
        store.select_marker(Some(&id));
        assert_eq!(store.selected_id(), Some(id.as_str()));

        assert!(store.remove_marker(&id));
        assert_eq!(store.selected_id(), None);
        assert!(!store.remove_marker(&id));
    }

    #[test]
    fn removing_other_marker_keeps_selection() {
        let mut store = MapStore::new();
        let keep = store.add_marker(cafe()).unwrap();
        let other = store.add_marker(cafe()).unwrap();
        store.select_marker(Some(&keep));
        store.remove_marker(&other);
        assert_eq!(store.selected_id(), Some(keep.as_str()));
    }

    #[test]
    fn selecting_unknown_id_clears_selection() {
        let mut store = MapStore::new();
        let id = store.add_marker(cafe()).unwrap();
        store.select_marker(Some(&id));
        store.select_marker(Some("missing"));
        assert_eq!(store.selected_id(), None);
    }

    #[test]
    fn update_and_rename_are_no_ops_for_absent_ids() {
        let mut store = MapStore::new();
        assert!(!store.rename_marker("missing", "x"));
        assert!(!store.update_marker("missing", &LocationPatch::default()));
        assert!(!store.move_marker("missing", Coordinates::new(1.0, 1.0)));
    }

    #[test]
    fn update_patches_only_given_fields() {
        let mut store = MapStore::new();
        let id = store
            .add_marker(LocationInput {
                description: "corner".to_string(),
                ..cafe()
            })
            .unwrap();
        assert!(store.update_marker(
            &id,
            &LocationPatch {
                group: Some("Favorites".to_string()),
                ..LocationPatch::default()
            }
        ));
        let marker = store.marker(&id).unwrap();
        assert_eq!(marker.group, "Favorites");
        assert_eq!(marker.description, "corner");
        assert_eq!(marker.coordinates, Coordinates::new(28.1, -15.4));
    }

    #[test]
    fn subscribers_observe_every_mutation_until_unsubscribed() {
        let mut store = MapStore::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let sub = store.subscribe(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let id = store.add_marker(cafe()).unwrap();
        store.set_center(1.0, 2.0);
        store.set_zoom(12.0);
        store.remove_marker(&id);
        assert_eq!(calls.load(Ordering::SeqCst), 4);

        assert!(store.unsubscribe(sub));
        store.clear();
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn clear_empties_markers_and_selection_but_keeps_view() {
        let mut store = MapStore::new();
        let id = store.add_marker(cafe()).unwrap();
        store.select_marker(Some(&id));
        store.set_center(3.0, 4.0);
        store.clear();
        assert!(store.markers().is_empty());
        assert_eq!(store.selected_id(), None);
        assert_eq!(store.state().center, Some(Coordinates::new(3.0, 4.0)));
    }

    #[test]
    fn import_skips_duplicates_and_assigns_missing_ids() {
        let mut store = MapStore::new();
        let existing = store.add_marker(cafe()).unwrap();
        let summary = store.import(vec![
            cafe().into_location(existing),
            cafe().into_location(String::new()),
        ]);
        assert_eq!(
            summary,
            ImportSummary {
                added: 1,
                skipped_duplicates: 1
            }
        );
        assert_eq!(store.markers().len(), 2);
        assert!(store.markers().iter().all(|m| !m.id.is_empty()));
    }

    #[test]
    fn from_state_drops_dangling_selection() {
        let store = MapStore::from_state(MapState {
            selected_id: Some("ghost".to_string()),
            ..MapState::default()
        });
        assert_eq!(store.selected_id(), None);
    }
}
