use std::collections::HashSet;

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use geopin_core::location::{coerce_location, read_finite_f64};
use geopin_core::{LocationInput, LocationPatch, MapStore};

use crate::catalog::ToolName;
use crate::notice::{Notice, Notifier};
use crate::result::ToolCallRecord;

pub const CENTER_NOTICE_TIMEOUT_MS: u64 = 2000;

/// Storage key for the call ids a client has already applied.
pub const APPLIED_KEY: &str = "applied-calls";

/// Store operation a tool's result is replayed into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    InsertMarker,
    RemoveMarker,
    CenterView,
    PatchMarker,
    Informational,
}

pub fn route(tool: ToolName) -> Route {
    match tool {
        ToolName::AddMarker => Route::InsertMarker,
        ToolName::RemoveMarker => Route::RemoveMarker,
        ToolName::CenterMap => Route::CenterView,
        ToolName::ModifyLocation => Route::PatchMarker,
        ToolName::ListMarkers | ToolName::SearchLocation | ToolName::SearchWeb => {
            Route::Informational
        }
    }
}

pub fn routing_table() -> Vec<(ToolName, Route)> {
    ToolName::ALL.iter().map(|tool| (*tool, route(*tool))).collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    pub processed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl ApplyReport {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

/// Replays tool-call records produced in staged mode into the real store.
///
/// Each record is applied at most once: its `call_id` is remembered and a
/// replay of the same record is skipped.
#[derive(Debug, Clone, Default)]
pub struct ActionApplier {
    applied: HashSet<Uuid>,
}

impl ActionApplier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume with call ids applied by an earlier session.
    pub fn with_applied(applied: HashSet<Uuid>) -> Self {
        Self { applied }
    }

    pub fn has_applied(&self, call_id: &Uuid) -> bool {
        self.applied.contains(call_id)
    }

    pub fn applied(&self) -> &HashSet<Uuid> {
        &self.applied
    }

    pub fn apply<N>(
        &mut self,
        store: &mut MapStore,
        records: &[ToolCallRecord],
        notifier: &mut N,
    ) -> ApplyReport
    where
        N: Notifier + ?Sized,
    {
        let mut report = ApplyReport::default();
        for record in records {
            if !self.applied.insert(record.call_id) {
                report.skipped += 1;
                continue;
            }

            if !record.result.success {
                let error = record.result.error.as_deref().unwrap_or("tool call failed");
                notifier.notify(Notice::error(format!("{}: {error}", record.name)));
                report.failed += 1;
                continue;
            }

            let outcome = match ToolName::from_name(&record.name) {
                Some(tool) => apply_one(store, route(tool), record.result.data.as_ref()),
                None => Err(format!("unknown tool '{}'", record.name)),
            };
            match outcome {
                Ok(Some(notice)) => {
                    notifier.notify(notice);
                    report.processed += 1;
                }
                Ok(None) => report.processed += 1,
                Err(error) => {
                    tracing::warn!(tool = %record.name, call_id = %record.call_id, error = %error, "could not apply tool result");
                    notifier.notify(Notice::error(format!("{}: {error}", record.name)));
                    report.failed += 1;
                }
            }
        }
        tracing::debug!(
            processed = report.processed,
            failed = report.failed,
            skipped = report.skipped,
            "applied tool results"
        );
        report
    }
}

fn apply_one(store: &mut MapStore, route: Route, data: Option<&Value>) -> Result<Option<Notice>, String> {
    match route {
        Route::Informational => Ok(None),
        Route::InsertMarker => {
            let location = data
                .and_then(coerce_location)
                .ok_or("result carried no marker")?;
            let name = location.name.clone();
            store
                .add_marker(LocationInput::from(location))
                .map_err(|e| e.to_string())?;
            Ok(Some(Notice::success(format!("Assistant added: {name}"))))
        }
        Route::RemoveMarker => {
            let id = data
                .and_then(|d| d.get("id"))
                .and_then(Value::as_str)
                .ok_or("result carried no marker id")?;
            if !store.remove_marker(id) {
                return Err(format!("marker '{id}' is not on the map"));
            }
            Ok(Some(Notice::info("Assistant removed a marker")))
        }
        Route::CenterView => {
            let data = data.ok_or("result carried no coordinates")?;
            let lat = data.get("latitude").and_then(read_finite_f64);
            let lng = data.get("longitude").and_then(read_finite_f64);
            let (Some(lat), Some(lng)) = (lat, lng) else {
                return Err("result carried no coordinates".to_string());
            };
            store.set_center(lat, lng);
            if let Some(zoom) = data.get("zoom").and_then(read_finite_f64) {
                store.set_zoom(zoom);
            }
            Ok(Some(
                Notice::info("Assistant centered the map").with_timeout(CENTER_NOTICE_TIMEOUT_MS),
            ))
        }
        Route::PatchMarker => {
            let location = data
                .and_then(coerce_location)
                .ok_or("result carried no marker")?;
            let patch = LocationPatch {
                description: Some(location.description),
                group: Some(location.group),
                tags: Some(location.tags),
                ..LocationPatch::default()
            };
            if !store.update_marker(&location.id, &patch) {
                return Err(format!("marker '{}' is not on the map", location.id));
            }
            Ok(Some(Notice::success(format!("Assistant updated: {}", location.name))))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::catalog;
    use crate::notice::{NoticeLevel, NoticeQueue};
    use crate::result::ToolResult;
    use geopin_core::Coordinates;
    use serde_json::json;

    fn added(id: &str, name: &str) -> ToolCallRecord {
        let location = LocationInput::new(name, Coordinates::new(28.1, -15.4)).into_location(id.to_string());
        ToolCallRecord::new(
            "add_marker",
            json!({ "name": name, "latitude": 28.1, "longitude": -15.4 }),
            ToolResult::ok(Some(json!(location)), "added"),
        )
    }

    #[test]
    fn routing_covers_the_whole_catalog() {
        let routed: Vec<ToolName> = routing_table().into_iter().map(|(tool, _)| tool).collect();
        let cataloged: Vec<ToolName> = catalog().iter().map(|d| d.name).collect();
        assert_eq!(routed, cataloged);
    }

    #[test]
    fn applies_mutations_and_counts_informational_records() {
        let mut store = MapStore::new();
        let mut notices = NoticeQueue::new();
        let records = vec![
            added("m-1", "Beach"),
            ToolCallRecord::new("list_markers", json!({}), ToolResult::ok(Some(json!([])), "none")),
            ToolCallRecord::new(
                "center_map",
                json!({}),
                ToolResult::ok(Some(json!({ "latitude": 28.1, "longitude": -15.4, "zoom": 12.0 })), "centered"),
            ),
        ];

        let report = ActionApplier::new().apply(&mut store, &records, &mut notices);
        assert_eq!(report, ApplyReport { processed: 3, failed: 0, skipped: 0 });
        assert_eq!(store.markers()[0].id, "m-1");
        assert_eq!(store.state().center, Some(Coordinates::new(28.1, -15.4)));
        assert_eq!(store.state().zoom, Some(12.0));

        let levels: Vec<NoticeLevel> = notices.notices().iter().map(|n| n.level).collect();
        assert_eq!(levels, vec![NoticeLevel::Success, NoticeLevel::Info]);
        assert_eq!(notices.notices()[1].timeout_ms, 2000);
    }

    #[test]
    fn replaying_records_applies_them_once() {
        let mut store = MapStore::new();
        let mut notices = NoticeQueue::new();
        let mut applier = ActionApplier::new();
        let records = vec![added("m-1", "Beach")];

        applier.apply(&mut store, &records, &mut notices);
        let replay = applier.apply(&mut store, &records, &mut notices);

        assert_eq!(replay, ApplyReport { processed: 0, failed: 0, skipped: 1 });
        assert_eq!(store.markers().len(), 1);
        assert!(applier.has_applied(&records[0].call_id));

        let mut resumed = ActionApplier::with_applied(applier.applied().clone());
        let again = resumed.apply(&mut store, &records, &mut notices);
        assert_eq!(again, ApplyReport { processed: 0, failed: 0, skipped: 1 });
    }

    #[test]
    fn removal_raises_an_info_notice() {
        let mut store = MapStore::new();
        let mut notices = NoticeQueue::new();
        let records = vec![
            added("m-1", "Beach"),
            ToolCallRecord::new(
                "remove_marker",
                json!({ "marker_id": "m-1" }),
                ToolResult::ok(Some(json!({ "id": "m-1" })), "removed"),
            ),
        ];

        ActionApplier::new().apply(&mut store, &records, &mut notices);
        let last = notices.notices().last().unwrap();
        assert_eq!(last.level, NoticeLevel::Info);
        assert_eq!(last.message, "Assistant removed a marker");
    }

    #[test]
    fn failed_and_malformed_records_raise_error_notices() {
        let mut store = MapStore::new();
        let mut notices = NoticeQueue::new();
        let records = vec![
            ToolCallRecord::new("add_marker", json!({}), ToolResult::failure("latitude must be between -90 and 90")),
            ToolCallRecord::new("add_marker", json!({}), ToolResult::ok(Some(json!({ "name": "no coords" })), "added")),
            ToolCallRecord::new("remove_marker", json!({}), ToolResult::ok(Some(json!({ "id": "ghost" })), "removed")),
            ToolCallRecord::new("teleport", json!({}), ToolResult::ok(None, "ok")),
        ];

        let report = ActionApplier::new().apply(&mut store, &records, &mut notices);
        assert_eq!(report, ApplyReport { processed: 0, failed: 4, skipped: 0 });
        assert!(notices.notices().iter().all(|n| n.level == NoticeLevel::Error));
        assert!(store.markers().is_empty());
    }

    #[test]
    fn modify_and_remove_follow_add() {
        let mut store = MapStore::new();
        let mut notices = NoticeQueue::new();
        let mut updated = LocationInput::new("Beach", Coordinates::new(28.1, -15.4)).into_location("m-1".to_string());
        updated.group = "Beaches".to_string();
        updated.tags = vec!["swim".to_string()];

        let records = vec![
            added("m-1", "Beach"),
            ToolCallRecord::new("modify_location", json!({}), ToolResult::ok(Some(json!(updated)), "updated")),
        ];
        let report = ActionApplier::new().apply(&mut store, &records, &mut notices);
        assert!(report.all_succeeded());
        assert_eq!(store.markers()[0].group, "Beaches");
        assert_eq!(store.markers()[0].tags, vec!["swim".to_string()]);

        let removal = vec![ToolCallRecord::new(
            "remove_marker",
            json!({ "marker_id": "m-1" }),
            ToolResult::ok(Some(json!({ "id": "m-1" })), "removed"),
        )];
        ActionApplier::new().apply(&mut store, &removal, &mut notices);
        assert!(store.markers().is_empty());
    }
}
