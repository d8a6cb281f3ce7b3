use std::path::PathBuf;

use serde_json::json;

use geopin_core::transfer::{export_locations, parse_import};

use crate::util::{exit_error, open_workspace, print_json, read_input, save_workspace};

/// Import a JSON array of locations from a file ("-" for stdin).
pub fn import(data_dir: Option<PathBuf>, file: &str) -> i32 {
    let raw = read_input(file).unwrap_or_else(|e| exit_error(&e, None));
    let batch = parse_import(&raw).unwrap_or_else(|e| {
        exit_error(
            &e.to_string(),
            Some("Expected a JSON array of {name, coordinates: {lat, lng}, ...} objects"),
        )
    });

    let mut workspace = open_workspace(data_dir);
    let summary = workspace.store.import(batch.locations);
    if summary.added > 0 {
        save_workspace(&mut workspace);
    }
    tracing::info!(
        added = summary.added,
        duplicates = summary.skipped_duplicates,
        discarded = batch.discarded,
        "import finished"
    );

    print_json(&json!({
        "added": summary.added,
        "skippedDuplicates": summary.skipped_duplicates,
        "discarded": batch.discarded,
    }))
}

/// Export every marker as pretty JSON to a file, or stdout without one.
pub fn export(data_dir: Option<PathBuf>, file: Option<&str>) -> i32 {
    let workspace = open_workspace(data_dir);
    let body = export_locations(workspace.store.markers())
        .unwrap_or_else(|e| exit_error(&format!("Failed to encode markers: {e}"), None));

    match file {
        None | Some("-") => {
            println!("{body}");
            0
        }
        Some(path) => {
            if let Err(e) = std::fs::write(path, &body) {
                exit_error(&format!("Failed to write '{path}': {e}"), None);
            }
            print_json(&json!({
                "exported": workspace.store.markers().len(),
                "file": path,
            }))
        }
    }
}
