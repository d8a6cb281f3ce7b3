use std::path::PathBuf;

use clap::Subcommand;
use serde_json::json;

use geopin_core::location::{group_color, group_locations};
use geopin_core::error::codes;
use geopin_core::{Coordinates, LocationInput, LocationPatch, MapStore};

use crate::util::{exit_error, open_workspace, print_error, print_json, save_workspace};

#[derive(Subcommand)]
pub enum MarkersCommands {
    /// Add a marker
    Add {
        /// Marker name
        #[arg(long)]
        name: String,
        /// Latitude in degrees (-90..=90)
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        /// Longitude in degrees (-180..=180)
        #[arg(long, allow_negative_numbers = true)]
        lng: f64,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        address: Option<String>,
        /// Postal code
        #[arg(long)]
        cp: Option<String>,
        /// Group (defaults to "Inbox")
        #[arg(long)]
        group: Option<String>,
        /// Tag, repeatable
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// List markers, optionally only one group
    List {
        #[arg(long)]
        group: Option<String>,
    },
    /// Markers bucketed by group with each group's color
    Groups,
    /// Remove a marker by id
    Remove { id: String },
    /// Rename a marker
    Rename { id: String, name: String },
    /// Patch a marker's descriptive fields
    Update {
        id: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        address: Option<String>,
        #[arg(long)]
        cp: Option<String>,
        #[arg(long)]
        group: Option<String>,
        /// Replace tags; repeatable
        #[arg(long = "tag")]
        tags: Option<Vec<String>>,
    },
    /// Move a marker to new coordinates
    Move {
        id: String,
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        #[arg(long, allow_negative_numbers = true)]
        lng: f64,
    },
    /// Select a marker; without an id the selection is cleared
    Select { id: Option<String> },
    /// Remove every marker
    Clear {
        /// Required confirmation
        #[arg(long)]
        yes: bool,
    },
}

pub fn run(data_dir: Option<PathBuf>, command: MarkersCommands) -> i32 {
    let mut workspace = open_workspace(data_dir);
    let store = &mut workspace.store;

    let (code, changed) = match command {
        MarkersCommands::Add {
            name,
            lat,
            lng,
            description,
            address,
            cp,
            group,
            tags,
        } => {
            let coordinates = checked_coordinates(lat, lng);
            let input = LocationInput {
                description: description.unwrap_or_default(),
                address: address.unwrap_or_default(),
                cp: cp.unwrap_or_default(),
                group,
                tags: (!tags.is_empty()).then_some(tags),
                ..LocationInput::new(name, coordinates)
            };
            match store.add_marker(input) {
                Ok(id) => (print_json(&store.marker(&id)), true),
                Err(e) => (print_error(codes::CONFLICT, &e.to_string(), 1), false),
            }
        }
        MarkersCommands::List { group } => {
            let markers: Vec<_> = store
                .markers()
                .iter()
                .filter(|m| group.as_ref().is_none_or(|g| &m.group == g))
                .collect();
            (print_json(&markers), false)
        }
        MarkersCommands::Groups => (print_json(&groups_summary(store)), false),
        MarkersCommands::Remove { id } => {
            let removed = store.remove_marker(&id);
            (found_or_not(removed, &id, json!({ "removed": &id })), removed)
        }
        MarkersCommands::Rename { id, name } => {
            let renamed = store.rename_marker(&id, name);
            (found_or_not(renamed, &id, json!(store.marker(&id))), renamed)
        }
        MarkersCommands::Update {
            id,
            description,
            address,
            cp,
            group,
            tags,
        } => {
            let patch = LocationPatch {
                description,
                address,
                cp,
                group,
                tags,
                ..LocationPatch::default()
            };
            if patch.is_empty() {
                exit_error(
                    "Nothing to update",
                    Some("Pass at least one of --description, --address, --cp, --group, --tag"),
                );
            }
            let updated = store.update_marker(&id, &patch);
            (found_or_not(updated, &id, json!(store.marker(&id))), updated)
        }
        MarkersCommands::Move { id, lat, lng } => {
            let moved = store.move_marker(&id, checked_coordinates(lat, lng));
            (found_or_not(moved, &id, json!(store.marker(&id))), moved)
        }
        MarkersCommands::Select { id } => {
            if let Some(id) = id.as_deref().filter(|id| !store.contains(id)) {
                return print_error(codes::NOT_FOUND, &format!("no marker with id '{id}'"), 1);
            }
            store.select_marker(id.as_deref());
            (print_json(&json!({ "selectedId": store.selected_id() })), true)
        }
        MarkersCommands::Clear { yes } => {
            if !yes {
                exit_error("Refusing to clear markers without --yes", None);
            }
            let count = store.markers().len();
            store.clear();
            (print_json(&json!({ "removed": count })), true)
        }
    };

    if changed {
        save_workspace(&mut workspace);
    }
    code
}

fn checked_coordinates(lat: f64, lng: f64) -> Coordinates {
    let coordinates = Coordinates::new(lat, lng);
    if !coordinates.in_range() {
        exit_error(
            &format!("Coordinates out of range: {lat}, {lng}"),
            Some("Latitude must be within -90..=90 and longitude within -180..=180"),
        );
    }
    coordinates
}

fn found_or_not(found: bool, id: &str, output: serde_json::Value) -> i32 {
    if found {
        print_json(&output)
    } else {
        print_error(codes::NOT_FOUND, &format!("no marker with id '{id}'"), 1)
    }
}

fn groups_summary(store: &MapStore) -> serde_json::Value {
    let groups: Vec<_> = group_locations(store.markers())
        .into_iter()
        .map(|(group, members)| {
            json!({
                "group": group,
                "color": group_color(&group),
                "count": members.len(),
                "markers": members.iter().map(|m| &m.name).collect::<Vec<_>>(),
            })
        })
        .collect();
    json!(groups)
}
