use std::path::PathBuf;

use clap::Subcommand;
use serde_json::json;

use geopin_assistant::executor::{MAX_ZOOM, MIN_ZOOM};
use geopin_core::Coordinates;

use crate::util::{exit_error, open_workspace, print_json, save_workspace};

#[derive(Subcommand)]
pub enum ViewCommands {
    /// Show center, zoom and selection
    Show,
    /// Center the map
    Center {
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        #[arg(long, allow_negative_numbers = true)]
        lng: f64,
        /// Zoom level, clamped to 1..=18
        #[arg(long)]
        zoom: Option<f64>,
    },
    /// Set the zoom level, clamped to 1..=18
    Zoom { level: f64 },
}

pub fn run(data_dir: Option<PathBuf>, command: ViewCommands) -> i32 {
    let mut workspace = open_workspace(data_dir);
    let store = &mut workspace.store;

    match command {
        ViewCommands::Show => {}
        ViewCommands::Center { lat, lng, zoom } => {
            if !Coordinates::new(lat, lng).in_range() {
                exit_error(
                    &format!("Coordinates out of range: {lat}, {lng}"),
                    Some("Latitude must be within -90..=90 and longitude within -180..=180"),
                );
            }
            store.set_center(lat, lng);
            if let Some(zoom) = zoom {
                store.set_zoom(clamp_zoom(zoom));
            }
            save_workspace(&mut workspace);
        }
        ViewCommands::Zoom { level } => {
            store.set_zoom(clamp_zoom(level));
            save_workspace(&mut workspace);
        }
    }

    let state = workspace.store.state();
    print_json(&json!({
        "center": state.center,
        "zoom": state.zoom,
        "selectedId": state.selected_id,
        "markers": state.markers.len(),
    }))
}

fn clamp_zoom(zoom: f64) -> f64 {
    if !zoom.is_finite() {
        exit_error("Zoom must be a finite number", None);
    }
    zoom.clamp(MIN_ZOOM, MAX_ZOOM)
}
