use serde::Serialize;
use serde_json::Value;

use crate::location::{Coordinates, Location, coerce_location};
use crate::store::new_marker_id;

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("import file is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("import file must contain a JSON array of locations")]
    NotAnArray,
    #[error("import file contains no valid locations ({total} entries checked)")]
    NoValidEntries { total: usize },
}

/// Parsed import file: valid records plus how many entries were discarded.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportBatch {
    pub locations: Vec<Location>,
    pub discarded: usize,
}

/// Field order of exported records.
#[derive(Serialize)]
struct ExportRecord<'a> {
    id: &'a str,
    name: &'a str,
    description: &'a str,
    address: &'a str,
    #[serde(rename = "CP")]
    cp: &'a str,
    coordinates: Coordinates,
    group: &'a str,
    tags: &'a [String],
}

impl<'a> From<&'a Location> for ExportRecord<'a> {
    fn from(location: &'a Location) -> Self {
        Self {
            id: &location.id,
            name: &location.name,
            description: &location.description,
            address: &location.address,
            cp: &location.cp,
            coordinates: location.coordinates,
            group: &location.group,
            tags: &location.tags,
        }
    }
}

pub fn export_locations(locations: &[Location]) -> Result<String, serde_json::Error> {
    let records: Vec<ExportRecord<'_>> = locations.iter().map(ExportRecord::from).collect();
    serde_json::to_string_pretty(&records)
}

/// Parse an import file. Entries without usable coordinates are discarded;
/// a file with nothing usable is an error so the caller can report it.
pub fn parse_import(raw: &str) -> Result<ImportBatch, TransferError> {
    let value: Value = serde_json::from_str(raw)?;
    let Value::Array(entries) = value else {
        return Err(TransferError::NotAnArray);
    };
    let total = entries.len();
    let locations: Vec<Location> = entries
        .iter()
        .filter_map(coerce_location)
        .map(|mut location| {
            if location.id.trim().is_empty() {
                location.id = new_marker_id();
            }
            location
        })
        .collect();
    if locations.is_empty() {
        return Err(TransferError::NoValidEntries { total });
    }
    let discarded = total - locations.len();
    if discarded > 0 {
        tracing::warn!(discarded, total, "skipped import entries without valid coordinates");
    }
    Ok(ImportBatch {
        locations,
        discarded,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::LocationInput;

    fn sample() -> Vec<Location> {
        vec![
            LocationInput {
                description: "Guanarteme, Las Palmas".to_string(),
                address: "Calle Fernando Guanarteme, 70".to_string(),
                cp: "35010".to_string(),
                group: Some("Food".to_string()),
                tags: Some(vec!["coffee".to_string(), "wifi".to_string()]),
                ..LocationInput::new("Cafe", Coordinates::new(28.1, -15.4))
            }
            .into_location("loc-1".to_string()),
            LocationInput::new("Beach", Coordinates::new(28.14, -15.43))
                .into_location("loc-2".to_string()),
        ]
    }

    #[test]
    fn export_then_import_round_trips() {
        let original = sample();
        let exported = export_locations(&original).unwrap();
        let batch = parse_import(&exported).unwrap();
        assert_eq!(batch.locations, original);
        assert_eq!(batch.discarded, 0);
    }

    #[test]
    fn export_field_order_is_stable() {
        let exported = export_locations(&sample()[..1]).unwrap();
        let positions: Vec<usize> = ["\"id\"", "\"name\"", "\"description\"", "\"address\"", "\"CP\"", "\"coordinates\""]
            .iter()
            .map(|key| exported.find(key).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn import_without_ids_generates_them() {
        let raw = r#"[{"name": "Dock", "description": "", "address": "", "CP": "", "coordinates": {"lat": 1, "lng": 2}}]"#;
        let batch = parse_import(raw).unwrap();
        assert!(!batch.locations[0].id.is_empty());
        assert_eq!(batch.locations[0].group, "Inbox");
    }

    #[test]
    fn import_discards_entries_without_coordinates() {
        let raw = r#"[
            {"name": "ok", "coordinates": {"lat": 1, "lng": 2}},
            {"name": "bad", "coordinates": {"lat": "x", "lng": 2}},
            {"name": "missing"}
        ]"#;
        let batch = parse_import(raw).unwrap();
        assert_eq!(batch.locations.len(), 1);
        assert_eq!(batch.discarded, 2);
    }

    #[test]
    fn import_reports_malformed_files() {
        assert!(matches!(parse_import("not json"), Err(TransferError::InvalidJson(_))));
        assert!(matches!(parse_import(r#"{"name": "x"}"#), Err(TransferError::NotAnArray)));
        assert!(matches!(
            parse_import(r#"[{"name": "x"}]"#),
            Err(TransferError::NoValidEntries { total: 1 })
        ));
        assert!(matches!(
            parse_import("[]"),
            Err(TransferError::NoValidEntries { total: 0 })
        ));
    }
}
