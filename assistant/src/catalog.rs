use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use geopin_core::error::codes;

use crate::result::ToolError;

/// Every operation the model may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    AddMarker,
    RemoveMarker,
    ListMarkers,
    CenterMap,
    SearchLocation,
    SearchWeb,
    ModifyLocation,
}

impl ToolName {
    pub const ALL: [ToolName; 7] = [
        ToolName::AddMarker,
        ToolName::RemoveMarker,
        ToolName::ListMarkers,
        ToolName::CenterMap,
        ToolName::SearchLocation,
        ToolName::SearchWeb,
        ToolName::ModifyLocation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ToolName::AddMarker => "add_marker",
            ToolName::RemoveMarker => "remove_marker",
            ToolName::ListMarkers => "list_markers",
            ToolName::CenterMap => "center_map",
            ToolName::SearchLocation => "search_location",
            ToolName::SearchWeb => "search_web",
            ToolName::ModifyLocation => "modify_location",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.as_str() == name)
    }
}

impl std::fmt::Display for ToolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Number,
    StringArray,
}

impl ParamKind {
    /// JSON-schema type name.
    pub fn json_type(self) -> &'static str {
        match self {
            ParamKind::String => "string",
            ParamKind::Number => "number",
            ParamKind::StringArray => "array",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub description: &'static str,
    pub required: bool,
}

#[derive(Debug)]
pub struct ToolDefinition {
    pub name: ToolName,
    pub description: &'static str,
    pub parameters: &'static [ParameterSpec],
}

impl ToolDefinition {
    pub fn parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn required(&self) -> Vec<&'static str> {
        self.parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name)
            .collect()
    }

    /// JSON-schema object describing the arguments.
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        for param in self.parameters {
            let mut schema = json!({
                "type": param.kind.json_type(),
                "description": param.description,
            });
            if param.kind == ParamKind::StringArray {
                schema["items"] = json!({ "type": "string" });
            }
            properties.insert(param.name.to_string(), schema);
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": self.required(),
            "additionalProperties": false,
        })
    }

    pub fn to_value(&self) -> Value {
        json!({
            "name": self.name.as_str(),
            "description": self.description,
            "parameters": self.input_schema(),
        })
    }
}

const fn required(name: &'static str, kind: ParamKind, description: &'static str) -> ParameterSpec {
    ParameterSpec {
        name,
        kind,
        description,
        required: true,
    }
}

const fn optional(name: &'static str, kind: ParamKind, description: &'static str) -> ParameterSpec {
    ParameterSpec {
        name,
        kind,
        description,
        required: false,
    }
}

static CATALOG: [ToolDefinition; 7] = [
    ToolDefinition {
        name: ToolName::AddMarker,
        description: "Add a new marker to the map at the given coordinates.",
        parameters: &[
            required("name", ParamKind::String, "Name or title of the place"),
            required("latitude", ParamKind::Number, "Latitude between -90 and 90"),
            required("longitude", ParamKind::Number, "Longitude between -180 and 180"),
            optional("address", ParamKind::String, "Street address of the place"),
            optional("description", ParamKind::String, "Short description or area"),
            optional("CP", ParamKind::String, "Postal code"),
        ],
    },
    ToolDefinition {
        name: ToolName::RemoveMarker,
        description: "Remove an existing marker by its id. Call list_markers first to find ids.",
        parameters: &[required(
            "marker_id",
            ParamKind::String,
            "Id of the marker to remove",
        )],
    },
    ToolDefinition {
        name: ToolName::ListMarkers,
        description: "List every marker currently saved on the map.",
        parameters: &[],
    },
    ToolDefinition {
        name: ToolName::CenterMap,
        description: "Center the map view on a coordinate, optionally changing the zoom level.",
        parameters: &[
            required("latitude", ParamKind::Number, "Latitude between -90 and 90"),
            required("longitude", ParamKind::Number, "Longitude between -180 and 180"),
            optional("zoom", ParamKind::Number, "Zoom level from 1 (world) to 18 (street)"),
        ],
    },
    ToolDefinition {
        name: ToolName::SearchLocation,
        description: "Look up a place or address and return its coordinates and address parts.",
        parameters: &[required(
            "query",
            ParamKind::String,
            "Place name or address to look up",
        )],
    },
    ToolDefinition {
        name: ToolName::SearchWeb,
        description: "Search the web for current information about a place.",
        parameters: &[required("query", ParamKind::String, "Search query")],
    },
    ToolDefinition {
        name: ToolName::ModifyLocation,
        description: "Change the group, tags or description of a saved marker, found by name.",
        parameters: &[
            required(
                "targetName",
                ParamKind::String,
                "Name of the marker to modify; approximate names are matched",
            ),
            optional("newGroup", ParamKind::String, "Group to move the marker into"),
            optional(
                "newTags",
                ParamKind::StringArray,
                "Tags to add; existing tags are kept",
            ),
            optional("description", ParamKind::String, "Replacement description"),
        ],
    },
];

pub fn catalog() -> &'static [ToolDefinition] {
    &CATALOG
}

pub fn definition(name: ToolName) -> &'static ToolDefinition {
    // CATALOG is declared in ToolName discriminant order.
    &CATALOG[name as usize]
}

/// Catalog rendered as JSON, for listings and the HTTP surface.
pub fn catalog_schema() -> Value {
    Value::Array(catalog().iter().map(ToolDefinition::to_value).collect())
}

#[derive(Debug, Clone, PartialEq)]
pub struct AddMarkerArgs {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub address: Option<String>,
    pub description: Option<String>,
    pub cp: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoveMarkerArgs {
    pub marker_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CenterMapArgs {
    pub latitude: f64,
    pub longitude: f64,
    pub zoom: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryArgs {
    pub query: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModifyLocationArgs {
    pub target_name: String,
    pub new_group: Option<String>,
    pub new_tags: Option<Vec<String>>,
    pub description: Option<String>,
}

/// A validated tool request.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    AddMarker(AddMarkerArgs),
    RemoveMarker(RemoveMarkerArgs),
    ListMarkers,
    CenterMap(CenterMapArgs),
    SearchLocation(QueryArgs),
    SearchWeb(QueryArgs),
    ModifyLocation(ModifyLocationArgs),
}

impl ToolCall {
    pub fn name(&self) -> ToolName {
        match self {
            ToolCall::AddMarker(_) => ToolName::AddMarker,
            ToolCall::RemoveMarker(_) => ToolName::RemoveMarker,
            ToolCall::ListMarkers => ToolName::ListMarkers,
            ToolCall::CenterMap(_) => ToolName::CenterMap,
            ToolCall::SearchLocation(_) => ToolName::SearchLocation,
            ToolCall::SearchWeb(_) => ToolName::SearchWeb,
            ToolCall::ModifyLocation(_) => ToolName::ModifyLocation,
        }
    }

    /// Validate a raw name/arguments pair against the catalog. Unknown tools,
    /// unknown arguments, missing required arguments and mistyped values are
    /// all rejected.
    pub fn parse(name: &str, args: &Map<String, Value>) -> Result<Self, ToolError> {
        let tool = ToolName::from_name(name).ok_or_else(|| {
            ToolError::new(codes::UNKNOWN_TOOL, format!("Unknown tool: {name}"))
        })?;
        reject_unknown_fields(definition(tool), args)?;

        let call = match tool {
            ToolName::AddMarker => ToolCall::AddMarker(AddMarkerArgs {
                name: required_string(args, "name")?,
                latitude: required_number(args, "latitude")?,
                longitude: required_number(args, "longitude")?,
                address: arg_optional_string(args, "address")?,
                description: arg_optional_string(args, "description")?,
                cp: arg_optional_string(args, "CP")?,
            }),
            ToolName::RemoveMarker => ToolCall::RemoveMarker(RemoveMarkerArgs {
                marker_id: required_string(args, "marker_id")?,
            }),
            ToolName::ListMarkers => ToolCall::ListMarkers,
            ToolName::CenterMap => ToolCall::CenterMap(CenterMapArgs {
                latitude: required_number(args, "latitude")?,
                longitude: required_number(args, "longitude")?,
                zoom: arg_optional_number(args, "zoom")?,
            }),
            ToolName::SearchLocation => ToolCall::SearchLocation(QueryArgs {
                query: required_string(args, "query")?,
            }),
            ToolName::SearchWeb => ToolCall::SearchWeb(QueryArgs {
                query: required_string(args, "query")?,
            }),
            ToolName::ModifyLocation => ToolCall::ModifyLocation(ModifyLocationArgs {
                target_name: required_string(args, "targetName")?,
                new_group: arg_optional_string(args, "newGroup")?,
                new_tags: arg_optional_string_array(args, "newTags")?,
                description: arg_optional_string(args, "description")?,
            }),
        };
        Ok(call)
    }
}

fn reject_unknown_fields(
    definition: &ToolDefinition,
    args: &Map<String, Value>,
) -> Result<(), ToolError> {
    match args.keys().find(|key| definition.parameter(key).is_none()) {
        Some(key) => Err(ToolError::validation(format!(
            "Unknown field '{key}' for tool {}",
            definition.name
        ))
        .with_field(key.as_str())),
        None => Ok(()),
    }
}

fn required_string(args: &Map<String, Value>, key: &str) -> Result<String, ToolError> {
    let value = args.get(key).ok_or_else(|| {
        ToolError::validation(format!("Missing required field '{key}'")).with_field(key)
    })?;
    match value {
        Value::String(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        Value::String(_) => {
            Err(ToolError::validation(format!("'{key}' must not be empty")).with_field(key))
        }
        _ => Err(ToolError::validation(format!("'{key}' must be a string")).with_field(key)),
    }
}

fn arg_optional_string(args: &Map<String, Value>, key: &str) -> Result<Option<String>, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(v)) if v.trim().is_empty() => Ok(None),
        Some(Value::String(v)) => Ok(Some(v.trim().to_string())),
        Some(_) => Err(ToolError::validation(format!("'{key}' must be a string")).with_field(key)),
    }
}

fn required_number(args: &Map<String, Value>, key: &str) -> Result<f64, ToolError> {
    arg_optional_number(args, key)?.ok_or_else(|| {
        ToolError::validation(format!("Missing required field '{key}'")).with_field(key)
    })
}

fn arg_optional_number(args: &Map<String, Value>, key: &str) -> Result<Option<f64>, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_f64()
            .filter(|v| v.is_finite())
            .map(Some)
            .ok_or_else(|| {
                ToolError::validation(format!("'{key}' must be a finite number")).with_field(key)
            }),
        Some(_) => Err(ToolError::validation(format!("'{key}' must be a number")).with_field(key)),
    }
}

fn arg_optional_string_array(
    args: &Map<String, Value>,
    key: &str,
) -> Result<Option<Vec<String>>, ToolError> {
    let Some(value) = args.get(key) else {
        return Ok(None);
    };
    if value.is_null() {
        return Ok(None);
    }
    let items = value.as_array().ok_or_else(|| {
        ToolError::validation(format!("'{key}' must be an array of strings")).with_field(key)
    })?;
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let text = item.as_str().ok_or_else(|| {
            ToolError::validation(format!("'{key}' items must be strings")).with_field(key)
        })?;
        let normalized = text.trim();
        if !normalized.is_empty() {
            out.push(normalized.to_string());
        }
    }
    Ok(Some(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn catalog_follows_tool_name_order() {
        let names: Vec<ToolName> = catalog().iter().map(|d| d.name).collect();
        assert_eq!(names, ToolName::ALL.to_vec());
        for tool in ToolName::ALL {
            assert_eq!(definition(tool).name, tool);
            assert_eq!(ToolName::from_name(tool.as_str()), Some(tool));
        }
    }

    #[test]
    fn schema_marks_required_parameters() {
        let schema = definition(ToolName::AddMarker).input_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["required"], json!(["name", "latitude", "longitude"]));
        assert_eq!(schema["properties"]["latitude"]["type"], "number");

        let modify = definition(ToolName::ModifyLocation).input_schema();
        assert_eq!(modify["properties"]["newTags"]["items"]["type"], "string");
        assert_eq!(modify["required"], json!(["targetName"]));
    }

    #[test]
    fn parse_add_marker() {
        let call = ToolCall::parse(
            "add_marker",
            &args(json!({
                "name": " Cafe ",
                "latitude": 28.1,
                "longitude": -15.4,
                "CP": "35010"
            })),
        )
        .unwrap();
        assert_eq!(
            call,
            ToolCall::AddMarker(AddMarkerArgs {
                name: "Cafe".to_string(),
                latitude: 28.1,
                longitude: -15.4,
                address: None,
                description: None,
                cp: Some("35010".to_string()),
            })
        );
        assert_eq!(call.name(), ToolName::AddMarker);
    }

    #[test]
    fn parse_rejects_unknown_tool() {
        let err = ToolCall::parse("launch_rocket", &Map::new()).unwrap_err();
        assert_eq!(err.code, "unknown_tool");
    }

    #[test]
    fn parse_rejects_unknown_field() {
        let err = ToolCall::parse("list_markers", &args(json!({ "limit": 3 }))).unwrap_err();
        assert_eq!(err.code, "validation_failed");
        assert_eq!(err.field.as_deref(), Some("limit"));
    }

    #[test]
    fn parse_rejects_missing_and_mistyped_fields() {
        let missing = ToolCall::parse("remove_marker", &Map::new()).unwrap_err();
        assert_eq!(missing.field.as_deref(), Some("marker_id"));

        let mistyped = ToolCall::parse(
            "center_map",
            &args(json!({ "latitude": "28.1", "longitude": -15.4 })),
        )
        .unwrap_err();
        assert_eq!(mistyped.field.as_deref(), Some("latitude"));

        let bad_tags = ToolCall::parse(
            "modify_location",
            &args(json!({ "targetName": "Cafe", "newTags": "coffee" })),
        )
        .unwrap_err();
        assert_eq!(bad_tags.field.as_deref(), Some("newTags"));
    }

    #[test]
    fn parse_drops_blank_optional_values() {
        let call = ToolCall::parse(
            "modify_location",
            &args(json!({
                "targetName": "Cafe",
                "newGroup": "  ",
                "newTags": ["coffee", " ", "wifi"]
            })),
        )
        .unwrap();
        let ToolCall::ModifyLocation(modify) = call else {
            panic!("expected modify_location");
        };
        assert_eq!(modify.new_group, None);
        assert_eq!(
            modify.new_tags,
            Some(vec!["coffee".to_string(), "wifi".to_string()])
        );
    }
}
