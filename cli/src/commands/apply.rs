use std::path::PathBuf;

use serde_json::{Value, json};

use geopin_assistant::notice::{Notice, NoticeQueue};
use geopin_assistant::{ApplyReport, ToolCallRecord};
use geopin_core::persist::PersistError;

use crate::util::{Workspace, exit_error, open_workspace, print_json, read_input};

/// Replay tool calls returned by the HTTP API into the local map.
///
/// Accepts either a full `/api/chat` response (`{text, toolsUsed}`) or a bare
/// array of tool-call records.
pub fn run(data_dir: Option<PathBuf>, file: &str) -> i32 {
    let raw = read_input(file).unwrap_or_else(|e| exit_error(&e, None));
    let records = parse_records(&raw).unwrap_or_else(|e| {
        exit_error(
            &e,
            Some("Pass the JSON body returned by POST /api/chat, or its toolsUsed array"),
        )
    });

    let mut workspace = open_workspace(data_dir);
    let (report, notices) = apply_records(&mut workspace, &records).unwrap_or_else(|e| {
        exit_error(
            &format!("Failed to save to '{}': {e}", workspace.dir().display()),
            None,
        )
    });

    let code = if report.all_succeeded() { 0 } else { 1 };
    print_json(&json!({
        "report": report,
        "notices": notices,
    }));
    code
}

/// Apply `records` and persist both the map and the applied call ids.
fn apply_records(
    workspace: &mut Workspace,
    records: &[ToolCallRecord],
) -> Result<(ApplyReport, Vec<Notice>), PersistError> {
    let mut applier = workspace.load_applier()?;
    let mut notices = NoticeQueue::new();
    let report = applier.apply(&mut workspace.store, records, &mut notices);
    if report.processed > 0 {
        workspace.save()?;
    }
    if report.processed + report.failed > 0 {
        workspace.save_applier(&applier)?;
    }
    Ok((report, notices.drain()))
}

fn parse_records(raw: &str) -> Result<Vec<ToolCallRecord>, String> {
    let value: Value = serde_json::from_str(raw).map_err(|e| format!("Invalid JSON: {e}"))?;
    let records = match value {
        Value::Array(_) => value,
        Value::Object(mut body) => body.remove("toolsUsed").unwrap_or(Value::Array(Vec::new())),
        _ => return Err("Expected an object or an array".to_string()),
    };
    serde_json::from_value(records).map_err(|e| format!("Invalid tool-call record: {e}"))
}
