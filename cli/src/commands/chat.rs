use std::path::PathBuf;

use clap::Args;
use serde_json::json;

use geopin_assistant::chat::MessageRole;
use geopin_assistant::config::AssistantConfig;
use geopin_assistant::gemini::GeminiModel;
use geopin_assistant::geocode::NominatimGeocoder;
use geopin_assistant::{Orchestrator, ToolExecutor};
use geopin_core::error::codes;

use crate::util::{exit_error, open_workspace, print_error, print_json, save_workspace};

#[derive(Args)]
pub struct ChatArgs {
    /// Message for the assistant
    #[arg(required_unless_present_any = ["reset", "history"])]
    pub message: Option<String>,
    /// Clear the stored conversation
    #[arg(long)]
    pub reset: bool,
    /// Print the stored conversation
    #[arg(long, conflicts_with = "reset")]
    pub history: bool,
}

/// One assistant turn acting directly on the local map.
pub async fn run(data_dir: Option<PathBuf>, args: ChatArgs) -> i32 {
    let mut workspace = open_workspace(data_dir);
    let mut log = workspace
        .load_chat()
        .unwrap_or_else(|e| exit_error(&format!("Failed to load chat log: {e}"), None));

    if args.history {
        return print_json(&log);
    }
    if args.reset {
        log.clear();
        if let Err(e) = workspace.save_chat(&log) {
            exit_error(&format!("Failed to save chat log: {e}"), None);
        }
        if args.message.is_none() {
            return print_json(&json!({ "reset": true }));
        }
    }
    let Some(message) = args.message else {
        return 0;
    };

    let config = AssistantConfig::from_env();
    let model = GeminiModel::new(config.gemini);
    if !model.is_configured() {
        exit_error(
            "GOOGLE_AI_API_KEY is not set",
            Some("Export GOOGLE_AI_API_KEY or add it to .env"),
        );
    }
    let geocoder = NominatimGeocoder::new(config.geocoder)
        .unwrap_or_else(|e| exit_error(&e.to_string(), Some("Check GEOPIN_GEOCODER_URL")));
    let orchestrator = Orchestrator::new(model, ToolExecutor::new(geocoder), config.orchestrator);

    let history = log.history();
    log.add_message(MessageRole::User, message.clone(), None);
    let result = orchestrator
        .run_turn(&message, &history, &mut workspace.store)
        .await;

    // Direct mode: effects of calls that ran before a failure are kept.
    let code = match result {
        Ok(outcome) => {
            log.record_outcome(&outcome);
            print_json(&json!({
                "text": outcome.text,
                "toolsUsed": outcome.tool_calls,
                "rounds": outcome.rounds,
                "depthExhausted": outcome.depth_exhausted,
            }))
        }
        Err(e) => {
            log.set_error(e.to_string());
            print_error(codes::EXTERNAL_ERROR, &e.to_string(), 2)
        }
    };

    save_workspace(&mut workspace);
    if let Err(e) = workspace.save_chat(&log) {
        exit_error(&format!("Failed to save chat log: {e}"), None);
    }
    code
}
