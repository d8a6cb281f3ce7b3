use std::fmt::Write as _;

use serde_json::Value;

use geopin_core::{Coordinates, Location};

use crate::catalog::catalog;
use crate::chat::HistoryEntry;
use crate::executor::{MapCapabilities, ToolExecutor};
use crate::geocode::Geocoder;
use crate::model::{CallResponse, ChatModel, ModelError, ModelReply, ModelRequest, Turn};
use crate::result::ToolCallRecord;

pub const DEFAULT_MAX_ROUNDS: u32 = 5;
pub const MAX_ROUNDS_LIMIT: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Upper bound on tool rounds per user turn.
    pub max_rounds: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }
}

/// What one user turn produced.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub text: String,
    pub tool_calls: Vec<ToolCallRecord>,
    pub rounds: u32,
    /// The model still wanted tools when the round bound was reached.
    pub depth_exhausted: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("user message must not be empty")]
    EmptyMessage,
    #[error("model call failed after {rounds} tool round(s): {source}")]
    Model {
        rounds: u32,
        #[source]
        source: ModelError,
    },
}

/// Drives the model/tool loop for one user turn.
#[derive(Debug, Clone)]
pub struct Orchestrator<M, G> {
    model: M,
    executor: ToolExecutor<G>,
    config: OrchestratorConfig,
}

impl<M: ChatModel, G: Geocoder> Orchestrator<M, G> {
    pub fn new(model: M, executor: ToolExecutor<G>, config: OrchestratorConfig) -> Self {
        Self {
            model,
            executor,
            config,
        }
    }

    pub fn config(&self) -> OrchestratorConfig {
        self.config
    }

    pub fn executor(&self) -> &ToolExecutor<G> {
        &self.executor
    }

    /// Run one user turn against `caps`.
    ///
    /// Calls of a round run sequentially in the order the model sent them, and
    /// all their results go back to the model as one message. A model error
    /// aborts the turn; effects already applied to `caps` stay applied.
    pub async fn run_turn<C>(
        &self,
        user_message: &str,
        history: &[HistoryEntry],
        caps: &mut C,
    ) -> Result<TurnOutcome, OrchestratorError>
    where
        C: MapCapabilities + Send + ?Sized,
    {
        let user_message = user_message.trim();
        if user_message.is_empty() {
            return Err(OrchestratorError::EmptyMessage);
        }

        let system_instruction = system_instruction(&caps.markers(), caps.view_center());
        let mut turns: Vec<Turn> = history.iter().cloned().map(HistoryEntry::into_turn).collect();
        turns.push(Turn::User(user_message.to_string()));

        let mut reply = self.ask(&system_instruction, &turns, 0).await?;
        let mut records = Vec::new();
        let mut rounds = 0;

        while !reply.calls.is_empty() && rounds < self.config.max_rounds {
            rounds += 1;
            tracing::info!(round = rounds, calls = reply.calls.len(), "executing tool round");

            let mut responses = Vec::with_capacity(reply.calls.len());
            for call in &reply.calls {
                let result = self.executor.execute(&call.name, &call.args, caps).await;
                records.push(ToolCallRecord::new(
                    call.name.clone(),
                    Value::Object(call.args.clone()),
                    result.clone(),
                ));
                responses.push(CallResponse {
                    name: call.name.clone(),
                    result,
                });
            }

            turns.push(Turn::Model {
                text: std::mem::take(&mut reply.text),
                calls: std::mem::take(&mut reply.calls),
            });
            turns.push(Turn::ToolResults(responses));
            reply = self.ask(&system_instruction, &turns, rounds).await?;
        }

        let depth_exhausted = !reply.calls.is_empty();
        if depth_exhausted {
            tracing::warn!(
                rounds,
                pending_calls = reply.calls.len(),
                "tool round limit reached; returning last text"
            );
        }

        Ok(TurnOutcome {
            text: reply.text,
            tool_calls: records,
            rounds,
            depth_exhausted,
        })
    }

    async fn ask(
        &self,
        system_instruction: &str,
        turns: &[Turn],
        rounds: u32,
    ) -> Result<ModelReply, OrchestratorError> {
        let request = ModelRequest {
            system_instruction,
            turns,
            tools: catalog(),
        };
        self.model.send(request).await.map_err(|source| {
            tracing::error!(rounds, error = %source, "model call failed");
            OrchestratorError::Model { rounds, source }
        })
    }
}

/// Map context embedded in the system instruction: the view center and a
/// numbered list of saved markers.
pub fn build_map_context(markers: &[Location], center: Option<Coordinates>) -> String {
    let mut context = String::from("Map context:\n");
    if let Some(center) = center {
        let _ = writeln!(
            context,
            "- Current map center: {:.4}, {:.4}",
            center.lat, center.lng
        );
    }
    if markers.is_empty() {
        context.push_str("- There are no saved markers.\n");
        return context;
    }

    let _ = writeln!(context, "- Saved markers ({}):", markers.len());
    for (index, marker) in markers.iter().enumerate() {
        let place = if marker.address.trim().is_empty() {
            format!("{}, {}", marker.coordinates.lat, marker.coordinates.lng)
        } else {
            marker.address.clone()
        };
        let _ = write!(context, "  {}. \"{}\" at {}", index + 1, marker.name, place);
        if !marker.description.trim().is_empty() {
            let _ = write!(context, " - {}", marker.description);
        }
        if marker.group != geopin_core::location::DEFAULT_GROUP {
            let _ = write!(context, " [group: {}]", marker.group);
        }
        context.push('\n');
    }
    context
}

pub fn system_instruction(markers: &[Location], center: Option<Coordinates>) -> String {
    format!(
        "You are an assistant that helps people manage places on an interactive map.

{context}
Your job is to:
1. Manage the user's markers with the available tools.
2. Give information about places.
3. Suggest places that fit what the user needs.
4. Answer questions about the saved markers.

TOOLS:
- Use 'search_web' whenever you need real-world or current information you do not already know. Never invent addresses or places.
- To save a place: first call 'search_location' with only the street and number (for example \"Calle Fernando Guanarteme, 46\"), leaving out business name, postal code, city and province. Then call 'add_marker' with the coordinates and address parts it returned.
- Use 'list_markers' to find marker ids before calling 'remove_marker'.
- Use 'modify_location' to regroup, tag or describe a saved marker by name.

When the user asks to add, find or manage markers you MUST call the tools rather than describe what you would do.

Answer briefly and helpfully.",
        context = build_map_context(markers, center)
    )
}
