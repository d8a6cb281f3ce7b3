//! Assistant side of geopin: the tool catalog the model sees, the executor
//! that runs tool calls against a map, the model loop, and the applier that
//! replays recorded calls into a client's store.

pub mod applier;
pub mod catalog;
pub mod chat;
pub mod config;
pub mod executor;
pub mod gemini;
pub mod geocode;
pub mod mcp;
pub mod model;
pub mod notice;
pub mod orchestrator;
pub mod result;

pub use applier::{ActionApplier, ApplyReport};
pub use catalog::{ToolCall, ToolName, catalog, catalog_schema};
pub use executor::{MapCapabilities, StagedMarkers, ToolExecutor};
pub use model::{ChatModel, ModelError};
pub use orchestrator::{Orchestrator, OrchestratorConfig, OrchestratorError, TurnOutcome};
pub use result::{ToolCallRecord, ToolResult};
