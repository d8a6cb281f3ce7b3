use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use geopin_assistant::chat::HistoryEntry;
use geopin_assistant::config::AssistantConfig;
use geopin_assistant::gemini::GeminiModel;
use geopin_assistant::geocode::{GeocodeError, Geocoder, NominatimGeocoder};
use geopin_assistant::{
    ChatModel, Orchestrator, OrchestratorError, StagedMarkers, ToolExecutor, TurnOutcome,
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Object-safe view of the orchestrator so handlers stay non-generic.
pub trait ChatService: Send + Sync {
    fn run_turn<'a>(
        &'a self,
        user_message: &'a str,
        history: &'a [HistoryEntry],
        staged: &'a mut StagedMarkers,
    ) -> BoxFuture<'a, Result<TurnOutcome, OrchestratorError>>;
}

impl<M, G> ChatService for Orchestrator<M, G>
where
    M: ChatModel + 'static,
    G: Geocoder + 'static,
{
    fn run_turn<'a>(
        &'a self,
        user_message: &'a str,
        history: &'a [HistoryEntry],
        staged: &'a mut StagedMarkers,
    ) -> BoxFuture<'a, Result<TurnOutcome, OrchestratorError>> {
        Box::pin(Orchestrator::run_turn(self, user_message, history, staged))
    }
}

#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<dyn ChatService>,
    /// False when no model API key is configured; chat requests will fail.
    pub model_configured: bool,
}

impl AppState {
    pub fn new(chat: Arc<dyn ChatService>, model_configured: bool) -> Self {
        Self {
            chat,
            model_configured,
        }
    }

    pub fn from_env() -> Result<Self, GeocodeError> {
        let config = AssistantConfig::from_env();
        let model = GeminiModel::new(config.gemini);
        let model_configured = model.is_configured();
        if !model_configured {
            tracing::warn!("GOOGLE_AI_API_KEY is not set; /api/chat will answer 500");
        }
        let geocoder = NominatimGeocoder::new(config.geocoder)?;
        let orchestrator = Orchestrator::new(model, ToolExecutor::new(geocoder), config.orchestrator);
        tracing::info!(
            max_rounds = config.orchestrator.max_rounds,
            "assistant configured"
        );
        Ok(Self::new(Arc::new(orchestrator), model_configured))
    }
}
