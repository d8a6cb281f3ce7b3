use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::catalog::ToolDefinition;
use crate::result::ToolResult;

/// A call the model asked for in one reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestedCall {
    pub name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

/// Result of one executed call, fed back to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct CallResponse {
    pub name: String,
    pub result: ToolResult,
}

/// One entry of the conversation as the model sees it.
#[derive(Debug, Clone, PartialEq)]
pub enum Turn {
    User(String),
    Model {
        text: String,
        calls: Vec<RequestedCall>,
    },
    /// All results of one tool round, resubmitted as a single message.
    ToolResults(Vec<CallResponse>),
}

#[derive(Debug, Clone, Copy)]
pub struct ModelRequest<'a> {
    pub system_instruction: &'a str,
    pub turns: &'a [Turn],
    pub tools: &'a [ToolDefinition],
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelReply {
    pub text: String,
    pub calls: Vec<RequestedCall>,
}

impl ModelReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            calls: Vec::new(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("model API key is not configured (set GOOGLE_AI_API_KEY)")]
    MissingApiKey,
    #[error("model request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("model returned HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("model response could not be read: {0}")]
    InvalidResponse(String),
}

/// A function-calling chat model.
pub trait ChatModel: Send + Sync {
    fn send(
        &self,
        request: ModelRequest<'_>,
    ) -> impl Future<Output = Result<ModelReply, ModelError>> + Send;
}

impl<T: ChatModel> ChatModel for Arc<T> {
    fn send(
        &self,
        request: ModelRequest<'_>,
    ) -> impl Future<Output = Result<ModelReply, ModelError>> + Send {
        (**self).send(request)
    }
}
