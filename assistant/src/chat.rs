use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::model::Turn;
use crate::orchestrator::TurnOutcome;
use crate::result::ToolCallRecord;

/// Storage key of the persisted chat log.
pub const CHAT_KEY: &str = "chat-store";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
    Action,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ToolCallRecord>,
}

/// Prior conversation entry sent alongside a new user message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct HistoryEntry {
    /// `user`, or `model` for anything the assistant produced.
    pub role: String,
    pub parts: String,
}

impl HistoryEntry {
    pub fn into_turn(self) -> Turn {
        match self.role.as_str() {
            "model" | "assistant" | "action" => Turn::Model {
                text: self.parts,
                calls: Vec::new(),
            },
            _ => Turn::User(self.parts),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatLog {
    messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ChatLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn add_message(
        &mut self,
        role: MessageRole,
        content: impl Into<String>,
        metadata: Option<ToolCallRecord>,
    ) -> String {
        let id = Uuid::now_v7().to_string();
        self.messages.push(ChatMessage {
            id: id.clone(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            metadata,
        });
        self.error = None;
        id
    }

    pub fn set_error(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.error = None;
    }

    /// Conversation as the model should see it. System messages stay local.
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.messages
            .iter()
            .filter_map(|message| {
                let role = match message.role {
                    MessageRole::User => "user",
                    MessageRole::Assistant | MessageRole::Action => "model",
                    MessageRole::System => return None,
                };
                Some(HistoryEntry {
                    role: role.to_string(),
                    parts: message.content.clone(),
                })
            })
            .collect()
    }

    /// Append one action message per executed tool call, then the reply.
    pub fn record_outcome(&mut self, outcome: &TurnOutcome) {
        for record in &outcome.tool_calls {
            let content = format!("{}: {}", record.name, record.result.summary());
            self.add_message(MessageRole::Action, content, Some(record.clone()));
        }
        if !outcome.text.trim().is_empty() {
            self.add_message(MessageRole::Assistant, outcome.text.clone(), None);
        }
    }
}
