use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::catalog::{ParamKind, ToolDefinition};
use crate::model::{ChatModel, ModelError, ModelReply, ModelRequest, RequestedCall, Turn};

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com";

const TEMPERATURE: f64 = 0.7;
const TOP_K: u32 = 40;
const TOP_P: f64 = 0.95;
const MAX_OUTPUT_TOKENS: u32 = 1024;

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
}

impl GeminiConfig {
    pub fn from_env() -> Self {
        let read = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        Self {
            api_key: read("GOOGLE_AI_API_KEY"),
            model: read("GEOPIN_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: read("GEOPIN_GEMINI_URL").unwrap_or_else(|| DEFAULT_GEMINI_URL.to_string()),
        }
    }
}

/// Google Generative AI `generateContent` client.
#[derive(Debug, Clone)]
pub struct GeminiModel {
    http: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiModel {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.config.api_key.is_some()
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }
}

impl ChatModel for GeminiModel {
    async fn send(&self, request: ModelRequest<'_>) -> Result<ModelReply, ModelError> {
        let api_key = self.config.api_key.as_deref().ok_or(ModelError::MissingApiKey)?;
        let body = request_body(&request);

        let resp = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let raw = resp.text().await.unwrap_or_default();
            return Err(ModelError::Status {
                status: status.as_u16(),
                message: error_message(&raw),
            });
        }

        let payload: GenerateContentResponse = resp
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;
        let reply = payload.into_reply()?;
        tracing::debug!(
            model = %self.config.model,
            calls = reply.calls.len(),
            text_len = reply.text.len(),
            "model replied"
        );
        Ok(reply)
    }
}

fn error_message(raw: &str) -> String {
    serde_json::from_str::<Value>(raw)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| raw.chars().take(300).collect())
}

/// Catalog entries as Gemini function declarations: upper-case type tags
/// inside an `OBJECT` wrapper.
pub fn function_declarations(tools: &[ToolDefinition]) -> Vec<Value> {
    tools
        .iter()
        .map(|tool| {
            let mut properties = Map::new();
            for param in tool.parameters {
                let mut schema = json!({
                    "type": param.kind.json_type().to_uppercase(),
                    "description": param.description,
                });
                if param.kind == ParamKind::StringArray {
                    schema["items"] = json!({ "type": "STRING" });
                }
                properties.insert(param.name.to_string(), schema);
            }
            json!({
                "name": tool.name.as_str(),
                "description": tool.description,
                "parameters": {
                    "type": "OBJECT",
                    "properties": properties,
                    "required": tool.required(),
                },
            })
        })
        .collect()
}

pub fn contents(turns: &[Turn]) -> Vec<Value> {
    turns
        .iter()
        .map(|turn| match turn {
            Turn::User(text) => json!({ "role": "user", "parts": [{ "text": text }] }),
            Turn::Model { text, calls } => {
                let mut parts = Vec::with_capacity(calls.len() + 1);
                if !text.is_empty() {
                    parts.push(json!({ "text": text }));
                }
                for call in calls {
                    parts.push(json!({
                        "functionCall": { "name": call.name, "args": call.args }
                    }));
                }
                if parts.is_empty() {
                    parts.push(json!({ "text": "" }));
                }
                json!({ "role": "model", "parts": parts })
            }
            Turn::ToolResults(responses) => {
                let parts: Vec<Value> = responses
                    .iter()
                    .map(|response| {
                        json!({
                            "functionResponse": {
                                "name": response.name,
                                "response": response.result,
                            }
                        })
                    })
                    .collect();
                json!({ "role": "function", "parts": parts })
            }
        })
        .collect()
}

pub fn request_body(request: &ModelRequest<'_>) -> Value {
    json!({
        "systemInstruction": { "parts": [{ "text": request.system_instruction }] },
        "contents": contents(request.turns),
        "tools": [{ "functionDeclarations": function_declarations(request.tools) }],
        "generationConfig": {
            "temperature": TEMPERATURE,
            "topK": TOP_K,
            "topP": TOP_P,
            "maxOutputTokens": MAX_OUTPUT_TOKENS,
        },
    })
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default, rename = "promptFeedback")]
    prompt_feedback: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    function_call: Option<RequestedCall>,
}

impl GenerateContentResponse {
    fn into_reply(self) -> Result<ModelReply, ModelError> {
        let Some(candidate) = self.candidates.into_iter().next() else {
            let reason = self
                .prompt_feedback
                .as_ref()
                .and_then(|f| f["blockReason"].as_str())
                .unwrap_or("no candidates");
            return Err(ModelError::InvalidResponse(format!(
                "model returned no candidates ({reason})"
            )));
        };

        let mut reply = ModelReply::default();
        for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
            if let Some(text) = part.text {
                reply.text.push_str(&text);
            }
            if let Some(call) = part.function_call {
                reply.calls.push(call);
            }
        }
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::catalog;
    use crate::model::CallResponse;
    use crate::result::ToolResult;

    #[test]
    fn declarations_use_upper_case_types() {
        let declarations = function_declarations(catalog());
        assert_eq!(declarations.len(), 7);

        let add = &declarations[0];
        assert_eq!(add["name"], "add_marker");
        assert_eq!(add["parameters"]["type"], "OBJECT");
        assert_eq!(add["parameters"]["properties"]["latitude"]["type"], "NUMBER");

        let modify = declarations
            .iter()
            .find(|d| d["name"] == "modify_location")
            .unwrap();
        assert_eq!(modify["parameters"]["properties"]["newTags"]["type"], "ARRAY");
        assert_eq!(
            modify["parameters"]["properties"]["newTags"]["items"]["type"],
            "STRING"
        );
    }

    #[test]
    fn contents_map_turn_roles() {
        let turns = vec![
            Turn::User("add the beach".to_string()),
            Turn::Model {
                text: String::new(),
                calls: vec![RequestedCall {
                    name: "list_markers".to_string(),
                    args: Map::new(),
                }],
            },
            Turn::ToolResults(vec![CallResponse {
                name: "list_markers".to_string(),
                result: ToolResult::ok(Some(json!([])), "No markers saved"),
            }]),
        ];
        let contents = contents(&turns);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[1]["parts"].as_array().unwrap().len(), 1);
        assert_eq!(contents[1]["parts"][0]["functionCall"]["name"], "list_markers");
        assert_eq!(contents[2]["role"], "function");
        assert_eq!(
            contents[2]["parts"][0]["functionResponse"]["response"]["success"],
            true
        );
    }

    #[test]
    fn request_body_carries_generation_config() {
        let turns = vec![Turn::User("hi".to_string())];
        let body = request_body(&ModelRequest {
            system_instruction: "be brief",
            turns: &turns,
            tools: catalog(),
        });
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be brief");
        assert_eq!(body["generationConfig"]["topK"], 40);
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 1024);
        assert_eq!(
            body["tools"][0]["functionDeclarations"].as_array().unwrap().len(),
            7
        );
    }

    #[test]
    fn reply_collects_text_and_calls() {
        let payload: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        { "text": "Looking it up. " },
                        { "functionCall": { "name": "search_location", "args": { "query": "Calle Mayor, 12" } } },
                        { "functionCall": { "name": "list_markers" } }
                    ]
                },
                "finishReason": "STOP"
            }]
        }))
        .unwrap();
        let reply = payload.into_reply().unwrap();
        assert_eq!(reply.text, "Looking it up. ");
        assert_eq!(reply.calls.len(), 2);
        assert_eq!(reply.calls[0].args["query"], "Calle Mayor, 12");
        assert!(reply.calls[1].args.is_empty());
    }

    #[test]
    fn empty_candidates_is_an_invalid_response() {
        let payload: GenerateContentResponse = serde_json::from_value(json!({
            "promptFeedback": { "blockReason": "SAFETY" }
        }))
        .unwrap();
        let err = payload.into_reply().unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn error_message_prefers_api_error_field() {
        let raw = r#"{"error": {"code": 400, "message": "API key not valid"}}"#;
        assert_eq!(error_message(raw), "API key not valid");
        assert_eq!(error_message("upstream down"), "upstream down");
    }

    #[tokio::test]
    async fn missing_api_key_fails_before_any_request() {
        let model = GeminiModel::new(GeminiConfig {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: "http://127.0.0.1:9".to_string(),
        });
        let turns = vec![Turn::User("hi".to_string())];
        let err = model
            .send(ModelRequest {
                system_instruction: "",
                turns: &turns,
                tools: catalog(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::MissingApiKey));
    }
}
