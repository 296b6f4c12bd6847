//! OpenAI-compatible chat-completions client implementing `ReasoningEngine`.

use std::time::Duration;

use async_trait::async_trait;
use deliberation::{EngineError, EngineRequest, ReasoningEngine};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::LlmConfig;

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    /// Chain of thought, exposed by some reasoning models
    #[serde(default)]
    reasoning_content: Option<String>,
}

/// Final reply text: the answer, preceded by any reasoning wrapped in
/// `<reasoning>` tags. `None` when both are empty.
fn compose_reply(content: Option<String>, reasoning: Option<String>) -> Option<String> {
    let content = content.unwrap_or_default();
    let reasoning = reasoning.unwrap_or_default();
    match (reasoning.trim().is_empty(), content.trim().is_empty()) {
        (true, true) => None,
        (true, false) => Some(content),
        (false, _) => Some(format!(
            "<reasoning>\n{}\n</reasoning>\n\n{}",
            reasoning.trim(),
            content
        )),
    }
}

/// Reasoning engine backed by an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiCompatibleEngine {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
}

impl OpenAiCompatibleEngine {
    pub fn new(config: &LlmConfig) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| EngineError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            temperature: config.temperature,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ReasoningEngine for OpenAiCompatibleEngine {
    async fn generate(&self, request: EngineRequest) -> Result<String, EngineError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            max_tokens: request.max_tokens,
            temperature: self.temperature,
        };

        let mut http = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            http = http.bearer_auth(key);
        }

        let response = http
            .send()
            .await
            .map_err(|e| EngineError::Request(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Status {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| EngineError::Request(format!("invalid response body: {e}")))?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or(EngineError::EmptyResponse)?;

        let reply = compose_reply(choice.message.content, choice.message.reasoning_content)
            .ok_or(EngineError::EmptyResponse)?;
        debug!(
            role = %request.role,
            factor_id = ?request.factor_id,
            chars = reply.len(),
            "Engine replied"
        );
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_reply_wraps_reasoning() {
        let reply = compose_reply(Some("ANSWER".into()), Some("thinking".into())).unwrap();
        assert_eq!(reply, "<reasoning>\nthinking\n</reasoning>\n\nANSWER");
        assert_eq!(compose_reply(Some("ANSWER".into()), None).unwrap(), "ANSWER");
        assert!(compose_reply(Some("  ".into()), Some(String::new())).is_none());
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let config = LlmConfig {
            base_url: "http://llm:8080/v1/".into(),
            model: "m".into(),
            api_key: None,
            temperature: 0.3,
            request_timeout_secs: 5,
        };
        let engine = OpenAiCompatibleEngine::new(&config).unwrap();
        assert_eq!(engine.endpoint(), "http://llm:8080/v1/chat/completions");
    }

    #[test]
    fn test_response_without_choices_parses() {
        let parsed: ChatResponse = serde_json::from_str(r#"{"id": "x"}"#).unwrap();
        assert!(parsed.choices.is_empty());
    }
}
