use std::time::Duration;

use async_trait::async_trait;

use crate::config::DecisionConfig;
use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::llm::provider::LlmProvider;
use crate::llm::types::{MessagesRequest, MessagesResponse};

pub struct AnthropicProvider {
    id: String,
    endpoint: String,
    api_key: String,
    anthropic_version: String,
    beta: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(config: &DecisionConfig) -> DeskPilotResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            id: "anthropic".into(),
            endpoint: format!("{}/v1/messages", config.api_base.trim_end_matches('/')),
            api_key: config.resolve_api_key(),
            anthropic_version: config.anthropic_version.clone(),
            beta: config.beta.clone(),
            client,
        })
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        &self.id
    }

    async fn create_message(&self, request: &MessagesRequest) -> DeskPilotResult<MessagesResponse> {
        tracing::debug!(
            provider = %self.id,
            model = %request.model,
            messages = request.messages.len(),
            "sending decision request"
        );
        tracing::debug!(body = %sanitized_body(request), "request body (sanitized, base64 omitted)");

        let mut builder = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.anthropic_version)
            .json(request);
        if !self.beta.is_empty() {
            builder = builder.header("anthropic-beta", &self.beta);
        }

        let response = builder.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            return Err(DeskPilotError::Transport(format!("{}: {}", status, err_body)));
        }

        let body = response.text().await?;
        let parsed: MessagesResponse = serde_json::from_str(&body)
            .map_err(|e| DeskPilotError::Protocol(format!("malformed decision response: {e}")))?;

        tracing::info!(
            id = %parsed.id,
            blocks = parsed.content.len(),
            stop_reason = ?parsed.stop_reason,
            "decision response received"
        );
        Ok(parsed)
    }
}

/// Request JSON with every image payload replaced, for logging.
fn sanitized_body(request: &MessagesRequest) -> String {
    let Ok(mut value) = serde_json::to_value(request) else {
        return String::new();
    };
    redact_images(&mut value);
    serde_json::to_string(&value).unwrap_or_default()
}

fn redact_images(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            if map.get("type").and_then(|t| t.as_str()) == Some("image") {
                if let Some(data) = map.get_mut("source").and_then(|s| s.get_mut("data")) {
                    *data = serde_json::Value::String("<omitted_base64_image>".into());
                }
            }
            for child in map.values_mut() {
                redact_images(child);
            }
        }
        serde_json::Value::Array(items) => items.iter_mut().for_each(redact_images),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::{ContentBlock, Message, ToolSpec};

    fn request() -> MessagesRequest {
        MessagesRequest {
            model: "claude-test".into(),
            max_tokens: 1024,
            system: "be careful".into(),
            tools: vec![ToolSpec {
                tool_type: "computer_20241022".into(),
                name: "computer".into(),
                display_width_px: 1280,
                display_height_px: 720,
                display_number: 1,
            }],
            messages: vec![Message::user(vec![
                ContentBlock::text("open settings"),
                ContentBlock::png("AAAABASE64"),
            ])],
        }
    }

    fn provider_for(server: &mockito::Server) -> AnthropicProvider {
        let config = DecisionConfig {
            api_base: server.url(),
            api_key: Some("test-key".into()),
            ..DecisionConfig::default()
        };
        AnthropicProvider::new(&config).unwrap()
    }

    #[test]
    fn sanitized_body_omits_image_data() {
        let body = sanitized_body(&request());
        assert!(!body.contains("AAAABASE64"));
        assert!(body.contains("<omitted_base64_image>"));
        assert!(body.contains("open settings"));
    }

    #[tokio::test]
    async fn posts_messages_and_parses_tool_use() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/messages")
            .match_header("anthropic-version", "2023-06-01")
            .match_header("anthropic-beta", "computer-use-2024-10-22")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"id":"msg_1","model":"claude-test","stop_reason":"tool_use","content":[
                    {"type":"text","text":"Clicking the gear."},
                    {"type":"tool_use","id":"toolu_1","name":"computer","input":{"action":"left_click"}}
                ]}"#,
            )
            .create_async()
            .await;

        let response = provider_for(&server).create_message(&request()).await.unwrap();
        mock.assert_async().await;
        assert_eq!(response.content.len(), 2);
        assert!(matches!(&response.content[1], ContentBlock::ToolUse { name, .. } if name == "computer"));
    }

    #[tokio::test]
    async fn non_success_status_is_transport_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/messages")
            .with_status(529)
            .with_body(r#"{"type":"error","error":{"type":"overloaded_error"}}"#)
            .create_async()
            .await;

        let err = provider_for(&server).create_message(&request()).await.unwrap_err();
        assert!(err.is_transport(), "{err}");
    }

    #[tokio::test]
    async fn malformed_body_is_protocol_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/messages")
            .with_status(200)
            .with_body("not json at all")
            .create_async()
            .await;

        let err = provider_for(&server).create_message(&request()).await.unwrap_err();
        assert!(matches!(err, DeskPilotError::Protocol(_)), "{err}");
    }
}
