//! Anthropic Messages API adapter.
//!
//! ## Security
//!
//! The API key comes from the catalog entry's [`ApiCredential`] and is only
//! exposed when the request header is set.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{
    extract_error_message, parse_retry_after, BackendAdapter, BackendFamily, NormalizedResponse,
    ProviderError, StopReason, TaskRequest, TokenUsage,
};
use crate::catalog::ProviderConfig;

/// API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Adapter for the Anthropic Messages API.
#[derive(Debug, Clone)]
pub struct AnthropicAdapter {
    base_url: String,
    client: reqwest::Client,
}

impl AnthropicAdapter {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }
}

/// Anthropic API request format.
#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'static str,
    content: Vec<ContentBlock<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock<'a> {
    Text { text: &'a str },
}

/// Anthropic API response format.
#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlockResponse>,
    model: String,
    stop_reason: Option<String>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct ContentBlockResponse {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

fn build_request<'a>(config: &'a ProviderConfig, request: &'a TaskRequest) -> AnthropicRequest<'a> {
    AnthropicRequest {
        model: &config.model_id,
        max_tokens: request.max_output_tokens(),
        system: request.system_instruction(),
        messages: vec![AnthropicMessage {
            role: "user",
            content: vec![ContentBlock::Text {
                text: request.user_instruction(),
            }],
        }],
        // The Messages API caps temperature at 1.0.
        temperature: request.temperature().min(1.0),
    }
}

fn normalize(body: AnthropicResponse) -> Result<NormalizedResponse, ProviderError> {
    let text = body
        .content
        .into_iter()
        .filter_map(|block| block.text)
        .collect::<Vec<_>>()
        .join("");

    if text.trim().is_empty() {
        return Err(ProviderError::EmptyResponse);
    }

    Ok(NormalizedResponse {
        text,
        usage: TokenUsage::new(body.usage.input_tokens, body.usage.output_tokens),
        stop_reason: StopReason::from_provider(body.stop_reason.as_deref()),
        backend_family: BackendFamily::Anthropic,
        model_id: body.model,
        estimated_cost: None,
    })
}

#[async_trait]
impl BackendAdapter for AnthropicAdapter {
    fn family(&self) -> BackendFamily {
        BackendFamily::Anthropic
    }

    async fn complete(
        &self,
        config: &ProviderConfig,
        request: &TaskRequest,
    ) -> Result<NormalizedResponse, ProviderError> {
        let credential = config.credential.as_ref().ok_or_else(|| {
            ProviderError::NotConfigured("Anthropic API key not set".to_string())
        })?;

        // SECURITY: Only expose the credential here, at the point of use
        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", credential.expose())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&build_request(config, request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(
                response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok()),
            );
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(
                status.as_u16(),
                extract_error_message(&body),
                retry_after,
            ));
        }

        let body: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        normalize(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CostModel;
    use claimwise_core::TaskType;

    #[test]
    fn test_request_shape() {
        let config = ProviderConfig::new(
            BackendFamily::Anthropic,
            "claude-sonnet-4-5",
            CostModel::Free,
            0,
        );
        let request =
            TaskRequest::new(TaskType::PremiumPay, "You check pay.", "Claim: 125.00", 1.5, 900).unwrap();

        let json = serde_json::to_value(build_request(&config, &request)).unwrap();
        assert_eq!(json["model"], "claude-sonnet-4-5");
        assert_eq!(json["system"], "You check pay.");
        assert_eq!(json["max_tokens"], 900);
        assert_eq!(json["temperature"], 1.0);
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"][0]["type"], "text");
        assert_eq!(json["messages"][0]["content"][0]["text"], "Claim: 125.00");
    }

    #[test]
    fn test_normalize_joins_text_blocks() {
        let body: AnthropicResponse = serde_json::from_value(serde_json::json!({
            "content": [{"type": "text", "text": "{\"ok\":"}, {"type": "text", "text": " true}"}],
            "model": "claude-sonnet-4-5",
            "stop_reason": "max_tokens",
            "usage": {"input_tokens": 120, "output_tokens": 30}
        }))
        .unwrap();

        let response = normalize(body).unwrap();
        assert_eq!(response.text, "{\"ok\": true}");
        assert_eq!(response.stop_reason, StopReason::Truncated);
        assert_eq!(response.usage.total(), 150);
        assert_eq!(response.served_by(), "anthropic/claude-sonnet-4-5");
    }

    #[test]
    fn test_empty_content_is_malformed() {
        let body: AnthropicResponse = serde_json::from_value(serde_json::json!({
            "content": [],
            "model": "claude-sonnet-4-5",
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 1, "output_tokens": 0}
        }))
        .unwrap();

        let err = normalize(body).unwrap_err();
        assert_eq!(err.class(), crate::providers::ErrorClass::MalformedOutput);
    }

    #[tokio::test]
    async fn test_missing_credential_is_auth_error() {
        let adapter = AnthropicAdapter::new("http://127.0.0.1:9");
        let config = ProviderConfig::new(BackendFamily::Anthropic, "claude", CostModel::Free, 0);
        let request = TaskRequest::new(TaskType::Compliance, "sys", "user", 0.1, 10).unwrap();

        let err = adapter.complete(&config, &request).await.unwrap_err();
        assert_eq!(err.class(), crate::providers::ErrorClass::AuthError);
    }
}
