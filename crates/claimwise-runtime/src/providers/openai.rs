//! OpenAI-compatible chat completions adapter.
//!
//! OpenAI, OpenRouter and Groq share one wire format; the adapter is
//! parameterized by family and base URL.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{
    extract_error_message, parse_retry_after, BackendAdapter, BackendFamily, NormalizedResponse,
    ProviderError, StopReason, TaskRequest, TokenUsage,
};
use crate::catalog::ProviderConfig;

/// Adapter for `/chat/completions` style APIs.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleAdapter {
    family: BackendFamily,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAiCompatibleAdapter {
    pub fn new(family: BackendFamily, base_url: impl Into<String>) -> Self {
        Self {
            family,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }
}

/// Request payload for chat completions.
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

/// Response payload for chat completions.
#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

fn build_request<'a>(config: &'a ProviderConfig, request: &'a TaskRequest) -> ChatRequest<'a> {
    ChatRequest {
        model: &config.model_id,
        messages: [
            ChatMessage {
                role: "system",
                content: request.system_instruction(),
            },
            ChatMessage {
                role: "user",
                content: request.user_instruction(),
            },
        ],
        temperature: request.temperature(),
        max_tokens: request.max_output_tokens(),
    }
}

fn normalize(
    family: BackendFamily,
    config: &ProviderConfig,
    body: ChatResponse,
) -> Result<NormalizedResponse, ProviderError> {
    let choice = body
        .choices
        .into_iter()
        .next()
        .ok_or(ProviderError::EmptyResponse)?;

    let text = choice.message.content.unwrap_or_default();
    if text.trim().is_empty() {
        return Err(ProviderError::EmptyResponse);
    }

    let usage = body
        .usage
        .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens))
        .unwrap_or_default();

    Ok(NormalizedResponse {
        text,
        usage,
        stop_reason: StopReason::from_provider(choice.finish_reason.as_deref()),
        backend_family: family,
        model_id: body.model.unwrap_or_else(|| config.model_id.clone()),
        estimated_cost: None,
    })
}

#[async_trait]
impl BackendAdapter for OpenAiCompatibleAdapter {
    fn family(&self) -> BackendFamily {
        self.family
    }

    async fn complete(
        &self,
        config: &ProviderConfig,
        request: &TaskRequest,
    ) -> Result<NormalizedResponse, ProviderError> {
        let credential = config.credential.as_ref().ok_or_else(|| {
            ProviderError::NotConfigured(format!("{} not set", self.family.credential_name()))
        })?;

        // SECURITY: Only expose the credential here, at the point of use
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(credential.expose())
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

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        normalize(self.family, config, body)
    }
}
