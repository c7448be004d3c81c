//! Local Ollama server adapter.
//!
//! Uses the non-streaming `/api/chat` endpoint. Reachability is probed
//! through `/api/tags`, which answers quickly without loading a model.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{
    extract_error_message, BackendAdapter, BackendFamily, NormalizedResponse, ProviderError,
    StopReason, TaskRequest, TokenUsage,
};
use crate::catalog::ProviderConfig;

/// Adapter for a locally hosted Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaAdapter {
    base_url: String,
    client: reqwest::Client,
}

impl OllamaAdapter {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: [OllamaMessage<'a>; 2],
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    #[serde(default)]
    model: Option<String>,
    message: OllamaResponseMessage,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: u32,
    #[serde(default)]
    eval_count: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaResponseMessage {
    #[serde(default)]
    content: String,
}

fn build_request<'a>(config: &'a ProviderConfig, request: &'a TaskRequest) -> OllamaChatRequest<'a> {
    OllamaChatRequest {
        model: &config.model_id,
        messages: [
            OllamaMessage {
                role: "system",
                content: request.system_instruction(),
            },
            OllamaMessage {
                role: "user",
                content: request.user_instruction(),
            },
        ],
        stream: false,
        options: OllamaOptions {
            temperature: request.temperature(),
            num_predict: request.max_output_tokens(),
        },
    }
}

fn normalize(config: &ProviderConfig, body: OllamaChatResponse) -> Result<NormalizedResponse, ProviderError> {
    if body.message.content.trim().is_empty() {
        return Err(ProviderError::EmptyResponse);
    }

    Ok(NormalizedResponse {
        text: body.message.content,
        usage: TokenUsage::new(body.prompt_eval_count, body.eval_count),
        stop_reason: StopReason::from_provider(body.done_reason.as_deref()),
        backend_family: BackendFamily::Ollama,
        model_id: body.model.unwrap_or_else(|| config.model_id.clone()),
        estimated_cost: None,
    })
}

#[async_trait]
impl BackendAdapter for OllamaAdapter {
    fn family(&self) -> BackendFamily {
        BackendFamily::Ollama
    }

    async fn complete(
        &self,
        config: &ProviderConfig,
        request: &TaskRequest,
    ) -> Result<NormalizedResponse, ProviderError> {
        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&build_request(config, request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(
                status.as_u16(),
                extract_error_message(&body),
                None,
            ));
        }

        let body: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        normalize(config, body)
    }

    async fn probe(&self, timeout: Duration) -> bool {
        let result = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(timeout)
            .send()
            .await;

        match result {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(base_url = %self.base_url, error = %e, "Ollama probe failed");
                false
            }
        }
    }
}
