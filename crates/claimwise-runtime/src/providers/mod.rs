//! Backend adapters and the normalized call contract.
//!
//! Every inference backend family is reached through one [`BackendAdapter`]
//! implementation that translates a [`TaskRequest`] into its wire protocol
//! and the reply back into a [`NormalizedResponse`]. Adapter errors are
//! [`ProviderError`]s, each of which maps to exactly one [`ErrorClass`].
//!
//! ## Security
//!
//! All adapters use the [`secrets`] module for credential handling.
//! See [`ApiCredential`] for the recommended patterns.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use claimwise_core::TaskType;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::ProviderConfig;

mod registry;
pub mod secrets;

#[cfg(feature = "anthropic")]
mod anthropic;
#[cfg(feature = "local")]
mod ollama;
#[cfg(feature = "openai")]
mod openai;

pub use registry::AdapterRegistry;
pub use secrets::{ApiCredential, CredentialSource};

#[cfg(feature = "anthropic")]
pub use anthropic::AnthropicAdapter;
#[cfg(feature = "local")]
pub use ollama::OllamaAdapter;
#[cfg(feature = "openai")]
pub use openai::OpenAiCompatibleAdapter;

lazy_static! {
    /// Error text that means the account is out of money or quota.
    static ref BILLING_PATTERN: Regex = Regex::new(
        r"(?i)(credit balance|insufficient[_ ]quota|exceeded your current quota|insufficient credits|billing|payment required)"
    )
    .expect("billing pattern is valid");
}

/// Inference backend families. One wire protocol and credential type each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendFamily {
    /// Locally hosted Ollama server
    Ollama,
    OpenAi,
    OpenRouter,
    Groq,
    Anthropic,
}

impl BackendFamily {
    pub const ALL: [BackendFamily; 5] = [
        BackendFamily::Ollama,
        BackendFamily::OpenAi,
        BackendFamily::OpenRouter,
        BackendFamily::Groq,
        BackendFamily::Anthropic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendFamily::Ollama => "ollama",
            BackendFamily::OpenAi => "openai",
            BackendFamily::OpenRouter => "openrouter",
            BackendFamily::Groq => "groq",
            BackendFamily::Anthropic => "anthropic",
        }
    }

    /// Local families are free and probed through the availability cache.
    pub fn is_local(&self) -> bool {
        matches!(self, BackendFamily::Ollama)
    }

    /// Environment variable holding this family's credential, if it needs one.
    pub fn credential_env(&self) -> Option<&'static str> {
        match self {
            BackendFamily::Ollama => None,
            BackendFamily::OpenAi => Some("OPENAI_API_KEY"),
            BackendFamily::OpenRouter => Some("OPENROUTER_API_KEY"),
            BackendFamily::Groq => Some("GROQ_API_KEY"),
            BackendFamily::Anthropic => Some("ANTHROPIC_API_KEY"),
        }
    }

    /// Human-readable credential name used in logs and messages.
    pub fn credential_name(&self) -> &'static str {
        match self {
            BackendFamily::Ollama => "Ollama (no credential)",
            BackendFamily::OpenAi => "OpenAI API key",
            BackendFamily::OpenRouter => "OpenRouter API key",
            BackendFamily::Groq => "Groq API key",
            BackendFamily::Anthropic => "Anthropic API key",
        }
    }

    /// Whether calls to this family need a credential.
    pub fn requires_credential(&self) -> bool {
        self.credential_env().is_some()
    }

    /// Default API base URL.
    pub fn default_base_url(&self) -> &'static str {
        match self {
            BackendFamily::Ollama => "http://localhost:11434",
            BackendFamily::OpenAi => "https://api.openai.com/v1",
            BackendFamily::OpenRouter => "https://openrouter.ai/api/v1",
            BackendFamily::Groq => "https://api.groq.com/openai/v1",
            BackendFamily::Anthropic => "https://api.anthropic.com/v1",
        }
    }
}

impl fmt::Display for BackendFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "ollama" | "local" => Ok(BackendFamily::Ollama),
            "open_ai" | "openai" => Ok(BackendFamily::OpenAi),
            "open_router" | "openrouter" => Ok(BackendFamily::OpenRouter),
            "groq" => Ok(BackendFamily::Groq),
            "anthropic" => Ok(BackendFamily::Anthropic),
            other => Err(format!("unknown backend family '{}'", other)),
        }
    }
}

/// Errors constructing a [`TaskRequest`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RequestError {
    #[error("Temperature {0} is outside [0, 2]")]
    TemperatureOutOfRange(f32),

    #[error("max_output_tokens must be greater than zero")]
    ZeroMaxOutputTokens,

    #[error("{0} instruction is empty")]
    EmptyInstruction(&'static str),
}

/// One normalized inference call. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRequest {
    system_instruction: String,
    user_instruction: String,
    temperature: f32,
    max_output_tokens: u32,
    task_type: TaskType,
}

impl TaskRequest {
    /// Build a request, checking the temperature range and token limit.
    pub fn new(
        task_type: TaskType,
        system_instruction: impl Into<String>,
        user_instruction: impl Into<String>,
        temperature: f32,
        max_output_tokens: u32,
    ) -> Result<Self, RequestError> {
        let system_instruction = system_instruction.into();
        let user_instruction = user_instruction.into();

        if !(temperature.is_finite() && (0.0..=2.0).contains(&temperature)) {
            return Err(RequestError::TemperatureOutOfRange(temperature));
        }
        if max_output_tokens == 0 {
            return Err(RequestError::ZeroMaxOutputTokens);
        }
        if system_instruction.trim().is_empty() {
            return Err(RequestError::EmptyInstruction("System"));
        }
        if user_instruction.trim().is_empty() {
            return Err(RequestError::EmptyInstruction("User"));
        }

        Ok(Self {
            system_instruction,
            user_instruction,
            temperature,
            max_output_tokens,
            task_type,
        })
    }

    pub fn system_instruction(&self) -> &str {
        &self.system_instruction
    }

    pub fn user_instruction(&self) -> &str {
        &self.user_instruction
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn max_output_tokens(&self) -> u32 {
        self.max_output_tokens
    }

    pub fn task_type(&self) -> TaskType {
        self.task_type
    }
}

/// Token usage from a completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens in the prompt
    pub input_tokens: u32,

    /// Tokens in the completion
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    /// Total tokens used.
    pub fn total(&self) -> u32 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// Why generation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Complete,
    Truncated,
}

impl StopReason {
    /// Map a backend's stop/finish reason onto the normalized enum.
    pub fn from_provider(reason: Option<&str>) -> Self {
        match reason {
            Some("max_tokens") | Some("length") => StopReason::Truncated,
            _ => StopReason::Complete,
        }
    }
}

/// A successful completion in backend-independent form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedResponse {
    pub text: String,
    pub usage: TokenUsage,
    pub stop_reason: StopReason,
    pub backend_family: BackendFamily,
    pub model_id: String,

    /// Cost in USD, when the cost model and reported usage allow an estimate
    pub estimated_cost: Option<f64>,
}

impl NormalizedResponse {
    /// `family/model` label for audit trails.
    pub fn served_by(&self) -> String {
        format!("{}/{}", self.backend_family, self.model_id)
    }
}

/// Failure taxonomy used by dispatch to decide how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    AuthError,
    CreditExhausted,
    RateLimited,
    TransportError,
    MalformedOutput,
    NotImplemented,
}

impl ErrorClass {
    /// Whether this failure disables the whole family for the rest of the call.
    pub fn poisons_family(&self) -> bool {
        matches!(self, ErrorClass::AuthError | ErrorClass::CreditExhausted)
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorClass::AuthError => "auth_error",
            ErrorClass::CreditExhausted => "credit_exhausted",
            ErrorClass::RateLimited => "rate_limited",
            ErrorClass::TransportError => "transport_error",
            ErrorClass::MalformedOutput => "malformed_output",
            ErrorClass::NotImplemented => "not_implemented",
        };
        f.write_str(label)
    }
}

/// Errors from backend adapters.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Authentication failed ({status}): {message}")]
    AuthFailed { status: u16, message: String },

    #[error("Credits or quota exhausted: {0}")]
    CreditExhausted(String),

    #[error("Rate limit exceeded, retry after {retry_after:?}: {message}")]
    RateLimited {
        retry_after: Option<Duration>,
        message: String,
    },

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("Unreadable response body: {0}")]
    ParseError(String),

    #[error("Response contained no text")]
    EmptyResponse,

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),
}

impl ProviderError {
    /// Build the error for a non-success HTTP status.
    pub fn from_status(status: u16, message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => ProviderError::AuthFailed { status, message },
            402 => ProviderError::CreditExhausted(message),
            429 => ProviderError::RateLimited {
                retry_after,
                message,
            },
            _ => ProviderError::ApiError { status, message },
        }
    }

    /// Classify this error for dispatch.
    pub fn class(&self) -> ErrorClass {
        match self {
            ProviderError::AuthFailed { .. } | ProviderError::NotConfigured(_) => {
                ErrorClass::AuthError
            }
            ProviderError::CreditExhausted(_) => ErrorClass::CreditExhausted,
            ProviderError::RateLimited { message, .. } => {
                if BILLING_PATTERN.is_match(message) {
                    ErrorClass::CreditExhausted
                } else {
                    ErrorClass::RateLimited
                }
            }
            ProviderError::ApiError { status, message } => {
                if *status < 500 && BILLING_PATTERN.is_match(message) {
                    ErrorClass::CreditExhausted
                } else {
                    ErrorClass::TransportError
                }
            }
            ProviderError::HttpError(_) | ProviderError::Timeout(_) => ErrorClass::TransportError,
            ProviderError::ParseError(_) | ProviderError::EmptyResponse => {
                ErrorClass::MalformedOutput
            }
            ProviderError::NotImplemented(_) => ErrorClass::NotImplemented,
        }
    }
}

#[cfg(feature = "reqwest")]
impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::HttpError(format!("request timed out: {}", e))
        } else if e.is_decode() {
            ProviderError::ParseError(e.to_string())
        } else {
            ProviderError::HttpError(e.to_string())
        }
    }
}

/// Pull the human-readable message out of an error body.
///
/// Handles `{"error": {"message": ...}}`, `{"error": "..."}` and plain text.
#[cfg_attr(not(feature = "reqwest"), allow(dead_code))]
pub(crate) fn extract_error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(message) = value["error"]["message"].as_str() {
            return message.to_string();
        }
        if let Some(message) = value["error"].as_str() {
            return message.to_string();
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "no error body".to_string()
    } else {
        trimmed.chars().take(300).collect()
    }
}

/// Parse a `retry-after` header value given in whole seconds.
pub fn parse_retry_after(value: Option<&str>) -> Option<Duration> {
    value
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// One inference backend family behind the normalized contract.
///
/// # Contract
/// - `complete` performs exactly one backend call; no internal retries
/// - `estimated_cost` is left `None`; dispatch fills it from the catalog
/// - Errors must classify correctly via [`ProviderError::class`]
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    /// The family this adapter speaks to.
    fn family(&self) -> BackendFamily;

    /// Execute one completion for a catalog entry.
    async fn complete(
        &self,
        config: &ProviderConfig,
        request: &TaskRequest,
    ) -> Result<NormalizedResponse, ProviderError>;

    /// Check reachability within `timeout`. Only consulted for local families.
    async fn probe(&self, _timeout: Duration) -> bool {
        true
    }
}
