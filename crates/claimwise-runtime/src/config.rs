//! Runtime configuration.
//!
//! Loaded from YAML or JSON. Every field has a default, so an empty file is
//! a valid configuration. Durations are written in human-readable form
//! (`"60s"`, `"2m"`, `"1500ms"`); bare integers are read as seconds.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use claimwise_core::TaskType;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::DEFAULT_AVAILABILITY_TTL;
use crate::catalog::{CostModel, ProviderCatalog, ProviderConfig};
use crate::knowledge::DEFAULT_KNOWLEDGE_TIMEOUT;
use crate::providers::{ApiCredential, BackendFamily};
use crate::resilience::RetryPolicy;

/// Environment variable overriding the Ollama base URL.
pub const OLLAMA_URL_ENV: &str = "CLAIMWISE_OLLAMA_URL";

/// Environment variable overriding the execution mode.
pub const EXECUTION_MODE_ENV: &str = "CLAIMWISE_EXECUTION_MODE";

/// Errors loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// How the orchestrator runs task agents within one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// One agent at a time, in task order
    #[default]
    Sequential,

    /// All agents at once; results still reported in task order
    Concurrent,
}

impl FromStr for ExecutionMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" => Ok(ExecutionMode::Sequential),
            "concurrent" | "parallel" => Ok(ExecutionMode::Concurrent),
            other => Err(ConfigError::Invalid(format!(
                "unknown execution mode '{}' (expected sequential or concurrent)",
                other
            ))),
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Sequential => write!(f, "sequential"),
            ExecutionMode::Concurrent => write!(f, "concurrent"),
        }
    }
}

/// Base URLs per backend family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub ollama: String,
    pub openai: String,
    pub openrouter: String,
    pub groq: String,
    pub anthropic: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            ollama: BackendFamily::Ollama.default_base_url().to_string(),
            openai: BackendFamily::OpenAi.default_base_url().to_string(),
            openrouter: BackendFamily::OpenRouter.default_base_url().to_string(),
            groq: BackendFamily::Groq.default_base_url().to_string(),
            anthropic: BackendFamily::Anthropic.default_base_url().to_string(),
        }
    }
}

impl Endpoints {
    pub fn for_family(&self, family: BackendFamily) -> &str {
        match family {
            BackendFamily::Ollama => &self.ollama,
            BackendFamily::OpenAi => &self.openai,
            BackendFamily::OpenRouter => &self.openrouter,
            BackendFamily::Groq => &self.groq,
            BackendFamily::Anthropic => &self.anthropic,
        }
    }
}

/// API keys given directly in the config file. Never printed.
#[derive(Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct ApiKeys(BTreeMap<BackendFamily, String>);

impl ApiKeys {
    pub fn get(&self, family: BackendFamily) -> Option<&str> {
        self.0.get(&family).map(String::as_str)
    }

    pub fn insert(&mut self, family: BackendFamily, key: impl Into<String>) {
        self.0.insert(family, key.into());
    }
}

impl fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.0.keys().map(|family| (family, "[REDACTED]")))
            .finish()
    }
}

/// One catalog entry as written in the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub family: BackendFamily,
    pub model: String,

    #[serde(default = "default_cost")]
    pub cost: CostModel,

    #[serde(default)]
    pub priority: u32,

    #[serde(default, with = "humantime_serde::option")]
    pub timeout: Option<Duration>,
}

fn default_cost() -> CostModel {
    CostModel::Free
}

/// Settings shared by every task agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            max_output_tokens: 1500,
        }
    }
}

/// Configuration for the runtime.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// How long a probe result stays fresh
    #[serde(with = "humantime_serde")]
    pub availability_ttl: Duration,

    /// Bound on one availability probe
    #[serde(with = "humantime_serde")]
    pub probe_timeout: Duration,

    /// Per-call inference timeout when a catalog entry sets none
    #[serde(with = "humantime_serde")]
    pub provider_timeout: Duration,

    /// Bound on each knowledge-base lookup
    #[serde(with = "humantime_serde")]
    pub knowledge_timeout: Duration,

    /// Advisory end-to-end run budget; exceeding it is logged, not enforced
    #[serde(with = "humantime_serde")]
    pub run_timeout: Duration,

    pub execution_mode: ExecutionMode,

    pub agents: AgentSettings,

    pub endpoints: Endpoints,

    /// Per-task catalogs; the built-in ladder is used when empty
    pub providers: BTreeMap<TaskType, Vec<ProviderEntry>>,

    pub api_keys: ApiKeys,

    pub persistence_retry: RetryPolicy,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            availability_ttl: DEFAULT_AVAILABILITY_TTL,
            probe_timeout: Duration::from_secs(2),
            provider_timeout: Duration::from_secs(60),
            knowledge_timeout: DEFAULT_KNOWLEDGE_TIMEOUT,
            run_timeout: Duration::from_secs(120),
            execution_mode: ExecutionMode::Sequential,
            agents: AgentSettings::default(),
            endpoints: Endpoints::default(),
            providers: BTreeMap::new(),
            api_keys: ApiKeys::default(),
            persistence_retry: RetryPolicy::default(),
        }
    }
}

impl RuntimeConfig {
    /// Parse configuration from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file, choosing the format by extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&contents),
            _ => Self::from_yaml(&contents),
        }
    }

    /// Apply `CLAIMWISE_*` environment overrides.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(url) = lookup(OLLAMA_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.endpoints.ollama = url.trim().to_string();
        }
        if let Some(mode) = lookup(EXECUTION_MODE_ENV).filter(|v| !v.trim().is_empty()) {
            self.execution_mode = mode.parse()?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Check ranges and URLs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("availability_ttl", self.availability_ttl),
            ("probe_timeout", self.probe_timeout),
            ("provider_timeout", self.provider_timeout),
            ("knowledge_timeout", self.knowledge_timeout),
            ("run_timeout", self.run_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigError::Invalid(format!("{} must be greater than zero", name)));
            }
        }

        let temperature = self.agents.temperature;
        if !(0.0..=2.0).contains(&temperature) {
            return Err(ConfigError::Invalid(format!(
                "agents.temperature {} is outside [0, 2]",
                temperature
            )));
        }
        if self.agents.max_output_tokens == 0 {
            return Err(ConfigError::Invalid(
                "agents.max_output_tokens must be greater than zero".to_string(),
            ));
        }

        for family in BackendFamily::ALL {
            let url = self.endpoints.for_family(family);
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::Invalid(format!(
                    "endpoint for {} must start with http:// or https://",
                    family
                )));
            }
        }

        for (task, entries) in &self.providers {
            for entry in entries {
                if entry.model.trim().is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "provider entry for {} ({}) has an empty model",
                        task, entry.family
                    )));
                }
            }
        }

        Ok(())
    }

    /// Build the provider catalog with credentials resolved.
    ///
    /// Config keys win over environment variables. Families with neither
    /// stay in the catalog without a credential.
    pub fn build_catalog(&self) -> ProviderCatalog {
        let mut catalog = if self.providers.is_empty() {
            ProviderCatalog::builtin()
        } else {
            let mut catalog = ProviderCatalog::new();
            for (task, entries) in &self.providers {
                for entry in entries {
                    let mut config =
                        ProviderConfig::new(entry.family, entry.model.clone(), entry.cost, entry.priority);
                    config.timeout = entry.timeout;
                    catalog.insert(*task, config);
                }
            }
            catalog
        };

        let credentials: HashMap<_, _> = catalog
            .families()
            .into_iter()
            .filter_map(|family| {
                let env_var = family.credential_env()?;
                let credential = ApiCredential::resolve(
                    self.api_keys.get(family),
                    env_var,
                    family.credential_name(),
                )?;
                Some((family, Arc::new(credential)))
            })
            .collect();
        catalog.attach_credentials(&credentials);

        catalog
    }
}

/// Serde support for `Duration` as humantime strings.
///
/// Serializes as e.g. `"1m 30s"`; deserializes strings through
/// `humantime::parse_duration` and bare integers as seconds.
pub mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Seconds(u64),
    }

    fn from_raw<E: serde::de::Error>(raw: Raw) -> Result<Duration, E> {
        match raw {
            Raw::Text(text) => humantime::parse_duration(text.trim()).map_err(E::custom),
            Raw::Seconds(secs) => Ok(Duration::from_secs(secs)),
        }
    }

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        from_raw(Raw::deserialize(deserializer)?)
    }

    pub mod option {
        use super::{from_raw, Raw};
        use serde::{Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match duration {
                Some(d) => super::serialize(d, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
        where
            D: Deserializer<'de>,
        {
            Option::<Raw>::deserialize(deserializer)?
                .map(from_raw)
                .transpose()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.availability_ttl, Duration::from_secs(60));
        assert_eq!(config.probe_timeout, Duration::from_secs(2));
        assert_eq!(config.run_timeout, Duration::from_secs(120));
        assert_eq!(config.knowledge_timeout, DEFAULT_KNOWLEDGE_TIMEOUT);
        assert_eq!(config.execution_mode, ExecutionMode::Sequential);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_yaml_is_default() {
        let config = RuntimeConfig::from_yaml("{}").unwrap();
        assert_eq!(config.provider_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_parse_yaml_with_providers() {
        let yaml = r#"
availability_ttl: 30s
probe_timeout: 1500ms
provider_timeout: 45
execution_mode: concurrent
agents:
  temperature: 0.2
providers:
  premium_pay:
    - family: ollama
      model: "qwen2.5:14b"
      priority: 0
    - family: anthropic
      model: "claude-sonnet-4-5"
      priority: 10
      timeout: 90s
      cost:
        kind: per_token
        input_per_million: 3.0
        output_per_million: 15.0
api_keys:
  anthropic: "sk-ant-from-config"
"#;
        let config = RuntimeConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.availability_ttl, Duration::from_secs(30));
        assert_eq!(config.probe_timeout, Duration::from_millis(1500));
        assert_eq!(config.provider_timeout, Duration::from_secs(45));
        assert_eq!(config.execution_mode, ExecutionMode::Concurrent);
        assert_eq!(config.agents.max_output_tokens, 1500);

        let catalog = config.build_catalog();
        let premium = catalog.for_task(TaskType::PremiumPay);
        assert_eq!(premium.len(), 2);
        assert_eq!(premium[1].timeout, Some(Duration::from_secs(90)));
        assert_eq!(
            premium[1].credential.as_ref().map(|c| c.expose()),
            Some("sk-ant-from-config")
        );
        assert!(catalog.for_task(TaskType::FlightTime).is_empty());
    }

    #[test]
    fn test_api_keys_redacted_in_debug() {
        let config =
            RuntimeConfig::from_yaml("api_keys:\n  groq: \"gsk-very-secret\"\n").unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("gsk-very-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(RuntimeConfig::from_yaml("probe_timeout: 0s").is_err());
        assert!(RuntimeConfig::from_yaml("knowledge_timeout: 0s").is_err());
        assert!(RuntimeConfig::from_yaml("agents:\n  temperature: 3.0").is_err());
        assert!(RuntimeConfig::from_yaml("endpoints:\n  ollama: localhost:11434").is_err());
        assert!(RuntimeConfig::from_yaml("availability_ttl: soon").is_err());
    }

    #[test]
    fn test_overrides() {
        let config = RuntimeConfig::default()
            .with_overrides(|key| match key {
                OLLAMA_URL_ENV => Some("http://gpu-box:11434".to_string()),
                EXECUTION_MODE_ENV => Some("Concurrent".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.endpoints.ollama, "http://gpu-box:11434");
        assert_eq!(config.execution_mode, ExecutionMode::Concurrent);

        let bad = RuntimeConfig::default().with_overrides(|key| {
            (key == EXECUTION_MODE_ENV).then(|| "eventually".to_string())
        });
        assert!(bad.is_err());
    }

    #[test]
    fn test_json_config() {
        let config = RuntimeConfig::from_json(r#"{"run_timeout": "2m", "execution_mode": "sequential"}"#)
            .unwrap();
        assert_eq!(config.run_timeout, Duration::from_secs(120));
    }
}
