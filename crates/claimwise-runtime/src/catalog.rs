//! Provider catalog: ranked candidate backends per task.
//!
//! Each task has its own ordered list of [`ProviderConfig`]s. Lower
//! `priority` values are tried first, so the list encodes a cost ladder:
//! free local models, then mid-tier cloud models, then premium ones.
//! The catalog is read-only once built.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use claimwise_core::TaskType;
use serde::{Deserialize, Serialize};

use crate::providers::{ApiCredential, BackendFamily, TokenUsage};

/// How a provider charges for a call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CostModel {
    Free,

    /// Fixed price per call, in USD
    Flat { per_call: f64 },

    /// USD per million tokens
    PerToken {
        input_per_million: f64,
        output_per_million: f64,
    },
}

impl CostModel {
    pub fn per_token(input_per_million: f64, output_per_million: f64) -> Self {
        CostModel::PerToken {
            input_per_million,
            output_per_million,
        }
    }

    /// Estimated cost of one call.
    ///
    /// `None` when a per-token model reported no usage to price.
    pub fn estimate(&self, usage: &TokenUsage) -> Option<f64> {
        match self {
            CostModel::Free => Some(0.0),
            CostModel::Flat { per_call } => Some(*per_call),
            CostModel::PerToken {
                input_per_million,
                output_per_million,
            } => {
                if usage.total() == 0 {
                    return None;
                }
                let input = usage.input_tokens as f64 / 1_000_000.0 * input_per_million;
                let output = usage.output_tokens as f64 / 1_000_000.0 * output_per_million;
                Some(input + output)
            }
        }
    }

    pub fn is_free(&self) -> bool {
        matches!(self, CostModel::Free)
    }
}

impl fmt::Display for CostModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CostModel::Free => write!(f, "free"),
            CostModel::Flat { per_call } => write!(f, "${:.4}/call", per_call),
            CostModel::PerToken {
                input_per_million,
                output_per_million,
            } => write!(
                f,
                "${:.2}/${:.2} per 1M in/out",
                input_per_million, output_per_million
            ),
        }
    }
}

/// One candidate backend for a task.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub family: BackendFamily,
    pub model_id: String,

    /// Absent for local families and for cloud families with no key configured
    pub credential: Option<Arc<ApiCredential>>,

    pub cost_model: CostModel,

    /// Lower values are tried first
    pub priority: u32,

    /// Per-call timeout; the runtime default applies when unset
    pub timeout: Option<Duration>,
}

impl ProviderConfig {
    pub fn new(
        family: BackendFamily,
        model_id: impl Into<String>,
        cost_model: CostModel,
        priority: u32,
    ) -> Self {
        Self {
            family,
            model_id: model_id.into(),
            credential: None,
            cost_model,
            priority,
            timeout: None,
        }
    }

    pub fn with_credential(mut self, credential: Arc<ApiCredential>) -> Self {
        self.credential = Some(credential);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Whether the entry has what it needs to be called.
    pub fn has_credential(&self) -> bool {
        !self.family.requires_credential()
            || self.credential.as_ref().map(|c| !c.is_empty()).unwrap_or(false)
    }

    /// `family/model` label.
    pub fn label(&self) -> String {
        format!("{}/{}", self.family, self.model_id)
    }
}

/// Ranked provider lists, one per task.
#[derive(Debug, Clone, Default)]
pub struct ProviderCatalog {
    entries: BTreeMap<TaskType, Vec<ProviderConfig>>,
}

impl ProviderCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in cost ladder for every task, without credentials.
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        for task in TaskType::ALL {
            for config in default_ladder() {
                catalog.insert(task, config);
            }
        }
        catalog
    }

    /// Add a candidate for a task, keeping the list in priority order.
    ///
    /// Entries with equal priority keep insertion order.
    pub fn insert(&mut self, task: TaskType, config: ProviderConfig) {
        let list = self.entries.entry(task).or_default();
        list.push(config);
        list.sort_by_key(|c| c.priority);
    }

    /// Candidates for a task in the order dispatch tries them.
    pub fn for_task(&self, task: TaskType) -> &[ProviderConfig] {
        self.entries.get(&task).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Tasks that have at least one candidate.
    pub fn tasks(&self) -> impl Iterator<Item = TaskType> + '_ {
        self.entries
            .iter()
            .filter(|(_, list)| !list.is_empty())
            .map(|(task, _)| *task)
    }

    /// Families referenced anywhere in the catalog.
    pub fn families(&self) -> Vec<BackendFamily> {
        let mut families: Vec<BackendFamily> = self
            .entries
            .values()
            .flatten()
            .map(|c| c.family)
            .collect();
        families.sort();
        families.dedup();
        families
    }

    /// Attach credentials to every entry of a family that lacks one.
    pub fn attach_credentials(&mut self, credentials: &HashMap<BackendFamily, Arc<ApiCredential>>) {
        for config in self.entries.values_mut().flatten() {
            if config.credential.is_none() {
                if let Some(credential) = credentials.get(&config.family) {
                    config.credential = Some(Arc::clone(credential));
                }
            }
        }
    }

    /// Resolve each referenced family's credential from the environment.
    pub fn with_env_credentials(mut self) -> Self {
        let credentials = env_credentials(&self.families());
        self.attach_credentials(&credentials);
        self
    }
}

/// Read credentials for the given families from their environment variables.
pub fn env_credentials(families: &[BackendFamily]) -> HashMap<BackendFamily, Arc<ApiCredential>> {
    families
        .iter()
        .filter_map(|family| {
            let env_var = family.credential_env()?;
            let credential = ApiCredential::from_env(env_var, family.credential_name())?;
            Some((*family, Arc::new(credential)))
        })
        .collect()
}

fn default_ladder() -> Vec<ProviderConfig> {
    vec![
        ProviderConfig::new(BackendFamily::Ollama, "llama3.1:8b", CostModel::Free, 0),
        ProviderConfig::new(
            BackendFamily::Groq,
            "llama-3.1-8b-instant",
            CostModel::per_token(0.05, 0.08),
            10,
        ),
        ProviderConfig::new(
            BackendFamily::OpenRouter,
            "meta-llama/llama-3.1-70b-instruct",
            CostModel::per_token(0.40, 0.40),
            20,
        ),
        ProviderConfig::new(
            BackendFamily::OpenAi,
            "gpt-4o-mini",
            CostModel::per_token(0.15, 0.60),
            30,
        ),
        ProviderConfig::new(
            BackendFamily::Anthropic,
            "claude-sonnet-4-5",
            CostModel::per_token(3.0, 15.0),
            40,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::CredentialSource;

    #[test]
    fn test_cost_estimation() {
        let usage = TokenUsage::new(1000, 500);

        // 1000 * $3/MTok + 500 * $15/MTok = $0.0105
        let cost = CostModel::per_token(3.0, 15.0).estimate(&usage).unwrap();
        assert!((cost - 0.0105).abs() < 1e-12);

        assert_eq!(CostModel::Free.estimate(&usage), Some(0.0));
        assert_eq!(CostModel::Flat { per_call: 0.02 }.estimate(&usage), Some(0.02));
        assert_eq!(CostModel::per_token(3.0, 15.0).estimate(&TokenUsage::default()), None);
    }

    #[test]
    fn test_insert_keeps_priority_order() {
        let mut catalog = ProviderCatalog::new();
        catalog.insert(
            TaskType::Compliance,
            ProviderConfig::new(BackendFamily::Anthropic, "premium", CostModel::Free, 30),
        );
        catalog.insert(
            TaskType::Compliance,
            ProviderConfig::new(BackendFamily::Ollama, "local", CostModel::Free, 0),
        );
        catalog.insert(
            TaskType::Compliance,
            ProviderConfig::new(BackendFamily::OpenAi, "mid-a", CostModel::Free, 10),
        );
        catalog.insert(
            TaskType::Compliance,
            ProviderConfig::new(BackendFamily::OpenAi, "mid-b", CostModel::Free, 10),
        );

        let models: Vec<&str> = catalog
            .for_task(TaskType::Compliance)
            .iter()
            .map(|c| c.model_id.as_str())
            .collect();
        assert_eq!(models, vec!["local", "mid-a", "mid-b", "premium"]);
        assert!(catalog.for_task(TaskType::FlightTime).is_empty());
    }

    #[test]
    fn test_builtin_ladder_starts_local() {
        let catalog = ProviderCatalog::builtin();
        for task in TaskType::ALL {
            let list = catalog.for_task(task);
            assert_eq!(list[0].family, BackendFamily::Ollama);
            assert!(list[0].cost_model.is_free());
            assert_eq!(list.last().map(|c| c.family), Some(BackendFamily::Anthropic));
        }
        assert_eq!(catalog.tasks().count(), 3);
    }

    #[test]
    fn test_credential_presence() {
        let local = ProviderConfig::new(BackendFamily::Ollama, "llama", CostModel::Free, 0);
        assert!(local.has_credential());

        let cloud = ProviderConfig::new(BackendFamily::Anthropic, "claude", CostModel::Free, 1);
        assert!(!cloud.has_credential());

        let keyed = cloud.with_credential(Arc::new(ApiCredential::new(
            "sk-test",
            CredentialSource::Programmatic,
            "Anthropic API key",
        )));
        assert!(keyed.has_credential());
    }

    #[test]
    fn test_attach_credentials_shares_one_secret_per_family() {
        let mut catalog = ProviderCatalog::builtin();
        let credential = Arc::new(ApiCredential::new(
            "sk-test",
            CredentialSource::Programmatic,
            "Anthropic API key",
        ));
        let mut credentials = HashMap::new();
        credentials.insert(BackendFamily::Anthropic, Arc::clone(&credential));
        catalog.attach_credentials(&credentials);

        for task in TaskType::ALL {
            for config in catalog.for_task(task) {
                assert_eq!(
                    config.credential.is_some(),
                    config.family == BackendFamily::Anthropic
                );
            }
        }
        // Three tasks, the map, and the local handle.
        assert_eq!(Arc::strong_count(&credential), 5);
    }
}
