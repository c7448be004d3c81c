//! Unified dispatch: one request, a ranked list of backends, first success wins.
//!
//! For each catalog entry of the request's task, in priority order:
//! 1. Skip families poisoned earlier in this call
//! 2. Skip cloud entries without a credential
//! 3. For local families, consult the availability cache and probe when stale
//! 4. Call the adapter under the entry's own timeout
//! 5. Return the first success; classify any failure and move on
//!
//! Poisoning is call-scoped. An auth or billing failure takes the whole
//! family out of the remaining entries of this call only; the next call
//! starts clean. The availability cache is the only state that outlives
//! a call.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use claimwise_core::TaskType;
use serde::Serialize;
use thiserror::Error;

use crate::cache::AvailabilityCache;
use crate::catalog::{ProviderCatalog, ProviderConfig};
use crate::config::RuntimeConfig;
use crate::providers::{
    AdapterRegistry, BackendAdapter, BackendFamily, ErrorClass, NormalizedResponse, ProviderError,
    TaskRequest,
};

/// What happened to one catalog entry during a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "class")]
pub enum AttemptOutcome {
    /// Called and failed
    Failed(ErrorClass),

    /// Local backend did not answer its probe
    Unavailable,

    /// Family poisoned earlier in the same call
    SkippedPoisoned,

    /// Cloud family with no credential configured
    NoCredential,
}

impl AttemptOutcome {
    /// Whether the adapter was actually invoked.
    pub fn was_called(&self) -> bool {
        matches!(self, AttemptOutcome::Failed(_))
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptOutcome::Failed(class) => write!(f, "failed ({})", class),
            AttemptOutcome::Unavailable => write!(f, "unavailable"),
            AttemptOutcome::SkippedPoisoned => write!(f, "skipped (family poisoned)"),
            AttemptOutcome::NoCredential => write!(f, "skipped (no credential)"),
        }
    }
}

/// One row of the attempt ledger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptRecord {
    pub family: BackendFamily,
    pub model_id: String,

    #[serde(flatten)]
    pub outcome: AttemptOutcome,

    /// Error text for failed calls
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl AttemptRecord {
    fn new(config: &ProviderConfig, outcome: AttemptOutcome) -> Self {
        Self {
            family: config.family,
            model_id: config.model_id.clone(),
            outcome,
            detail: None,
        }
    }

    fn failed(config: &ProviderConfig, class: ErrorClass, detail: String) -> Self {
        Self {
            detail: Some(detail),
            ..Self::new(config, AttemptOutcome::Failed(class))
        }
    }
}

/// Every candidate was tried or skipped and none answered.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchFailure {
    pub task_type: TaskType,

    /// One record per catalog entry, in the order they were considered
    pub attempts: Vec<AttemptRecord>,

    /// Families poisoned by auth or billing failures during the call
    pub poisoned: Vec<BackendFamily>,
}

impl DispatchFailure {
    /// `(family, model)` pairs whose adapter was actually called.
    pub fn attempted(&self) -> impl Iterator<Item = (BackendFamily, &str)> + '_ {
        self.attempts
            .iter()
            .filter(|a| a.outcome.was_called())
            .map(|a| (a.family, a.model_id.as_str()))
    }

    /// Whether credentials or billing, rather than outages, explain the failure.
    pub fn is_credential_problem(&self) -> bool {
        !self.poisoned.is_empty()
            || (self.attempts.iter().any(|a| a.outcome == AttemptOutcome::NoCredential)
                && !self.attempts.iter().any(|a| a.outcome.was_called()))
    }

    /// User-facing advice for this failure.
    pub fn remediation(&self) -> String {
        if !self.poisoned.is_empty() {
            let families: Vec<&str> = self.poisoned.iter().map(|f| f.as_str()).collect();
            return format!(
                "Credentials or billing rejected by {}. Check the API keys and account credit for these providers.",
                families.join(", ")
            );
        }

        if self.is_credential_problem() {
            let vars: BTreeSet<&str> = self
                .attempts
                .iter()
                .filter(|a| a.outcome == AttemptOutcome::NoCredential)
                .filter_map(|a| a.family.credential_env())
                .collect();
            return format!(
                "No provider could be called. Start a local model server or set one of: {}.",
                vars.into_iter().collect::<Vec<_>>().join(", ")
            );
        }

        "Every provider failed or was unreachable. The services may be down or rate limited; try again later.".to_string()
    }
}

impl fmt::Display for DispatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "all providers exhausted for {}", self.task_type)?;
        for attempt in &self.attempts {
            write!(f, "; {}/{} {}", attempt.family, attempt.model_id, attempt.outcome)?;
        }
        Ok(())
    }
}

/// Errors from dispatch.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    #[error("No providers configured for task {0}")]
    EmptyCatalog(TaskType),

    #[error("{0}")]
    AllProvidersExhausted(DispatchFailure),
}

impl DispatchError {
    /// User-facing advice.
    pub fn remediation(&self) -> String {
        match self {
            DispatchError::EmptyCatalog(task) => {
                format!("Add at least one provider for {} to the configuration.", task)
            }
            DispatchError::AllProvidersExhausted(failure) => failure.remediation(),
        }
    }
}

/// Routes task requests across the provider catalog.
#[derive(Debug, Clone)]
pub struct DispatchClient {
    catalog: Arc<ProviderCatalog>,
    registry: Arc<AdapterRegistry>,
    cache: Arc<AvailabilityCache>,
    probe_timeout: Duration,
    default_timeout: Duration,
}

impl DispatchClient {
    pub fn new(
        catalog: Arc<ProviderCatalog>,
        registry: Arc<AdapterRegistry>,
        cache: Arc<AvailabilityCache>,
    ) -> Self {
        let defaults = RuntimeConfig::default();
        Self {
            catalog,
            registry,
            cache,
            probe_timeout: defaults.probe_timeout,
            default_timeout: defaults.provider_timeout,
        }
    }

    /// Build a client from configuration, sharing an existing cache.
    pub fn from_config(
        config: &RuntimeConfig,
        registry: Arc<AdapterRegistry>,
        cache: Arc<AvailabilityCache>,
    ) -> Self {
        Self::new(Arc::new(config.build_catalog()), registry, cache)
            .with_probe_timeout(config.probe_timeout)
            .with_default_timeout(config.provider_timeout)
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Timeout for entries that do not set their own.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn catalog(&self) -> &ProviderCatalog {
        &self.catalog
    }

    pub fn cache(&self) -> &AvailabilityCache {
        &self.cache
    }

    /// Send a request to the first backend able to answer it.
    pub async fn dispatch(&self, request: &TaskRequest) -> Result<NormalizedResponse, DispatchError> {
        let task = request.task_type();
        let candidates = self.catalog.for_task(task);
        if candidates.is_empty() {
            return Err(DispatchError::EmptyCatalog(task));
        }

        let mut poisoned: BTreeSet<BackendFamily> = BTreeSet::new();
        let mut attempts = Vec::with_capacity(candidates.len());

        for config in candidates {
            if poisoned.contains(&config.family) {
                tracing::debug!(task = %task, provider = %config.label(), "Skipping poisoned family");
                attempts.push(AttemptRecord::new(config, AttemptOutcome::SkippedPoisoned));
                continue;
            }

            if !config.has_credential() {
                tracing::debug!(task = %task, provider = %config.label(), "Skipping provider without credential");
                attempts.push(AttemptRecord::new(config, AttemptOutcome::NoCredential));
                continue;
            }

            let Some(adapter) = self.registry.get(config.family) else {
                let error = ProviderError::NotImplemented(format!(
                    "no adapter compiled in for {}",
                    config.family
                ));
                tracing::warn!(task = %task, provider = %config.label(), error = %error, "Provider unavailable in this build");
                attempts.push(AttemptRecord::failed(config, error.class(), error.to_string()));
                continue;
            };

            if config.family.is_local() && !self.is_available(config.family, adapter.as_ref()).await {
                tracing::debug!(task = %task, provider = %config.label(), "Local backend unavailable");
                attempts.push(AttemptRecord::new(config, AttemptOutcome::Unavailable));
                continue;
            }

            match self.call(adapter.as_ref(), config, request).await {
                Ok(mut response) => {
                    response.estimated_cost = config.cost_model.estimate(&response.usage);
                    tracing::info!(
                        task = %task,
                        provider = %config.label(),
                        tokens = response.usage.total(),
                        skipped = attempts.len(),
                        "Dispatch succeeded"
                    );
                    return Ok(response);
                }
                Err(error) => {
                    let class = error.class();
                    tracing::warn!(
                        task = %task,
                        provider = %config.label(),
                        class = %class,
                        error = %error,
                        "Provider call failed"
                    );

                    // Only the probe decides availability; siblings in the
                    // same family are still tried.
                    if class.poisons_family() {
                        poisoned.insert(config.family);
                    }
                    attempts.push(AttemptRecord::failed(config, class, error.to_string()));
                }
            }
        }

        let failure = DispatchFailure {
            task_type: task,
            attempts,
            poisoned: poisoned.into_iter().collect(),
        };
        tracing::error!(task = %task, failure = %failure, "All providers exhausted");
        Err(DispatchError::AllProvidersExhausted(failure))
    }

    async fn call(
        &self,
        adapter: &dyn BackendAdapter,
        config: &ProviderConfig,
        request: &TaskRequest,
    ) -> Result<NormalizedResponse, ProviderError> {
        let timeout = config.timeout.unwrap_or(self.default_timeout);
        tracing::debug!(provider = %config.label(), timeout = ?timeout, "Calling provider");

        match tokio::time::timeout(timeout, adapter.complete(config, request)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(timeout)),
        }
    }

    /// Cached availability, probing when the entry is missing or stale.
    async fn is_available(&self, family: BackendFamily, adapter: &dyn BackendAdapter) -> bool {
        if let Some(available) = self.cache.get(family) {
            return available;
        }

        let available = tokio::time::timeout(self.probe_timeout, adapter.probe(self.probe_timeout))
            .await
            .unwrap_or_else(|_| {
                tracing::debug!(family = %family, timeout = ?self.probe_timeout, "Probe timed out");
                false
            });
        self.cache.record(family, available);
        available
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use crate::catalog::CostModel;
    use crate::providers::{ApiCredential, CredentialSource, StopReason, TokenUsage};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use proptest::prelude::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Behavior {
        Succeed,
        AuthFail,
        CreditFail,
        RateLimited,
        Transport,
        Malformed,
        Hang,
    }

    impl Behavior {
        fn poisons(&self) -> bool {
            matches!(self, Behavior::AuthFail | Behavior::CreditFail)
        }
    }

    #[derive(Debug, Clone, Copy)]
    enum Probe {
        Up,
        Down,
        Hang,
    }

    type CallLog = Arc<Mutex<Vec<(BackendFamily, String)>>>;

    struct MockAdapter {
        family: BackendFamily,
        behaviors: HashMap<String, Behavior>,
        probe: Probe,
        probes: AtomicU32,
        log: CallLog,
    }

    impl MockAdapter {
        fn new(family: BackendFamily, log: &CallLog) -> Self {
            Self {
                family,
                behaviors: HashMap::new(),
                probe: Probe::Up,
                probes: AtomicU32::new(0),
                log: Arc::clone(log),
            }
        }

        fn on(mut self, model: &str, behavior: Behavior) -> Self {
            self.behaviors.insert(model.to_string(), behavior);
            self
        }

        fn probing(mut self, probe: Probe) -> Self {
            self.probe = probe;
            self
        }
    }

    #[async_trait]
    impl BackendAdapter for MockAdapter {
        fn family(&self) -> BackendFamily {
            self.family
        }

        async fn complete(
            &self,
            config: &ProviderConfig,
            _request: &TaskRequest,
        ) -> Result<NormalizedResponse, ProviderError> {
            self.log.lock().push((self.family, config.model_id.clone()));
            let behavior = self
                .behaviors
                .get(&config.model_id)
                .copied()
                .unwrap_or(Behavior::Succeed);

            match behavior {
                Behavior::Succeed => Ok(NormalizedResponse {
                    text: format!("{{\"served\":\"{}\"}}", config.model_id),
                    usage: TokenUsage::new(1000, 500),
                    stop_reason: StopReason::Complete,
                    backend_family: self.family,
                    model_id: config.model_id.clone(),
                    estimated_cost: None,
                }),
                Behavior::AuthFail => Err(ProviderError::from_status(401, "invalid api key", None)),
                Behavior::CreditFail => Err(ProviderError::from_status(
                    400,
                    "Your credit balance is too low",
                    None,
                )),
                Behavior::RateLimited => Err(ProviderError::from_status(429, "slow down", None)),
                Behavior::Transport => Err(ProviderError::HttpError("connection refused".into())),
                Behavior::Malformed => Err(ProviderError::EmptyResponse),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(ProviderError::HttpError("unreachable".into()))
                }
            }
        }

        async fn probe(&self, _timeout: Duration) -> bool {
            self.probes.fetch_add(1, Ordering::SeqCst);
            match self.probe {
                Probe::Up => true,
                Probe::Down => false,
                Probe::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    true
                }
            }
        }
    }

    fn entry(family: BackendFamily, model: &str, priority: u32) -> ProviderConfig {
        if !family.requires_credential() {
            return ProviderConfig::new(family, model, CostModel::Free, priority);
        }
        ProviderConfig::new(family, model, CostModel::per_token(3.0, 15.0), priority).with_credential(
            Arc::new(ApiCredential::new(
                "test-key",
                CredentialSource::Programmatic,
                family.credential_name(),
            )),
        )
    }

    fn catalog(entries: Vec<ProviderConfig>) -> Arc<ProviderCatalog> {
        let mut catalog = ProviderCatalog::new();
        for config in entries {
            catalog.insert(TaskType::PremiumPay, config);
        }
        Arc::new(catalog)
    }

    fn request() -> TaskRequest {
        TaskRequest::new(TaskType::PremiumPay, "system", "user", 0.1, 1000).unwrap()
    }

    fn client(
        catalog: Arc<ProviderCatalog>,
        adapters: Vec<Arc<MockAdapter>>,
    ) -> (DispatchClient, Arc<ManualClock>) {
        let mut registry = AdapterRegistry::new();
        for adapter in adapters {
            registry.register(adapter);
        }
        let clock = Arc::new(ManualClock::new());
        let cache = Arc::new(AvailabilityCache::with_clock(Duration::from_secs(60), clock.clone()));
        let client = DispatchClient::new(catalog, Arc::new(registry), cache)
            .with_probe_timeout(Duration::from_secs(2))
            .with_default_timeout(Duration::from_secs(30));
        (client, clock)
    }

    fn new_log() -> CallLog {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_timeout_then_poison_then_premium_succeeds() {
        let log = new_log();
        let ollama = Arc::new(MockAdapter::new(BackendFamily::Ollama, &log).probing(Probe::Hang));
        let groq = Arc::new(MockAdapter::new(BackendFamily::Groq, &log).on("mid-a", Behavior::AuthFail));
        let anthropic = Arc::new(MockAdapter::new(BackendFamily::Anthropic, &log));

        let catalog = catalog(vec![
            entry(BackendFamily::Ollama, "local", 0),
            entry(BackendFamily::Groq, "mid-a", 10),
            entry(BackendFamily::Groq, "mid-b", 15),
            entry(BackendFamily::Anthropic, "premium", 40),
        ]);
        let (client, _) = client(catalog, vec![ollama.clone(), groq, anthropic]);

        let response = client.dispatch(&request()).await.unwrap();
        assert_eq!(response.served_by(), "anthropic/premium");

        // 1000 * $3/MTok + 500 * $15/MTok
        let cost = response.estimated_cost.unwrap();
        assert!((cost - 0.0105).abs() < 1e-12);

        let calls = log.lock().clone();
        assert_eq!(
            calls,
            vec![
                (BackendFamily::Groq, "mid-a".to_string()),
                (BackendFamily::Anthropic, "premium".to_string()),
            ]
        );
        assert_eq!(ollama.probes.load(Ordering::SeqCst), 1);
        assert_eq!(client.cache().get(BackendFamily::Ollama), Some(false));
    }

    #[tokio::test(start_paused = true)]
    async fn test_everything_failing_exhausts_with_ledger() {
        let log = new_log();
        let ollama = Arc::new(MockAdapter::new(BackendFamily::Ollama, &log).probing(Probe::Down));
        let groq = Arc::new(MockAdapter::new(BackendFamily::Groq, &log).on("mid", Behavior::RateLimited));
        let anthropic =
            Arc::new(MockAdapter::new(BackendFamily::Anthropic, &log).on("premium", Behavior::CreditFail));

        let keyless = ProviderConfig::new(BackendFamily::OpenAi, "gpt", CostModel::Free, 20);
        let catalog = catalog(vec![
            entry(BackendFamily::Ollama, "local", 0),
            entry(BackendFamily::Groq, "mid", 10),
            keyless,
            entry(BackendFamily::Anthropic, "premium", 30),
            entry(BackendFamily::Anthropic, "premium-backup", 40),
        ]);
        let (client, _) = client(catalog, vec![ollama, groq, anthropic]);

        let error = client.dispatch(&request()).await.unwrap_err();
        let DispatchError::AllProvidersExhausted(failure) = error else {
            panic!("expected exhaustion, got {:?}", error);
        };

        let outcomes: Vec<AttemptOutcome> = failure.attempts.iter().map(|a| a.outcome).collect();
        assert_eq!(
            outcomes,
            vec![
                AttemptOutcome::Unavailable,
                AttemptOutcome::Failed(ErrorClass::RateLimited),
                AttemptOutcome::NoCredential,
                AttemptOutcome::Failed(ErrorClass::CreditExhausted),
                AttemptOutcome::SkippedPoisoned,
            ]
        );
        assert_eq!(failure.poisoned, vec![BackendFamily::Anthropic]);
        assert_eq!(
            failure.attempted().collect::<Vec<_>>(),
            vec![(BackendFamily::Groq, "mid"), (BackendFamily::Anthropic, "premium")]
        );
        assert!(failure.is_credential_problem());
        assert!(failure.remediation().contains("anthropic"));
        assert_eq!(log.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_outage_remediation_differs_from_credentials() {
        let log = new_log();
        let groq = Arc::new(MockAdapter::new(BackendFamily::Groq, &log).on("mid", Behavior::Transport));
        let catalog = catalog(vec![entry(BackendFamily::Groq, "mid", 10)]);
        let (client, _) = client(catalog, vec![groq]);

        let error = client.dispatch(&request()).await.unwrap_err();
        let DispatchError::AllProvidersExhausted(failure) = &error else {
            panic!("expected exhaustion");
        };
        assert!(!failure.is_credential_problem());
        assert!(error.remediation().contains("try again later"));
    }

    #[tokio::test]
    async fn test_only_missing_credentials_suggests_env_vars() {
        let catalog = catalog(vec![
            ProviderConfig::new(BackendFamily::OpenAi, "gpt", CostModel::Free, 0),
            ProviderConfig::new(BackendFamily::Anthropic, "claude", CostModel::Free, 1),
        ]);
        let (client, _) = client(catalog, vec![]);

        let error = client.dispatch(&request()).await.unwrap_err();
        let remediation = error.remediation();
        assert!(remediation.contains("ANTHROPIC_API_KEY"));
        assert!(remediation.contains("OPENAI_API_KEY"));
    }

    #[tokio::test]
    async fn test_empty_catalog() {
        let (client, _) = client(Arc::new(ProviderCatalog::new()), vec![]);
        assert_eq!(
            client.dispatch(&request()).await,
            Err(DispatchError::EmptyCatalog(TaskType::PremiumPay))
        );
    }

    #[tokio::test]
    async fn test_missing_adapter_is_not_implemented() {
        let log = new_log();
        let anthropic = Arc::new(MockAdapter::new(BackendFamily::Anthropic, &log));
        let catalog = catalog(vec![
            entry(BackendFamily::Groq, "mid", 10),
            entry(BackendFamily::Anthropic, "premium", 20),
        ]);
        let (client, _) = client(catalog, vec![anthropic]);

        let response = client.dispatch(&request()).await.unwrap();
        assert_eq!(response.backend_family, BackendFamily::Anthropic);
    }

    #[tokio::test]
    async fn test_malformed_output_moves_to_sibling_not_same_entry() {
        let log = new_log();
        let groq = Arc::new(
            MockAdapter::new(BackendFamily::Groq, &log)
                .on("mid-a", Behavior::Malformed)
                .on("mid-b", Behavior::Succeed),
        );
        let catalog = catalog(vec![
            entry(BackendFamily::Groq, "mid-a", 10),
            entry(BackendFamily::Groq, "mid-b", 20),
        ]);
        let (client, _) = client(catalog, vec![groq]);

        let response = client.dispatch(&request()).await.unwrap();
        assert_eq!(response.model_id, "mid-b");
        assert_eq!(log.lock().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_provider_times_out_as_transport_failure() {
        let log = new_log();
        let anthropic = Arc::new(MockAdapter::new(BackendFamily::Anthropic, &log).on("slow", Behavior::Hang));
        let openai = Arc::new(MockAdapter::new(BackendFamily::OpenAi, &log));

        let catalog = catalog(vec![
            entry(BackendFamily::Anthropic, "slow", 0).with_timeout(Duration::from_secs(5)),
            entry(BackendFamily::OpenAi, "fast", 10),
        ]);
        let (client, _) = client(catalog, vec![anthropic, openai]);

        let started = tokio::time::Instant::now();
        let response = client.dispatch(&request()).await.unwrap();
        assert_eq!(response.model_id, "fast");
        assert!(started.elapsed() >= Duration::from_secs(5));
        assert!(started.elapsed() < Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_same_catalog_picks_same_provider_and_reuses_probe() {
        let log = new_log();
        let ollama = Arc::new(MockAdapter::new(BackendFamily::Ollama, &log));
        let groq = Arc::new(MockAdapter::new(BackendFamily::Groq, &log));
        let catalog = catalog(vec![
            entry(BackendFamily::Ollama, "local", 0),
            entry(BackendFamily::Groq, "mid", 10),
        ]);
        let (client, clock) = client(catalog, vec![ollama.clone(), groq]);

        let first = client.dispatch(&request()).await.unwrap();
        let second = client.dispatch(&request()).await.unwrap();
        assert_eq!(first.served_by(), "ollama/local");
        assert_eq!(first.served_by(), second.served_by());
        assert_eq!(first.estimated_cost, Some(0.0));
        assert_eq!(ollama.probes.load(Ordering::SeqCst), 1);

        clock.advance(Duration::from_secs(60));
        client.dispatch(&request()).await.unwrap();
        assert_eq!(ollama.probes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_local_transport_failure_still_tries_sibling_model() {
        let log = new_log();
        let ollama = Arc::new(
            MockAdapter::new(BackendFamily::Ollama, &log).on("missing-model", Behavior::Transport),
        );
        let catalog = catalog(vec![
            entry(BackendFamily::Ollama, "missing-model", 0),
            entry(BackendFamily::Ollama, "qwen", 1),
        ]);
        let (client, _) = client(catalog, vec![ollama.clone()]);

        let response = client.dispatch(&request()).await.unwrap();
        assert_eq!(response.served_by(), "ollama/qwen");
        assert_eq!(client.cache().get(BackendFamily::Ollama), Some(true));

        // The backend stays available for the next call.
        let response = client.dispatch(&request()).await.unwrap();
        assert_eq!(response.served_by(), "ollama/qwen");
        assert_eq!(ollama.probes.load(Ordering::SeqCst), 1);
        assert_eq!(
            log.lock().clone(),
            vec![
                (BackendFamily::Ollama, "missing-model".to_string()),
                (BackendFamily::Ollama, "qwen".to_string()),
                (BackendFamily::Ollama, "missing-model".to_string()),
                (BackendFamily::Ollama, "qwen".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_poisoning_does_not_outlive_the_call() {
        let log = new_log();
        let groq = Arc::new(MockAdapter::new(BackendFamily::Groq, &log).on("mid", Behavior::AuthFail));
        let catalog = catalog(vec![entry(BackendFamily::Groq, "mid", 10)]);
        let (client, _) = client(catalog, vec![groq]);

        assert!(client.dispatch(&request()).await.is_err());
        assert!(client.dispatch(&request()).await.is_err());
        assert_eq!(log.lock().len(), 2);
    }

    const FAMILIES: [BackendFamily; 3] =
        [BackendFamily::OpenAi, BackendFamily::Groq, BackendFamily::Anthropic];
    const BEHAVIORS: [Behavior; 5] = [
        Behavior::Succeed,
        Behavior::AuthFail,
        Behavior::CreditFail,
        Behavior::RateLimited,
        Behavior::Transport,
    ];

    proptest! {
        #[test]
        fn prop_poisoned_families_are_never_called_again(
            plan in prop::collection::vec((0usize..3, 0usize..5), 1..10)
        ) {
            let log = new_log();
            let mut adapters: HashMap<BackendFamily, MockAdapter> = FAMILIES
                .iter()
                .map(|f| (*f, MockAdapter::new(*f, &log)))
                .collect();
            let mut entries = Vec::new();
            for (i, (family_idx, behavior_idx)) in plan.iter().enumerate() {
                let family = FAMILIES[*family_idx];
                let model = format!("m{}", i);
                if let Some(adapter) = adapters.remove(&family) {
                    adapters.insert(family, adapter.on(&model, BEHAVIORS[*behavior_idx]));
                }
                entries.push(entry(family, &model, i as u32));
            }

            // Reference walk of the ladder.
            let mut poisoned = BTreeSet::new();
            let mut expected_calls = Vec::new();
            let mut expected_winner = None;
            for (i, (family_idx, behavior_idx)) in plan.iter().enumerate() {
                let family = FAMILIES[*family_idx];
                if poisoned.contains(&family) {
                    continue;
                }
                let behavior = BEHAVIORS[*behavior_idx];
                expected_calls.push((family, format!("m{}", i)));
                if behavior == Behavior::Succeed {
                    expected_winner = Some(format!("m{}", i));
                    break;
                }
                if behavior.poisons() {
                    poisoned.insert(family);
                }
            }

            let (client, _) = client(
                catalog(entries),
                adapters.into_values().map(Arc::new).collect(),
            );
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .unwrap();
            let result = runtime.block_on(client.dispatch(&request()));

            prop_assert_eq!(log.lock().clone(), expected_calls);
            match expected_winner {
                Some(model) => prop_assert_eq!(result.unwrap().model_id, model),
                None => {
                    let is_exhausted = matches!(result, Err(DispatchError::AllProvidersExhausted(_)));
                    prop_assert!(is_exhausted);
                }
            }
        }
    }
}
