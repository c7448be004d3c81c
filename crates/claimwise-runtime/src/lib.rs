//! # claimwise-runtime
//!
//! LLM-assisted claim review on top of `claimwise-core`.
//!
//! This crate routes each analysis task to a ranked list of inference
//! backends, decodes their answers, and hands the task results to the
//! deterministic decision engine in `claimwise-core`.
//!
//! ## Components
//!
//! - [`catalog`]: ranked providers per task, with cost models
//! - [`providers`]: one adapter per backend family behind [`BackendAdapter`]
//! - [`cache`]: TTL-bounded availability of local backends
//! - [`dispatch`]: first-success routing with call-scoped poisoning
//! - [`agents`]: one agent per task; failures become error results
//! - [`orchestrator`]: runs the agents and decides the verdict
//! - [`knowledge`] and [`persistence`]: outbound boundaries
//!
//! ## Important
//!
//! The verdict itself is never decided by a model. Agents only produce task
//! results; the Synthesizer in `claimwise-core` applies fixed rules.
//!
//! ## Example
//!
//! ```rust,ignore
//! use claimwise_runtime::{RuntimeConfig, RuntimeOrchestrator};
//! use claimwise_core::DomainFacts;
//!
//! let config = RuntimeConfig::from_file("claimwise.yaml")?.with_env_overrides()?;
//! let orchestrator = RuntimeOrchestrator::from_config(&config);
//!
//! let facts = DomainFacts::from_file("claim.yaml")?;
//! let result = orchestrator.submit_validation(&facts).await?;
//! println!("{}", result.verdict.overall_status);
//! ```

pub mod agents;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod dispatch;
pub mod knowledge;
pub mod orchestrator;
pub mod persistence;
pub mod prompts;
pub mod providers;
pub mod resilience;

#[cfg(test)]
mod testing;

pub use agents::{AgentContext, AgentError, TaskAgent};
pub use cache::{AvailabilityCache, Clock, ManualClock, SystemClock};
pub use catalog::{CostModel, ProviderCatalog, ProviderConfig};
pub use config::{ConfigError, ExecutionMode, RuntimeConfig};
pub use dispatch::{AttemptOutcome, AttemptRecord, DispatchClient, DispatchError, DispatchFailure};
pub use knowledge::{KnowledgeBase, KnowledgeError, RuleContext, StaticKnowledge};
pub use orchestrator::{RuntimeError, RuntimeOrchestrator, RuntimeResult};
pub use persistence::{MemorySink, NoopSink, PersistenceError, VerdictRecord, VerdictSink};
pub use providers::{
    AdapterRegistry, BackendAdapter, BackendFamily, ErrorClass, NormalizedResponse, ProviderError,
    TaskRequest,
};
pub use resilience::{LlmUsage, RetryPolicy, UsageLedger};
