//! Runtime orchestrator for a claim validation run.
//!
//! The orchestrator:
//! - Rejects malformed facts before any agent runs
//! - Gathers rule context from the knowledge base (best effort)
//! - Runs every task agent, sequentially or concurrently
//! - Decides the verdict through the deterministic Synthesizer
//! - Notifies the record store without waiting for it

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use thiserror::Error;
use tokio::time::Instant;

use claimwise_core::{DomainFacts, FactsError, Synthesizer, TaskResult, TaskType, Verdict};

use crate::agents::{default_agents, AgentContext, TaskAgent};
use crate::cache::AvailabilityCache;
use crate::config::{ExecutionMode, RuntimeConfig};
use crate::dispatch::DispatchClient;
use crate::knowledge::{gather_rule_context, KnowledgeBase, StaticKnowledge};
use crate::persistence::{notify, NoopSink, VerdictRecord, VerdictSink};
use crate::providers::AdapterRegistry;
use crate::resilience::{LlmUsage, RetryPolicy};

/// Errors from the runtime orchestrator.
///
/// Only inbound problems surface here; every failure after validation
/// becomes part of the verdict.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Invalid input: {0}")]
    InvalidInput(#[from] FactsError),
}

/// Result from a validation run.
#[derive(Debug)]
pub struct RuntimeResult {
    /// The decided verdict
    pub verdict: Verdict,

    /// LLM usage across all agents of the run
    pub llm_usage: LlmUsage,

    /// Tasks whose dispatch found no provider able to answer
    pub exhausted_dispatches: u32,

    /// Whether the run took longer than its advisory budget
    pub exceeded_run_budget: bool,
}

/// Runs the task agents for a claim and decides the verdict.
///
/// # Architecture
/// - Fan-out: one agent per task, in task order
/// - Fan-in: the Synthesizer applies the decision rules
/// - Fail closed: an agent that cannot finish yields an error result, which
///   rejects the claim
pub struct RuntimeOrchestrator {
    /// Agents in execution order
    agents: Vec<Arc<dyn TaskAgent>>,

    knowledge: Arc<dyn KnowledgeBase>,

    sink: Arc<dyn VerdictSink>,

    synthesizer: Synthesizer,

    execution_mode: ExecutionMode,

    /// Bound on each knowledge-base lookup
    knowledge_timeout: Duration,

    /// Advisory; exceeding it is logged and reported
    run_timeout: Duration,

    persistence_retry: RetryPolicy,
}

impl RuntimeOrchestrator {
    /// Create an orchestrator with the default agents on a dispatch client.
    pub fn new(dispatch: Arc<DispatchClient>, config: &RuntimeConfig) -> Self {
        Self {
            agents: default_agents(dispatch, &config.agents),
            knowledge: Arc::new(StaticKnowledge),
            sink: Arc::new(NoopSink),
            synthesizer: Synthesizer::new(),
            execution_mode: config.execution_mode,
            knowledge_timeout: config.knowledge_timeout,
            run_timeout: config.run_timeout,
            persistence_retry: config.persistence_retry.clone(),
        }
    }

    /// Create an orchestrator with the adapters compiled into this build.
    pub fn from_config(config: &RuntimeConfig) -> Self {
        let registry = Arc::new(AdapterRegistry::with_defaults(&config.endpoints));
        let cache = Arc::new(AvailabilityCache::new(config.availability_ttl));
        let dispatch = DispatchClient::from_config(config, registry, cache);
        Self::new(Arc::new(dispatch), config)
    }

    /// Replace the agents.
    ///
    /// Agents are sorted by task type, so they run (and their results
    /// appear in the verdict) in task order whatever order they are given in.
    pub fn with_agents(mut self, mut agents: Vec<Arc<dyn TaskAgent>>) -> Self {
        agents.sort_by_key(|a| a.task_type());
        self.agents = agents;
        self
    }

    pub fn with_knowledge(mut self, knowledge: Arc<dyn KnowledgeBase>) -> Self {
        self.knowledge = knowledge;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn VerdictSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_execution_mode(mut self, mode: ExecutionMode) -> Self {
        self.execution_mode = mode;
        self
    }

    /// Tasks this orchestrator runs, in order.
    pub fn tasks(&self) -> Vec<TaskType> {
        self.agents.iter().map(|a| a.task_type()).collect()
    }

    /// Validate a claim end to end.
    ///
    /// # Execution Flow
    /// 1. Check the facts bundle (the only step that can return an error)
    /// 2. Compute screening signals and gather rule context
    /// 3. Run every agent
    /// 4. Decide the verdict
    /// 5. Notify the record store in the background
    pub async fn submit_validation(&self, facts: &DomainFacts) -> Result<RuntimeResult, RuntimeError> {
        facts.validate()?;

        let started = Instant::now();
        let subject_id = facts.subject_id();
        tracing::info!(subject = %subject_id, mode = %self.execution_mode, "Validation started");

        let rules = gather_rule_context(
            self.knowledge.as_ref(),
            &facts.claim.claim_type,
            self.knowledge_timeout,
        )
        .await;
        let context = AgentContext::new(facts, rules);

        let task_results = self.run_agents(facts, &context).await;
        let verdict = self.synthesizer.decide(subject_id, task_results);

        let elapsed = started.elapsed();
        let exceeded_run_budget = elapsed > self.run_timeout;
        if exceeded_run_budget {
            tracing::warn!(
                subject = %subject_id,
                elapsed = ?elapsed,
                budget = ?self.run_timeout,
                "Validation exceeded its time budget"
            );
        }

        tracing::info!(
            subject = %subject_id,
            status = %verdict.overall_status,
            confidence = verdict.confidence,
            issues = verdict.issues.len(),
            "Verdict decided"
        );

        let _ = notify(
            Arc::clone(&self.sink),
            VerdictRecord::from_verdict(&verdict),
            self.persistence_retry.clone(),
        );

        Ok(RuntimeResult {
            verdict,
            llm_usage: context.usage.total(),
            exhausted_dispatches: context.usage.exhausted_dispatches(),
            exceeded_run_budget,
        })
    }

    async fn run_agents(&self, facts: &DomainFacts, context: &AgentContext) -> Vec<TaskResult> {
        match self.execution_mode {
            ExecutionMode::Sequential => {
                let mut results = Vec::with_capacity(self.agents.len());
                for agent in &self.agents {
                    results.push(agent.run(facts, context).await);
                }
                results
            }
            // join_all yields results in input order.
            ExecutionMode::Concurrent => {
                join_all(self.agents.iter().map(|agent| agent.run(facts, context))).await
            }
        }
    }
}
