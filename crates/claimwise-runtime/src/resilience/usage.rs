//! Usage and cost accounting for LLM calls.
//!
//! Every successful dispatch is recorded against the task that made it.
//! The ledger is per run; the orchestrator reports its totals next to the
//! verdict.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};

use claimwise_core::TaskType;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::providers::NormalizedResponse;

/// Accumulated LLM usage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmUsage {
    /// Total tokens used
    pub total_tokens: u32,

    pub input_tokens: u32,
    pub output_tokens: u32,

    /// Number of successful LLM calls
    pub llm_calls: u32,

    /// Estimated cost in USD over priced calls
    pub estimated_cost: f64,

    /// Calls whose cost could not be estimated
    pub unpriced_calls: u32,
}

impl LlmUsage {
    /// Add one successful response.
    pub fn add(&mut self, response: &NormalizedResponse) {
        self.input_tokens = self.input_tokens.saturating_add(response.usage.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(response.usage.output_tokens);
        self.total_tokens = self.total_tokens.saturating_add(response.usage.total());
        self.llm_calls += 1;

        match response.estimated_cost {
            Some(cost) => self.estimated_cost += cost,
            None => self.unpriced_calls += 1,
        }
    }

    /// Fold another usage record into this one.
    pub fn merge(&mut self, other: &LlmUsage) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
        self.total_tokens = self.total_tokens.saturating_add(other.total_tokens);
        self.llm_calls += other.llm_calls;
        self.estimated_cost += other.estimated_cost;
        self.unpriced_calls += other.unpriced_calls;
    }
}

/// Per-run usage ledger, safe to share between concurrently running agents.
#[derive(Debug, Default)]
pub struct UsageLedger {
    per_task: RwLock<BTreeMap<TaskType, LlmUsage>>,

    /// Dispatches that ended without any provider answering
    exhausted: AtomicU32,
}

impl UsageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful response for a task.
    pub fn record(&self, task: TaskType, response: &NormalizedResponse) {
        self.per_task.write().entry(task).or_default().add(response);
    }

    /// Record a dispatch that exhausted every provider.
    pub fn record_exhausted(&self) {
        self.exhausted.fetch_add(1, Ordering::SeqCst);
    }

    /// Usage for one task.
    pub fn usage_for(&self, task: TaskType) -> LlmUsage {
        self.per_task.read().get(&task).cloned().unwrap_or_default()
    }

    /// Usage across all tasks.
    pub fn total(&self) -> LlmUsage {
        let mut total = LlmUsage::default();
        for usage in self.per_task.read().values() {
            total.merge(usage);
        }
        total
    }

    /// Number of exhausted dispatches.
    pub fn exhausted_dispatches(&self) -> u32 {
        self.exhausted.load(Ordering::SeqCst)
    }

    /// Clear the ledger.
    pub fn reset(&self) {
        self.per_task.write().clear();
        self.exhausted.store(0, Ordering::SeqCst);
    }
}
