//! Task agent trait and common types.

use std::sync::Arc;

use async_trait::async_trait;
use claimwise_core::{DecodeError, DomainFacts, ScreeningSignals, TaskResult, TaskType};
use thiserror::Error;

use crate::dispatch::DispatchError;
use crate::knowledge::RuleContext;
use crate::providers::RequestError;
use crate::resilience::UsageLedger;

/// Errors inside a task agent. Never escape [`TaskAgent::run`].
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Could not build request: {0}")]
    InvalidRequest(#[from] RequestError),

    #[error("{}. {}", .0, .0.remediation())]
    Dispatch(#[from] DispatchError),

    #[error("Model answer could not be used: {0}")]
    Decode(#[from] DecodeError),
}

/// Per-run inputs shared by every agent.
#[derive(Debug, Clone)]
pub struct AgentContext {
    /// Computed once from the facts bundle
    pub signals: ScreeningSignals,

    /// Rule material for the claim category
    pub rules: RuleContext,

    /// Usage ledger for this run
    pub usage: Arc<UsageLedger>,
}

impl AgentContext {
    pub fn new(facts: &DomainFacts, rules: RuleContext) -> Self {
        Self {
            signals: ScreeningSignals::compute(facts),
            rules,
            usage: Arc::new(UsageLedger::new()),
        }
    }
}

/// An agent answering one analysis task.
///
/// # Contract
/// - `run` always returns a result; failures become `status = error`
///   with confidence 0 and a readable reasoning
/// - Agents share no mutable state except the run's usage ledger
#[async_trait]
pub trait TaskAgent: Send + Sync {
    /// The task this agent answers.
    fn task_type(&self) -> TaskType;

    /// Review the claim.
    async fn run(&self, facts: &DomainFacts, context: &AgentContext) -> TaskResult;
}
