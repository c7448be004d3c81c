//! Generic agent: dispatch an instruction, decode the answer shape.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use claimwise_core::{
    decode_validated, Assessment, ComplianceAssessment, DomainFacts, FlightTimeAssessment,
    PremiumPayAssessment, TaskResult, TaskType,
};
use tokio::time::Instant;

use super::traits::{AgentContext, AgentError, TaskAgent};
use crate::config::AgentSettings;
use crate::dispatch::DispatchClient;
use crate::prompts::{system_prompt, user_prompt};
use crate::providers::{NormalizedResponse, StopReason, TaskRequest};

/// Agent for any task whose answer decodes into an [`Assessment`].
pub struct AssessmentAgent<A> {
    dispatch: Arc<DispatchClient>,
    settings: AgentSettings,
    _shape: PhantomData<fn() -> A>,
}

pub type FlightTimeAgent = AssessmentAgent<FlightTimeAssessment>;
pub type PremiumPayAgent = AssessmentAgent<PremiumPayAssessment>;
pub type ComplianceAgent = AssessmentAgent<ComplianceAssessment>;

impl<A: Assessment> AssessmentAgent<A> {
    pub fn new(dispatch: Arc<DispatchClient>, settings: AgentSettings) -> Self {
        Self {
            dispatch,
            settings,
            _shape: PhantomData,
        }
    }

    fn request(&self, facts: &DomainFacts, context: &AgentContext) -> Result<TaskRequest, AgentError> {
        Ok(TaskRequest::new(
            A::TASK,
            system_prompt(A::TASK),
            user_prompt(A::TASK, facts, &context.signals, Some(&context.rules)),
            self.settings.temperature,
            self.settings.max_output_tokens,
        )?)
    }

    async fn call(
        &self,
        facts: &DomainFacts,
        context: &AgentContext,
    ) -> Result<NormalizedResponse, AgentError> {
        let request = self.request(facts, context)?;
        match self.dispatch.dispatch(&request).await {
            Ok(response) => {
                context.usage.record(A::TASK, &response);
                Ok(response)
            }
            Err(e) => {
                context.usage.record_exhausted();
                Err(e.into())
            }
        }
    }
}

#[async_trait]
impl<A: Assessment + 'static> TaskAgent for AssessmentAgent<A> {
    fn task_type(&self) -> TaskType {
        A::TASK
    }

    async fn run(&self, facts: &DomainFacts, context: &AgentContext) -> TaskResult {
        let started = Instant::now();

        let response = match self.call(facts, context).await {
            Ok(response) => response,
            Err(e) => {
                let elapsed = started.elapsed().as_secs_f64();
                tracing::warn!(task = %A::TASK, error = %e, "Task could not be dispatched");
                return TaskResult::error(A::TASK, e.to_string(), elapsed);
            }
        };

        if response.stop_reason == StopReason::Truncated {
            tracing::warn!(task = %A::TASK, provider = %response.served_by(), "Answer was truncated");
        }

        let result = match decode_validated::<A>(&response.text) {
            Ok(assessment) => assessment.into_outcome(facts).into_result(
                response.usage.total(),
                started.elapsed().as_secs_f64(),
                Some(response.served_by()),
            ),
            Err(e) => {
                let error = AgentError::from(e);
                tracing::warn!(
                    task = %A::TASK,
                    provider = %response.served_by(),
                    error = %error,
                    "Answer failed to decode"
                );
                let mut result =
                    TaskResult::error(A::TASK, error.to_string(), started.elapsed().as_secs_f64());
                result.tokens_used = response.usage.total();
                result.served_by = Some(response.served_by());
                result
            }
        };

        tracing::info!(
            task = %A::TASK,
            status = ?result.status,
            confidence = ?result.confidence,
            duration = result.duration_seconds,
            "Task finished"
        );
        result
    }
}
