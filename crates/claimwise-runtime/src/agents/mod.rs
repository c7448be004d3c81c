//! Task agents for LLM-assisted claim review.
//!
//! Each analysis task has an agent that turns the facts bundle into a
//! request, dispatches it, and decodes the answer into a task result.

mod assessment;
mod traits;

pub use assessment::{AssessmentAgent, ComplianceAgent, FlightTimeAgent, PremiumPayAgent};
pub use traits::{AgentContext, AgentError, TaskAgent};

use std::sync::Arc;

use crate::config::AgentSettings;
use crate::dispatch::DispatchClient;

/// One agent per task, in default execution order.
pub fn default_agents(
    dispatch: Arc<DispatchClient>,
    settings: &AgentSettings,
) -> Vec<Arc<dyn TaskAgent>> {
    vec![
        Arc::new(FlightTimeAgent::new(Arc::clone(&dispatch), settings.clone())),
        Arc::new(PremiumPayAgent::new(Arc::clone(&dispatch), settings.clone())),
        Arc::new(ComplianceAgent::new(dispatch, settings.clone())),
    ]
}
