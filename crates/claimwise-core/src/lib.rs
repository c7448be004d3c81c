//! # claimwise-core
//!
//! Deterministic decision engine for payroll claim validation.
//!
//! This crate holds everything about a validation run that does not touch
//! the network:
//! - Facts bundles and their schema
//! - Task results, verdicts, and the evidence they carry
//! - Structured-output decoding of model answers
//! - Screening signals computed from the facts
//! - The final decision rules
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: Same task results always produce the same verdict
//! 2. **Fail closed**: Any task error rejects the claim
//! 3. **Honest decoding**: Malformed model output is an error, never a default
//!
//! ## Example
//!
//! ```rust,ignore
//! use claimwise_core::{Synthesizer, TaskResult, TaskType};
//!
//! let results = vec![
//!     TaskResult::error(TaskType::FlightTime, "provider outage", 0.4),
//! ];
//! let verdict = Synthesizer::new().decide("CLM-1001", results);
//! assert!(!verdict.is_approved());
//! ```

pub mod assessments;
pub mod decode;
pub mod evidence;
pub mod facts;
pub mod screening;
pub mod synthesizer;
pub mod types;

// Re-export main types at crate root
pub use assessments::{
    Assessment, AssessmentOutcome, ComplianceAssessment, CitedRule, FlightTimeAssessment,
    PremiumPayAssessment, ReportedIssue,
};
pub use decode::{decode, decode_validated, DecodeError, Validate};
pub use evidence::{Issue, Reference, Severity};
pub use facts::{Claim, Crew, DomainFacts, FactsError, HistoricalStats, Trip};
pub use screening::ScreeningSignals;
pub use synthesizer::Synthesizer;
pub use types::{
    OverallStatus, RiskLevel, TaskPayload, TaskResult, TaskStatus, TaskType, Verdict,
};

/// Decide a verdict from already-collected task results.
///
/// Results keep the order they are given in.
pub fn decide(subject_id: impl Into<String>, task_results: Vec<TaskResult>) -> Verdict {
    Synthesizer::new().decide(subject_id, task_results)
}
