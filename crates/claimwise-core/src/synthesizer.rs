//! Synthesizer: Aggregates task results into the final verdict.
//!
//! The synthesizer applies strict, non-configurable rules in precedence order:
//! 1. If ANY task result is an error → REJECTED (fail closed)
//! 2. Else if ANY task result is flagged, or mean confidence is below 0.7 → FLAGGED
//! 3. Else → APPROVED
//!
//! A technical failure in any analytical step is never eligible for approval.

use chrono::{DateTime, Utc};

use crate::evidence::{Issue, Reference};
use crate::types::{OverallStatus, TaskResult, Verdict};

/// Mean confidence below which a verdict is flagged.
///
/// The comparison allows a tolerance of [`THRESHOLD_EPSILON`]: a mean is
/// flagged only when it is below `0.7 - 1e-9`, so a mean that is 0.7 up to
/// float rounding (such as the mean of 0.9, 0.3 and 0.9) is not.
pub const CONFIDENCE_THRESHOLD: f64 = 0.7;

/// Tolerance applied below [`CONFIDENCE_THRESHOLD`].
pub const THRESHOLD_EPSILON: f64 = 1e-9;

/// Verdict confidence when no task result carries one.
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

/// The Synthesizer aggregates task results into a verdict.
#[derive(Debug, Default, Clone, Copy)]
pub struct Synthesizer;

impl Synthesizer {
    pub fn new() -> Self {
        Self
    }

    /// Decide the verdict for a subject, stamped with the current time.
    pub fn decide(&self, subject_id: impl Into<String>, task_results: Vec<TaskResult>) -> Verdict {
        self.decide_at(subject_id, task_results, Utc::now())
    }

    /// Decide the verdict with an explicit decision timestamp.
    pub fn decide_at(
        &self,
        subject_id: impl Into<String>,
        task_results: Vec<TaskResult>,
        decided_at: DateTime<Utc>,
    ) -> Verdict {
        let confidence = mean_confidence(&task_results);
        let overall_status = overall_status(&task_results, confidence);

        let processing_time_seconds = task_results.iter().map(|r| r.duration_seconds).sum();
        let issues = collect_issues(&task_results);
        let cited_references = collect_citations(&task_results);
        let subject_id = subject_id.into();

        tracing::debug!(
            subject = %subject_id,
            status = %overall_status,
            confidence,
            tasks = task_results.len(),
            "Verdict decided"
        );

        Verdict {
            subject_id,
            overall_status,
            confidence,
            processing_time_seconds,
            recommendation: overall_status.recommendation().to_string(),
            task_results,
            issues,
            cited_references,
            decided_at,
        }
    }
}

/// Apply the decision rules to a result set and its mean confidence.
pub fn overall_status(task_results: &[TaskResult], mean_confidence: f64) -> OverallStatus {
    // Rule 1: Any error -> REJECTED
    if task_results.iter().any(|r| r.status.is_error()) {
        return OverallStatus::Rejected;
    }

    // Rule 2: Any flag or weak confidence -> FLAGGED
    if task_results.iter().any(|r| r.status.is_flagged())
        || mean_confidence < CONFIDENCE_THRESHOLD - THRESHOLD_EPSILON
    {
        return OverallStatus::Flagged;
    }

    // Rule 3: Otherwise -> APPROVED
    OverallStatus::Approved
}

/// Arithmetic mean of the defined confidences, clamped to [0, 1].
///
/// Results without a confidence are left out rather than counted as zero.
pub fn mean_confidence(task_results: &[TaskResult]) -> f64 {
    let defined: Vec<f64> = task_results.iter().filter_map(|r| r.confidence).collect();
    if defined.is_empty() {
        return DEFAULT_CONFIDENCE;
    }

    let mean = defined.iter().sum::<f64>() / defined.len() as f64;
    mean.clamp(0.0, 1.0)
}

fn collect_issues(task_results: &[TaskResult]) -> Vec<Issue> {
    task_results
        .iter()
        .flat_map(|r| {
            r.issues()
                .iter()
                .cloned()
                .map(move |issue| issue.attributed_to(r.task_type))
        })
        .collect()
}

fn collect_citations(task_results: &[TaskResult]) -> Vec<Reference> {
    task_results
        .iter()
        .find(|r| r.task_type.is_citation_authority())
        .map(|r| r.payload.citations().to_vec())
        .unwrap_or_default()
}
