//! Expected response shapes for each analysis task.
//!
//! A model answers with one of these shapes; [`Assessment::into_outcome`]
//! maps it onto the common task-result fields. The mapping is deterministic:
//! the same decoded assessment and facts always yield the same status.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::decode::{check_non_negative, check_unit_interval, DecodeError, Validate};
use crate::evidence::{Issue, Reference, Severity};
use crate::facts::DomainFacts;
use crate::types::{RiskLevel, TaskPayload, TaskResult, TaskStatus, TaskType};

/// Amount differences at or below this are treated as rounding.
pub const AMOUNT_TOLERANCE: f64 = 0.01;

/// An issue as reported by a model, before attribution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportedIssue {
    pub severity: Severity,
    pub title: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub suggested_action: String,
}

impl ReportedIssue {
    fn attribute(self, task: TaskType) -> Issue {
        Issue::new(task, self.severity, self.title, self.description, self.suggested_action)
    }
}

/// A rule citation as reported by a model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CitedRule {
    pub section: String,

    #[serde(default)]
    pub title: Option<String>,

    pub excerpt: String,
}

impl From<CitedRule> for Reference {
    fn from(cited: CitedRule) -> Self {
        Reference {
            section: cited.section,
            title: cited.title,
            excerpt: cited.excerpt,
            relevance: None,
        }
    }
}

/// Task fields derived from a decoded assessment, before usage stamping.
#[derive(Debug, Clone, PartialEq)]
pub struct AssessmentOutcome {
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub confidence: f64,
    pub summary: String,
    pub details: Vec<String>,
    pub reasoning: String,
    pub payload: TaskPayload,
}

impl AssessmentOutcome {
    /// Stamp usage and timing to produce the final task result.
    pub fn into_result(
        self,
        tokens_used: u32,
        duration_seconds: f64,
        served_by: Option<String>,
    ) -> TaskResult {
        TaskResult {
            task_type: self.task_type,
            status: self.status,
            confidence: Some(self.confidence),
            summary: self.summary,
            details: self.details,
            reasoning: self.reasoning,
            payload: self.payload,
            tokens_used,
            duration_seconds,
            served_by,
        }
    }
}

/// A decoded model answer for one task.
pub trait Assessment: DeserializeOwned + Validate + Send {
    /// The task this shape answers.
    const TASK: TaskType;

    /// Map the decoded answer onto task-result fields.
    fn into_outcome(self, facts: &DomainFacts) -> AssessmentOutcome;
}

fn status_for(passed: bool, issues: &[Issue]) -> TaskStatus {
    if passed && !issues.iter().any(Issue::is_high) {
        TaskStatus::Completed
    } else {
        TaskStatus::Flagged
    }
}

fn validate_issues(issues: &[ReportedIssue]) -> Result<(), DecodeError> {
    for (index, issue) in issues.iter().enumerate() {
        if issue.title.trim().is_empty() {
            return Err(DecodeError::invalid(
                format!("issues[{}].title", index),
                "title is empty",
            ));
        }
    }
    Ok(())
}

/// Flight-time plausibility answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlightTimeAssessment {
    /// Whether the reported time is plausible
    pub valid: bool,
    pub confidence: f64,
    pub summary: String,

    #[serde(default)]
    pub reasoning: String,

    #[serde(default)]
    pub reported_hours: Option<f64>,

    #[serde(default)]
    pub verified_hours: Option<f64>,

    #[serde(default)]
    pub discrepancies: Vec<String>,

    #[serde(default)]
    pub issues: Vec<ReportedIssue>,
}

impl Validate for FlightTimeAssessment {
    fn validate(&self) -> Result<(), DecodeError> {
        check_unit_interval("confidence", self.confidence)?;
        if let Some(hours) = self.reported_hours {
            check_non_negative("reported_hours", hours)?;
        }
        if let Some(hours) = self.verified_hours {
            check_non_negative("verified_hours", hours)?;
        }
        validate_issues(&self.issues)
    }
}

impl Assessment for FlightTimeAssessment {
    const TASK: TaskType = TaskType::FlightTime;

    fn into_outcome(self, facts: &DomainFacts) -> AssessmentOutcome {
        let issues: Vec<Issue> = self.issues.into_iter().map(|i| i.attribute(Self::TASK)).collect();
        let reported_hours = self.reported_hours.or(facts.claim.hours_claimed);

        AssessmentOutcome {
            task_type: Self::TASK,
            status: status_for(self.valid, &issues),
            confidence: self.confidence,
            summary: self.summary,
            details: self.discrepancies,
            reasoning: self.reasoning,
            payload: TaskPayload::FlightTime {
                reported_hours,
                verified_hours: self.verified_hours,
                issues,
            },
        }
    }
}

/// Premium-pay amount answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PremiumPayAssessment {
    /// Whether the claimed amount matches the calculated one
    pub amount_correct: bool,
    pub calculated_amount: f64,
    pub confidence: f64,
    pub summary: String,

    #[serde(default)]
    pub reasoning: String,

    /// Calculation steps, in order
    #[serde(default)]
    pub breakdown: Vec<String>,

    #[serde(default)]
    pub citations: Vec<CitedRule>,

    #[serde(default)]
    pub issues: Vec<ReportedIssue>,
}

impl Validate for PremiumPayAssessment {
    fn validate(&self) -> Result<(), DecodeError> {
        check_unit_interval("confidence", self.confidence)?;
        check_non_negative("calculated_amount", self.calculated_amount)?;
        for (index, citation) in self.citations.iter().enumerate() {
            if citation.section.trim().is_empty() {
                return Err(DecodeError::invalid(
                    format!("citations[{}].section", index),
                    "section is empty",
                ));
            }
        }
        validate_issues(&self.issues)
    }
}

impl Assessment for PremiumPayAssessment {
    const TASK: TaskType = TaskType::PremiumPay;

    fn into_outcome(self, facts: &DomainFacts) -> AssessmentOutcome {
        let issues: Vec<Issue> = self.issues.into_iter().map(|i| i.attribute(Self::TASK)).collect();
        let claimed_amount = facts.claim.amount;
        let difference = claimed_amount - self.calculated_amount;
        let amounts_agree = difference.abs() <= AMOUNT_TOLERANCE;

        let mut details = self.breakdown;
        if self.amount_correct && !amounts_agree {
            details.push(format!(
                "Reviewer marked the amount correct but calculated {:.2} against {:.2} claimed",
                self.calculated_amount, claimed_amount
            ));
        }

        AssessmentOutcome {
            task_type: Self::TASK,
            status: status_for(self.amount_correct && amounts_agree, &issues),
            confidence: self.confidence,
            summary: self.summary,
            details,
            reasoning: self.reasoning,
            payload: TaskPayload::PremiumPay {
                claimed_amount,
                calculated_amount: self.calculated_amount,
                difference,
                citations: self.citations.into_iter().map(Reference::from).collect(),
                issues,
            },
        }
    }
}

/// Compliance and fraud screening answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComplianceAssessment {
    pub compliant: bool,
    pub fraud_risk: RiskLevel,
    pub confidence: f64,
    pub summary: String,

    #[serde(default)]
    pub reasoning: String,

    /// Red flags noticed, in order
    #[serde(default)]
    pub flags: Vec<String>,

    #[serde(default)]
    pub issues: Vec<ReportedIssue>,
}

impl Validate for ComplianceAssessment {
    fn validate(&self) -> Result<(), DecodeError> {
        check_unit_interval("confidence", self.confidence)?;
        validate_issues(&self.issues)
    }
}

impl Assessment for ComplianceAssessment {
    const TASK: TaskType = TaskType::Compliance;

    fn into_outcome(self, _facts: &DomainFacts) -> AssessmentOutcome {
        let issues: Vec<Issue> = self.issues.into_iter().map(|i| i.attribute(Self::TASK)).collect();
        let passed = self.compliant && self.fraud_risk != RiskLevel::High;

        AssessmentOutcome {
            task_type: Self::TASK,
            status: status_for(passed, &issues),
            confidence: self.confidence,
            summary: self.summary,
            details: self.flags,
            reasoning: self.reasoning,
            payload: TaskPayload::Compliance {
                fraud_risk: self.fraud_risk,
                issues,
            },
        }
    }
}
