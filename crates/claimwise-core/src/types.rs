//! Core types shared by the decision engine and the runtime.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::evidence::{Issue, Reference};

/// The analysis tasks a claim is routed through.
///
/// The declaration order is the default execution order and the order in
/// which results appear in a verdict.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Is the reported flight time plausible against the trip record?
    FlightTime,

    /// Is the claimed premium-pay amount correct under the pay rules?
    PremiumPay,

    /// Does the claim show compliance or fraud concerns?
    Compliance,
}

impl TaskType {
    /// All tasks in default execution order.
    pub const ALL: [TaskType; 3] = [TaskType::FlightTime, TaskType::PremiumPay, TaskType::Compliance];

    /// Stable identifier used in configuration files and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::FlightTime => "flight_time",
            TaskType::PremiumPay => "premium_pay",
            TaskType::Compliance => "compliance",
        }
    }

    /// Human-readable name.
    pub fn display_name(&self) -> &'static str {
        match self {
            TaskType::FlightTime => "Flight Time Validation",
            TaskType::PremiumPay => "Premium Pay Calculation",
            TaskType::Compliance => "Compliance Screening",
        }
    }

    /// Whether this task's citations are the ones the verdict reports.
    pub fn is_citation_authority(&self) -> bool {
        matches!(self, TaskType::PremiumPay)
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// The task ran and found nothing blocking
    Completed,

    /// The task ran and wants a human to look
    Flagged,

    /// The task could not produce an assessment
    Error,
}

impl TaskStatus {
    pub fn is_error(&self) -> bool {
        matches!(self, TaskStatus::Error)
    }

    pub fn is_flagged(&self) -> bool {
        matches!(self, TaskStatus::Flagged)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Flagged => write!(f, "flagged"),
            TaskStatus::Error => write!(f, "error"),
        }
    }
}

/// Fraud risk band reported by compliance screening.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Task-specific structured data carried by a [`TaskResult`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskPayload {
    FlightTime {
        /// Hours the crew member reported, if stated
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reported_hours: Option<f64>,

        /// Hours the reviewer considers supported by the trip record
        #[serde(default, skip_serializing_if = "Option::is_none")]
        verified_hours: Option<f64>,

        #[serde(default)]
        issues: Vec<Issue>,
    },

    PremiumPay {
        claimed_amount: f64,
        calculated_amount: f64,

        /// `claimed_amount - calculated_amount`
        difference: f64,

        #[serde(default)]
        citations: Vec<Reference>,

        #[serde(default)]
        issues: Vec<Issue>,
    },

    Compliance {
        fraud_risk: RiskLevel,

        #[serde(default)]
        issues: Vec<Issue>,
    },

    /// No structured data (error results)
    #[default]
    Empty,
}

impl TaskPayload {
    /// Issues reported in this payload, in the order reported.
    pub fn issues(&self) -> &[Issue] {
        match self {
            TaskPayload::FlightTime { issues, .. }
            | TaskPayload::PremiumPay { issues, .. }
            | TaskPayload::Compliance { issues, .. } => issues,
            TaskPayload::Empty => &[],
        }
    }

    /// Rule citations reported in this payload.
    pub fn citations(&self) -> &[Reference] {
        match self {
            TaskPayload::PremiumPay { citations, .. } => citations,
            _ => &[],
        }
    }
}

/// Result record produced by one task agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskResult {
    pub task_type: TaskType,
    pub status: TaskStatus,

    /// Confidence in [0, 1]. Agents always set it; results loaded from
    /// elsewhere may lack it and are then left out of the verdict mean.
    #[serde(default)]
    pub confidence: Option<f64>,

    pub summary: String,

    #[serde(default)]
    pub details: Vec<String>,

    #[serde(default)]
    pub reasoning: String,

    #[serde(default)]
    pub payload: TaskPayload,

    #[serde(default)]
    pub tokens_used: u32,

    #[serde(default)]
    pub duration_seconds: f64,

    /// `family/model` that served the task, for the audit trail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub served_by: Option<String>,
}

impl TaskResult {
    /// Build the error-shaped result used whenever a task cannot finish.
    pub fn error(task_type: TaskType, reasoning: impl Into<String>, duration_seconds: f64) -> Self {
        let reasoning = reasoning.into();
        Self {
            task_type,
            status: TaskStatus::Error,
            confidence: Some(0.0),
            summary: format!("{} could not be completed", task_type.display_name()),
            details: vec![],
            reasoning,
            payload: TaskPayload::Empty,
            tokens_used: 0,
            duration_seconds,
            served_by: None,
        }
    }

    /// Issues reported by this task.
    pub fn issues(&self) -> &[Issue] {
        self.payload.issues()
    }
}

/// Final status of a verdict.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Approved,
    Flagged,
    Rejected,
}

impl OverallStatus {
    /// Fixed recommendation text for this status.
    pub fn recommendation(&self) -> &'static str {
        match self {
            OverallStatus::Approved => "APPROVE - all validation checks passed",
            OverallStatus::Flagged => "RECOMMEND: request additional information",
            OverallStatus::Rejected => "REJECT - validation failed",
        }
    }
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverallStatus::Approved => write!(f, "approved"),
            OverallStatus::Flagged => write!(f, "flagged"),
            OverallStatus::Rejected => write!(f, "rejected"),
        }
    }
}

/// The single synthesized outcome of a validation run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Verdict {
    /// Identifier of the claim this verdict is about
    pub subject_id: String,

    pub overall_status: OverallStatus,

    /// Mean of the defined task confidences
    pub confidence: f64,

    /// Sum of per-task durations
    pub processing_time_seconds: f64,

    pub recommendation: String,

    /// Results in configured task order
    pub task_results: Vec<TaskResult>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<Issue>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cited_references: Vec<Reference>,

    pub decided_at: DateTime<Utc>,
}

impl Verdict {
    pub fn is_approved(&self) -> bool {
        self.overall_status == OverallStatus::Approved
    }

    /// Result for a specific task, if it ran.
    pub fn result_for(&self, task: TaskType) -> Option<&TaskResult> {
        self.task_results.iter().find(|r| r.task_type == task)
    }
}
