//! Evidence attached to task results and verdicts.
//!
//! Every finding the reviewers surface is either an [`Issue`] (something a
//! human should look at) or a [`Reference`] (a rule excerpt the finding
//! relies on). Both are carried through to the verdict unchanged so the
//! audit trail shows exactly what each step reported.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::TaskType;

/// How urgently an issue needs attention.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
        }
    }
}

/// A problem detected by one of the analysis tasks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Issue {
    /// How urgent the issue is
    pub severity: Severity,

    /// Short headline
    pub title: String,

    /// What was observed
    pub description: String,

    /// What a reviewer should do about it
    pub suggested_action: String,

    /// Which task reported the issue
    pub detected_by: TaskType,
}

impl Issue {
    /// Create an issue attributed to a task.
    pub fn new(
        detected_by: TaskType,
        severity: Severity,
        title: impl Into<String>,
        description: impl Into<String>,
        suggested_action: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            title: title.into(),
            description: description.into(),
            suggested_action: suggested_action.into(),
            detected_by,
        }
    }

    /// Re-attribute the issue to another task.
    pub fn attributed_to(mut self, task: TaskType) -> Self {
        self.detected_by = task;
        self
    }

    /// Whether the issue blocks approval on its own.
    pub fn is_high(&self) -> bool {
        self.severity == Severity::High
    }
}

/// A rule or contract excerpt cited in support of a finding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reference {
    /// Section identifier (e.g., "CBA 25.B.3")
    pub section: String,

    /// Optional human-readable title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// The quoted rule text
    pub excerpt: String,

    /// Ranking score from the knowledge base, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance: Option<f64>,
}

impl Reference {
    /// Create a reference from a section and its excerpt.
    pub fn new(section: impl Into<String>, excerpt: impl Into<String>) -> Self {
        Self {
            section: section.into(),
            title: None,
            excerpt: excerpt.into(),
            relevance: None,
        }
    }

    /// Attach a title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Attach a relevance score.
    pub fn with_relevance(mut self, relevance: f64) -> Self {
        self.relevance = Some(relevance);
        self
    }

    /// One-line citation used in explanations and persistence records.
    pub fn citation(&self) -> String {
        match &self.title {
            Some(title) => format!("{} ({}): {}", self.section, title, self.excerpt),
            None => format!("{}: {}", self.section, self.excerpt),
        }
    }
}
