//! Persistence boundary: tell the record store about a verdict.
//!
//! Notification is fire-and-forget. It runs on a spawned task after the
//! verdict is returned, retries transient failures with backoff, and only
//! logs when it finally gives up.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backon::Retryable;
use claimwise_core::Verdict;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::resilience::RetryPolicy;

/// Errors from a verdict sink.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PersistenceError {
    #[error("Record store unavailable: {0}")]
    Unavailable(String),

    #[error("Record rejected: {0}")]
    Rejected(String),
}

impl PersistenceError {
    /// Whether trying again may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, PersistenceError::Unavailable(_))
    }
}

/// What the record store learns about a decided claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerdictRecord {
    pub subject_id: String,
    pub approved: bool,
    pub explanation: String,

    /// First cited rule, when the verdict carries one
    pub primary_citation: Option<String>,
}

impl VerdictRecord {
    pub fn from_verdict(verdict: &Verdict) -> Self {
        let mut explanation = format!(
            "{} ({}, confidence {:.2})",
            verdict.recommendation, verdict.overall_status, verdict.confidence
        );
        if !verdict.issues.is_empty() {
            let titles: Vec<&str> = verdict.issues.iter().map(|i| i.title.as_str()).collect();
            explanation.push_str(&format!("; issues: {}", titles.join(", ")));
        }

        Self {
            subject_id: verdict.subject_id.clone(),
            approved: verdict.is_approved(),
            explanation,
            primary_citation: verdict.cited_references.first().map(|r| r.citation()),
        }
    }
}

/// Destination for verdict records.
#[async_trait]
pub trait VerdictSink: Send + Sync {
    async fn record(&self, record: &VerdictRecord) -> Result<(), PersistenceError>;
}

/// Sink that drops every record.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

#[async_trait]
impl VerdictSink for NoopSink {
    async fn record(&self, _record: &VerdictRecord) -> Result<(), PersistenceError> {
        Ok(())
    }
}

/// Sink that keeps records in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<VerdictRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<VerdictRecord> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl VerdictSink for MemorySink {
    async fn record(&self, record: &VerdictRecord) -> Result<(), PersistenceError> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}

/// Send a record to the sink on a background task.
pub fn notify(
    sink: Arc<dyn VerdictSink>,
    record: VerdictRecord,
    policy: RetryPolicy,
) -> JoinHandle<Result<(), PersistenceError>> {
    tokio::spawn(async move {
        let attempt = || {
            let sink = Arc::clone(&sink);
            let record = record.clone();
            async move { sink.record(&record).await }
        };

        let result = attempt
            .retry(policy.backoff())
            .when(PersistenceError::is_transient)
            .notify(|e: &PersistenceError, delay: Duration| {
                tracing::debug!(subject = %record.subject_id, error = %e, delay = ?delay, "Retrying verdict notification");
            })
            .await;

        match &result {
            Ok(()) => tracing::debug!(subject = %record.subject_id, "Verdict recorded"),
            Err(e) => {
                tracing::warn!(subject = %record.subject_id, error = %e, "Verdict notification failed")
            }
        }
        result
    })
}
