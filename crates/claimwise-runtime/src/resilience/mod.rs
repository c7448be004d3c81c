//! Resilience patterns for claimwise-runtime.
//!
//! This module provides:
//! - Usage and cost accounting per run
//! - Retry with backoff for best-effort collaborator calls
//!
//! Provider fallback and call-scoped poisoning live in [`crate::dispatch`].

mod retry;
mod usage;

pub use retry::RetryPolicy;
pub use usage::{LlmUsage, UsageLedger};
