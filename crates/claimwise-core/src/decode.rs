//! Structured-output decoding.
//!
//! Model responses carry their machine-readable answer either as bare JSON
//! or inside one fenced ```` ```json ```` block. Decoding never falls back to
//! a default value: a response that does not parse into the expected shape
//! is a [`DecodeError`], which callers must keep distinct from transport
//! failures.

use lazy_static::lazy_static;
use regex::Regex;
use serde::de::DeserializeOwned;
use thiserror::Error;

lazy_static! {
    /// First fenced block labelled as JSON.
    static ref JSON_FENCE: Regex = Regex::new(r"(?s)```[ \t]*(?i:json)[ \t]*\r?\n(.*?)```")
        .expect("JSON fence pattern is valid");
}

/// Maximum characters of raw output kept in error messages.
const EXCERPT_CHARS: usize = 160;

/// Errors from decoding structured model output.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Response is empty")]
    Empty,

    #[error("Response is not valid JSON ({source}): {excerpt}")]
    NotJson {
        #[source]
        source: serde_json::Error,
        excerpt: String,
    },

    #[error("Response JSON does not match the expected shape: {0}")]
    ShapeMismatch(#[source] serde_json::Error),

    #[error("Invalid value for '{field}': {reason}")]
    InvalidField { field: String, reason: String },
}

impl DecodeError {
    /// Convenience constructor for range and consistency violations.
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        DecodeError::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Post-deserialization checks a decoded shape must satisfy.
pub trait Validate {
    fn validate(&self) -> Result<(), DecodeError>;
}

/// Return the body of the first ```` ```json ```` block, or the text itself.
pub fn extract_structured_block(raw: &str) -> &str {
    match JSON_FENCE.captures(raw).and_then(|caps| caps.get(1)) {
        Some(body) => body.as_str(),
        None => raw,
    }
}

/// Decode raw model output into `T`.
pub fn decode<T: DeserializeOwned>(raw: &str) -> Result<T, DecodeError> {
    let body = extract_structured_block(raw);
    if body.trim().is_empty() {
        return Err(DecodeError::Empty);
    }

    let value: serde_json::Value =
        serde_json::from_str(body.trim()).map_err(|source| DecodeError::NotJson {
            source,
            excerpt: excerpt(body),
        })?;

    serde_json::from_value(value).map_err(DecodeError::ShapeMismatch)
}

/// Decode raw model output into `T` and run its [`Validate`] checks.
pub fn decode_validated<T: DeserializeOwned + Validate>(raw: &str) -> Result<T, DecodeError> {
    let decoded: T = decode(raw)?;
    decoded.validate()?;
    Ok(decoded)
}

/// Check that a confidence value lies in [0, 1].
pub fn check_unit_interval(field: &str, value: f64) -> Result<(), DecodeError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(DecodeError::invalid(field, format!("{} is outside [0, 1]", value)))
    }
}

/// Check that an amount is finite and non-negative.
pub fn check_non_negative(field: &str, value: f64) -> Result<(), DecodeError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(DecodeError::invalid(field, format!("{} is not a non-negative amount", value)))
    }
}

fn excerpt(body: &str) -> String {
    let trimmed = body.trim();
    let mut out: String = trimmed.chars().take(EXCERPT_CHARS).collect();
    if trimmed.chars().count() > EXCERPT_CHARS {
        out.push_str("...");
    }
    out
}
