//! Facts bundle parsing from YAML/JSON.

use std::fmt;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::schema::validate_facts_schema;

/// Errors that can occur when loading a facts bundle.
#[derive(Error, Debug)]
pub enum FactsError {
    #[error("Failed to read facts file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Facts failed schema validation: {}", .0.join("; "))]
    SchemaViolations(Vec<String>),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Inconsistent facts: {0}")]
    Inconsistent(String),
}

/// The payroll claim under review.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claim {
    pub id: String,
    pub crew_id: String,

    #[serde(default)]
    pub trip_id: Option<String>,

    /// Claim category (e.g., "international_premium", "holiday_pay")
    pub claim_type: String,

    /// Amount claimed
    pub amount: f64,

    #[serde(default = "default_currency")]
    pub currency: String,

    #[serde(default)]
    pub hours_claimed: Option<f64>,

    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub description: Option<String>,
}

fn default_currency() -> String {
    "USD".to_string()
}

/// The trip the claim refers to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trip {
    pub id: String,

    #[serde(default)]
    pub flight_number: Option<String>,

    pub origin: String,
    pub destination: String,
    pub scheduled_departure: DateTime<Utc>,
    pub scheduled_arrival: DateTime<Utc>,

    #[serde(default)]
    pub actual_departure: Option<DateTime<Utc>>,

    #[serde(default)]
    pub actual_arrival: Option<DateTime<Utc>>,

    #[serde(default)]
    pub is_international: bool,

    #[serde(default)]
    pub aircraft_type: Option<String>,
}

/// The crew member who filed the claim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Crew {
    pub id: String,
    pub name: String,

    /// Crew position (e.g., "captain", "first_officer", "flight_attendant")
    pub position: String,

    #[serde(default)]
    pub base: Option<String>,

    #[serde(default)]
    pub seniority_years: Option<f64>,

    #[serde(default)]
    pub hourly_rate: Option<f64>,
}

/// Aggregate statistics for similar past claims.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoricalStats {
    #[serde(default)]
    pub claim_type: Option<String>,

    pub average_amount: f64,

    #[serde(default)]
    pub std_dev_amount: Option<f64>,

    pub sample_size: u32,

    #[serde(default)]
    pub claims_last_90_days: Option<u32>,
}

/// A fully resolved facts bundle for one claim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DomainFacts {
    pub claim: Claim,

    #[serde(default)]
    pub trip: Option<Trip>,

    #[serde(default)]
    pub crew: Option<Crew>,

    #[serde(default)]
    pub historical_stats: Option<HistoricalStats>,
}

impl DomainFacts {
    /// Create a bundle with only the claim.
    pub fn new(claim: Claim) -> Self {
        Self {
            claim,
            trip: None,
            crew: None,
            historical_stats: None,
        }
    }

    /// The subject identifier verdicts are keyed by.
    pub fn subject_id(&self) -> &str {
        &self.claim.id
    }

    /// Parse a bundle from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, FactsError> {
        let value: serde_json::Value = serde_yaml::from_str(yaml)?;
        Self::from_value(value)
    }

    /// Parse a bundle from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, FactsError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Parse a bundle from a file, choosing the format by extension.
    ///
    /// `.json` files are read as JSON; anything else as YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, FactsError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&contents),
            _ => Self::from_yaml(&contents),
        }
    }

    /// Validate a raw value against the schema, then deserialize and check
    /// cross-record consistency.
    pub fn from_value(value: serde_json::Value) -> Result<Self, FactsError> {
        validate_facts_schema(&value).map_err(FactsError::SchemaViolations)?;
        let facts: DomainFacts = serde_json::from_value(value)?;
        facts.validate()?;
        Ok(facts)
    }

    /// Check identifiers and cross-record references.
    pub fn validate(&self) -> Result<(), FactsError> {
        if self.claim.id.trim().is_empty() {
            return Err(FactsError::MissingField("claim.id".to_string()));
        }

        if self.claim.crew_id.trim().is_empty() {
            return Err(FactsError::MissingField("claim.crew_id".to_string()));
        }

        if let (Some(trip_id), Some(trip)) = (&self.claim.trip_id, &self.trip) {
            if trip_id != &trip.id {
                return Err(FactsError::Inconsistent(format!(
                    "claim references trip {} but trip {} was supplied",
                    trip_id, trip.id
                )));
            }
        }

        if let Some(crew) = &self.crew {
            if crew.id != self.claim.crew_id {
                return Err(FactsError::Inconsistent(format!(
                    "claim filed by crew {} but crew record is {}",
                    self.claim.crew_id, crew.id
                )));
            }
        }

        if let Some(trip) = &self.trip {
            if trip.scheduled_arrival < trip.scheduled_departure {
                return Err(FactsError::Inconsistent(format!(
                    "trip {} is scheduled to arrive before it departs",
                    trip.id
                )));
            }
        }

        Ok(())
    }
}

// Human-readable blocks used in task instructions. Field order is fixed so
// identical facts always render identically.

impl fmt::Display for Claim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Claim ID: {}", self.id)?;
        writeln!(f, "Crew ID: {}", self.crew_id)?;
        writeln!(f, "Trip ID: {}", self.trip_id.as_deref().unwrap_or("(none)"))?;
        writeln!(f, "Claim Type: {}", self.claim_type)?;
        writeln!(f, "Amount Claimed: {:.2} {}", self.amount, self.currency)?;
        if let Some(hours) = self.hours_claimed {
            writeln!(f, "Hours Claimed: {:.2}", hours)?;
        }
        if let Some(submitted) = self.submitted_at {
            writeln!(f, "Submitted: {}", submitted.to_rfc3339())?;
        }
        if let Some(description) = &self.description {
            writeln!(f, "Description: {}", description)?;
        }
        Ok(())
    }
}

impl fmt::Display for Trip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Trip ID: {}", self.id)?;
        if let Some(flight) = &self.flight_number {
            writeln!(f, "Flight: {}", flight)?;
        }
        writeln!(f, "Route: {} -> {}", self.origin, self.destination)?;
        writeln!(f, "International: {}", if self.is_international { "yes" } else { "no" })?;
        writeln!(f, "Scheduled Departure: {}", self.scheduled_departure.to_rfc3339())?;
        writeln!(f, "Scheduled Arrival: {}", self.scheduled_arrival.to_rfc3339())?;
        match self.actual_departure {
            Some(t) => writeln!(f, "Actual Departure: {}", t.to_rfc3339())?,
            None => writeln!(f, "Actual Departure: (not recorded)")?,
        }
        match self.actual_arrival {
            Some(t) => writeln!(f, "Actual Arrival: {}", t.to_rfc3339())?,
            None => writeln!(f, "Actual Arrival: (not recorded)")?,
        }
        if let Some(aircraft) = &self.aircraft_type {
            writeln!(f, "Aircraft: {}", aircraft)?;
        }
        Ok(())
    }
}

impl fmt::Display for Crew {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Crew ID: {}", self.id)?;
        writeln!(f, "Name: {}", self.name)?;
        writeln!(f, "Position: {}", self.position)?;
        if let Some(base) = &self.base {
            writeln!(f, "Base: {}", base)?;
        }
        if let Some(years) = self.seniority_years {
            writeln!(f, "Seniority: {:.1} years", years)?;
        }
        if let Some(rate) = self.hourly_rate {
            writeln!(f, "Hourly Rate: {:.2}", rate)?;
        }
        Ok(())
    }
}

impl fmt::Display for HistoricalStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(claim_type) = &self.claim_type {
            writeln!(f, "Claim Type: {}", claim_type)?;
        }
        writeln!(f, "Average Amount: {:.2}", self.average_amount)?;
        if let Some(std_dev) = self.std_dev_amount {
            writeln!(f, "Std Dev: {:.2}", std_dev)?;
        }
        writeln!(f, "Sample Size: {}", self.sample_size)?;
        if let Some(recent) = self.claims_last_90_days {
            writeln!(f, "Claims (last 90 days): {}", recent)?;
        }
        Ok(())
    }
}
