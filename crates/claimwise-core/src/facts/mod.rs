//! Inbound facts bundles.
//!
//! A bundle is the fully resolved record set for one claim: the claim
//! itself plus the optional trip, crew, and historical statistics the data
//! layer could find. Bundles are schema-validated before any task runs.

mod parser;
mod schema;

pub use parser::{Claim, Crew, DomainFacts, FactsError, HistoricalStats, Trip};
pub use schema::validate_facts_schema;
