//! Scripted backend and fixtures shared by the runtime's unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use claimwise_core::{Claim, Crew, DomainFacts, TaskType, Trip};
use chrono::{TimeZone, Utc};

use crate::cache::AvailabilityCache;
use crate::catalog::{CostModel, ProviderCatalog, ProviderConfig};
use crate::dispatch::DispatchClient;
use crate::providers::{
    AdapterRegistry, ApiCredential, BackendAdapter, BackendFamily, CredentialSource,
    NormalizedResponse, ProviderError, StopReason, TaskRequest, TokenUsage,
};

pub const FLIGHT_TIME_OK: &str = r#"{"valid": true, "confidence": 0.99, "summary": "Claimed hours match block time", "verified_hours": 7.0}"#;

pub const PREMIUM_PAY_OK: &str = r#"```json
{
  "amount_correct": true,
  "calculated_amount": 125.0,
  "confidence": 1.0,
  "summary": "International premium applies",
  "breakdown": ["Flat international premium: 125.00"],
  "citations": [{"section": "CBA 12.1", "title": "International Premium", "excerpt": "Crew members operating a trip that crosses a national border receive the international premium once per trip."}]
}
```"#;

pub const COMPLIANCE_OK: &str = r#"{"compliant": true, "fraud_risk": "low", "confidence": 0.995, "summary": "No compliance concerns"}"#;

/// How the scripted backend answers one task.
#[derive(Debug, Clone)]
pub enum Script {
    Reply(String),
    Fail(u16, &'static str),
    Hang,
}

/// Backend that answers per task from a script and counts calls.
pub struct ScriptedAdapter {
    family: BackendFamily,
    scripts: HashMap<TaskType, Script>,
    pub calls: AtomicU32,
}

impl ScriptedAdapter {
    pub fn new(family: BackendFamily) -> Self {
        Self {
            family,
            scripts: HashMap::new(),
            calls: AtomicU32::new(0),
        }
    }

    /// Answer every task successfully.
    pub fn all_ok(family: BackendFamily) -> Self {
        Self::new(family)
            .on(TaskType::FlightTime, Script::Reply(FLIGHT_TIME_OK.to_string()))
            .on(TaskType::PremiumPay, Script::Reply(PREMIUM_PAY_OK.to_string()))
            .on(TaskType::Compliance, Script::Reply(COMPLIANCE_OK.to_string()))
    }

    pub fn on(mut self, task: TaskType, script: Script) -> Self {
        self.scripts.insert(task, script);
        self
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackendAdapter for ScriptedAdapter {
    fn family(&self) -> BackendFamily {
        self.family
    }

    async fn complete(
        &self,
        config: &ProviderConfig,
        request: &TaskRequest,
    ) -> Result<NormalizedResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let script = self
            .scripts
            .get(&request.task_type())
            .cloned()
            .unwrap_or(Script::Fail(503, "no script for task"));

        match script {
            Script::Reply(text) => Ok(NormalizedResponse {
                text,
                usage: TokenUsage::new(800, 200),
                stop_reason: StopReason::Complete,
                backend_family: self.family,
                model_id: config.model_id.clone(),
                estimated_cost: None,
            }),
            Script::Fail(status, message) => Err(ProviderError::from_status(status, message, None)),
            Script::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(ProviderError::HttpError("unreachable".into()))
            }
        }
    }
}

/// Dispatch client with one credentialed entry per task served by `adapter`.
pub fn dispatch_with(adapter: Arc<ScriptedAdapter>) -> DispatchClient {
    let family = adapter.family();
    let mut catalog = ProviderCatalog::new();
    for task in TaskType::ALL {
        let mut config =
            ProviderConfig::new(family, "scripted-model", CostModel::per_token(3.0, 15.0), 0);
        if family.requires_credential() {
            config = config.with_credential(Arc::new(ApiCredential::new(
                "test-key",
                CredentialSource::Programmatic,
                family.credential_name(),
            )));
        }
        catalog.insert(task, config);
    }

    let registry = AdapterRegistry::new().with(adapter);
    DispatchClient::new(
        Arc::new(catalog),
        Arc::new(registry),
        Arc::new(AvailabilityCache::default()),
    )
    .with_default_timeout(Duration::from_secs(10))
}

/// A complete, consistent facts bundle.
pub fn sample_facts() -> DomainFacts {
    let departure = Utc.with_ymd_and_hms(2026, 3, 14, 8, 0, 0).single();
    let arrival = Utc.with_ymd_and_hms(2026, 3, 14, 15, 0, 0).single();

    let mut facts = DomainFacts::new(Claim {
        id: "CLM-1001".to_string(),
        crew_id: "CRW-7".to_string(),
        trip_id: Some("TRP-55".to_string()),
        claim_type: "international_premium".to_string(),
        amount: 125.0,
        currency: "USD".to_string(),
        hours_claimed: Some(7.0),
        submitted_at: None,
        description: None,
    });
    if let (Some(departure), Some(arrival)) = (departure, arrival) {
        facts.trip = Some(Trip {
            id: "TRP-55".to_string(),
            flight_number: Some("CW 410".to_string()),
            origin: "SEA".to_string(),
            destination: "YVR".to_string(),
            scheduled_departure: departure,
            scheduled_arrival: arrival,
            actual_departure: Some(departure),
            actual_arrival: Some(arrival),
            is_international: true,
            aircraft_type: None,
        });
    }
    facts.crew = Some(Crew {
        id: "CRW-7".to_string(),
        name: "A. Rivera".to_string(),
        position: "captain".to_string(),
        base: Some("SEA".to_string()),
        seniority_years: Some(12.0),
        hourly_rate: Some(210.0),
    });
    facts
}
