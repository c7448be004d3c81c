//! Deterministic screening signals.
//!
//! Computed once per run from the facts bundle and rendered into every task
//! instruction, so all reviewers reason from the same numbers.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::facts::DomainFacts;

/// Hours difference beyond which claimed and recorded time disagree.
pub const HOURS_TOLERANCE: f64 = 0.5;

/// Z-score at or above which a claimed amount is an outlier.
pub const OUTLIER_Z_SCORE: f64 = 2.0;

/// Numbers derived from the facts bundle without any model involvement.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScreeningSignals {
    /// Scheduled block time in hours
    pub scheduled_block_hours: Option<f64>,

    /// Actual block time in hours, when both actual times are recorded
    pub actual_block_hours: Option<f64>,

    /// Minutes between scheduled and actual departure (negative when early)
    pub departure_delay_minutes: Option<i64>,

    pub is_international: Option<bool>,

    /// Claimed hours minus the best available block time
    pub hours_difference: Option<f64>,

    /// Claimed amount divided by the historical average
    pub amount_ratio: Option<f64>,

    /// Standard score of the claimed amount against history
    pub amount_z_score: Option<f64>,
}

impl ScreeningSignals {
    /// Compute signals for a facts bundle.
    pub fn compute(facts: &DomainFacts) -> Self {
        let mut signals = ScreeningSignals::default();

        if let Some(trip) = &facts.trip {
            let scheduled = trip.scheduled_arrival - trip.scheduled_departure;
            signals.scheduled_block_hours = Some(hours(scheduled.num_seconds()));
            signals.is_international = Some(trip.is_international);

            if let (Some(dep), Some(arr)) = (trip.actual_departure, trip.actual_arrival) {
                signals.actual_block_hours = Some(hours((arr - dep).num_seconds()));
            }

            if let Some(dep) = trip.actual_departure {
                signals.departure_delay_minutes =
                    Some((dep - trip.scheduled_departure).num_minutes());
            }
        }

        if let Some(claimed) = facts.claim.hours_claimed {
            let recorded = signals.actual_block_hours.or(signals.scheduled_block_hours);
            signals.hours_difference = recorded.map(|r| round2(claimed - r));
        }

        if let Some(stats) = &facts.historical_stats {
            if stats.sample_size > 0 && stats.average_amount > 0.0 {
                signals.amount_ratio = Some(round2(facts.claim.amount / stats.average_amount));
            }
            if let Some(std_dev) = stats.std_dev_amount.filter(|s| *s > 0.0) {
                if stats.sample_size > 1 {
                    signals.amount_z_score =
                        Some(round2((facts.claim.amount - stats.average_amount) / std_dev));
                }
            }
        }

        signals
    }

    /// Whether claimed hours disagree with the recorded block time.
    pub fn hours_mismatch(&self) -> bool {
        self.hours_difference
            .map(|d| d.abs() > HOURS_TOLERANCE)
            .unwrap_or(false)
    }

    /// Whether the claimed amount is a statistical outlier.
    pub fn amount_outlier(&self) -> bool {
        self.amount_z_score
            .map(|z| z.abs() >= OUTLIER_Z_SCORE)
            .unwrap_or(false)
    }
}

fn hours(seconds: i64) -> f64 {
    round2(seconds as f64 / 3600.0)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl fmt::Display for ScreeningSignals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn opt<T: fmt::Display>(value: Option<T>) -> String {
            value.map(|v| v.to_string()).unwrap_or_else(|| "n/a".to_string())
        }

        writeln!(f, "Scheduled Block Hours: {}", opt(self.scheduled_block_hours.map(|h| format!("{:.2}", h))))?;
        writeln!(f, "Actual Block Hours: {}", opt(self.actual_block_hours.map(|h| format!("{:.2}", h))))?;
        writeln!(f, "Departure Delay (min): {}", opt(self.departure_delay_minutes))?;
        writeln!(
            f,
            "International: {}",
            opt(self.is_international.map(|i| if i { "yes" } else { "no" }))
        )?;
        writeln!(f, "Claimed vs Recorded Hours: {}", opt(self.hours_difference.map(|d| format!("{:+.2}", d))))?;
        writeln!(f, "Amount / Historical Average: {}", opt(self.amount_ratio.map(|r| format!("{:.2}", r))))?;
        writeln!(f, "Amount Z-Score: {}", opt(self.amount_z_score.map(|z| format!("{:+.2}", z))))?;
        if self.hours_mismatch() {
            writeln!(f, "Note: claimed hours differ from the recorded block time")?;
        }
        if self.amount_outlier() {
            writeln!(f, "Note: claimed amount is a statistical outlier")?;
        }
        Ok(())
    }
}
