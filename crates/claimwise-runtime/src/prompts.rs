//! Instructions for the task agents.
//!
//! The system instruction is fixed per task: a shared base plus the
//! task's question and answer format. The user instruction is rendered from
//! the facts bundle in a fixed section order, so the same facts always
//! produce the same text.

use std::fmt::Write;

use claimwise_core::{DomainFacts, ScreeningSignals, TaskType};

use crate::knowledge::RuleContext;

/// Base system instruction shared by every task agent.
pub const BASE_SYSTEM_PROMPT: &str = r#"
You are a payroll claim reviewer for an airline crew payroll team.

You check one aspect of a claim against the facts you are given.
You do not approve or reject the claim as a whole.
You do not invent facts that are not in the claim record.

## Review Constraints
1. Use ONLY the facts and rules provided
2. Treat the screening signals as computed facts, not opinions
3. If the facts are insufficient, say so and lower your confidence
4. Report every problem you find as an issue with a severity
5. Answer with a single JSON object and nothing else

## Confidence Guidelines
- 0.9-1.0: Facts are complete and the answer is unambiguous
- 0.7-0.9: Facts support the answer with minor gaps
- 0.4-0.7: Notable uncertainty; a human should look at this claim
- < 0.4: Facts are insufficient to answer

## Issue Format
{"severity": "low" | "medium" | "high", "title": "short title", "description": "what is wrong", "suggested_action": "what a reviewer should do"}
"#;

/// Flight-time validation instruction.
pub const FLIGHT_TIME_PROMPT: &str = r#"
## Review Task: Flight Time Validation

Question:
Are the hours claimed plausible given the trip's scheduled and actual times?

## Output Format (JSON)
{
  "valid": true | false,
  "confidence": 0.0-1.0,
  "summary": "one sentence",
  "reasoning": "how you reached the answer",
  "reported_hours": number | null,
  "verified_hours": number | null,
  "discrepancies": ["each discrepancy found"],
  "issues": [Issue]
}
"#;

/// Premium-pay calculation instruction.
pub const PREMIUM_PAY_PROMPT: &str = r#"
## Review Task: Premium Pay Calculation

Question:
Is the claimed amount correct under the applicable pay rules?

Calculate the amount yourself from the rules and the crew member's rate,
then compare it with the amount claimed. Cite every rule you applied.

## Output Format (JSON)
{
  "amount_correct": true | false,
  "calculated_amount": number,
  "confidence": 0.0-1.0,
  "summary": "one sentence",
  "reasoning": "how you reached the answer",
  "breakdown": ["each calculation step"],
  "citations": [{"section": "rule section", "title": "rule title", "excerpt": "quoted rule text"}],
  "issues": [Issue]
}
"#;

/// Compliance screening instruction.
pub const COMPLIANCE_PROMPT: &str = r#"
## Review Task: Compliance Screening

Question:
Does this claim break any compliance rule or show signs of fraud?

Consider the claim history, outlier amounts, and mismatches between
claimed and recorded time.

## Output Format (JSON)
{
  "compliant": true | false,
  "fraud_risk": "low" | "medium" | "high",
  "confidence": 0.0-1.0,
  "summary": "one sentence",
  "reasoning": "how you reached the answer",
  "flags": ["each red flag noticed"],
  "issues": [Issue]
}
"#;

/// Task-specific part of the system instruction.
pub fn task_prompt(task: TaskType) -> &'static str {
    match task {
        TaskType::FlightTime => FLIGHT_TIME_PROMPT,
        TaskType::PremiumPay => PREMIUM_PAY_PROMPT,
        TaskType::Compliance => COMPLIANCE_PROMPT,
    }
}

/// Full system instruction for a task.
pub fn system_prompt(task: TaskType) -> String {
    format!("{}\n{}", BASE_SYSTEM_PROMPT.trim(), task_prompt(task).trim_end())
}

/// Render the user instruction for a task.
///
/// Sections appear in a fixed order; sections a task does not use, or whose
/// facts are absent, are left out.
pub fn user_prompt(
    task: TaskType,
    facts: &DomainFacts,
    signals: &ScreeningSignals,
    rules: Option<&RuleContext>,
) -> String {
    let mut out = String::new();

    section(&mut out, "Claim", &facts.claim);

    if let Some(trip) = &facts.trip {
        section(&mut out, "Trip", trip);
    } else {
        let _ = writeln!(out, "## Trip\n(no trip record)\n");
    }

    if let Some(crew) = &facts.crew {
        section(&mut out, "Crew Member", crew);
    }

    if task == TaskType::Compliance {
        if let Some(stats) = &facts.historical_stats {
            section(&mut out, "Historical Statistics", stats);
        }
    }

    section(&mut out, "Screening Signals", signals);

    if task != TaskType::FlightTime {
        if let Some(rules) = rules {
            section(&mut out, "Applicable Rules", rules);
        }
    }

    let _ = write!(
        out,
        "Answer the {} question for claim {} as a single JSON object.",
        task.display_name(),
        facts.subject_id()
    );
    out
}

fn section(out: &mut String, title: &str, body: &dyn std::fmt::Display) {
    let _ = writeln!(out, "## {}\n{}", title, body);
}
