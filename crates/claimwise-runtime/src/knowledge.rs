//! Knowledge-base boundary: pay and compliance rules for task instructions.
//!
//! Lookups are best effort. When the knowledge base cannot answer, agents
//! fall back to the full rules text and finally to a built-in summary; a
//! missing knowledge base never fails a run.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use claimwise_core::Reference;
use thiserror::Error;

/// Maximum citations requested per claim category.
pub const DEFAULT_CITATION_LIMIT: usize = 5;

/// Errors from a knowledge base.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum KnowledgeError {
    #[error("Knowledge base unavailable: {0}")]
    Unavailable(String),

    #[error("Knowledge query failed: {0}")]
    Query(String),

    #[error("Knowledge base did not answer within {0:?}")]
    Timeout(Duration),
}

/// Default bound on one knowledge-base lookup.
pub const DEFAULT_KNOWLEDGE_TIMEOUT: Duration = Duration::from_secs(5);

/// Read-only source of rule text.
#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    /// Ranked, citation-worthy rule excerpts for a claim category.
    async fn citations_for(
        &self,
        claim_type: &str,
        limit: usize,
    ) -> Result<Vec<Reference>, KnowledgeError>;

    /// Every known rule as prose.
    async fn all_rules_text(&self) -> Result<String, KnowledgeError>;
}

/// Rules used when no knowledge base can answer.
pub const STATIC_RULES_SUMMARY: &str = "\
Pay and compliance rules (built-in summary):
- Premium pay applies only to the claim category it is filed under and requires a matching trip.
- International premium: trips crossing a national border earn a per-trip premium.
- Holiday pay: duty on a recognised holiday is paid at 1.5x the hourly rate for duty hours.
- Overtime: duty beyond scheduled block time is paid at the hourly rate for the excess, rounded to the quarter hour.
- Delay pay: departure delays over 60 minutes earn the hourly rate for the delay beyond 60 minutes.
- Claimed hours must match recorded block time within 0.5 hours.
- Duplicate or repeated claims for the same trip must be flagged for review.";

struct StaticRule {
    section: &'static str,
    title: &'static str,
    categories: &'static [&'static str],
    excerpt: &'static str,
}

const STATIC_RULES: &[StaticRule] = &[
    StaticRule {
        section: "CBA 12.1",
        title: "International Premium",
        categories: &["international_premium"],
        excerpt: "Crew members operating a trip that crosses a national border receive the international premium once per trip.",
    },
    StaticRule {
        section: "CBA 14.3",
        title: "Holiday Pay",
        categories: &["holiday_pay"],
        excerpt: "Duty performed on a recognised holiday is paid at one and one-half times the hourly rate for all duty hours.",
    },
    StaticRule {
        section: "CBA 15.2",
        title: "Overtime",
        categories: &["overtime"],
        excerpt: "Duty time in excess of the scheduled block time is paid at the hourly rate, rounded to the nearest quarter hour.",
    },
    StaticRule {
        section: "CBA 16.1",
        title: "Delay Pay",
        categories: &["delay_pay", "overtime"],
        excerpt: "Departure delays exceeding sixty minutes are compensated at the hourly rate for the time beyond sixty minutes.",
    },
    StaticRule {
        section: "CBA 3.4",
        title: "Claim Accuracy",
        categories: &[],
        excerpt: "Claimed hours must agree with the recorded block time within one half hour; claims outside the tolerance require documentation.",
    },
];

/// Built-in knowledge base backed by a small fixed rule table.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticKnowledge;

#[async_trait]
impl KnowledgeBase for StaticKnowledge {
    async fn citations_for(
        &self,
        claim_type: &str,
        limit: usize,
    ) -> Result<Vec<Reference>, KnowledgeError> {
        let claim_type = claim_type.trim().to_ascii_lowercase();

        let mut matched: Vec<Reference> = STATIC_RULES
            .iter()
            .filter(|rule| rule.categories.contains(&claim_type.as_str()))
            .map(|rule| {
                Reference::new(rule.section, rule.excerpt)
                    .with_title(rule.title)
                    .with_relevance(1.0)
            })
            .collect();

        // General rules apply to every category, ranked below specific ones.
        matched.extend(
            STATIC_RULES
                .iter()
                .filter(|rule| rule.categories.is_empty())
                .map(|rule| {
                    Reference::new(rule.section, rule.excerpt)
                        .with_title(rule.title)
                        .with_relevance(0.5)
                }),
        );

        matched.truncate(limit);
        Ok(matched)
    }

    async fn all_rules_text(&self) -> Result<String, KnowledgeError> {
        Ok(STATIC_RULES
            .iter()
            .map(|rule| format!("[{}] {}: {}", rule.section, rule.title, rule.excerpt))
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

/// Rule material gathered for one claim, from the best source that answered.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleContext {
    Citations(Vec<Reference>),
    RulesText(String),
    Summary,
}

impl RuleContext {
    /// Citations, when the knowledge base returned any.
    pub fn citations(&self) -> &[Reference] {
        match self {
            RuleContext::Citations(citations) => citations,
            _ => &[],
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, RuleContext::Summary)
    }
}

impl fmt::Display for RuleContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleContext::Citations(citations) => {
                for reference in citations {
                    writeln!(f, "- {}: {}", reference.citation(), reference.excerpt)?;
                }
                Ok(())
            }
            RuleContext::RulesText(text) => writeln!(f, "{}", text.trim_end()),
            RuleContext::Summary => writeln!(f, "{}", STATIC_RULES_SUMMARY),
        }
    }
}

/// Gather rule context for a claim category.
///
/// Tries ranked citations, then the full rules text, then the built-in
/// summary. Each lookup is bounded by `timeout`; one that does not answer
/// in time falls through to the next source. Never fails.
pub async fn gather_rule_context(
    knowledge: &dyn KnowledgeBase,
    claim_type: &str,
    timeout: Duration,
) -> RuleContext {
    match bounded(timeout, knowledge.citations_for(claim_type, DEFAULT_CITATION_LIMIT)).await {
        Ok(citations) if !citations.is_empty() => return RuleContext::Citations(citations),
        Ok(_) => {
            tracing::debug!(claim_type = %claim_type, "No citations for category, using full rules text");
        }
        Err(e) => {
            tracing::warn!(claim_type = %claim_type, error = %e, "Citation lookup failed, using full rules text");
        }
    }

    match bounded(timeout, knowledge.all_rules_text()).await {
        Ok(text) if !text.trim().is_empty() => RuleContext::RulesText(text),
        Ok(_) => {
            tracing::warn!("Knowledge base returned no rules, using built-in summary");
            RuleContext::Summary
        }
        Err(e) => {
            tracing::warn!(error = %e, "Knowledge base unavailable, using built-in summary");
            RuleContext::Summary
        }
    }
}

async fn bounded<T>(
    timeout: Duration,
    lookup: impl Future<Output = Result<T, KnowledgeError>>,
) -> Result<T, KnowledgeError> {
    tokio::time::timeout(timeout, lookup)
        .await
        .unwrap_or(Err(KnowledgeError::Timeout(timeout)))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FlakyKnowledge {
        citations: Result<Vec<Reference>, KnowledgeError>,
        rules: Result<String, KnowledgeError>,
    }

    #[async_trait]
    impl KnowledgeBase for FlakyKnowledge {
        async fn citations_for(&self, _: &str, _: usize) -> Result<Vec<Reference>, KnowledgeError> {
            self.citations.clone()
        }

        async fn all_rules_text(&self) -> Result<String, KnowledgeError> {
            self.rules.clone()
        }
    }

    fn down() -> KnowledgeError {
        KnowledgeError::Unavailable("connection refused".to_string())
    }

    #[tokio::test]
    async fn test_static_citations_rank_specific_rules_first() {
        let citations = StaticKnowledge
            .citations_for("International_Premium", DEFAULT_CITATION_LIMIT)
            .await
            .unwrap();
        assert_eq!(citations.len(), 2);
        assert_eq!(citations[0].section, "CBA 12.1");
        assert_eq!(citations[1].section, "CBA 3.4");

        let limited = StaticKnowledge.citations_for("overtime", 1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_citations_preferred() {
        let context = gather_rule_context(&StaticKnowledge, "holiday_pay", DEFAULT_KNOWLEDGE_TIMEOUT).await;
        assert_eq!(context.citations()[0].section, "CBA 14.3");
        assert!(context.to_string().contains("Holiday Pay"));
    }

    #[tokio::test]
    async fn test_falls_back_to_rules_text() {
        let kb = FlakyKnowledge {
            citations: Err(down()),
            rules: Ok("Rule 1: be accurate".to_string()),
        };
        let context = gather_rule_context(&kb, "holiday_pay", DEFAULT_KNOWLEDGE_TIMEOUT).await;
        assert_eq!(context, RuleContext::RulesText("Rule 1: be accurate".to_string()));
        assert!(context.citations().is_empty());
    }

    #[tokio::test]
    async fn test_falls_back_to_summary() {
        let kb = FlakyKnowledge {
            citations: Ok(vec![]),
            rules: Err(down()),
        };
        let context = gather_rule_context(&kb, "holiday_pay", DEFAULT_KNOWLEDGE_TIMEOUT).await;
        assert!(context.is_degraded());
        assert!(context.to_string().contains("built-in summary"));
    }

    struct SlowCitations;

    #[async_trait]
    impl KnowledgeBase for SlowCitations {
        async fn citations_for(&self, _: &str, _: usize) -> Result<Vec<Reference>, KnowledgeError> {
            std::future::pending().await
        }

        async fn all_rules_text(&self) -> Result<String, KnowledgeError> {
            Ok("Rule 2: file within 30 days".to_string())
        }
    }

    struct HungKnowledge;

    #[async_trait]
    impl KnowledgeBase for HungKnowledge {
        async fn citations_for(&self, _: &str, _: usize) -> Result<Vec<Reference>, KnowledgeError> {
            std::future::pending().await
        }

        async fn all_rules_text(&self) -> Result<String, KnowledgeError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_citation_lookup_falls_back_to_rules_text() {
        let context = gather_rule_context(&SlowCitations, "overtime", Duration::from_secs(2)).await;
        assert_eq!(
            context,
            RuleContext::RulesText("Rule 2: file within 30 days".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_knowledge_base_degrades_to_summary() {
        let started = tokio::time::Instant::now();
        let context = gather_rule_context(&HungKnowledge, "overtime", Duration::from_secs(2)).await;
        assert!(context.is_degraded());
        // Two bounded lookups, then the summary.
        assert!(started.elapsed() >= Duration::from_secs(4));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
