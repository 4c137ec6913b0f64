//! Routing decision engine.
//!
//! A pure function of (classification, contract matches, configured
//! rules) — no side effects, deterministic for identical inputs, which is
//! what makes idempotent retries safe. Rule order:
//! (a) critical priority → escalation department, regardless of category
//! (b) otherwise category → department table
//! (c) ambiguous contract match + certainty-requiring category →
//!     manual-review department instead of a guess
//! (d) attach the single top contract match if exactly one exists
//!
//! The rationale lists every rule that fired, in evaluation order.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::classify::{ClassificationResult, Priority};
use crate::config::TriageConfig;
use crate::error::PipelineError;
use crate::matching::{ContractMatch, MatchStrategy};
use crate::pipeline::types::{RoutingDecision, Signal};

/// The decision engine. Holds only configuration — no mutable state.
pub struct RoutingDecisionEngine {
    config: Arc<TriageConfig>,
}

impl RoutingDecisionEngine {
    pub fn new(config: Arc<TriageConfig>) -> Self {
        Self { config }
    }

    /// Fuse classification and match results into one routing decision.
    ///
    /// A malformed `ClassificationResult` is a programming-contract
    /// violation and fails loudly; it is never silently defaulted.
    pub fn decide(
        &self,
        message_id: &str,
        classification: &ClassificationResult,
        matches: &[ContractMatch],
        decided_at: DateTime<Utc>,
    ) -> Result<RoutingDecision, PipelineError> {
        classification
            .validate()
            .map_err(PipelineError::ContractViolation)?;

        let category = classification.category.label;
        let mut rationale = Vec::new();

        // Match outcome signal first — it frames the routing choice.
        match matches {
            [] => {}
            [single] => rationale.push(match single.strategy {
                MatchStrategy::ExactNumber => Signal::ExactMatch,
                MatchStrategy::FuzzyNameAndDate => Signal::FuzzyMatch,
            }),
            _ => rationale.push(Signal::AmbiguousContract),
        }

        let department = if classification.priority.label == Priority::Critical {
            rationale.push(Signal::CriticalEscalation);
            self.config.priority_escalation_department.clone()
        } else if matches.len() > 1 && self.config.certainty_categories.contains(&category) {
            rationale.push(Signal::NeedsManualReview);
            self.config.manual_review_department.clone()
        } else {
            rationale.push(Signal::Category(category));
            self.config.department_for(category).to_string()
        };

        let contract_id = match matches {
            [single] => Some(single.contract_id.clone()),
            _ => None,
        };

        debug!(
            message_id,
            department = %department,
            contract = contract_id.as_deref().unwrap_or("none"),
            "Routing decision computed"
        );

        Ok(RoutingDecision {
            message_id: message_id.to_string(),
            department,
            priority: classification.priority.label,
            contract_id,
            rationale,
            decided_at,
        })
    }
}
