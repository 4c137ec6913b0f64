//! The triage pipeline.
//!
//! Per message, data flows strictly downstream:
//! raw message → text extraction → {entities, language} →
//! {category, priority, sentiment} (concurrent) → contract matching →
//! routing decision. The coordinator owns ordering, idempotency, and the
//! retry policy; no component calls back upstream.

pub mod coordinator;
pub mod record;
pub mod types;

use async_trait::async_trait;
use tracing::info;

use crate::error::PipelineError;

pub use coordinator::{CoordinatorDeps, PipelineCoordinator};
pub use record::{PipelineRunRecord, RunStatus};
pub use types::{ExtractedDocument, RoutingDecision, Signal};

/// Notification/routing-delivery collaborator — consumes emitted
/// decisions. Delivery mechanics (forwarding, auto-replies, webhooks)
/// live behind this boundary.
#[async_trait]
pub trait DecisionSink: Send + Sync {
    async fn deliver(&self, decision: &RoutingDecision) -> Result<(), PipelineError>;
}

/// Sink that only logs — the default when no delivery collaborator is
/// wired in.
pub struct LoggingSink;

#[async_trait]
impl DecisionSink for LoggingSink {
    async fn deliver(&self, decision: &RoutingDecision) -> Result<(), PipelineError> {
        info!(
            message_id = %decision.message_id,
            department = %decision.department,
            priority = %decision.priority,
            contract = decision.contract_id.as_deref().unwrap_or("none"),
            "Routing decision delivered"
        );
        Ok(())
    }
}
