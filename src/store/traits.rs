//! `RunStore` trait — the persistence collaborator contract.
//!
//! The core depends only on load/save plus `claim`, the single
//! compare-and-transition primitive that makes pickup exclusive and
//! completed runs idempotent. The storage engine behind it is not this
//! crate's concern.

use async_trait::async_trait;

use crate::error::StorageError;
use crate::pipeline::record::PipelineRunRecord;
use crate::pipeline::types::RoutingDecision;

/// Outcome of an atomic claim on a message's run record.
#[derive(Debug, Clone)]
pub enum ClaimOutcome {
    /// The record is now exclusively `in_progress` for this caller.
    Claimed(PipelineRunRecord),
    /// A decision already exists — return it without re-running inference.
    AlreadyCompleted(RoutingDecision),
    /// Another worker holds the in-progress claim.
    Busy,
    /// The record is terminally failed; do not retry.
    Exhausted(PipelineRunRecord),
}

/// Persistence collaborator for pipeline run records.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Load the record for a message, if one exists.
    async fn load(&self, message_id: &str) -> Result<Option<PipelineRunRecord>, StorageError>;

    /// Persist a record, replacing any previous version.
    async fn save(&self, record: &PipelineRunRecord) -> Result<(), StorageError>;

    /// Atomically claim a message for processing.
    ///
    /// Creates a `pending` record if none exists, then applies the single
    /// compare-and-transition: `pending → in_progress` claims; any other
    /// state reports why the claim is unavailable.
    async fn claim(&self, message_id: &str) -> Result<ClaimOutcome, StorageError>;
}
