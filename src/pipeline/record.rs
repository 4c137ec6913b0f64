//! Per-message run record — the state machine enforcing exclusivity,
//! idempotency, and the retry ceiling.
//!
//! Status moves monotonically forward: `pending → in_progress →
//! {completed, failed}`, with `failed → pending` only while the retry
//! ceiling allows requeueing. A `completed` record never leaves that
//! state, which is what makes reprocessing a redelivered message a
//! short-circuit instead of a second inference pass.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StorageError;
use crate::pipeline::types::RoutingDecision;

/// Processing status of one message's pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Waiting for pickup (fresh, or requeued after a recoverable failure).
    Pending,
    /// Exclusively claimed by a worker.
    InProgress,
    /// A routing decision was emitted. Terminal.
    Completed,
    /// Failed; terminal once the retry ceiling is reached.
    Failed,
}

impl RunStatus {
    /// Check if this status may move to `target`.
    pub fn can_transition_to(&self, target: RunStatus) -> bool {
        use RunStatus::*;

        matches!(
            (self, target),
            (Pending, InProgress)
                | (InProgress, Completed)
                | (InProgress, Failed)
                // Cancellation hands the claim back without a failure.
                | (InProgress, Pending)
                // Requeue after a recoverable failure below the ceiling.
                | (Failed, Pending)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// The run record keyed by message identifier.
///
/// Invariants: at most one decision per message identifier; the status
/// only moves along `can_transition_to` edges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRunRecord {
    pub message_id: String,
    pub status: RunStatus,
    /// Stable key for this record's lifetime, distinct from the message id.
    pub idempotency_key: Uuid,
    pub retry_count: u32,
    /// Present exactly when status is `Completed`.
    pub decision: Option<RoutingDecision>,
    /// Last stage error, kept inspectable for operators.
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PipelineRunRecord {
    pub fn new(message_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            message_id: message_id.into(),
            status: RunStatus::Pending,
            idempotency_key: Uuid::new_v4(),
            retry_count: 0,
            decision: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Transition to a new status, enforcing the state machine.
    pub fn transition_to(&mut self, target: RunStatus) -> Result<(), StorageError> {
        if !self.status.can_transition_to(target) {
            return Err(StorageError::InvalidTransition {
                id: self.message_id.clone(),
                from: self.status.to_string(),
                to: target.to_string(),
            });
        }
        self.status = target;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Record the emitted decision and complete the run.
    pub fn record_decision(&mut self, decision: RoutingDecision) -> Result<(), StorageError> {
        self.transition_to(RunStatus::Completed)?;
        self.decision = Some(decision);
        self.last_error = None;
        Ok(())
    }

    /// Record a recoverable failure: increment the retry count and requeue
    /// as `pending`, unless the ceiling is passed — then the record stays
    /// `failed` with the count frozen at the ceiling.
    ///
    /// Returns the resulting status.
    pub fn record_recoverable_failure(
        &mut self,
        error: &str,
        ceiling: u32,
    ) -> Result<RunStatus, StorageError> {
        self.transition_to(RunStatus::Failed)?;
        self.last_error = Some(error.to_string());
        self.retry_count += 1;

        if self.retry_count > ceiling {
            self.retry_count = ceiling;
        } else {
            self.transition_to(RunStatus::Pending)?;
        }
        Ok(self.status)
    }

    /// Record a terminal failure: no requeue, retry count untouched.
    pub fn record_terminal_failure(&mut self, error: &str) -> Result<(), StorageError> {
        self.transition_to(RunStatus::Failed)?;
        self.last_error = Some(error.to_string());
        Ok(())
    }

    /// Hand the claim back after a cancellation — no failure, no retry.
    pub fn requeue_cancelled(&mut self) -> Result<(), StorageError> {
        self.transition_to(RunStatus::Pending)
    }
}
