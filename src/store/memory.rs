//! In-memory `RunStore` backed by a mutex-guarded map.
//!
//! The mutex is what makes `claim` atomic here; a database-backed store
//! would use a conditional update for the same compare-and-transition.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::StorageError;
use crate::pipeline::record::{PipelineRunRecord, RunStatus};
use crate::store::traits::{ClaimOutcome, RunStore};

/// In-memory run-record store for tests and the demo binary.
#[derive(Default)]
pub struct InMemoryRunStore {
    records: Mutex<HashMap<String, PipelineRunRecord>>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn load(&self, message_id: &str) -> Result<Option<PipelineRunRecord>, StorageError> {
        Ok(self.records.lock().await.get(message_id).cloned())
    }

    async fn save(&self, record: &PipelineRunRecord) -> Result<(), StorageError> {
        self.records
            .lock()
            .await
            .insert(record.message_id.clone(), record.clone());
        Ok(())
    }

    async fn claim(&self, message_id: &str) -> Result<ClaimOutcome, StorageError> {
        let mut records = self.records.lock().await;
        let record = records
            .entry(message_id.to_string())
            .or_insert_with(|| PipelineRunRecord::new(message_id));

        match record.status {
            RunStatus::Pending => {
                record.transition_to(RunStatus::InProgress)?;
                debug!(message_id, "Run record claimed");
                Ok(ClaimOutcome::Claimed(record.clone()))
            }
            RunStatus::InProgress => Ok(ClaimOutcome::Busy),
            RunStatus::Completed => match &record.decision {
                Some(decision) => Ok(ClaimOutcome::AlreadyCompleted(decision.clone())),
                // A completed record always carries its decision; a missing
                // one means the store itself is corrupt.
                None => Err(StorageError::Load {
                    id: message_id.to_string(),
                    reason: "completed record without a decision".into(),
                }),
            },
            RunStatus::Failed => Ok(ClaimOutcome::Exhausted(record.clone())),
        }
    }
}
