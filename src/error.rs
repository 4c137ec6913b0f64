//! Error types for the contract triage pipeline.
//!
//! The taxonomy mirrors the retry policy:
//! - per-source failures (one attachment) are *not* errors here — they are
//!   recorded as skipped sources in extraction metadata
//! - recoverable-per-run errors abort the run and feed the retry counter
//! - terminal errors mark the run `failed` without requeueing
//! - contract violations indicate a programming bug and fail loudly

use std::time::Duration;

/// Top-level error type for the triage core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Mailbox error: {0}")]
    Mailbox(#[from] MailboxError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Invalid entity pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Mailbox collaborator errors.
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("Failed to mark message {id} processed: {reason}")]
    MarkProcessed { id: String, reason: String },
}

/// Attachment decoder collaborator errors.
///
/// Both variants are recoverable per source: the extractor skips the
/// attachment and records it in extraction metadata.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Unsupported attachment format: {media_type}")]
    Unsupported { media_type: String },

    #[error("Attachment decode failed: {0}")]
    Failed(String),
}

/// Contract registry collaborator errors. Transient by nature — the
/// registry is an external service the core only reads from.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Registry lookup failed: {0}")]
    Lookup(String),

    #[error("Registry unavailable: {0}")]
    Unavailable(String),
}

/// Run-record store errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Save failed for message {id}: {reason}")]
    Save { id: String, reason: String },

    #[error("Load failed for message {id}: {reason}")]
    Load { id: String, reason: String },

    #[error("Invalid status transition for message {id}: {from} -> {to}")]
    InvalidTransition { id: String, from: String, to: String },
}

/// Pipeline stage errors, classified for the retry policy.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The message has no extractable text at all. Terminal — downstream
    /// stages cannot operate on it.
    #[error("Message {id} has no extractable text")]
    EmptyMessageBody { id: String },

    /// A collaborator call exceeded its deadline. Recoverable.
    #[error("Stage {stage} timed out after {timeout:?}")]
    StageTimeout {
        stage: &'static str,
        timeout: Duration,
    },

    /// Transient registry failure. Recoverable.
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Transient storage failure. Recoverable.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Decision delivery failure. Recoverable.
    #[error("Decision delivery failed: {0}")]
    Delivery(String),

    /// The run was cancelled at a stage checkpoint.
    #[error("Run for message {id} was cancelled")]
    Cancelled { id: String },

    /// Another worker holds the in-progress claim for this message.
    #[error("Message {id} is already being processed")]
    AlreadyInProgress { id: String },

    /// Retry ceiling reached; the record is terminally failed.
    #[error("Message {id} exhausted its retry ceiling ({ceiling})")]
    RetriesExhausted { id: String, ceiling: u32 },

    /// A stage received input that violates its contract (e.g. a
    /// confidence outside [0,1]). Programming bug — never defaulted.
    #[error("Contract violation: {0}")]
    ContractViolation(String),
}

impl PipelineError {
    /// Whether this error feeds the retry policy (requeue as `pending`
    /// until the ceiling) rather than terminating the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::StageTimeout { .. } | Self::Registry(_) | Self::Storage(_) | Self::Delivery(_)
        )
    }

    /// Whether the message's run record is terminally settled — no further
    /// attempt will change the outcome.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::EmptyMessageBody { .. }
                | Self::ContractViolation(_)
                | Self::RetriesExhausted { .. }
        )
    }
}

/// Result type alias for the triage core.
pub type Result<T> = std::result::Result<T, Error>;
