//! Pipeline coordinator — orchestrates the stages per message and
//! enforces exactly-once routing.
//!
//! Flow per message:
//! 1. atomic claim on the run record (exclusive pickup, idempotent
//!    short-circuit on completed records)
//! 2. text extraction → language + entities
//! 3. the three classifiers, fanned out as independent tasks and joined
//! 4. contract matching against the registry
//! 5. routing decision, committed to the store, then delivered
//!
//! Every external-collaborator call runs under the configured timeout;
//! a timeout is a recoverable stage error feeding the retry policy.
//! Cancellation is cooperative, checked between stages.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use tracing::{debug, error, info, warn};

use crate::classify::{
    Category, ClassificationResult, Classifier, ClassifyInput, KeywordCategoryClassifier,
    KeywordPriorityAnalyzer, LexiconSentimentAnalyzer, Priority, Sentiment, Verdict,
};
use crate::config::TriageConfig;
use crate::error::{ConfigError, PipelineError, RegistryError};
use crate::extract::{
    AttachmentDecoder, EntityExtractor, LanguageDetector, SchoolNameIndex, TextExtractor,
};
use crate::mailbox::Mailbox;
use crate::matching::{ContractMatcher, ContractRegistry};
use crate::message::RawMessage;
use crate::pipeline::record::PipelineRunRecord;
use crate::pipeline::types::{ExtractedDocument, RoutingDecision};
use crate::pipeline::DecisionSink;
use crate::store::{ClaimOutcome, RunStore};

/// External collaborators the coordinator reaches through narrow traits.
#[derive(Clone)]
pub struct CoordinatorDeps {
    pub decoder: Arc<dyn AttachmentDecoder>,
    pub registry: Arc<dyn ContractRegistry>,
    pub store: Arc<dyn RunStore>,
    pub sink: Arc<dyn DecisionSink>,
}

/// Per-message pipeline orchestration.
pub struct PipelineCoordinator {
    config: Arc<TriageConfig>,
    text_extractor: TextExtractor,
    entity_extractor: EntityExtractor,
    category: Arc<dyn Classifier<Category>>,
    priority: Arc<dyn Classifier<Priority>>,
    sentiment: Arc<dyn Classifier<Sentiment>>,
    matcher: ContractMatcher,
    engine: crate::routing::RoutingDecisionEngine,
    deps: CoordinatorDeps,
    cancel: Arc<AtomicBool>,
}

impl PipelineCoordinator {
    /// Build a coordinator with the default rule-based classifier stack.
    pub fn new(config: Arc<TriageConfig>, deps: CoordinatorDeps) -> Result<Self, ConfigError> {
        config.validate()?;
        let category: Arc<dyn Classifier<Category>> =
            Arc::new(KeywordCategoryClassifier::default_rules());
        let priority: Arc<dyn Classifier<Priority>> =
            Arc::new(KeywordPriorityAnalyzer::from_config(&config));
        let sentiment: Arc<dyn Classifier<Sentiment>> = Arc::new(LexiconSentimentAnalyzer::new());
        Self::with_classifiers(config, deps, category, priority, sentiment)
    }

    /// Build a coordinator with custom classifier implementations — the
    /// seam for swapping rule-based stages for learned ones.
    pub fn with_classifiers(
        config: Arc<TriageConfig>,
        deps: CoordinatorDeps,
        category: Arc<dyn Classifier<Category>>,
        priority: Arc<dyn Classifier<Priority>>,
        sentiment: Arc<dyn Classifier<Sentiment>>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            text_extractor: TextExtractor::new(
                Arc::clone(&deps.decoder),
                config.collaborator_timeout,
            ),
            entity_extractor: EntityExtractor::new(&config)?,
            matcher: ContractMatcher::new(config.fuzzy_match_floor),
            engine: crate::routing::RoutingDecisionEngine::new(Arc::clone(&config)),
            category,
            priority,
            sentiment,
            deps,
            cancel: Arc::new(AtomicBool::new(false)),
            config,
        })
    }

    /// Cooperative cancellation flag. Setting it stops in-flight runs at
    /// their next stage checkpoint; emitted decisions are unaffected.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Process one message through the full pipeline.
    ///
    /// Exactly-once: a completed record short-circuits with the stored
    /// decision; a concurrent claim returns `AlreadyInProgress`; failures
    /// feed the retry policy until the configured ceiling.
    pub async fn process(&self, message: &RawMessage) -> Result<RoutingDecision, PipelineError> {
        let mut record = match self.deps.store.claim(&message.id).await? {
            ClaimOutcome::Claimed(record) => record,
            ClaimOutcome::AlreadyCompleted(decision) => {
                info!(id = %message.id, "Already completed — returning stored decision");
                return Ok(decision);
            }
            ClaimOutcome::Busy => {
                return Err(PipelineError::AlreadyInProgress {
                    id: message.id.clone(),
                });
            }
            ClaimOutcome::Exhausted(_) => {
                return Err(PipelineError::RetriesExhausted {
                    id: message.id.clone(),
                    ceiling: self.config.max_retry_count,
                });
            }
        };

        info!(
            id = %message.id,
            sender = %message.sender,
            attempt = record.retry_count + 1,
            "Processing message"
        );

        match self.run_stages(message).await {
            Ok(decision) => {
                record.record_decision(decision.clone())?;
                self.deps.store.save(&record).await?;

                // The decision is committed; delivery failures are the
                // delivery collaborator's to retry.
                if let Err(e) = self.deps.sink.deliver(&decision).await {
                    warn!(id = %message.id, error = %e, "Decision delivery failed");
                }

                info!(
                    id = %message.id,
                    department = %decision.department,
                    priority = %decision.priority,
                    "Message routed"
                );
                Ok(decision)
            }
            Err(err) => {
                self.record_failure(&mut record, &err).await;
                Err(err)
            }
        }
    }

    /// Process a batch of messages. Failures on individual messages are
    /// logged but do not fail the batch.
    pub async fn process_batch(&self, messages: &[RawMessage]) -> Vec<RoutingDecision> {
        let mut decisions = Vec::with_capacity(messages.len());
        for message in messages {
            match self.process(message).await {
                Ok(decision) => decisions.push(decision),
                Err(e) => error!(id = %message.id, error = %e, "Failed to process message"),
            }
        }
        decisions
    }

    /// Process one message, retrying recoverable failures in place with
    /// jittered exponential backoff until the record goes terminal.
    pub async fn process_with_retries(
        &self,
        message: &RawMessage,
    ) -> Result<RoutingDecision, PipelineError> {
        let mut attempt: u32 = 0;
        loop {
            match self.process(message).await {
                Ok(decision) => return Ok(decision),
                Err(err) if err.is_recoverable() && attempt < self.config.max_retry_count => {
                    attempt += 1;
                    let delay = retry_delay(attempt);
                    debug!(
                        id = %message.id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying after recoverable failure"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// One poll cycle: fetch unprocessed messages, run them as parallel
    /// independent pipelines, acknowledge the ones whose record reached a
    /// terminal state. Run-record claims keep concurrent runs for the
    /// same message id exclusive.
    pub async fn poll_once(&self, mailbox: &dyn Mailbox) -> Vec<RoutingDecision> {
        let messages = match mailbox.fetch_unprocessed().await {
            Ok(messages) => messages,
            Err(e) => {
                error!(error = %e, "Mailbox fetch failed");
                return Vec::new();
            }
        };

        if messages.is_empty() {
            return Vec::new();
        }
        info!(count = messages.len(), "Fetched unprocessed messages");

        let results = futures::future::join_all(
            messages
                .iter()
                .map(|message| async move { (message, self.process(message).await) }),
        )
        .await;

        let mut decisions = Vec::new();
        for (message, result) in results {
            let terminal = match result {
                Ok(decision) => {
                    decisions.push(decision);
                    true
                }
                Err(e) => {
                    error!(id = %message.id, error = %e, "Failed to process message");
                    // Busy and cancelled runs stay in the mailbox; only a
                    // settled record stops redelivery.
                    e.is_terminal()
                }
            };

            if terminal && let Err(e) = mailbox.mark_processed(&message.id).await {
                warn!(id = %message.id, error = %e, "Failed to acknowledge message");
            }
        }
        decisions
    }

    // ── Stages ──────────────────────────────────────────────────────

    async fn run_stages(&self, message: &RawMessage) -> Result<RoutingDecision, PipelineError> {
        // Stage 1: text extraction.
        let extracted = self.text_extractor.extract(message).await?;
        self.checkpoint(&message.id)?;

        // Stage 2: language + entities. The known-names index is a
        // registry lookup capability, fetched fresh each run.
        let language = LanguageDetector.detect(&extracted.segments);
        let names = self
            .with_timeout("known-school-names", self.deps.registry.known_school_names())
            .await??;
        let entities = self
            .entity_extractor
            .extract(&extracted.segments, &SchoolNameIndex::new(names));

        let document = ExtractedDocument {
            message_id: message.id.clone(),
            segments: extracted.segments,
            language,
            entities,
            skipped_sources: extracted.skipped,
        };
        debug!(
            id = %message.id,
            language = document.language.as_deref().unwrap_or("unknown"),
            entities = document.entities.len(),
            skipped = document.skipped_sources.len(),
            "Document extracted"
        );
        self.checkpoint(&message.id)?;

        // Stage 3: classifier fan-out — three independent tasks over the
        // shared read-only document, joined before matching begins.
        let classification = self.classify(message, &document).await?;
        self.checkpoint(&message.id)?;

        // Stage 4: contract matching.
        let matches = self
            .with_timeout(
                "contract-match",
                self.matcher
                    .match_contracts(&document.entities, self.deps.registry.as_ref()),
            )
            .await??;
        self.checkpoint(&message.id)?;

        // Stage 5: routing decision.
        self.engine
            .decide(&message.id, &classification, &matches, Utc::now())
    }

    async fn classify(
        &self,
        message: &RawMessage,
        document: &ExtractedDocument,
    ) -> Result<ClassificationResult, PipelineError> {
        let text = Arc::new(document.full_text());
        let entities = Arc::new(document.entities.clone());
        let sender_domain = Arc::new(message.sender_domain());

        let category = spawn_classifier(
            Arc::clone(&self.category),
            Arc::clone(&text),
            Arc::clone(&entities),
            Arc::clone(&sender_domain),
        );
        let priority = spawn_classifier(
            Arc::clone(&self.priority),
            Arc::clone(&text),
            Arc::clone(&entities),
            Arc::clone(&sender_domain),
        );
        let sentiment = spawn_classifier(
            Arc::clone(&self.sentiment),
            Arc::clone(&text),
            Arc::clone(&entities),
            Arc::clone(&sender_domain),
        );

        let (category, priority, sentiment) = tokio::join!(category, priority, sentiment);

        Ok(ClassificationResult {
            category: join_verdict(category)?,
            priority: join_verdict(priority)?,
            sentiment: join_verdict(sentiment)?,
        })
    }

    fn checkpoint(&self, message_id: &str) -> Result<(), PipelineError> {
        if self.cancel.load(Ordering::Relaxed) {
            return Err(PipelineError::Cancelled {
                id: message_id.to_string(),
            });
        }
        Ok(())
    }

    async fn with_timeout<T>(
        &self,
        stage: &'static str,
        fut: impl Future<Output = Result<T, RegistryError>>,
    ) -> Result<Result<T, PipelineError>, PipelineError> {
        match tokio::time::timeout(self.config.collaborator_timeout, fut).await {
            Ok(result) => Ok(result.map_err(PipelineError::from)),
            Err(_) => Err(PipelineError::StageTimeout {
                stage,
                timeout: self.config.collaborator_timeout,
            }),
        }
    }

    async fn record_failure(&self, record: &mut PipelineRunRecord, err: &PipelineError) {
        let bookkeeping = match err {
            PipelineError::Cancelled { .. } => {
                debug!(id = %record.message_id, "Run cancelled — handing claim back");
                record.requeue_cancelled()
            }
            e if e.is_recoverable() => record
                .record_recoverable_failure(&e.to_string(), self.config.max_retry_count)
                .map(|status| {
                    warn!(
                        id = %record.message_id,
                        retry_count = record.retry_count,
                        status = %status,
                        error = %e,
                        "Recoverable stage failure"
                    );
                }),
            e => record.record_terminal_failure(&e.to_string()).map(|()| {
                error!(
                    id = %record.message_id,
                    error = %e,
                    "Terminal failure — message needs operator attention"
                );
            }),
        };

        if let Err(transition_err) = bookkeeping {
            error!(
                id = %record.message_id,
                error = %transition_err,
                "Failed to update run record status"
            );
        }
        if let Err(save_err) = self.deps.store.save(record).await {
            error!(
                id = %record.message_id,
                error = %save_err,
                "Failed to persist run record"
            );
        }
    }
}

fn spawn_classifier<L: Send + 'static>(
    classifier: Arc<dyn Classifier<L>>,
    text: Arc<String>,
    entities: Arc<Vec<crate::extract::entities::Entity>>,
    sender_domain: Arc<Option<String>>,
) -> tokio::task::JoinHandle<Verdict<L>> {
    tokio::spawn(async move {
        let input = ClassifyInput {
            text: &text,
            entities: &entities,
            sender_domain: sender_domain.as_deref(),
        };
        classifier.classify(&input)
    })
}

fn join_verdict<L>(
    joined: Result<Verdict<L>, tokio::task::JoinError>,
) -> Result<Verdict<L>, PipelineError> {
    joined.map_err(|e| PipelineError::ContractViolation(format!("classifier task failed: {e}")))
}

/// Exponential backoff with jitter for in-place retries.
fn retry_delay(attempt: u32) -> Duration {
    let base_ms = 250u64.saturating_mul(1 << attempt.min(6));
    let jitter = rand::thread_rng().gen_range(0..base_ms / 2 + 1);
    Duration::from_millis(base_ms + jitter)
}
