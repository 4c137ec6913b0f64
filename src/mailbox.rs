//! Mailbox collaborator boundary.
//!
//! The core never talks IMAP/POP3 itself — it sees only this trait.
//! Polling, auth, and redelivery semantics belong to the implementation;
//! redelivered messages are harmless because the coordinator short-circuits
//! on completed run records.

use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::MailboxError;
use crate::message::RawMessage;

/// Read side of the mailbox. `fetch_unprocessed` is restartable each poll
/// cycle and may redeliver messages already seen.
#[async_trait]
pub trait Mailbox: Send + Sync {
    /// Fetch messages not yet marked processed.
    async fn fetch_unprocessed(&self) -> Result<Vec<RawMessage>, MailboxError>;

    /// Acknowledge a message so later poll cycles stop returning it.
    async fn mark_processed(&self, message_id: &str) -> Result<(), MailboxError>;
}

/// In-memory mailbox for tests and the demo binary.
pub struct InMemoryMailbox {
    inner: Mutex<MailboxState>,
}

struct MailboxState {
    messages: Vec<RawMessage>,
    processed: HashSet<String>,
}

impl InMemoryMailbox {
    pub fn new(messages: Vec<RawMessage>) -> Self {
        Self {
            inner: Mutex::new(MailboxState {
                messages,
                processed: HashSet::new(),
            }),
        }
    }

    /// Deliver another message into the mailbox.
    pub async fn deliver(&self, message: RawMessage) {
        self.inner.lock().await.messages.push(message);
    }
}

#[async_trait]
impl Mailbox for InMemoryMailbox {
    async fn fetch_unprocessed(&self) -> Result<Vec<RawMessage>, MailboxError> {
        let state = self.inner.lock().await;
        Ok(state
            .messages
            .iter()
            .filter(|m| !state.processed.contains(&m.id))
            .cloned()
            .collect())
    }

    async fn mark_processed(&self, message_id: &str) -> Result<(), MailboxError> {
        let mut state = self.inner.lock().await;
        state.processed.insert(message_id.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn message(id: &str) -> RawMessage {
        RawMessage {
            id: id.into(),
            sender: "a@b.com".into(),
            sender_name: None,
            subject: None,
            body: "hello".into(),
            attachments: vec![],
            received_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn fetch_skips_processed() {
        let mailbox = InMemoryMailbox::new(vec![message("m-1"), message("m-2")]);
        mailbox.mark_processed("m-1").await.unwrap();

        let unprocessed = mailbox.fetch_unprocessed().await.unwrap();
        assert_eq!(unprocessed.len(), 1);
        assert_eq!(unprocessed[0].id, "m-2");
    }

    #[tokio::test]
    async fn fetch_redelivers_until_marked() {
        let mailbox = InMemoryMailbox::new(vec![message("m-1")]);
        assert_eq!(mailbox.fetch_unprocessed().await.unwrap().len(), 1);
        assert_eq!(mailbox.fetch_unprocessed().await.unwrap().len(), 1);

        mailbox.mark_processed("m-1").await.unwrap();
        assert!(mailbox.fetch_unprocessed().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delivered_messages_show_up_next_fetch() {
        let mailbox = InMemoryMailbox::new(vec![]);
        assert!(mailbox.fetch_unprocessed().await.unwrap().is_empty());

        mailbox.deliver(message("m-late")).await;
        assert_eq!(mailbox.fetch_unprocessed().await.unwrap().len(), 1);
    }
}
