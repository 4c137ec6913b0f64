//! Inbound message types.
//!
//! `RawMessage` is the immutable input to the pipeline. It is normally
//! created by the mailbox collaborator; `RawMessage::from_rfc822` covers
//! the common case of a raw MIME payload.

use chrono::{DateTime, Utc};
use mail_parser::{MessageParser, MimeHeaders};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An undecoded attachment as received, with its declared media type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentBlob {
    /// Declared filename, if any.
    pub filename: Option<String>,
    /// Declared media type, e.g. `application/pdf`.
    pub media_type: String,
    /// Raw attachment bytes.
    pub data: Vec<u8>,
}

/// One inbound email, exactly as the mailbox collaborator delivered it.
/// Never mutated by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMessage {
    /// Stable unique message identifier (Message-ID or generated UUID).
    pub id: String,
    /// Sender address.
    pub sender: String,
    /// Human-readable sender name, if available.
    pub sender_name: Option<String>,
    /// Subject line.
    pub subject: Option<String>,
    /// Message body (plain text or HTML).
    pub body: String,
    /// Ordered attachment blobs.
    pub attachments: Vec<AttachmentBlob>,
    /// When the message was received.
    pub received_at: DateTime<Utc>,
}

impl RawMessage {
    /// The domain part of the sender address, lowercased.
    pub fn sender_domain(&self) -> Option<String> {
        self.sender
            .rsplit_once('@')
            .map(|(_, domain)| domain.to_lowercase())
    }

    /// Parse a raw RFC-822 payload into a `RawMessage`.
    ///
    /// Returns `None` when the payload is not parseable as an email at all.
    /// Falls back to a generated UUID when the Message-ID header is absent.
    pub fn from_rfc822(raw: &[u8], received_at: DateTime<Utc>) -> Option<Self> {
        let parsed = MessageParser::default().parse(raw)?;

        let sender = parsed
            .from()
            .and_then(|addr| addr.first())
            .and_then(|a| a.address())
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown".into());

        let sender_name = parsed
            .from()
            .and_then(|addr| addr.first())
            .and_then(|a| a.name())
            .map(|s| s.to_string());

        let subject = parsed.subject().map(|s| s.to_string());

        // Prefer the plain-text body; fall back to raw HTML (the text
        // extractor strips markup downstream).
        let body = parsed
            .body_text(0)
            .map(|t| t.to_string())
            .or_else(|| parsed.body_html(0).map(|h| h.to_string()))
            .unwrap_or_default();

        let attachments = parsed
            .attachments()
            .map(|part| {
                let media_type = MimeHeaders::content_type(part)
                    .map(|ct| match ct.subtype() {
                        Some(sub) => format!("{}/{}", ct.ctype(), sub),
                        None => ct.ctype().to_string(),
                    })
                    .unwrap_or_else(|| "application/octet-stream".into());
                AttachmentBlob {
                    filename: MimeHeaders::attachment_name(part).map(|s| s.to_string()),
                    media_type,
                    data: part.contents().to_vec(),
                }
            })
            .collect();

        let id = parsed
            .message_id()
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("gen-{}", Uuid::new_v4()));

        Some(Self {
            id,
            sender,
            sender_name,
            subject,
            body,
            attachments,
            received_at,
        })
    }
}
