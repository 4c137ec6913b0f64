//! Text and entity extraction.
//!
//! Stage order within a run:
//! 1. `TextExtractor` — body + decoded attachments → tagged plain-text segments
//! 2. `LanguageDetector` — one language code for the whole document
//! 3. `EntityExtractor` — contract numbers, school names, amounts, dates
//!
//! Attachment decoding is delegated to the `AttachmentDecoder` collaborator;
//! a single attachment failing never fails the message.

pub mod entities;
pub mod language;
pub mod text;

use async_trait::async_trait;

use crate::error::DecodeError;
use crate::message::AttachmentBlob;

pub use entities::{Entity, EntityExtractor, EntityKind, EntityValue, SchoolNameIndex};
pub use language::LanguageDetector;
pub use text::{ExtractedText, SegmentSource, SkippedSource, TextExtractor, TextSegment};

/// Attachment decoder collaborator — turns a blob into plain text.
///
/// Real implementations wrap PDF/DOCX/OCR tooling; the core only needs
/// this contract.
#[async_trait]
pub trait AttachmentDecoder: Send + Sync {
    async fn decode(&self, blob: &AttachmentBlob) -> Result<String, DecodeError>;
}

/// Decoder that handles `text/*` attachments and rejects everything else.
///
/// Useful as a baseline and in tests; production deployments compose it
/// with format-specific decoders.
pub struct PlainTextDecoder;

#[async_trait]
impl AttachmentDecoder for PlainTextDecoder {
    async fn decode(&self, blob: &AttachmentBlob) -> Result<String, DecodeError> {
        if blob.media_type.starts_with("text/") {
            Ok(String::from_utf8_lossy(&blob.data).into_owned())
        } else {
            Err(DecodeError::Unsupported {
                media_type: blob.media_type.clone(),
            })
        }
    }
}
