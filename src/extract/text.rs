//! Text extraction — normalizes body and attachment text into tagged
//! plain-text segments.
//!
//! Markup is stripped with paragraph boundaries preserved; quoted reply
//! chains are removed from the body. A failing attachment decoder skips
//! that source and records it — only a message with no extractable text
//! anywhere is an error.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::PipelineError;
use crate::extract::AttachmentDecoder;
use crate::message::RawMessage;

/// Where a text segment came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", content = "index", rename_all = "snake_case")]
pub enum SegmentSource {
    Body,
    Attachment(usize),
}

/// One normalized text segment with its provenance tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextSegment {
    pub source: SegmentSource,
    pub text: String,
}

/// Extraction metadata for a source that was skipped, not failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedSource {
    /// Attachment index within the message.
    pub index: usize,
    /// Declared media type of the skipped attachment.
    pub media_type: String,
    /// Why it was skipped.
    pub reason: String,
}

/// Output of the text extraction stage.
#[derive(Debug, Clone)]
pub struct ExtractedText {
    pub segments: Vec<TextSegment>,
    pub skipped: Vec<SkippedSource>,
}

/// Text extraction stage.
pub struct TextExtractor {
    decoder: Arc<dyn AttachmentDecoder>,
    decode_timeout: Duration,
}

impl TextExtractor {
    pub fn new(decoder: Arc<dyn AttachmentDecoder>, decode_timeout: Duration) -> Self {
        Self {
            decoder,
            decode_timeout,
        }
    }

    /// Extract normalized text segments from a message.
    ///
    /// Decoder errors skip the attachment; a decoder *timeout* aborts the
    /// run as recoverable, since the collaborator may just be slow.
    pub async fn extract(&self, message: &RawMessage) -> Result<ExtractedText, PipelineError> {
        let mut segments = Vec::new();
        let mut skipped = Vec::new();

        let body = normalize_body(message.subject.as_deref(), &message.body);
        if !body.is_empty() {
            segments.push(TextSegment {
                source: SegmentSource::Body,
                text: body,
            });
        }

        for (index, blob) in message.attachments.iter().enumerate() {
            let decoded = tokio::time::timeout(self.decode_timeout, self.decoder.decode(blob))
                .await
                .map_err(|_| PipelineError::StageTimeout {
                    stage: "attachment-decode",
                    timeout: self.decode_timeout,
                })?;

            match decoded {
                Ok(text) => {
                    let text = strip_markup(&text);
                    if !text.is_empty() {
                        segments.push(TextSegment {
                            source: SegmentSource::Attachment(index),
                            text,
                        });
                    }
                }
                Err(e) => {
                    debug!(
                        id = %message.id,
                        index,
                        media_type = %blob.media_type,
                        error = %e,
                        "Skipping attachment"
                    );
                    skipped.push(SkippedSource {
                        index,
                        media_type: blob.media_type.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        if segments.is_empty() {
            return Err(PipelineError::EmptyMessageBody {
                id: message.id.clone(),
            });
        }

        Ok(ExtractedText { segments, skipped })
    }
}

/// Normalize the body segment: subject line joined in (it regularly
/// carries the contract number), markup stripped, quoted reply chain
/// removed.
fn normalize_body(subject: Option<&str>, body: &str) -> String {
    let cleaned = strip_markup(&strip_quoted_text(body));
    match subject {
        Some(s) if !s.trim().is_empty() => {
            let subject_line = format!("Subject: {}", s.trim());
            if cleaned.is_empty() {
                subject_line
            } else {
                format!("{subject_line}\n\n{cleaned}")
            }
        }
        _ => cleaned,
    }
}

/// Strip quoted text from an email body.
///
/// Removes lines starting with `>`, "On ... wrote:" attribution lines,
/// and everything after an "Original Message" separator.
pub fn strip_quoted_text(body: &str) -> String {
    let mut result = Vec::new();

    for line in body.lines() {
        let trimmed = line.trim();

        if trimmed.starts_with('>') {
            continue;
        }

        if trimmed.starts_with("On ") && trimmed.ends_with("wrote:") {
            break;
        }

        if trimmed.starts_with("---") && trimmed.contains("Original Message") {
            break;
        }

        result.push(line);
    }

    while result.last().is_some_and(|l| l.trim().is_empty()) {
        result.pop();
    }

    result.join("\n")
}

static BLOCK_BOUNDARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<(?:br\s*/?|/p|/div|/li|/tr|/h[1-6]|/blockquote|/table)>").unwrap()
});

static HTML_HINT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</?(?:p|br|div|html|body|span|td|li|h[1-6])\b").unwrap());

/// Strip markup from text, preserving paragraph boundaries.
///
/// Plain text passes through with paragraphs re-flowed; HTML gets block
/// closers converted to paragraph breaks before tags are dropped.
pub fn strip_markup(input: &str) -> String {
    if !HTML_HINT.is_match(input) {
        return reflow_paragraphs(input);
    }

    let with_breaks = BLOCK_BOUNDARY.replace_all(input, "\n\n");

    let mut stripped = String::with_capacity(with_breaks.len());
    let mut in_tag = false;
    for ch in with_breaks.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => stripped.push(ch),
            _ => {}
        }
    }

    reflow_paragraphs(&decode_entities(&stripped))
}

/// Collapse whitespace within paragraphs, keeping blank-line boundaries.
fn reflow_paragraphs(text: &str) -> String {
    let mut paragraphs = Vec::new();
    let mut current = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join(" "));
                current = Vec::new();
            }
        } else {
            current.extend(line.split_whitespace().map(String::from));
        }
    }
    if !current.is_empty() {
        paragraphs.push(current.join(" "));
    }

    paragraphs.join("\n\n")
}

/// Decode the handful of HTML entities that show up in email bodies.
fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::error::DecodeError;
    use crate::extract::PlainTextDecoder;
    use crate::message::AttachmentBlob;

    fn message(body: &str, attachments: Vec<AttachmentBlob>) -> RawMessage {
        RawMessage {
            id: "m-1".into(),
            sender: "maria@escola.edu.br".into(),
            sender_name: None,
            subject: None,
            body: body.into(),
            attachments,
            received_at: Utc::now(),
        }
    }

    fn extractor() -> TextExtractor {
        TextExtractor::new(Arc::new(PlainTextDecoder), Duration::from_secs(5))
    }

    fn text_attachment(content: &str) -> AttachmentBlob {
        AttachmentBlob {
            filename: Some("anexo.txt".into()),
            media_type: "text/plain".into(),
            data: content.as_bytes().to_vec(),
        }
    }

    fn image_attachment() -> AttachmentBlob {
        AttachmentBlob {
            filename: Some("scan.png".into()),
            media_type: "image/png".into(),
            data: vec![0x89, 0x50, 0x4e, 0x47],
        }
    }

    // ── strip/normalize helpers ─────────────────────────────────────

    #[test]
    fn strip_markup_plain_text_reflows() {
        let input = "Primeira linha\nsegunda linha\n\nNovo paragrafo";
        assert_eq!(
            strip_markup(input),
            "Primeira linha segunda linha\n\nNovo paragrafo"
        );
    }

    #[test]
    fn strip_markup_html_preserves_paragraphs() {
        let input = "<html><body><p>Prezados,</p><p>Solicito a renovacao.</p><br>Atenciosamente</body></html>";
        let out = strip_markup(input);
        assert!(out.starts_with("Prezados,"));
        assert!(out.contains("\n\n"));
        assert!(!out.contains('<'));
    }

    #[test]
    fn strip_markup_decodes_common_entities() {
        let out = strip_markup("<p>Valor &amp; prazo&nbsp;final</p>");
        assert_eq!(out, "Valor & prazo final");
    }

    #[test]
    fn strip_markup_leaves_angle_math_alone_in_plain_text() {
        let input = "o valor a < b permanece";
        assert_eq!(strip_markup(input), input);
    }

    #[test]
    fn strip_quoted_removes_reply_chain() {
        let body = "Segue em anexo.\n\nOn Mon, Jan 5 2026 Maria wrote:\n> mensagem antiga";
        assert_eq!(strip_quoted_text(body), "Segue em anexo.");
    }

    #[test]
    fn strip_quoted_removes_quote_lines() {
        let body = "Ok, de acordo.\n> trecho citado\nObrigado";
        assert_eq!(strip_quoted_text(body), "Ok, de acordo.\nObrigado");
    }

    // ── extraction ──────────────────────────────────────────────────

    #[tokio::test]
    async fn body_becomes_first_segment() {
        let msg = message("Corpo do email", vec![text_attachment("texto do anexo")]);
        let extracted = extractor().extract(&msg).await.unwrap();

        assert_eq!(extracted.segments.len(), 2);
        assert_eq!(extracted.segments[0].source, SegmentSource::Body);
        assert_eq!(extracted.segments[1].source, SegmentSource::Attachment(0));
        assert!(extracted.skipped.is_empty());
    }

    #[tokio::test]
    async fn unsupported_attachment_is_skipped_not_fatal() {
        let msg = message("Corpo presente", vec![image_attachment()]);
        let extracted = extractor().extract(&msg).await.unwrap();

        assert_eq!(extracted.segments.len(), 1);
        assert_eq!(extracted.skipped.len(), 1);
        assert_eq!(extracted.skipped[0].index, 0);
        assert_eq!(extracted.skipped[0].media_type, "image/png");
    }

    #[tokio::test]
    async fn subject_joins_body_segment() {
        let mut msg = message("Segue a solicitação.", vec![]);
        msg.subject = Some("Renovação contrato 2024-0452".into());
        let extracted = extractor().extract(&msg).await.unwrap();

        assert_eq!(extracted.segments.len(), 1);
        assert!(
            extracted.segments[0]
                .text
                .starts_with("Subject: Renovação contrato 2024-0452")
        );
        assert!(extracted.segments[0].text.contains("Segue a solicitação."));
    }

    #[tokio::test]
    async fn subject_alone_is_extractable() {
        let mut msg = message("", vec![]);
        msg.subject = Some("Cancelamento urgente".into());
        let extracted = extractor().extract(&msg).await.unwrap();
        assert_eq!(extracted.segments.len(), 1);
        assert_eq!(extracted.segments[0].text, "Subject: Cancelamento urgente");
    }

    #[tokio::test]
    async fn empty_everything_is_terminal() {
        let msg = message("   \n  ", vec![image_attachment()]);
        let err = extractor().extract(&msg).await.unwrap_err();
        assert!(matches!(err, PipelineError::EmptyMessageBody { .. }));
    }

    #[tokio::test]
    async fn attachment_text_survives_empty_body() {
        let msg = message("", vec![text_attachment("apenas o anexo tem texto")]);
        let extracted = extractor().extract(&msg).await.unwrap();
        assert_eq!(extracted.segments.len(), 1);
        assert_eq!(extracted.segments[0].source, SegmentSource::Attachment(0));
    }

    #[tokio::test]
    async fn slow_decoder_times_out_as_recoverable() {
        struct SlowDecoder;

        #[async_trait::async_trait]
        impl AttachmentDecoder for SlowDecoder {
            async fn decode(
                &self,
                _blob: &crate::message::AttachmentBlob,
            ) -> Result<String, DecodeError> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(String::new())
            }
        }

        let slow = TextExtractor::new(Arc::new(SlowDecoder), Duration::from_millis(20));
        let msg = message("corpo", vec![text_attachment("x")]);
        let err = slow.extract(&msg).await.unwrap_err();
        assert!(matches!(err, PipelineError::StageTimeout { .. }));
        assert!(err.is_recoverable());
    }
}
