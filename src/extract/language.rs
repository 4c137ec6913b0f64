//! Language detection over extracted text segments.
//!
//! One language code is assigned to the whole document: majority vote
//! across segments weighted by segment length, ties broken in favor of
//! the body segment's language.

use std::collections::HashMap;

use tracing::debug;
use whatlang::Lang;

use crate::extract::text::{SegmentSource, TextSegment};

/// Language detection stage. Stateless — whatlang does the per-segment work.
pub struct LanguageDetector;

impl LanguageDetector {
    /// Detect the document language as an ISO 639-3 code (e.g. `por`).
    ///
    /// Returns `None` when no segment yields a detection at all.
    pub fn detect(&self, segments: &[TextSegment]) -> Option<String> {
        let mut weights: HashMap<Lang, usize> = HashMap::new();
        let mut body_lang = None;

        for segment in segments {
            let Some(info) = whatlang::detect(&segment.text) else {
                continue;
            };
            *weights.entry(info.lang()).or_default() += segment.text.len();
            if segment.source == SegmentSource::Body && body_lang.is_none() {
                body_lang = Some(info.lang());
            }
        }

        let max_weight = *weights.values().max()?;
        let mut leaders: Vec<Lang> = weights
            .iter()
            .filter(|(_, w)| **w == max_weight)
            .map(|(lang, _)| *lang)
            .collect();

        let winner = if leaders.len() == 1 {
            leaders[0]
        } else if let Some(body) = body_lang.filter(|b| leaders.contains(b)) {
            body
        } else {
            // No body vote among the leaders — pick deterministically.
            leaders.sort_by_key(|l| l.code());
            leaders[0]
        };

        debug!(lang = winner.code(), "Detected document language");
        Some(winner.code().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(text: &str) -> TextSegment {
        TextSegment {
            source: SegmentSource::Body,
            text: text.into(),
        }
    }

    fn attachment(index: usize, text: &str) -> TextSegment {
        TextSegment {
            source: SegmentSource::Attachment(index),
            text: text.into(),
        }
    }

    #[test]
    fn detects_portuguese_body() {
        let segments = vec![body(
            "Prezados, solicito a renovação do contrato da escola municipal. \
             O contrato atual vence no próximo mês e gostaríamos de renová-lo.",
        )];
        assert_eq!(LanguageDetector.detect(&segments).as_deref(), Some("por"));
    }

    #[test]
    fn longer_segment_outweighs_shorter() {
        let segments = vec![
            body("Ok."),
            attachment(
                0,
                "This supplementary agreement describes the terms and conditions \
                 under which the school software services will continue to be \
                 provided for the following contractual year, including pricing.",
            ),
        ];
        assert_eq!(LanguageDetector.detect(&segments).as_deref(), Some("eng"));
    }

    #[test]
    fn empty_segments_detect_nothing() {
        assert!(LanguageDetector.detect(&[]).is_none());
    }
}
