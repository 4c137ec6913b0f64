//! Priority analysis.
//!
//! Two escalation signals feed the level: configured escalation keywords
//! in the text, and configured sender domains (legal/compliance desks
//! default to at least `High`). When the signals disagree the configured
//! precedence decides; either signal alone always applies.

use tracing::debug;

use crate::classify::{Classifier, ClassifyInput, Priority, Verdict, count_occurrences, is_near_empty};
use crate::config::{EscalationPrecedence, TriageConfig};

/// Keyword count at which a message is considered critical rather than
/// merely high priority.
const CRITICAL_KEYWORD_HITS: usize = 3;

/// Keyword and sender-domain priority analyzer.
pub struct KeywordPriorityAnalyzer {
    escalation_keywords: Vec<String>,
    escalation_domains: Vec<String>,
    precedence: EscalationPrecedence,
    default: Priority,
}

impl KeywordPriorityAnalyzer {
    pub fn from_config(config: &TriageConfig) -> Self {
        Self {
            escalation_keywords: config
                .escalation_keywords
                .iter()
                .map(|k| k.to_lowercase())
                .collect(),
            escalation_domains: config
                .escalation_sender_domains
                .iter()
                .map(|d| d.trim_start_matches('@').to_lowercase())
                .collect(),
            precedence: config.escalation_precedence,
            default: Priority::Normal,
        }
    }

    fn keyword_level(&self, text: &str) -> Option<(Priority, usize)> {
        let hits: usize = self
            .escalation_keywords
            .iter()
            .map(|k| count_occurrences(text, k))
            .sum();
        match hits {
            0 => None,
            h if h >= CRITICAL_KEYWORD_HITS => Some((Priority::Critical, h)),
            h => Some((Priority::High, h)),
        }
    }

    fn sender_level(&self, domain: Option<&str>) -> Option<Priority> {
        let domain = domain?;
        self.escalation_domains
            .iter()
            .any(|d| domain == d || domain.ends_with(&format!(".{d}")))
            .then_some(Priority::High)
    }
}

impl Classifier<Priority> for KeywordPriorityAnalyzer {
    fn classify(&self, input: &ClassifyInput<'_>) -> Verdict<Priority> {
        if is_near_empty(input.text) {
            return Verdict::undetermined(self.default);
        }

        let text = input.text.to_lowercase();
        let keyword = self.keyword_level(&text);
        let sender = self.sender_level(input.sender_domain);

        let verdict = match (keyword, sender) {
            (None, None) => Verdict::new(self.default, 0.5),
            (Some((level, hits)), None) => Verdict::new(level, hit_confidence(hits)),
            (None, Some(level)) => Verdict::new(level, 0.7),
            (Some((kw_level, hits)), Some(sender_level)) => match self.precedence {
                EscalationPrecedence::KeywordWins => Verdict::new(kw_level, hit_confidence(hits)),
                EscalationPrecedence::SenderWins => Verdict::new(sender_level, 0.7),
                EscalationPrecedence::HighestWins => {
                    Verdict::new(kw_level.max(sender_level), hit_confidence(hits).max(0.7))
                }
            },
        };

        debug!(
            priority = %verdict.label,
            confidence = verdict.confidence,
            "Priority analyzed"
        );
        verdict
    }
}

fn hit_confidence(hits: usize) -> f32 {
    (0.6 + 0.1 * hits as f32).min(0.9)
}
