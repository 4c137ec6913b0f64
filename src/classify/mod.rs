//! Classification stages — category, priority, sentiment.
//!
//! Each stage is polymorphic over the `Classifier` capability so the
//! underlying technique (keyword rules here, a learned model elsewhere)
//! can be swapped without touching the coordinator. The three stages are
//! independent and run concurrently; none sees another's output.
//!
//! Contract for every implementation:
//! - return exactly one label from the enumerated set plus a confidence
//!   in [0,1]
//! - never fail on well-formed text
//! - on empty/near-empty text return the default label with confidence
//!   0.0 — "undetermined", not a guess

pub mod category;
pub mod priority;
pub mod sentiment;

use serde::{Deserialize, Serialize};

use crate::extract::entities::Entity;

pub use category::KeywordCategoryClassifier;
pub use priority::KeywordPriorityAnalyzer;
pub use sentiment::LexiconSentimentAnalyzer;

// ── Labels ──────────────────────────────────────────────────────────

/// Message category. The set is fixed; the department each category maps
/// to is configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    NewContract,
    Renewal,
    Amendment,
    Cancellation,
    Payment,
    Question,
    Complaint,
    Support,
    Other,
}

impl Category {
    pub const ALL: [Category; 9] = [
        Category::NewContract,
        Category::Renewal,
        Category::Amendment,
        Category::Cancellation,
        Category::Payment,
        Category::Question,
        Category::Complaint,
        Category::Support,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewContract => "new-contract",
            Self::Renewal => "renewal",
            Self::Amendment => "amendment",
            Self::Cancellation => "cancellation",
            Self::Payment => "payment",
            Self::Question => "question",
            Self::Complaint => "complaint",
            Self::Support => "support",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Urgency level, ordered: `Low < Normal < High < Critical`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Message sentiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Negative,
    Neutral,
    Positive,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Negative => "negative",
            Self::Neutral => "neutral",
            Self::Positive => "positive",
        }
    }
}

impl std::fmt::Display for Sentiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ── Capability ──────────────────────────────────────────────────────

/// A label with its confidence score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Verdict<L> {
    pub label: L,
    /// Confidence in [0,1]; 0.0 means "undetermined".
    pub confidence: f32,
}

impl<L> Verdict<L> {
    pub fn new(label: L, confidence: f32) -> Self {
        Self {
            label,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// The undetermined verdict for empty input.
    pub fn undetermined(label: L) -> Self {
        Self {
            label,
            confidence: 0.0,
        }
    }
}

/// Input shared by all classification stages.
#[derive(Debug, Clone, Copy)]
pub struct ClassifyInput<'a> {
    /// Normalized document text (all segments joined).
    pub text: &'a str,
    /// Extracted entities, already floored.
    pub entities: &'a [Entity],
    /// Lowercased sender domain, when the sender address has one.
    pub sender_domain: Option<&'a str>,
}

/// The uniform classification capability.
pub trait Classifier<L>: Send + Sync {
    fn classify(&self, input: &ClassifyInput<'_>) -> Verdict<L>;
}

/// Whether text is too thin to classify meaningfully.
pub(crate) fn is_near_empty(text: &str) -> bool {
    text.split_whitespace().map(str::len).sum::<usize>() < 3
}

/// Count non-overlapping occurrences of a keyword in lowercased text.
pub(crate) fn count_occurrences(text: &str, keyword: &str) -> usize {
    if keyword.is_empty() {
        return 0;
    }
    text.matches(keyword).count()
}

// ── Fused result ────────────────────────────────────────────────────

/// The fused output of the three classification stages. Produced once per
/// message; immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub category: Verdict<Category>,
    pub priority: Verdict<Priority>,
    pub sentiment: Verdict<Sentiment>,
}

impl ClassificationResult {
    /// Check the classifier contract. A violation here is a programming
    /// bug in a classifier implementation, not bad input data.
    pub fn validate(&self) -> Result<(), String> {
        for (stage, confidence) in [
            ("category", self.category.confidence),
            ("priority", self.priority.confidence),
            ("sentiment", self.sentiment.confidence),
        ] {
            if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
                return Err(format!(
                    "{stage} confidence {confidence} is outside [0,1]"
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_ordering() {
        assert!(Priority::Low < Priority::Normal);
        assert!(Priority::Normal < Priority::High);
        assert!(Priority::High < Priority::Critical);
    }

    #[test]
    fn verdict_clamps_confidence() {
        assert_eq!(Verdict::new(Category::Other, 1.7).confidence, 1.0);
        assert_eq!(Verdict::new(Category::Other, -0.2).confidence, 0.0);
    }

    #[test]
    fn category_serde_snake_case() {
        let json = serde_json::to_string(&Category::NewContract).unwrap();
        assert_eq!(json, "\"new_contract\"");
    }

    #[test]
    fn near_empty_detection() {
        assert!(is_near_empty(""));
        assert!(is_near_empty("  \n "));
        assert!(is_near_empty("ok"));
        assert!(!is_near_empty("renovação do contrato"));
    }

    #[test]
    fn validate_rejects_nan_confidence() {
        let result = ClassificationResult {
            category: Verdict {
                label: Category::Renewal,
                confidence: f32::NAN,
            },
            priority: Verdict::new(Priority::Normal, 0.5),
            sentiment: Verdict::new(Sentiment::Neutral, 0.5),
        };
        assert!(result.validate().is_err());
    }

    #[test]
    fn validate_accepts_well_formed() {
        let result = ClassificationResult {
            category: Verdict::new(Category::Renewal, 0.8),
            priority: Verdict::new(Priority::High, 0.7),
            sentiment: Verdict::new(Sentiment::Neutral, 0.5),
        };
        assert!(result.validate().is_ok());
    }
}
