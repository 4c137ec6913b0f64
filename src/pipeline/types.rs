//! Shared types for the triage pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classify::{Category, Priority};
use crate::extract::entities::Entity;
use crate::extract::text::{SkippedSource, TextSegment};

// ── Extracted document ──────────────────────────────────────────────

/// Everything extraction produced for one message. Owned by the pipeline
/// run that created it; discarded after the run unless a collaborator
/// persists it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedDocument {
    pub message_id: String,
    /// Normalized text segments in source order.
    pub segments: Vec<TextSegment>,
    /// Detected document language (ISO 639-3), if any.
    pub language: Option<String>,
    /// Floored entity candidates in document order.
    pub entities: Vec<Entity>,
    /// Sources skipped during extraction (per-attachment failures).
    pub skipped_sources: Vec<SkippedSource>,
}

impl ExtractedDocument {
    /// All segment text joined for the classifiers.
    pub fn full_text(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

// ── Rationale signals ───────────────────────────────────────────────

/// One contributing signal in a routing decision's rationale. Listed in
/// evaluation order for auditability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// A contract number matched a registry key exactly.
    ExactMatch,
    /// A single fuzzy candidate cleared the similarity floor.
    FuzzyMatch,
    /// More than one fuzzy candidate cleared the floor.
    AmbiguousContract,
    /// Critical priority overrode category routing.
    CriticalEscalation,
    /// Routed by the category → department table.
    Category(Category),
    /// Ambiguity plus a certainty-requiring category forced manual review.
    NeedsManualReview,
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExactMatch => write!(f, "exact-match"),
            Self::FuzzyMatch => write!(f, "fuzzy-match"),
            Self::AmbiguousContract => write!(f, "ambiguous-contract"),
            Self::CriticalEscalation => write!(f, "critical-escalation"),
            Self::Category(category) => write!(f, "category-{category}"),
            Self::NeedsManualReview => write!(f, "needs-manual-review"),
        }
    }
}

impl std::str::FromStr for Signal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exact-match" => Ok(Self::ExactMatch),
            "fuzzy-match" => Ok(Self::FuzzyMatch),
            "ambiguous-contract" => Ok(Self::AmbiguousContract),
            "critical-escalation" => Ok(Self::CriticalEscalation),
            "needs-manual-review" => Ok(Self::NeedsManualReview),
            other => match other.strip_prefix("category-") {
                Some(label) => {
                    let json = format!("\"{}\"", label.replace('-', "_"));
                    serde_json::from_str::<Category>(&json)
                        .map(Self::Category)
                        .map_err(|_| format!("unknown category signal: '{other}'"))
                }
                None => Err(format!("unknown signal: '{s}'")),
            },
        }
    }
}

impl Serialize for Signal {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Signal {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ── Routing decision ────────────────────────────────────────────────

/// The final, immutable output for one message: the department it goes
/// to, the priority it carries, and the contract it concerns (if any).
/// Exactly one exists per successfully processed message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub message_id: String,
    /// Target department identifier.
    pub department: String,
    /// Final priority.
    pub priority: Priority,
    /// Chosen contract association, when exactly one candidate matched.
    pub contract_id: Option<String>,
    /// Every rule that fired, in evaluation order.
    pub rationale: Vec<Signal>,
    pub decided_at: DateTime<Utc>,
}
