//! Triage configuration.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::classify::Category;
use crate::error::ConfigError;

/// Which escalation signal wins when keyword and sender-domain hints
/// disagree on priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationPrecedence {
    /// The keyword-derived level is used whenever any escalation keyword
    /// matched, even if the sender hint suggests a different level.
    KeywordWins,
    /// The sender-derived level is used whenever the sender domain is
    /// escalated, even if keywords suggest a different level.
    SenderWins,
    /// The higher of the two levels is used.
    HighestWins,
}

/// Configuration for the triage pipeline.
#[derive(Debug, Clone)]
pub struct TriageConfig {
    /// Category → department routing table.
    pub category_department_map: HashMap<Category, String>,
    /// Destination for critical-priority messages, overriding category.
    pub priority_escalation_department: String,
    /// Destination when a certainty-requiring category has an ambiguous
    /// contract match.
    pub manual_review_department: String,
    /// Fallback department for categories missing from the routing table.
    pub default_department: String,
    /// Categories that must not be routed on an ambiguous contract match.
    pub certainty_categories: HashSet<Category>,
    /// Minimum similarity score for a fuzzy contract match to be kept.
    pub fuzzy_match_floor: f32,
    /// Entities below this confidence are dropped, not retained as noise.
    pub entity_confidence_floor: f32,
    /// Retry ceiling for recoverable run failures.
    pub max_retry_count: u32,
    /// Keywords that escalate priority to at least `High`.
    pub escalation_keywords: Vec<String>,
    /// Sender domains whose messages default to at least `High`.
    pub escalation_sender_domains: Vec<String>,
    /// Tie-break between keyword and sender escalation signals.
    pub escalation_precedence: EscalationPrecedence,
    /// Pattern a contract-number entity must match exactly.
    pub contract_number_pattern: String,
    /// Deadline applied to every external-collaborator call.
    pub collaborator_timeout: Duration,
}

impl Default for TriageConfig {
    fn default() -> Self {
        let category_department_map = HashMap::from([
            (Category::NewContract, "commercial".to_string()),
            (Category::Renewal, "commercial".to_string()),
            (Category::Amendment, "legal".to_string()),
            (Category::Cancellation, "legal".to_string()),
            (Category::Payment, "finance".to_string()),
            (Category::Question, "customer-service".to_string()),
            (Category::Complaint, "customer-service".to_string()),
            (Category::Support, "tech-support".to_string()),
            (Category::Other, "triage".to_string()),
        ]);

        Self {
            category_department_map,
            priority_escalation_department: "escalations".to_string(),
            manual_review_department: "manual-review".to_string(),
            default_department: "triage".to_string(),
            certainty_categories: HashSet::from([Category::Renewal, Category::Cancellation]),
            fuzzy_match_floor: 0.6,
            entity_confidence_floor: 0.5,
            max_retry_count: 3,
            escalation_keywords: [
                "urgente",
                "urgência",
                "emergência",
                "imediato",
                "urgent",
                "emergency",
                "immediately",
                "asap",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            escalation_sender_domains: Vec::new(),
            escalation_precedence: EscalationPrecedence::HighestWins,
            contract_number_pattern: r"\b\d{4,10}(?:[-/][0-9A-Za-z]{1,5})?\b".to_string(),
            collaborator_timeout: Duration::from_secs(10),
        }
    }
}

impl TriageConfig {
    /// Build config from `TRIAGE_*` environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("TRIAGE_FUZZY_MATCH_FLOOR")
            && let Ok(f) = v.parse()
        {
            config.fuzzy_match_floor = f;
        }
        if let Ok(v) = std::env::var("TRIAGE_ENTITY_CONFIDENCE_FLOOR")
            && let Ok(f) = v.parse()
        {
            config.entity_confidence_floor = f;
        }
        if let Ok(v) = std::env::var("TRIAGE_MAX_RETRY_COUNT")
            && let Ok(n) = v.parse()
        {
            config.max_retry_count = n;
        }
        if let Ok(v) = std::env::var("TRIAGE_ESCALATION_DEPARTMENT") {
            config.priority_escalation_department = v;
        }
        if let Ok(v) = std::env::var("TRIAGE_ESCALATION_KEYWORDS") {
            config.escalation_keywords = split_csv(&v);
        }
        if let Ok(v) = std::env::var("TRIAGE_ESCALATION_SENDER_DOMAINS") {
            config.escalation_sender_domains = split_csv(&v);
        }
        if let Ok(v) = std::env::var("TRIAGE_ESCALATION_PRECEDENCE") {
            config.escalation_precedence = match v.as_str() {
                "keyword_wins" => EscalationPrecedence::KeywordWins,
                "sender_wins" => EscalationPrecedence::SenderWins,
                _ => EscalationPrecedence::HighestWins,
            };
        }
        if let Ok(v) = std::env::var("TRIAGE_CONTRACT_NUMBER_PATTERN") {
            config.contract_number_pattern = v;
        }
        if let Ok(v) = std::env::var("TRIAGE_COLLABORATOR_TIMEOUT_SECS")
            && let Ok(secs) = v.parse()
        {
            config.collaborator_timeout = Duration::from_secs(secs);
        }

        config
    }

    /// Validate value ranges and compile-time patterns.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.fuzzy_match_floor) {
            return Err(ConfigError::InvalidValue {
                key: "fuzzy_match_floor".into(),
                message: format!("{} is outside [0,1]", self.fuzzy_match_floor),
            });
        }
        if !(0.0..=1.0).contains(&self.entity_confidence_floor) {
            return Err(ConfigError::InvalidValue {
                key: "entity_confidence_floor".into(),
                message: format!("{} is outside [0,1]", self.entity_confidence_floor),
            });
        }
        if self.priority_escalation_department.is_empty() {
            return Err(ConfigError::MissingRequired {
                key: "priority_escalation_department".into(),
                hint: "critical messages need a destination".into(),
            });
        }
        Regex::new(&self.contract_number_pattern)?;
        Ok(())
    }

    /// Department for a category, falling back to the default department.
    pub fn department_for(&self, category: Category) -> &str {
        self.category_department_map
            .get(&category)
            .map(String::as_str)
            .unwrap_or(&self.default_department)
    }
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(TriageConfig::default().validate().is_ok());
    }

    #[test]
    fn default_routing_table_covers_all_categories() {
        let config = TriageConfig::default();
        for category in Category::ALL {
            assert!(
                config.category_department_map.contains_key(&category),
                "missing department for {category}"
            );
        }
    }

    #[test]
    fn department_for_unmapped_category_falls_back() {
        let mut config = TriageConfig::default();
        config.category_department_map.remove(&Category::Support);
        assert_eq!(config.department_for(Category::Support), "triage");
    }

    #[test]
    fn out_of_range_floor_rejected() {
        let config = TriageConfig {
            fuzzy_match_floor: 1.5,
            ..TriageConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn bad_contract_pattern_rejected() {
        let config = TriageConfig {
            contract_number_pattern: "[unclosed".into(),
            ..TriageConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Pattern(_))));
    }

    #[test]
    fn empty_escalation_department_rejected() {
        let config = TriageConfig {
            priority_escalation_department: String::new(),
            ..TriageConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingRequired { .. })
        ));
    }

    #[test]
    fn split_csv_trims_and_drops_empties() {
        assert_eq!(split_csv("a, b ,,c"), vec!["a", "b", "c"]);
    }
}
