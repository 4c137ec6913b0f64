//! Contract association.
//!
//! Strategy precedence:
//! 1. exact contract-number lookup — single match, confidence 1.0, done
//! 2. fuzzy school-name + nearest-date ranking over registry candidates,
//!    floored and sorted; ties broken by most-recently-updated contract
//! 3. no match — a valid terminal outcome, not an error
//!
//! Multiple above-floor fuzzy candidates are passed through unresolved;
//! disambiguation belongs to the routing engine.

pub mod registry;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::RegistryError;
use crate::extract::entities::{normalize_name, Entity, EntityKind, EntityValue};

pub use registry::{Contract, ContractRegistry, InMemoryRegistry};

/// How a candidate contract was associated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchStrategy {
    ExactNumber,
    FuzzyNameAndDate,
}

/// One candidate contract association.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractMatch {
    pub contract_id: String,
    /// Similarity score in [0,1]; 1.0 for exact number matches.
    pub score: f32,
    pub strategy: MatchStrategy,
}

/// Contract matching stage.
pub struct ContractMatcher {
    fuzzy_floor: f32,
}

impl ContractMatcher {
    pub fn new(fuzzy_floor: f32) -> Self {
        Self { fuzzy_floor }
    }

    /// Resolve extracted entities against the registry.
    ///
    /// Deterministic: identical entities and registry state produce the
    /// identical ranked list.
    pub async fn match_contracts(
        &self,
        entities: &[Entity],
        registry: &dyn ContractRegistry,
    ) -> Result<Vec<ContractMatch>, RegistryError> {
        // Strategy 1: exact number. Strongest candidates first.
        let mut numbers: Vec<&Entity> = entities
            .iter()
            .filter(|e| e.kind == EntityKind::ContractNumber)
            .collect();
        numbers.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        for entity in numbers {
            let Some(code) = entity.value.as_text() else {
                continue;
            };
            if let Some(contract) = registry.lookup_by_number(code).await? {
                debug!(contract = %contract.id, "Exact contract-number match");
                return Ok(vec![ContractMatch {
                    contract_id: contract.id,
                    score: 1.0,
                    strategy: MatchStrategy::ExactNumber,
                }]);
            }
        }

        // Strategy 2: fuzzy school-name + nearest date.
        let Some(school) = Entity::first_of(entities, EntityKind::SchoolName) else {
            return Ok(Vec::new());
        };
        let Some(name) = school.value.as_text() else {
            return Ok(Vec::new());
        };
        let date_hint = nearest_date(entities);

        let mut candidates = registry.search_candidates(name, date_hint).await?;
        // Deterministic ranking regardless of registry return order.
        candidates.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.id.cmp(&b.id))
        });

        let mut matches: Vec<(ContractMatch, chrono::DateTime<chrono::Utc>)> = candidates
            .into_iter()
            .filter_map(|contract| {
                let score = fuzzy_score(name, date_hint, &contract);
                (score >= self.fuzzy_floor).then(|| {
                    (
                        ContractMatch {
                            contract_id: contract.id.clone(),
                            score,
                            strategy: MatchStrategy::FuzzyNameAndDate,
                        },
                        contract.updated_at,
                    )
                })
            })
            .collect();

        matches.sort_by(|(a, a_updated), (b, b_updated)| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b_updated.cmp(a_updated))
                .then_with(|| a.contract_id.cmp(&b.contract_id))
        });

        debug!(count = matches.len(), "Fuzzy contract candidates above floor");
        Ok(matches.into_iter().map(|(m, _)| m).collect())
    }
}

/// Similarity between an extracted school name (plus optional date hint)
/// and a registry contract.
fn fuzzy_score(name: &str, date_hint: Option<NaiveDate>, contract: &Contract) -> f32 {
    let name_score = name_similarity(name, &contract.school_name);
    // The date contributes a bounded bonus factor — a wrong date should
    // weaken, never zero out, a strong name match.
    let date_factor = match date_hint {
        Some(hint) => date_proximity(hint, contract),
        None => 0.5,
    };
    (name_score * (0.85 + 0.15 * date_factor)).min(1.0)
}

/// Case/diacritic-insensitive name similarity in [0,1].
///
/// Exact normalized equality scores 1.0, containment 0.9, otherwise the
/// best of Jaro-Winkler and token-set Jaccard.
pub fn name_similarity(a: &str, b: &str) -> f32 {
    let a = normalize_name(a);
    let b = normalize_name(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    if a.contains(b.as_str()) || b.contains(a.as_str()) {
        return 0.9;
    }

    let jaro = strsim::jaro_winkler(&a, &b) as f32;

    let tokens_a: std::collections::HashSet<&str> = a.split_whitespace().collect();
    let tokens_b: std::collections::HashSet<&str> = b.split_whitespace().collect();
    let intersection = tokens_a.intersection(&tokens_b).count();
    let union = tokens_a.union(&tokens_b).count();
    let jaccard = if union == 0 {
        0.0
    } else {
        intersection as f32 / union as f32
    };

    jaro.max(jaccard)
}

/// How close the date hint falls to the contract's validity window, in
/// [0,1]. Inside the window is 1.0; the factor decays over a year.
fn date_proximity(hint: NaiveDate, contract: &Contract) -> f32 {
    let distance = match (contract.start_date, contract.end_date) {
        (None, None) => return 0.5,
        (Some(start), _) if hint < start => (start - hint).num_days(),
        (_, Some(end)) if hint > end => (hint - end).num_days(),
        // Inside the validity window (or on its open side).
        _ => 0,
    };
    (1.0 - distance as f32 / 365.0).clamp(0.0, 1.0)
}

/// The date entity nearest the document start — contract mail leads with
/// the relevant date.
fn nearest_date(entities: &[Entity]) -> Option<NaiveDate> {
    entities.iter().find_map(|e| match (&e.kind, &e.value) {
        (EntityKind::Date, EntityValue::Date(d)) => Some(*d),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn entity(kind: EntityKind, value: EntityValue, confidence: f32) -> Entity {
        let raw = match &value {
            EntityValue::Text(s) => s.clone(),
            EntityValue::Amount(d) => d.to_string(),
            EntityValue::Date(d) => d.to_string(),
        };
        Entity {
            kind,
            raw,
            value,
            confidence,
        }
    }

    fn number(code: &str) -> Entity {
        entity(
            EntityKind::ContractNumber,
            EntityValue::Text(code.into()),
            1.0,
        )
    }

    fn school(name: &str) -> Entity {
        entity(EntityKind::SchoolName, EntityValue::Text(name.into()), 1.0)
    }

    fn date(y: i32, m: u32, d: u32) -> Entity {
        entity(
            EntityKind::Date,
            EntityValue::Date(NaiveDate::from_ymd_opt(y, m, d).unwrap()),
            1.0,
        )
    }

    fn contract(id: &str, school: &str, updated_days_ago: i64) -> Contract {
        Contract {
            id: id.into(),
            school_name: school.into(),
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1),
            end_date: NaiveDate::from_ymd_opt(2025, 12, 31),
            value: None,
            updated_at: Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
                - chrono::Duration::days(updated_days_ago),
        }
    }

    #[tokio::test]
    async fn exact_number_short_circuits() {
        let registry = InMemoryRegistry::new(vec![
            contract("2024-0452", "Colégio Anchieta", 0),
            contract("2024-0099", "Colégio Anchieta", 0),
        ]);
        let entities = vec![number("2024-0452"), school("Colégio Anchieta")];

        let matches = ContractMatcher::new(0.6)
            .match_contracts(&entities, &registry)
            .await
            .unwrap();

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].contract_id, "2024-0452");
        assert_eq!(matches[0].score, 1.0);
        assert_eq!(matches[0].strategy, MatchStrategy::ExactNumber);
    }

    #[tokio::test]
    async fn unknown_number_falls_back_to_fuzzy() {
        let registry = InMemoryRegistry::new(vec![contract("77", "Colégio Anchieta", 0)]);
        let entities = vec![number("0000-0000"), school("Colegio Anchieta")];

        let matches = ContractMatcher::new(0.6)
            .match_contracts(&entities, &registry)
            .await
            .unwrap();

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].strategy, MatchStrategy::FuzzyNameAndDate);
    }

    #[tokio::test]
    async fn no_entities_is_empty_not_error() {
        let registry = InMemoryRegistry::new(vec![contract("1", "Colégio Anchieta", 0)]);
        let matches = ContractMatcher::new(0.6)
            .match_contracts(&[], &registry)
            .await
            .unwrap();
        assert!(matches.is_empty());
    }

    #[tokio::test]
    async fn fuzzy_ranked_descending_with_floor() {
        let registry = InMemoryRegistry::new(vec![
            contract("1", "Escola Municipal João da Silva", 0),
            contract("2", "Escola Estadual João Pessoa", 0),
            contract("3", "Instituto Horizonte Azul", 0),
        ]);
        let entities = vec![school("Escola Municipal João da Silva"), date(2025, 3, 1)];

        let matches = ContractMatcher::new(0.6)
            .match_contracts(&entities, &registry)
            .await
            .unwrap();

        assert!(!matches.is_empty());
        assert_eq!(matches[0].contract_id, "1");
        for window in matches.windows(2) {
            assert!(window[0].score >= window[1].score);
        }
        assert!(matches.iter().all(|m| m.score >= 0.6));
        assert!(matches.iter().all(|m| m.contract_id != "3"));
    }

    #[tokio::test]
    async fn equal_scores_tie_break_on_most_recent_update() {
        let registry = InMemoryRegistry::new(vec![
            contract("old", "Colégio Anchieta", 300),
            contract("new", "Colégio Anchieta", 1),
        ]);
        let entities = vec![school("Colégio Anchieta")];

        let matches = ContractMatcher::new(0.6)
            .match_contracts(&entities, &registry)
            .await
            .unwrap();

        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].contract_id, "new");
        assert_eq!(matches[1].contract_id, "old");
    }

    #[tokio::test]
    async fn deterministic_across_invocations() {
        let registry = InMemoryRegistry::new(vec![
            contract("a", "Escola Municipal João da Silva", 5),
            contract("b", "Escola Municipal João de Barro", 5),
        ]);
        let entities = vec![school("Escola Municipal João"), date(2025, 3, 1)];
        let matcher = ContractMatcher::new(0.5);

        let first = matcher.match_contracts(&entities, &registry).await.unwrap();
        let second = matcher.match_contracts(&entities, &registry).await.unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn name_similarity_diacritic_insensitive() {
        assert_eq!(name_similarity("Colégio Anchieta", "colegio anchieta"), 1.0);
    }

    #[test]
    fn name_similarity_containment() {
        assert_eq!(
            name_similarity("Anchieta", "Colégio Anchieta"),
            0.9
        );
    }

    #[test]
    fn name_similarity_disjoint_is_low() {
        assert!(name_similarity("Instituto Horizonte", "Escola do Mar") < 0.6);
    }

    #[test]
    fn date_inside_window_is_full_factor() {
        let c = contract("1", "X", 0);
        assert_eq!(
            date_proximity(NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(), &c),
            1.0
        );
    }

    #[test]
    fn date_far_outside_window_decays() {
        let c = contract("1", "X", 0);
        let factor = date_proximity(NaiveDate::from_ymd_opt(2028, 1, 1).unwrap(), &c);
        assert!(factor < 0.1);
    }
}
