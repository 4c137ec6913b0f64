//! Contract registry collaborator boundary.
//!
//! The registry is external and mutable; the core only ever reads from it
//! through this trait. The known-school-names lookup feeds the entity
//! extractor's name index.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::RegistryError;
use crate::extract::entities::normalize_name;

/// A contract as the registry exposes it to the matcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contract {
    /// Registry key, e.g. `2024-0452`.
    pub id: String,
    /// School the contract is with.
    pub school_name: String,
    /// Contract validity window.
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Monthly value, when known.
    pub value: Option<Decimal>,
    /// Last registry update — fuzzy-match tie-breaker.
    pub updated_at: DateTime<Utc>,
}

/// Read-only registry access used by the matcher and entity extractor.
#[async_trait]
pub trait ContractRegistry: Send + Sync {
    /// Exact lookup by contract number.
    async fn lookup_by_number(&self, code: &str) -> Result<Option<Contract>, RegistryError>;

    /// Coarse candidate search by school name, optionally biased by a
    /// date hint. Fine-grained ranking is the matcher's job.
    async fn search_candidates(
        &self,
        name: &str,
        date_hint: Option<NaiveDate>,
    ) -> Result<Vec<Contract>, RegistryError>;

    /// Known school names, for the extractor's name index.
    async fn known_school_names(&self) -> Result<Vec<String>, RegistryError>;
}

/// In-memory registry for tests and the demo binary.
pub struct InMemoryRegistry {
    contracts: RwLock<Vec<Contract>>,
}

impl InMemoryRegistry {
    pub fn new(contracts: Vec<Contract>) -> Self {
        Self {
            contracts: RwLock::new(contracts),
        }
    }

    pub async fn insert(&self, contract: Contract) {
        self.contracts.write().await.push(contract);
    }
}

#[async_trait]
impl ContractRegistry for InMemoryRegistry {
    async fn lookup_by_number(&self, code: &str) -> Result<Option<Contract>, RegistryError> {
        Ok(self
            .contracts
            .read()
            .await
            .iter()
            .find(|c| c.id == code)
            .cloned())
    }

    async fn search_candidates(
        &self,
        name: &str,
        _date_hint: Option<NaiveDate>,
    ) -> Result<Vec<Contract>, RegistryError> {
        let query_tokens: Vec<String> = normalize_name(name)
            .split_whitespace()
            .map(String::from)
            .collect();

        Ok(self
            .contracts
            .read()
            .await
            .iter()
            .filter(|c| {
                let normalized = normalize_name(&c.school_name);
                query_tokens.iter().any(|t| normalized.contains(t.as_str()))
            })
            .cloned()
            .collect())
    }

    async fn known_school_names(&self) -> Result<Vec<String>, RegistryError> {
        let mut names: Vec<String> = self
            .contracts
            .read()
            .await
            .iter()
            .map(|c| c.school_name.clone())
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contract(id: &str, school: &str) -> Contract {
        Contract {
            id: id.into(),
            school_name: school.into(),
            start_date: None,
            end_date: None,
            value: None,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn lookup_by_number_is_exact() {
        let registry = InMemoryRegistry::new(vec![contract("2024-0452", "Colégio Anchieta")]);
        assert!(
            registry
                .lookup_by_number("2024-0452")
                .await
                .unwrap()
                .is_some()
        );
        assert!(registry.lookup_by_number("2024-045").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn search_matches_shared_tokens() {
        let registry = InMemoryRegistry::new(vec![
            contract("1", "Colégio Anchieta"),
            contract("2", "Escola Municipal João da Silva"),
        ]);
        let hits = registry
            .search_candidates("colegio anchieta", None)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "1");
    }

    #[tokio::test]
    async fn inserted_contract_becomes_visible() {
        let registry = InMemoryRegistry::new(vec![]);
        assert!(registry.lookup_by_number("9999").await.unwrap().is_none());

        registry.insert(contract("9999", "Escola Nova")).await;
        assert!(registry.lookup_by_number("9999").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn known_names_deduplicated() {
        let registry = InMemoryRegistry::new(vec![
            contract("1", "Colégio Anchieta"),
            contract("2", "Colégio Anchieta"),
        ]);
        assert_eq!(registry.known_school_names().await.unwrap().len(), 1);
    }
}
