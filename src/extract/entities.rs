//! Entity extraction — structured candidates pulled out of normalized text.
//!
//! Recognized kinds: contract numbers (configured pattern), school names
//! (prefix cues checked against the registry's known-names index), monetary
//! amounts, and dates in the locale formats that show up in contract mail.
//!
//! Confidence encodes pattern strictness: a context-labeled candidate that
//! exactly matches the configured pattern scores 1.0; proximity or cue-only
//! candidates score below that. Entities under the configured floor are
//! dropped, not kept as low-confidence noise.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::TriageConfig;
use crate::error::ConfigError;
use crate::extract::text::TextSegment;

// ── Entity model ────────────────────────────────────────────────────

/// What kind of structured value an entity is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    SchoolName,
    ContractNumber,
    Amount,
    Date,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::SchoolName => "school_name",
            Self::ContractNumber => "contract_number",
            Self::Amount => "amount",
            Self::Date => "date",
        };
        write!(f, "{s}")
    }
}

/// Normalized entity value, typed per kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum EntityValue {
    Text(String),
    Amount(Decimal),
    Date(NaiveDate),
}

impl EntityValue {
    /// The value as matching text (contract codes, school names).
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(d) => Some(*d),
            _ => None,
        }
    }
}

/// One extracted entity candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub kind: EntityKind,
    /// The raw span as it appeared in the text.
    pub raw: String,
    /// Normalized value.
    pub value: EntityValue,
    /// Pattern-strictness confidence in [0,1].
    pub confidence: f32,
}

impl Entity {
    /// First entity of a kind, in document order.
    pub fn first_of<'a>(entities: &'a [Entity], kind: EntityKind) -> Option<&'a Entity> {
        entities.iter().find(|e| e.kind == kind)
    }
}

// ── School name index ───────────────────────────────────────────────

/// Known school names from the contract registry, pre-normalized for
/// case/diacritic-insensitive lookup. A lookup capability — the index is
/// rebuilt from the registry each run, never owned state.
pub struct SchoolNameIndex {
    entries: Vec<(String, String)>,
}

impl SchoolNameIndex {
    pub fn new(names: Vec<String>) -> Self {
        let entries = names
            .into_iter()
            .map(|canonical| (normalize_name(&canonical), canonical))
            .collect();
        Self { entries }
    }

    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Resolve a candidate against the index.
    ///
    /// Returns the canonical registry spelling and a confidence: 1.0 for a
    /// normalized exact match, 0.9 when one name contains the other.
    pub fn resolve(&self, candidate: &str) -> Option<(&str, f32)> {
        let normalized = normalize_name(candidate);
        if normalized.is_empty() {
            return None;
        }

        for (key, canonical) in &self.entries {
            if *key == normalized {
                return Some((canonical, 1.0));
            }
        }
        for (key, canonical) in &self.entries {
            if key.contains(&normalized) || normalized.contains(key.as_str()) {
                return Some((canonical, 0.9));
            }
        }
        None
    }
}

/// Normalize a name for comparison: lowercase, diacritics folded,
/// whitespace collapsed.
pub fn normalize_name(name: &str) -> String {
    let folded: String = name.chars().map(fold_diacritic).collect();
    folded
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn fold_diacritic(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ã' | 'ä' | 'Á' | 'À' | 'Â' | 'Ã' | 'Ä' => 'a',
        'é' | 'è' | 'ê' | 'ë' | 'É' | 'È' | 'Ê' | 'Ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' | 'Í' | 'Ì' | 'Î' | 'Ï' => 'i',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' | 'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => 'o',
        'ú' | 'ù' | 'û' | 'ü' | 'Ú' | 'Ù' | 'Û' | 'Ü' => 'u',
        'ç' | 'Ç' => 'c',
        'ñ' | 'Ñ' => 'n',
        _ => c,
    }
}

// ── Patterns ────────────────────────────────────────────────────────

static CONTRACT_LABELED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:contrato|processo|contract)\s*(?:n[º°o]?\.?\s*)?[:.]?\s*([0-9]{4,10}(?:[-/][0-9A-Za-z]{1,5})?)",
    )
    .unwrap()
});

static AMOUNT_CURRENCY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"R\$\s*([0-9]{1,3}(?:\.[0-9]{3})*(?:,[0-9]{2})?|[0-9]+(?:,[0-9]{2})?)").unwrap()
});

static AMOUNT_LABELED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:valor|montante|quantia|total|amount)\s*(?:de|:)?\s*(?:R\$\s*)?([0-9]{1,3}(?:[.,][0-9]{3})*(?:[.,][0-9]{2})?)",
    )
    .unwrap()
});

static DATE_NUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([0-3]?[0-9])[/.\-]([01]?[0-9])[/.\-]([0-9]{4})\b").unwrap());

static DATE_ISO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([0-9]{4})-([01][0-9])-([0-3][0-9])\b").unwrap());

static DATE_LONG_PT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b([0-3]?[0-9])\s+de\s+([a-zçã]+)\s+de\s+([0-9]{4})\b").unwrap()
});

static SCHOOL_CUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b((?:escola(?:\s+(?:municipal|estadual|particular))?|col[ée]gio|centro\s+educacional|instituto|e\.e\.|e\.m\.)\s+[A-Za-zÀ-ÖØ-öø-ÿ][A-Za-zÀ-ÖØ-öø-ÿ\s]{2,60})",
    )
    .unwrap()
});

const PT_MONTHS: [(&str, u32); 12] = [
    ("janeiro", 1),
    ("fevereiro", 2),
    ("março", 3),
    ("abril", 4),
    ("maio", 5),
    ("junho", 6),
    ("julho", 7),
    ("agosto", 8),
    ("setembro", 9),
    ("outubro", 10),
    ("novembro", 11),
    ("dezembro", 12),
];

// ── Extractor ───────────────────────────────────────────────────────

/// Entity extraction stage.
pub struct EntityExtractor {
    contract_number: Regex,
    confidence_floor: f32,
}

impl EntityExtractor {
    pub fn new(config: &TriageConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            contract_number: Regex::new(&config.contract_number_pattern)?,
            confidence_floor: config.entity_confidence_floor,
        })
    }

    /// Scan all segments for entity candidates.
    ///
    /// Candidates below the confidence floor are dropped; duplicates (same
    /// kind and normalized value) keep their highest-confidence occurrence.
    pub fn extract(&self, segments: &[TextSegment], schools: &SchoolNameIndex) -> Vec<Entity> {
        let mut entities = Vec::new();

        for segment in segments {
            self.extract_contract_numbers(&segment.text, &mut entities);
            self.extract_school_names(&segment.text, schools, &mut entities);
            extract_amounts(&segment.text, &mut entities);
            extract_dates(&segment.text, &mut entities);
        }

        dedup_keep_best(&mut entities);
        entities.retain(|e| e.confidence >= self.confidence_floor);
        entities
    }

    fn extract_contract_numbers(&self, text: &str, out: &mut Vec<Entity>) {
        for caps in CONTRACT_LABELED.captures_iter(text) {
            let raw = caps[1].to_string();
            // A label plus an exact pattern match is as strict as it gets.
            let confidence = if self.full_pattern_match(&raw) { 1.0 } else { 0.7 };
            out.push(Entity {
                kind: EntityKind::ContractNumber,
                value: EntityValue::Text(raw.clone()),
                raw,
                confidence,
            });
        }

        // Unlabeled code-shaped tokens are proximity candidates only. Bare
        // digit runs score under the default floor — years and phone
        // fragments would otherwise flood the matcher.
        for m in self.contract_number.find_iter(text) {
            let raw = m.as_str().to_string();
            let confidence = if raw.contains('-') || raw.contains('/') {
                0.75
            } else {
                0.45
            };
            out.push(Entity {
                kind: EntityKind::ContractNumber,
                value: EntityValue::Text(raw.clone()),
                raw,
                confidence,
            });
        }
    }

    fn full_pattern_match(&self, candidate: &str) -> bool {
        self.contract_number
            .find(candidate)
            .is_some_and(|m| m.start() == 0 && m.end() == candidate.len())
    }

    fn extract_school_names(
        &self,
        text: &str,
        schools: &SchoolNameIndex,
        out: &mut Vec<Entity>,
    ) {
        for caps in SCHOOL_CUE.captures_iter(text) {
            let raw = caps[1].trim().to_string();
            let (value, confidence) = match schools.resolve(&raw) {
                Some((canonical, conf)) => (canonical.to_string(), conf),
                None => (raw.clone(), 0.6),
            };
            out.push(Entity {
                kind: EntityKind::SchoolName,
                value: EntityValue::Text(value),
                raw,
                confidence,
            });
        }
    }
}

fn extract_amounts(text: &str, out: &mut Vec<Entity>) {
    for caps in AMOUNT_CURRENCY.captures_iter(text) {
        if let Some(amount) = parse_amount(&caps[1]) {
            out.push(Entity {
                kind: EntityKind::Amount,
                raw: caps[0].to_string(),
                value: EntityValue::Amount(amount),
                confidence: 1.0,
            });
        }
    }
    for caps in AMOUNT_LABELED.captures_iter(text) {
        if let Some(amount) = parse_amount(&caps[1]) {
            out.push(Entity {
                kind: EntityKind::Amount,
                raw: caps[0].to_string(),
                value: EntityValue::Amount(amount),
                confidence: 0.9,
            });
        }
    }
}

/// Parse a monetary amount in pt-BR (`5.000,00`) or plain (`5000.00`) form.
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let has_comma = raw.contains(',');
    let has_dot = raw.contains('.');

    let normalized = if has_comma && has_dot {
        // The rightmost separator is the decimal one.
        if raw.rfind(',') > raw.rfind('.') {
            raw.replace('.', "").replace(',', ".")
        } else {
            raw.replace(',', "")
        }
    } else if has_comma {
        let after = raw.rsplit(',').next().unwrap_or("");
        if after.len() == 2 {
            raw.replace(',', ".")
        } else {
            raw.replace(',', "")
        }
    } else if has_dot {
        let after = raw.rsplit('.').next().unwrap_or("");
        if after.len() == 3 {
            // Thousands grouping: 5.000
            raw.replace('.', "")
        } else {
            raw.to_string()
        }
    } else {
        raw.to_string()
    };

    normalized.parse().ok()
}

fn extract_dates(text: &str, out: &mut Vec<Entity>) {
    for caps in DATE_NUMERIC.captures_iter(text) {
        let (day, month, year) = (parse_u32(&caps[1]), parse_u32(&caps[2]), parse_i32(&caps[3]));
        push_date(out, &caps[0], year, month, day);
    }
    for caps in DATE_ISO.captures_iter(text) {
        let (year, month, day) = (parse_i32(&caps[1]), parse_u32(&caps[2]), parse_u32(&caps[3]));
        push_date(out, &caps[0], year, month, day);
    }
    for caps in DATE_LONG_PT.captures_iter(text) {
        let month_name = caps[2].to_lowercase();
        let Some((_, month)) = PT_MONTHS.iter().find(|(name, _)| *name == month_name) else {
            continue;
        };
        push_date(out, &caps[0], parse_i32(&caps[3]), *month, parse_u32(&caps[1]));
    }
}

fn push_date(out: &mut Vec<Entity>, raw: &str, year: i32, month: u32, day: u32) {
    // from_ymd_opt rejects impossible dates (32/13) for us.
    if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
        out.push(Entity {
            kind: EntityKind::Date,
            raw: raw.to_string(),
            value: EntityValue::Date(date),
            confidence: 1.0,
        });
    }
}

fn parse_u32(s: &str) -> u32 {
    s.parse().unwrap_or(0)
}

fn parse_i32(s: &str) -> i32 {
    s.parse().unwrap_or(0)
}

/// Keep the highest-confidence occurrence per (kind, normalized value),
/// preserving document order of first appearance.
fn dedup_keep_best(entities: &mut Vec<Entity>) {
    let mut seen: std::collections::HashMap<(EntityKind, String), usize> =
        std::collections::HashMap::new();
    let mut kept: Vec<Entity> = Vec::with_capacity(entities.len());

    for entity in entities.drain(..) {
        let key_value = match &entity.value {
            EntityValue::Text(s) => normalize_name(s),
            EntityValue::Amount(d) => d.to_string(),
            EntityValue::Date(d) => d.to_string(),
        };
        let key = (entity.kind, key_value);

        match seen.get(&key) {
            Some(&idx) => {
                if entity.confidence > kept[idx].confidence {
                    kept[idx] = entity;
                }
            }
            None => {
                seen.insert(key, kept.len());
                kept.push(entity);
            }
        }
    }

    *entities = kept;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    use crate::extract::text::SegmentSource;

    fn segment(text: &str) -> Vec<TextSegment> {
        vec![TextSegment {
            source: SegmentSource::Body,
            text: text.into(),
        }]
    }

    fn extractor() -> EntityExtractor {
        EntityExtractor::new(&TriageConfig::default()).unwrap()
    }

    fn kinds(entities: &[Entity], kind: EntityKind) -> Vec<&Entity> {
        entities.iter().filter(|e| e.kind == kind).collect()
    }

    // ── contract numbers ────────────────────────────────────────────

    #[test]
    fn labeled_contract_number_scores_full_confidence() {
        let entities = extractor().extract(
            &segment("Renovação contrato 2024-0452 da escola"),
            &SchoolNameIndex::empty(),
        );
        let numbers = kinds(&entities, EntityKind::ContractNumber);
        assert_eq!(numbers.len(), 1);
        assert_eq!(numbers[0].value.as_text(), Some("2024-0452"));
        assert_eq!(numbers[0].confidence, 1.0);
    }

    #[test]
    fn contrato_no_prefix_form() {
        let entities = extractor().extract(
            &segment("Solicito a renovação do contrato nº 12345."),
            &SchoolNameIndex::empty(),
        );
        let numbers = kinds(&entities, EntityKind::ContractNumber);
        assert_eq!(numbers.len(), 1);
        assert_eq!(numbers[0].value.as_text(), Some("12345"));
        assert_eq!(numbers[0].confidence, 1.0);
    }

    #[test]
    fn bare_year_dropped_by_floor() {
        let entities = extractor().extract(
            &segment("A reunião de 2024 foi adiada."),
            &SchoolNameIndex::empty(),
        );
        assert!(kinds(&entities, EntityKind::ContractNumber).is_empty());
    }

    #[test]
    fn unlabeled_code_shaped_token_is_proximity_candidate() {
        let entities = extractor().extract(
            &segment("Referente ao processo anexo, ref. 2023-0099."),
            &SchoolNameIndex::empty(),
        );
        let numbers = kinds(&entities, EntityKind::ContractNumber);
        assert_eq!(numbers.len(), 1);
        assert!(numbers[0].confidence < 1.0);
        assert!(numbers[0].confidence >= 0.5);
    }

    // ── school names ────────────────────────────────────────────────

    #[test]
    fn school_name_resolved_against_index() {
        let index = SchoolNameIndex::new(vec!["Colégio Anchieta".into()]);
        let entities = extractor().extract(
            &segment("Em nome do Colegio Anchieta, solicito a renovação."),
            &index,
        );
        let schools = kinds(&entities, EntityKind::SchoolName);
        assert_eq!(schools.len(), 1);
        assert_eq!(schools[0].value.as_text(), Some("Colégio Anchieta"));
        assert_eq!(schools[0].confidence, 1.0);
    }

    #[test]
    fn unknown_school_is_cue_only_confidence() {
        let index = SchoolNameIndex::new(vec!["Colégio Anchieta".into()]);
        let entities = extractor().extract(
            &segment("Representamos a Escola Nova Esperança nesta solicitação"),
            &index,
        );
        let schools = kinds(&entities, EntityKind::SchoolName);
        assert_eq!(schools.len(), 1);
        assert!(schools[0].confidence < 1.0);
    }

    #[test]
    fn index_resolution_is_diacritic_insensitive() {
        let index = SchoolNameIndex::new(vec!["Escola Municipal João da Silva".into()]);
        let (canonical, conf) = index.resolve("escola municipal joao da silva").unwrap();
        assert_eq!(canonical, "Escola Municipal João da Silva");
        assert_eq!(conf, 1.0);
    }

    // ── amounts ─────────────────────────────────────────────────────

    #[test]
    fn currency_amount_pt_br() {
        let entities = extractor().extract(
            &segment("O valor atual é de R$ 5.000,00 mensais."),
            &SchoolNameIndex::empty(),
        );
        let amounts = kinds(&entities, EntityKind::Amount);
        assert_eq!(amounts.len(), 1);
        assert_eq!(amounts[0].value, EntityValue::Amount(dec!(5000.00)));
        assert_eq!(amounts[0].confidence, 1.0);
    }

    #[test]
    fn parse_amount_variants() {
        assert_eq!(parse_amount("5.000,00"), Some(dec!(5000.00)));
        assert_eq!(parse_amount("1.234.567,89"), Some(dec!(1234567.89)));
        assert_eq!(parse_amount("1234.56"), Some(dec!(1234.56)));
        assert_eq!(parse_amount("1,234.56"), Some(dec!(1234.56)));
        assert_eq!(parse_amount("5.000"), Some(dec!(5000)));
        assert_eq!(parse_amount("300,50"), Some(dec!(300.50)));
    }

    // ── dates ───────────────────────────────────────────────────────

    #[test]
    fn numeric_date_dd_mm_yyyy() {
        let entities = extractor().extract(
            &segment("O contrato vence em 30/05/2025."),
            &SchoolNameIndex::empty(),
        );
        let dates = kinds(&entities, EntityKind::Date);
        assert_eq!(dates.len(), 1);
        assert_eq!(
            dates[0].value.as_date(),
            NaiveDate::from_ymd_opt(2025, 5, 30)
        );
    }

    #[test]
    fn iso_date_parsed() {
        let entities = extractor().extract(
            &segment("Vigência a partir de 2025-03-01 conforme acordado."),
            &SchoolNameIndex::empty(),
        );
        let dates = kinds(&entities, EntityKind::Date);
        assert_eq!(dates.len(), 1);
        assert_eq!(dates[0].value.as_date(), NaiveDate::from_ymd_opt(2025, 3, 1));
    }

    #[test]
    fn long_portuguese_date_parsed() {
        let entities = extractor().extract(
            &segment("O contrato vence em 1 de março de 2025."),
            &SchoolNameIndex::empty(),
        );
        let dates = kinds(&entities, EntityKind::Date);
        assert_eq!(dates.len(), 1);
        assert_eq!(dates[0].value.as_date(), NaiveDate::from_ymd_opt(2025, 3, 1));
    }

    #[test]
    fn impossible_date_rejected() {
        let entities = extractor().extract(
            &segment("Anotado como 32/13/2025 no formulário."),
            &SchoolNameIndex::empty(),
        );
        assert!(kinds(&entities, EntityKind::Date).is_empty());
    }

    // ── dedup and floor ─────────────────────────────────────────────

    #[test]
    fn duplicate_contract_number_keeps_best_confidence() {
        let entities = extractor().extract(
            &segment("contrato 2024-0452 ... conforme 2024-0452 acima"),
            &SchoolNameIndex::empty(),
        );
        let numbers = kinds(&entities, EntityKind::ContractNumber);
        assert_eq!(numbers.len(), 1);
        assert_eq!(numbers[0].confidence, 1.0);
    }

    #[test]
    fn floor_is_configurable() {
        let config = TriageConfig {
            entity_confidence_floor: 0.95,
            ..TriageConfig::default()
        };
        let extractor = EntityExtractor::new(&config).unwrap();
        let entities = extractor.extract(
            &segment("Referente ao documento ref. 2023-0099 da Escola Nova"),
            &SchoolNameIndex::empty(),
        );
        // Proximity contract candidate (0.75) and cue-only school (0.6)
        // both fall under the raised floor.
        assert!(entities.is_empty());
    }
}
