//! Keyword-based category classification.
//!
//! Scores each category by keyword occurrences in the normalized text,
//! bilingual (Portuguese/English) term tables. An entity-based refinement
//! catches payment mail the keywords miss: a contract number plus a
//! monetary amount with no category signal reads as a payment matter.

use std::collections::HashMap;

use tracing::debug;

use crate::classify::{
    Category, Classifier, ClassifyInput, Verdict, count_occurrences, is_near_empty,
};
use crate::extract::entities::{Entity, EntityKind};

/// Keyword-scoring category classifier.
pub struct KeywordCategoryClassifier {
    keywords: Vec<(Category, Vec<&'static str>)>,
    default: Category,
}

impl KeywordCategoryClassifier {
    /// Classifier with the default bilingual keyword tables.
    pub fn default_rules() -> Self {
        let keywords = vec![
            (
                Category::NewContract,
                vec![
                    "novo contrato",
                    "proposta",
                    "contratação",
                    "adesão",
                    "nova escola",
                    "novo cliente",
                    "iniciar contrato",
                    "new contract",
                    "proposal",
                    "onboarding",
                ],
            ),
            (
                Category::Renewal,
                vec![
                    "renovação",
                    "renovar",
                    "prorrogação",
                    "prorrogar",
                    "extensão",
                    "estender",
                    "continuidade",
                    "manter contrato",
                    "renewal",
                    "renew",
                    "extend the contract",
                ],
            ),
            (
                Category::Amendment,
                vec![
                    "alteração",
                    "modificação",
                    "aditivo",
                    "adendo",
                    "ajuste",
                    "atualização",
                    "revisão",
                    "mudar termos",
                    "amendment",
                    "addendum",
                    "modification",
                ],
            ),
            (
                Category::Cancellation,
                vec![
                    "cancelamento",
                    "rescisão",
                    "encerramento",
                    "desistência",
                    "cancelar",
                    "rescindir",
                    "encerrar",
                    "cancellation",
                    "cancel",
                    "terminate",
                ],
            ),
            (
                Category::Payment,
                vec![
                    "pagamento",
                    "fatura",
                    "nota fiscal",
                    "boleto",
                    "cobrança",
                    "recibo",
                    "transferência",
                    "depósito",
                    "quitar",
                    "payment",
                    "invoice",
                    "receipt",
                ],
            ),
            (
                Category::Question,
                vec![
                    "dúvida",
                    "pergunta",
                    "esclarecimento",
                    "como funciona",
                    "gostaria de saber",
                    "poderia explicar",
                    "não entendi",
                    "question",
                    "clarification",
                ],
            ),
            (
                Category::Complaint,
                vec![
                    "reclamação",
                    "insatisfação",
                    "não está funcionando",
                    "não recebi",
                    "atraso",
                    "descumprimento",
                    "complaint",
                    "dissatisfied",
                    "unacceptable",
                ],
            ),
            (
                Category::Support,
                vec![
                    "suporte",
                    "assistência",
                    "auxílio",
                    "orientação",
                    "como resolver",
                    "preciso de ajuda",
                    "não consigo",
                    "support",
                    "help with",
                    "troubleshoot",
                ],
            ),
        ];

        Self {
            keywords,
            default: Category::Other,
        }
    }

    /// Classifier with custom keyword tables (categories absent from the
    /// map simply never win).
    pub fn with_keywords(
        keywords: HashMap<Category, Vec<&'static str>>,
        default: Category,
    ) -> Self {
        Self {
            keywords: keywords.into_iter().collect(),
            default,
        }
    }

    fn score(&self, text: &str) -> Option<(Category, usize)> {
        self.keywords
            .iter()
            .map(|(category, terms)| {
                let hits: usize = terms.iter().map(|t| count_occurrences(text, t)).sum();
                (*category, hits)
            })
            .filter(|(_, hits)| *hits > 0)
            // Stable winner: highest hit count, category order breaks ties.
            .max_by_key(|(category, hits)| (*hits, std::cmp::Reverse(*category as usize)))
    }
}

impl Classifier<Category> for KeywordCategoryClassifier {
    fn classify(&self, input: &ClassifyInput<'_>) -> Verdict<Category> {
        if is_near_empty(input.text) {
            return Verdict::undetermined(self.default);
        }

        let text = input.text.to_lowercase();
        let verdict = match self.score(&text) {
            Some((category, hits)) => {
                // Smooth hit count into (0,1): 1 hit ≈ 0.33, 3 hits ≈ 0.6.
                let confidence = (hits as f32 / (hits as f32 + 2.0)).min(0.95);
                Verdict::new(category, confidence)
            }
            None => Verdict::undetermined(self.default),
        };

        let refined = refine_with_entities(verdict, self.default, input.entities);
        debug!(
            category = %refined.label,
            confidence = refined.confidence,
            "Category classified"
        );
        refined
    }
}

/// Entity-based refinement: a contract number together with a monetary
/// amount and no keyword signal points at a payment matter.
fn refine_with_entities(
    verdict: Verdict<Category>,
    default: Category,
    entities: &[Entity],
) -> Verdict<Category> {
    if verdict.label != default {
        return verdict;
    }
    let has_number = Entity::first_of(entities, EntityKind::ContractNumber).is_some();
    let has_amount = Entity::first_of(entities, EntityKind::Amount).is_some();
    if has_number && has_amount {
        return Verdict::new(Category::Payment, verdict.confidence.max(0.8));
    }
    verdict
}
