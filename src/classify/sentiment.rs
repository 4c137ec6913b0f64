//! Lexicon-based sentiment analysis.
//!
//! Counts positive and negative terms and maps the balance onto the
//! three-way label. Contract mail is mostly neutral; the signal matters
//! for complaint handling, where tone corroborates the category.

use tracing::debug;

use crate::classify::{Classifier, ClassifyInput, Sentiment, Verdict, count_occurrences, is_near_empty};

const NEGATIVE_TERMS: &[&str] = &[
    "reclamação",
    "problema",
    "insatisfação",
    "insatisfeito",
    "erro",
    "falha",
    "defeito",
    "atraso",
    "descumprimento",
    "péssimo",
    "inaceitável",
    "prejuízo",
    "complaint",
    "problem",
    "error",
    "failure",
    "delay",
    "unacceptable",
    "disappointed",
    "terrible",
];

const POSITIVE_TERMS: &[&str] = &[
    "obrigado",
    "obrigada",
    "agradeço",
    "agradecemos",
    "parabéns",
    "excelente",
    "ótimo",
    "satisfeito",
    "perfeito",
    "thank you",
    "thanks",
    "appreciate",
    "excellent",
    "great work",
    "satisfied",
];

/// Positive/negative lexicon sentiment analyzer.
pub struct LexiconSentimentAnalyzer {
    default: Sentiment,
}

impl LexiconSentimentAnalyzer {
    pub fn new() -> Self {
        Self {
            default: Sentiment::Neutral,
        }
    }
}

impl Default for LexiconSentimentAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Classifier<Sentiment> for LexiconSentimentAnalyzer {
    fn classify(&self, input: &ClassifyInput<'_>) -> Verdict<Sentiment> {
        if is_near_empty(input.text) {
            return Verdict::undetermined(self.default);
        }

        let text = input.text.to_lowercase();
        let negative: usize = NEGATIVE_TERMS
            .iter()
            .map(|t| count_occurrences(&text, t))
            .sum();
        let positive: usize = POSITIVE_TERMS
            .iter()
            .map(|t| count_occurrences(&text, t))
            .sum();

        let total = negative + positive;
        let verdict = if total == 0 {
            Verdict::new(Sentiment::Neutral, 0.5)
        } else {
            let balance = positive as f32 - negative as f32;
            let strength = (balance.abs() / total as f32).min(0.95);
            if balance > 0.0 {
                Verdict::new(Sentiment::Positive, 0.5 + strength / 2.0)
            } else if balance < 0.0 {
                Verdict::new(Sentiment::Negative, 0.5 + strength / 2.0)
            } else {
                Verdict::new(Sentiment::Neutral, 0.5)
            }
        };

        debug!(
            sentiment = %verdict.label,
            confidence = verdict.confidence,
            "Sentiment analyzed"
        );
        verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(text: &str) -> ClassifyInput<'_> {
        ClassifyInput {
            text,
            entities: &[],
            sender_domain: None,
        }
    }

    fn analyzer() -> LexiconSentimentAnalyzer {
        LexiconSentimentAnalyzer::new()
    }

    #[test]
    fn complaint_text_is_negative() {
        let verdict = analyzer().classify(&input(
            "Registro minha insatisfação com o atraso recorrente e a falha no sistema.",
        ));
        assert_eq!(verdict.label, Sentiment::Negative);
        assert!(verdict.confidence > 0.5);
    }

    #[test]
    fn thankful_text_is_positive() {
        let verdict = analyzer().classify(&input(
            "Agradecemos o excelente atendimento, ficamos muito satisfeitos. Obrigado!",
        ));
        assert_eq!(verdict.label, Sentiment::Positive);
    }

    #[test]
    fn administrative_text_is_neutral() {
        let verdict = analyzer().classify(&input(
            "Segue em anexo a segunda via do documento para assinatura.",
        ));
        assert_eq!(verdict.label, Sentiment::Neutral);
        assert_eq!(verdict.confidence, 0.5);
    }

    #[test]
    fn balanced_signals_are_neutral() {
        let verdict = analyzer().classify(&input("Obrigado pelo retorno, mas o problema persiste."));
        assert_eq!(verdict.label, Sentiment::Neutral);
    }

    #[test]
    fn empty_text_is_undetermined() {
        let verdict = analyzer().classify(&input("  "));
        assert_eq!(verdict.label, Sentiment::Neutral);
        assert_eq!(verdict.confidence, 0.0);
    }
}
