//! Factor validation: grounding in the problem statement and circular
//! (outcome-as-cause) reasoning.
//!
//! Results are informational. They are carried on the FACTOR_LIST message,
//! shown to the critic, and reported by the integrity check; they never
//! reject a factor on their own.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::events::{Factor, FactorId};

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
];

/// Outcome words that describe a result rather than a cause.
static OUTCOME_TERMS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(trade-?offs?|balances?|outcomes?|results?|consequences?|effects?|impacts?|challenges?|issues?|problems?)\b",
    )
    .expect("OUTCOME_TERMS regex should compile")
});

/// Causal frames where outcome words are legitimate.
static CAUSAL_FRAMES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)information source|institutional incentive|ideological frame|material condition|cognitive bias|resource constraint|structural barrier",
    )
    .expect("CAUSAL_FRAMES regex should compile")
});

/// Phrases in a description that explain a mechanism.
static MECHANISM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)because|causes?|leads? to|results? in|influences?|affects?|drives?|produces?|creates?|generates?",
    )
    .expect("MECHANISM regex should compile")
});

static WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\w+").expect("WORD regex should compile"));

/// Validation thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Share of key terms from the factor name that must appear in the
    /// problem statement.
    pub grounding_ratio: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            grounding_ratio: 0.5,
        }
    }
}

/// Validation result for one factor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorValidation {
    pub factor_id: FactorId,
    pub grounded: bool,
    pub grounding_note: String,
    pub circular: bool,
    pub circular_note: String,
}

impl FactorValidation {
    pub fn is_valid(&self) -> bool {
        self.grounded && !self.circular
    }

    /// One-line note for prompts and logs.
    pub fn summary(&self) -> String {
        format!("{}; {}", self.grounding_note, self.circular_note)
    }
}

/// Checks extracted factors against the problem statement.
#[derive(Debug, Clone, Default)]
pub struct FactorValidator {
    config: ValidationConfig,
}

impl FactorValidator {
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    fn key_terms(name: &str) -> Vec<String> {
        WORD.find_iter(name)
            .map(|m| m.as_str().to_lowercase())
            .filter(|w| w.chars().count() > 3 && !STOPWORDS.contains(&w.as_str()))
            .collect()
    }

    /// Whether enough key terms of the factor name occur in the statement.
    pub fn grounding(&self, factor: &Factor, problem: &str) -> (bool, String) {
        let terms = Self::key_terms(&factor.name);
        if terms.is_empty() {
            return (false, "Factor name contains no meaningful terms".to_string());
        }

        let problem = problem.to_lowercase();
        let found = terms.iter().filter(|t| problem.contains(t.as_str())).count();
        let ratio = found as f64 / terms.len() as f64;

        if ratio >= self.config.grounding_ratio {
            (
                true,
                format!("Grounded: {}/{} key terms found", found, terms.len()),
            )
        } else {
            (
                false,
                format!("Not grounded: only {}/{} key terms found", found, terms.len()),
            )
        }
    }

    /// Whether the factor names an outcome instead of a cause.
    pub fn circularity(&self, factor: &Factor) -> (bool, String) {
        let combined = format!("{} {}", factor.name, factor.description);

        if CAUSAL_FRAMES.is_match(&combined) {
            return (false, "Valid causal frame".to_string());
        }

        let mut terms: Vec<String> = OUTCOME_TERMS
            .find_iter(&combined)
            .map(|m| m.as_str().to_lowercase())
            .collect();
        terms.dedup();
        if terms.is_empty() {
            return (false, "No circular reasoning detected".to_string());
        }

        if MECHANISM.is_match(&factor.description) {
            (
                false,
                format!(
                    "Outcome terms ({}) with an explained mechanism",
                    terms.join(", ")
                ),
            )
        } else {
            (
                true,
                format!("CIRCULAR: describes outcome ({}) not cause", terms.join(", ")),
            )
        }
    }

    pub fn validate(&self, factor: &Factor, problem: &str) -> FactorValidation {
        let (grounded, grounding_note) = self.grounding(factor, problem);
        let (circular, circular_note) = self.circularity(factor);
        debug!(
            factor_id = factor.id,
            grounded, circular, "Factor validated"
        );
        FactorValidation {
            factor_id: factor.id,
            grounded,
            grounding_note,
            circular,
            circular_note,
        }
    }

    pub fn validate_all(&self, factors: &[Factor], problem: &str) -> Vec<FactorValidation> {
        factors.iter().map(|f| self.validate(f, problem)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROBLEM: &str = "Our retail chain saw declining foot traffic while online \
        competitors expanded. Management cut staffing budgets to protect margins.";

    #[test]
    fn test_grounded_factor() {
        let validator = FactorValidator::default();
        let factor = Factor::new(1, "Declining foot traffic", "Fewer store visits");
        let (grounded, note) = validator.grounding(&factor, PROBLEM);
        assert!(grounded, "{note}");
        assert!(note.starts_with("Grounded: 3/3"));
    }

    #[test]
    fn test_ungrounded_factor() {
        let validator = FactorValidator::default();
        let factor = Factor::new(1, "Supply shipping disruption", "Vendor delays");
        let (grounded, note) = validator.grounding(&factor, PROBLEM);
        assert!(!grounded);
        assert!(note.contains("0/3"));
    }

    #[test]
    fn test_stopwords_and_short_words_ignored() {
        let validator = FactorValidator::default();
        let factor = Factor::new(1, "The cut of it", "x");
        let (grounded, note) = validator.grounding(&factor, PROBLEM);
        assert!(!grounded);
        assert_eq!(note, "Factor name contains no meaningful terms");
    }

    #[test]
    fn test_grounding_ratio_is_configurable() {
        let strict = FactorValidator::new(ValidationConfig {
            grounding_ratio: 1.0,
        });
        // "staffing" and "budgets" present, "morale" absent
        let factor = Factor::new(1, "Staffing budgets morale", "x");
        assert!(!strict.grounding(&factor, PROBLEM).0);
        assert!(FactorValidator::default().grounding(&factor, PROBLEM).0);
    }

    #[test]
    fn test_outcome_as_cause_is_circular() {
        let validator = FactorValidator::default();
        let factor = Factor::new(1, "Business impact", "The overall impact on the chain");
        let (circular, note) = validator.circularity(&factor);
        assert!(circular);
        assert!(note.starts_with("CIRCULAR"));
    }

    #[test]
    fn test_mechanism_clears_outcome_terms() {
        let validator = FactorValidator::default();
        let factor = Factor::new(
            1,
            "Margin trade-off",
            "Staff cuts lead to longer queues which drives customers online",
        );
        assert!(!validator.circularity(&factor).0);
    }

    #[test]
    fn test_causal_frame_whitelisted() {
        let validator = FactorValidator::default();
        let factor = Factor::new(1, "Resource constraint issues", "Budget problems");
        assert!(!validator.circularity(&factor).0);
    }

    #[test]
    fn test_validate_all() {
        let validator = FactorValidator::default();
        let factors = vec![
            Factor::new(1, "Online competitors", "Competitors expanded online"),
            Factor::new(2, "Negative outcomes", "Bad results overall"),
        ];
        let results = validator.validate_all(&factors, PROBLEM);
        assert_eq!(results.len(), 2);
        assert!(results[0].is_valid());
        assert!(results[1].circular);
        assert!(!results[1].grounded);
    }
}
