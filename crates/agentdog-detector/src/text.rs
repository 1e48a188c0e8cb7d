//! Lexical helpers shared by the detection passes.

use regex::Regex;
use std::collections::BTreeSet;

use crate::config::{DetectorConfig, Thresholds};
use crate::error::{DetectorError, Result};

const FIELD_PATTERN: &str = r"\b([a-z_]+_[a-z_]+)\b";
const REFERENCE_PATTERN: &str = r"(?i)based on ([^.]+)";

/// Patterns compiled once per detector
#[derive(Debug, Clone)]
pub struct Lexicon {
    api_path: Regex,
    field: Regex,
    reference: Regex,
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|source| DetectorError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

impl Lexicon {
    pub fn new(config: &DetectorConfig) -> Result<Self> {
        Ok(Self {
            api_path: compile(&config.api_path_pattern)?,
            field: compile(FIELD_PATTERN)?,
            reference: compile(REFERENCE_PATTERN)?,
        })
    }

    /// Endpoint-shaped paths in order of appearance
    pub fn api_paths<'t>(&'t self, text: &'t str) -> impl Iterator<Item = &'t str> + 't {
        self.api_path.find_iter(text).map(|m| m.as_str())
    }

    /// Distinct lowercase underscore identifiers, sorted
    pub fn field_references(&self, text: &str) -> BTreeSet<String> {
        let lowered = text.to_lowercase();
        self.field
            .captures_iter(&lowered)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .collect()
    }

    /// Text following each "based on" in the output, up to the next period
    pub fn references<'t>(&self, text: &'t str) -> Vec<&'t str> {
        self.reference
            .captures_iter(text)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str())
            .collect()
    }
}

/// Whether the text claims to draw on outside data
pub fn mentions_source(text: &str) -> bool {
    let lowered = text.to_lowercase();
    lowered.contains("based on") || lowered.contains("according to")
}

/// Short declarative sentences among the first few of `text`.
pub fn extract_claims(text: &str, thresholds: &Thresholds) -> Vec<String> {
    text.split('.')
        .take(thresholds.max_claim_sentences)
        .filter(|s| s.chars().count() > thresholds.claim_min_length)
        .filter(|s| s.contains("is ") || s.contains("will ") || s.contains("should "))
        .map(|s| s.trim().to_string())
        .collect()
}

/// The first few sufficiently long words of a claim, lowercased
pub fn key_terms(claim: &str, thresholds: &Thresholds) -> Vec<String> {
    claim
        .to_lowercase()
        .split_whitespace()
        .filter(|w| w.chars().count() >= thresholds.key_term_min_length)
        .take(thresholds.key_terms_per_claim)
        .map(str::to_string)
        .collect()
}

/// Whether enough of the claim's key terms occur in `context`.
///
/// A claim without key terms is considered verifiable.
pub fn claim_verifiable(claim: &str, context: &str, thresholds: &Thresholds) -> bool {
    let terms = key_terms(claim, thresholds);
    if terms.is_empty() {
        return true;
    }
    let context = context.to_lowercase();
    let matches = terms.iter().filter(|t| context.contains(t.as_str())).count();
    matches as f64 >= terms.len() as f64 * thresholds.claim_verification_ratio
}

/// Words of a reference long enough to be worth searching for
pub fn significant_words(reference: &str, thresholds: &Thresholds) -> Vec<String> {
    reference
        .trim()
        .to_lowercase()
        .split_whitespace()
        .filter(|w| w.chars().count() >= thresholds.reference_word_min_length)
        .filter(|w| !thresholds.reference_stop_words.iter().any(|s| s == w))
        .map(str::to_string)
        .collect()
}

/// How many of `words` occur in the (already lowercased) text
pub fn count_present(words: &[String], lowered: &str) -> usize {
    words.iter().filter(|w| lowered.contains(w.as_str())).count()
}
