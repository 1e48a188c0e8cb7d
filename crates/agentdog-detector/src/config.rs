//! Detector configuration
//!
//! Every heuristic threshold is a named, overridable value. Configuration
//! loads from JSON, YAML or TOML; omitted keys keep their defaults.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{DetectorError, Result};
use crate::failure::ScoringWeights;
use crate::workflow::WorkflowRegistry;

/// Default pattern for endpoint-shaped paths in agent output
pub const DEFAULT_API_PATH_PATTERN: &str = r"/api/[a-zA-Z0-9_/-]+";

/// Tuning values for the lexical heuristics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Fraction of a claim's key terms that must appear in context
    pub claim_verification_ratio: f64,
    /// Sentences must be longer than this many characters to count as claims
    pub claim_min_length: usize,
    /// Only the first N sentences of an output are considered
    pub max_claim_sentences: usize,
    pub key_terms_per_claim: usize,
    /// Minimum length of a key term, in characters
    pub key_term_min_length: usize,
    /// Significant words a reference needs before it is checked, and the
    /// number that must co-occur in another span to substantiate it
    pub reference_min_significant_words: usize,
    pub reference_word_min_length: usize,
    pub reference_stop_words: Vec<String>,
    /// Slack allowed when a child outlasts its parent
    pub duration_tolerance_ms: u64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            claim_verification_ratio: 0.5,
            claim_min_length: 20,
            max_claim_sentences: 5,
            key_terms_per_claim: 3,
            key_term_min_length: 5,
            reference_min_significant_words: 2,
            reference_word_min_length: 4,
            reference_stop_words: ["the", "this", "that", "with", "from", "data"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            duration_tolerance_ms: 0,
        }
    }
}

/// Complete detector configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub thresholds: Thresholds,
    pub scoring: ScoringWeights,
    /// Prefixes of real endpoints; other `/api/` paths are invented
    pub api_allow_list: Vec<String>,
    pub api_path_pattern: String,
    pub registry: WorkflowRegistry,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            scoring: ScoringWeights::default(),
            api_allow_list: [
                "/api/chat",
                "/api/runs",
                "/api/run/",
                "/api/event",
                "/api/step/",
                "/api/summary/",
                "/api/ingest-sample",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            api_path_pattern: DEFAULT_API_PATH_PATTERN.to_string(),
            registry: WorkflowRegistry::default(),
        }
    }
}

impl DetectorConfig {
    /// Load configuration, picking the format from the file extension
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();
        let content = std::fs::read_to_string(path)
            .map_err(|e| DetectorError::FileError(format!("{}: {}", path.display(), e)))?;

        let config: DetectorConfig = match extension.as_str() {
            "json" => serde_json::from_str(&content)?,
            "yaml" | "yml" => serde_yaml::from_str(&content)?,
            "toml" => toml::from_str(&content)?,
            _ => return Err(DetectorError::UnsupportedFormat(extension)),
        };

        tracing::debug!(path = %path.display(), profiles = config.registry.profiles.len(), "Loaded detector config");
        config.validate()?;
        Ok(config)
    }

    /// Reject values the heuristics cannot work with
    pub fn validate(&self) -> Result<()> {
        let ratio = self.thresholds.claim_verification_ratio;
        if !(0.0..=1.0).contains(&ratio) {
            return Err(DetectorError::InvalidConfig(format!(
                "claim_verification_ratio must be within [0, 1], got {}",
                ratio
            )));
        }

        let weights = &self.scoring;
        if [weights.high, weights.medium, weights.low].iter().any(|w| *w < 0.0 || !w.is_finite()) {
            return Err(DetectorError::InvalidConfig(
                "scoring weights must be finite and non-negative".to_string(),
            ));
        }

        if let Some(profile) = self.registry.profiles.iter().find(|p| p.name.is_empty()) {
            return Err(DetectorError::InvalidConfig(format!(
                "workflow profile with keywords {:?} has no name",
                profile.root_keywords
            )));
        }

        Ok(())
    }

    /// Whether `path` starts with an allow-listed endpoint prefix
    pub fn is_known_api(&self, path: &str) -> bool {
        self.api_allow_list.iter().any(|prefix| path.starts_with(prefix.as_str()))
    }
}
