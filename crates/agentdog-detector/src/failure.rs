//! Failure records and the scored detection report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use agentdog_span::SpanRecord;

/// Broad class of a coordination failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureType {
    /// Fabricated model, API, field or type
    Hallucination,
    /// Internally contradictory span record
    LogicalInconsistency,
    /// Claim or reference not backed by the trace
    MissingContext,
    /// Broken inter-agent coordination rule
    ContractViolation,
}

impl FailureType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureType::Hallucination => "hallucination",
            FailureType::LogicalInconsistency => "logical_inconsistency",
            FailureType::MissingContext => "missing_context",
            FailureType::ContractViolation => "contract_violation",
        }
    }
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity level for failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub const ALL: [Severity; 3] = [Severity::High, Severity::Medium, Severity::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Specific kind of failure; each maps to exactly one `FailureType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureSubtype {
    InvalidModel,
    InvalidSpanType,
    InventedApi,
    InventedField,
    StatusErrorMismatch,
    MissingErrorDetails,
    TokenCountMismatch,
    DurationInconsistency,
    UnverifiableClaim,
    MissingReference,
    ExecutionOrder,
    WrongParent,
    DurationExceeded,
    MissingOutputFields,
}

impl FailureSubtype {
    pub fn failure_type(&self) -> FailureType {
        use FailureSubtype::*;
        match self {
            InvalidModel | InvalidSpanType | InventedApi | InventedField => FailureType::Hallucination,
            StatusErrorMismatch | MissingErrorDetails | TokenCountMismatch | DurationInconsistency => {
                FailureType::LogicalInconsistency
            }
            UnverifiableClaim | MissingReference => FailureType::MissingContext,
            ExecutionOrder | WrongParent | DurationExceeded | MissingOutputFields => {
                FailureType::ContractViolation
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        use FailureSubtype::*;
        match self {
            InvalidModel => "invalid_model",
            InvalidSpanType => "invalid_span_type",
            InventedApi => "invented_api",
            InventedField => "invented_field",
            StatusErrorMismatch => "status_error_mismatch",
            MissingErrorDetails => "missing_error_details",
            TokenCountMismatch => "token_count_mismatch",
            DurationInconsistency => "duration_inconsistency",
            UnverifiableClaim => "unverifiable_claim",
            MissingReference => "missing_reference",
            ExecutionOrder => "execution_order",
            WrongParent => "wrong_parent",
            DurationExceeded => "duration_exceeded",
            MissingOutputFields => "missing_output_fields",
        }
    }
}

impl fmt::Display for FailureSubtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One detected defect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    #[serde(rename = "type")]
    pub failure_type: FailureType,
    pub subtype: FailureSubtype,
    pub severity: Severity,
    pub span_id: String,
    pub span_name: String,
    pub message: String,
    /// Defect-specific values backing the judgment
    pub evidence: serde_json::Map<String, serde_json::Value>,
}

impl FailureRecord {
    /// Create a record for `span`; the failure type follows from the subtype.
    pub fn new(
        subtype: FailureSubtype,
        severity: Severity,
        span: &SpanRecord,
        message: impl Into<String>,
    ) -> Self {
        Self {
            failure_type: subtype.failure_type(),
            subtype,
            severity,
            span_id: span.span_id.clone(),
            span_name: span.name.clone(),
            message: message.into(),
            evidence: serde_json::Map::new(),
        }
    }

    /// Add one evidence entry
    pub fn with_evidence(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.evidence.insert(key.to_string(), value.into());
        self
    }
}

impl fmt::Display for FailureRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}/{} at '{}': {}",
            self.severity, self.failure_type, self.subtype, self.span_name, self.message
        )
    }
}

/// Points deducted from the health score per failure, by severity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub high: f64,
    pub medium: f64,
    pub low: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            high: 15.0,
            medium: 5.0,
            low: 1.0,
        }
    }
}

impl ScoringWeights {
    pub fn weight(&self, severity: Severity) -> f64 {
        match severity {
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
        }
    }

    /// Health score in [0, 100] for the given severity counts.
    pub fn health_score(&self, by_severity: &BTreeMap<Severity, usize>) -> f64 {
        let deducted: f64 = by_severity
            .iter()
            .map(|(severity, count)| self.weight(*severity).max(0.0) * *count as f64)
            .sum();
        (100.0 - deducted).clamp(0.0, 100.0)
    }
}

/// Aggregate counts and score for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionSummary {
    pub total_failures: usize,
    pub by_type: BTreeMap<FailureType, usize>,
    /// Always carries high, medium and low, even when zero
    pub by_severity: BTreeMap<Severity, usize>,
    /// Number of high-severity failures
    pub critical_issues: usize,
    pub health_score: f64,
}

impl DetectionSummary {
    pub fn from_failures(failures: &[FailureRecord], weights: &ScoringWeights) -> Self {
        let mut by_type = BTreeMap::new();
        let mut by_severity: BTreeMap<Severity, usize> =
            Severity::ALL.iter().map(|s| (*s, 0)).collect();

        for failure in failures {
            *by_type.entry(failure.failure_type).or_insert(0) += 1;
            *by_severity.entry(failure.severity).or_insert(0) += 1;
        }

        Self {
            total_failures: failures.len(),
            critical_issues: by_severity.get(&Severity::High).copied().unwrap_or(0),
            health_score: weights.health_score(&by_severity),
            by_type,
            by_severity,
        }
    }
}

/// Per-run detection report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub run_id: Option<String>,
    pub workflow_type: String,
    pub detected_at: DateTime<Utc>,
    pub has_failures: bool,
    pub failure_count: usize,
    pub failures: Vec<FailureRecord>,
    pub summary: DetectionSummary,
}

impl DetectionResult {
    /// Failures of the given subtype
    pub fn failures_of(&self, subtype: FailureSubtype) -> impl Iterator<Item = &FailureRecord> {
        self.failures.iter().filter(move |f| f.subtype == subtype)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentdog_span::SpanType;

    fn record(subtype: FailureSubtype, severity: Severity) -> FailureRecord {
        let span = SpanRecord::new("s1", "analyzer", SpanType::Agent);
        FailureRecord::new(subtype, severity, &span, "test")
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
    }

    #[test]
    fn test_subtype_maps_to_type() {
        assert_eq!(FailureSubtype::InventedApi.failure_type(), FailureType::Hallucination);
        assert_eq!(
            FailureSubtype::DurationInconsistency.failure_type(),
            FailureType::LogicalInconsistency
        );
        assert_eq!(FailureSubtype::MissingReference.failure_type(), FailureType::MissingContext);
        assert_eq!(
            FailureSubtype::MissingOutputFields.failure_type(),
            FailureType::ContractViolation
        );
    }

    #[test]
    fn test_record_serializes_wire_names() {
        let failure = record(FailureSubtype::TokenCountMismatch, Severity::Low)
            .with_evidence("tokens_total", 10);
        let value = serde_json::to_value(&failure).unwrap();
        assert_eq!(value["type"], "logical_inconsistency");
        assert_eq!(value["subtype"], "token_count_mismatch");
        assert_eq!(value["severity"], "low");
        assert_eq!(value["evidence"]["tokens_total"], 10);
    }

    #[test]
    fn test_summary_counts_and_score() {
        let failures = vec![
            record(FailureSubtype::InvalidModel, Severity::High),
            record(FailureSubtype::InventedField, Severity::Medium),
            record(FailureSubtype::DurationExceeded, Severity::Low),
        ];
        let summary = DetectionSummary::from_failures(&failures, &ScoringWeights::default());

        assert_eq!(summary.total_failures, 3);
        assert_eq!(summary.critical_issues, 1);
        assert_eq!(summary.by_type.get(&FailureType::Hallucination), Some(&2));
        assert!((summary.health_score - 79.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_summary_has_all_severities() {
        let summary = DetectionSummary::from_failures(&[], &ScoringWeights::default());
        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["by_severity"]["high"], 0);
        assert_eq!(value["by_severity"]["medium"], 0);
        assert_eq!(value["by_severity"]["low"], 0);
        assert_eq!(summary.health_score, 100.0);
    }

    #[test]
    fn test_health_score_clamped() {
        let failures: Vec<_> = (0..10)
            .map(|_| record(FailureSubtype::MissingReference, Severity::High))
            .collect();
        let summary = DetectionSummary::from_failures(&failures, &ScoringWeights::default());
        assert_eq!(summary.health_score, 0.0);
    }
}
