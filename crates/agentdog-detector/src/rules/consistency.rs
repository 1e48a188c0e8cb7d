//! Logical consistency checks on individual span records.

use agentdog_span::SpanStatus;

use super::{DetectionContext, DetectionPass};
use crate::failure::{FailureRecord, FailureSubtype, FailureType, Severity};

/// Pass for status, token and duration contradictions
pub struct ConsistencyPass;

impl ConsistencyPass {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ConsistencyPass {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectionPass for ConsistencyPass {
    fn id(&self) -> &str {
        "logical_consistency"
    }

    fn name(&self) -> &str {
        "Logical Consistency"
    }

    fn description(&self) -> &str {
        "Detects contradictory status, token counts and durations"
    }

    fn failure_type(&self) -> FailureType {
        FailureType::LogicalInconsistency
    }

    fn detect(&self, context: &DetectionContext<'_>) -> Vec<FailureRecord> {
        let tolerance = context.thresholds().duration_tolerance_ms;
        let mut failures = Vec::new();

        for (index, span) in context.iter() {
            let error = span.error_message();

            match (span.status, error) {
                (Some(SpanStatus::Success), Some(error)) => failures.push(
                    FailureRecord::new(
                        FailureSubtype::StatusErrorMismatch,
                        Severity::High,
                        span,
                        "Span marked as success but contains error message",
                    )
                    .with_evidence("status", SpanStatus::Success.as_str())
                    .with_evidence("error", error),
                ),
                (Some(SpanStatus::Error), None) => failures.push(
                    FailureRecord::new(
                        FailureSubtype::MissingErrorDetails,
                        Severity::Medium,
                        span,
                        "Span marked as error but missing error details",
                    )
                    .with_evidence("status", SpanStatus::Error.as_str()),
                ),
                _ => {}
            }

            if let Some(total) = span.tokens_total {
                let tokens_in = span.tokens_input.unwrap_or(0);
                let tokens_out = span.tokens_output.unwrap_or(0);
                let expected = tokens_in.saturating_add(tokens_out);
                if expected != total {
                    failures.push(
                        FailureRecord::new(
                            FailureSubtype::TokenCountMismatch,
                            Severity::Low,
                            span,
                            "Token counts don't add up correctly",
                        )
                        .with_evidence("tokens_input", tokens_in)
                        .with_evidence("tokens_output", tokens_out)
                        .with_evidence("tokens_total", total)
                        .with_evidence("expected_total", expected),
                    );
                }
            }

            // Running spans have no duration and are never compared.
            let Some((_, parent)) = context.parent(index) else {
                continue;
            };
            if let (Some(child_ms), Some(parent_ms)) = (span.duration_ms, parent.duration_ms) {
                if child_ms > parent_ms.saturating_add(tolerance) {
                    failures.push(
                        FailureRecord::new(
                            FailureSubtype::DurationInconsistency,
                            Severity::Medium,
                            span,
                            "Child span duration exceeds parent span duration",
                        )
                        .with_evidence("child_duration_ms", child_ms)
                        .with_evidence("parent_duration_ms", parent_ms)
                        .with_evidence("parent_span", parent.span_id.as_str()),
                    );
                }
            }
        }

        tracing::debug!(count = failures.len(), "Consistency pass complete");
        failures
    }
}
