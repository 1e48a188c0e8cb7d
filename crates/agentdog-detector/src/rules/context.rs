//! Missing-context detection
//!
//! An agent's claims should be traceable to what it was given: its parent's
//! output and its own input. Explicit "based on" references must name data
//! that some other span actually handled.

use std::collections::HashSet;

use agentdog_span::SpanRecord;

use super::{DetectionContext, DetectionPass};
use crate::failure::{FailureRecord, FailureSubtype, FailureType, Severity};
use crate::text;

/// Pass for unverifiable claims and dangling references
pub struct MissingContextPass;

impl MissingContextPass {
    pub fn new() -> Self {
        Self
    }

    fn unverifiable_claims(
        context: &DetectionContext<'_>,
        index: usize,
        span: &SpanRecord,
        failures: &mut Vec<FailureRecord>,
    ) {
        let Some((parent_index, parent)) = context.parent(index) else {
            return;
        };
        let own = context.text(index);
        let verification_context = format!("{} {}", context.text(parent_index).output, own.input);

        for claim in text::extract_claims(&own.output, context.thresholds()) {
            if text::claim_verifiable(&claim, &verification_context, context.thresholds()) {
                continue;
            }
            failures.push(
                FailureRecord::new(
                    FailureSubtype::UnverifiableClaim,
                    Severity::Medium,
                    span,
                    "Agent makes claim that can't be verified from parent context",
                )
                .with_evidence("claim", claim)
                .with_evidence("parent_span", parent.span_id.as_str()),
            );
        }
    }

    /// Whether some span other than `index` handled at least the required
    /// number of the reference's significant words.
    ///
    /// References with too few significant words are too generic to check
    /// and count as present.
    fn reference_exists(context: &DetectionContext<'_>, index: usize, reference: &str) -> bool {
        let thresholds = context.thresholds();
        let words = text::significant_words(reference, thresholds);
        let required = thresholds.reference_min_significant_words;
        if words.len() < required {
            return true;
        }

        context
            .texts()
            .iter()
            .enumerate()
            .filter(|(other, _)| *other != index)
            .any(|(_, t)| {
                text::count_present(&words, &t.output_lower) >= required
                    || text::count_present(&words, &t.input_lower) >= required
            })
    }
}

impl Default for MissingContextPass {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectionPass for MissingContextPass {
    fn id(&self) -> &str {
        "missing_context"
    }

    fn name(&self) -> &str {
        "Missing Context"
    }

    fn description(&self) -> &str {
        "Detects agent claims and references not backed by the trace"
    }

    fn failure_type(&self) -> FailureType {
        FailureType::MissingContext
    }

    fn detect(&self, context: &DetectionContext<'_>) -> Vec<FailureRecord> {
        let mut failures = Vec::new();
        let mut seen_references: HashSet<String> = HashSet::new();

        for (index, span) in context.agents() {
            Self::unverifiable_claims(context, index, span, &mut failures);

            let output = context.text(index).output.as_str();
            if !text::mentions_source(output) {
                continue;
            }
            for reference in context.lexicon.references(output) {
                let key = reference.trim().to_lowercase();
                if seen_references.contains(&key) || Self::reference_exists(context, index, reference) {
                    continue;
                }
                failures.push(
                    FailureRecord::new(
                        FailureSubtype::MissingReference,
                        Severity::High,
                        span,
                        "Agent references data not found in trace",
                    )
                    .with_evidence("reference", reference),
                );
                seen_references.insert(key);
            }
        }

        tracing::debug!(count = failures.len(), "Missing context pass complete");
        failures
    }
}
