//! Hallucination detection
//!
//! Flags models, span types, API endpoints and field names that a span
//! claims but that do not exist in the system or anywhere in the trace.

use serde_json::Value;
use std::collections::HashSet;

use agentdog_span::{SpanRecord, SpanType};

use super::{DetectionContext, DetectionPass};
use crate::failure::{FailureRecord, FailureSubtype, FailureType, Severity};

/// Pass for fabricated models, types, endpoints and fields
pub struct HallucinationPass;

impl HallucinationPass {
    pub fn new() -> Self {
        Self
    }

    /// Model declared by the span: the LLM field, else `metadata.model`.
    fn declared_model(span: &SpanRecord) -> Option<&str> {
        span.model
            .as_deref()
            .or_else(|| span.metadata.get("model").and_then(Value::as_str))
            .filter(|m| !m.is_empty())
    }

    fn field_exists(context: &DetectionContext<'_>, field: &str) -> bool {
        context
            .texts()
            .iter()
            .any(|t| t.metadata_lower.contains(field) || t.input_lower.contains(field))
    }
}

impl Default for HallucinationPass {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectionPass for HallucinationPass {
    fn id(&self) -> &str {
        "hallucination"
    }

    fn name(&self) -> &str {
        "Hallucination Detection"
    }

    fn description(&self) -> &str {
        "Detects invented models, span types, API endpoints and fields"
    }

    fn failure_type(&self) -> FailureType {
        FailureType::Hallucination
    }

    fn detect(&self, context: &DetectionContext<'_>) -> Vec<FailureRecord> {
        let workflow = &context.workflow;
        let mut failures = Vec::new();
        let mut seen_apis: HashSet<&str> = HashSet::new();
        let mut seen_fields: HashSet<String> = HashSet::new();

        for (index, span) in context.iter() {
            let output = context.text(index).output.as_str();

            if let Some(model) = Self::declared_model(span) {
                if !workflow.is_valid_model(model) {
                    failures.push(
                        FailureRecord::new(
                            FailureSubtype::InvalidModel,
                            Severity::High,
                            span,
                            format!(
                                "Agent claims to use model '{}' which is not valid for {} workflow",
                                model, workflow.workflow_type
                            ),
                        )
                        .with_evidence("claimed_model", model)
                        .with_evidence("workflow_type", workflow.workflow_type.as_str())
                        .with_evidence(
                            "valid_models_for_workflow",
                            workflow.valid_models.iter().cloned().collect::<Vec<_>>(),
                        ),
                    );
                }
            }

            if let Some(SpanType::Other(tag)) = &span.span_type {
                if !tag.is_empty() {
                    failures.push(
                        FailureRecord::new(
                            FailureSubtype::InvalidSpanType,
                            Severity::Medium,
                            span,
                            format!("Span uses invalid type '{}'", tag),
                        )
                        .with_evidence("claimed_type", tag.as_str())
                        .with_evidence(
                            "valid_types",
                            SpanType::RECOGNIZED.iter().map(|t| t.as_str()).collect::<Vec<_>>(),
                        ),
                    );
                }
            }

            for path in context.lexicon.api_paths(output) {
                if context.config.is_known_api(path) || !seen_apis.insert(path) {
                    continue;
                }
                failures.push(
                    FailureRecord::new(
                        FailureSubtype::InventedApi,
                        Severity::High,
                        span,
                        format!("Agent references non-existent API endpoint '{}'", path),
                    )
                    .with_evidence("claimed_api", path)
                    .with_evidence("found_in", "output")
                    .with_evidence("first_detected_in_span", span.name.as_str()),
                );
            }

            if !span.is_type(&SpanType::Agent) {
                continue;
            }
            for field in context.lexicon.field_references(output) {
                if seen_fields.contains(&field) || Self::field_exists(context, &field) {
                    continue;
                }
                failures.push(
                    FailureRecord::new(
                        FailureSubtype::InventedField,
                        Severity::Medium,
                        span,
                        format!("Agent references field '{}' that doesn't exist in trace", field),
                    )
                    .with_evidence("claimed_field", field.as_str()),
                );
                seen_fields.insert(field);
            }
        }

        tracing::debug!(count = failures.len(), "Hallucination pass complete");
        failures
    }
}
