//! Contract violation detection
//!
//! Checks agent spans against the contract table of the resolved workflow
//! type. Workflows without a table skip this pass entirely.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;

use agentdog_span::SpanRecord;

use super::{DetectionContext, DetectionPass};
use crate::contracts::{AgentContract, ContractTable};
use crate::failure::{FailureRecord, FailureSubtype, FailureType, Severity};

/// Pass for ordering, parentage, duration and output contracts
pub struct ContractPass;

/// When a span finished: its end time, else start plus duration. `None`
/// means it never finished (still running when the trace was recorded).
fn finished_at(span: &SpanRecord) -> Option<DateTime<Utc>> {
    span.end_time.or_else(|| {
        let start = span.start_time?;
        let ms = span.duration_ms?;
        let elapsed = Duration::milliseconds(i64::try_from(ms).unwrap_or(i64::MAX / 2));
        Some(start.checked_add_signed(elapsed).unwrap_or(DateTime::<Utc>::MAX_UTC))
    })
}

impl ContractPass {
    pub fn new() -> Self {
        Self
    }

    fn check_run_first(
        context: &DetectionContext<'_>,
        name: &str,
        failures: &mut Vec<FailureRecord>,
    ) {
        let Some((_, target)) = context.agent_named(name) else {
            return;
        };
        let Some(target_start) = target.start_time else {
            return;
        };

        // Earliest agent that started strictly before the contracted one.
        let first = context
            .agents()
            .filter_map(|(_, span)| span.start_time.map(|start| (start, span)))
            .filter(|(start, _)| *start < target_start)
            .min_by_key(|(start, _)| *start);

        if let Some((_, first)) = first {
            failures.push(
                FailureRecord::new(
                    FailureSubtype::ExecutionOrder,
                    Severity::High,
                    target,
                    format!("{} must run first but didn't", name),
                )
                .with_evidence("first_agent", first.name.as_str())
                .with_evidence("contract", format!("{}.must_run_first", name)),
            );
        }
    }

    fn check_run_after(
        context: &DetectionContext<'_>,
        name: &str,
        contract: &AgentContract,
        failures: &mut Vec<FailureRecord>,
    ) {
        for (_, span) in context.agents().filter(|(_, s)| s.name == name) {
            let Some(start) = span.start_time else {
                continue;
            };
            for predecessor in &contract.must_run_after {
                let Some((_, before)) = context.agent_named(predecessor) else {
                    continue;
                };
                if before.start_time.is_none() {
                    continue;
                }
                let finished = finished_at(before);
                if finished.map_or(true, |finished| start < finished) {
                    let finished_text = finished
                        .map(|f| f.to_rfc3339())
                        .unwrap_or_else(|| "running".to_string());
                    failures.push(
                        FailureRecord::new(
                            FailureSubtype::ExecutionOrder,
                            Severity::High,
                            span,
                            format!("{} started before {} finished", name, predecessor),
                        )
                        .with_evidence("predecessor", predecessor.as_str())
                        .with_evidence("started_at", start.to_rfc3339())
                        .with_evidence("predecessor_finished_at", finished_text)
                        .with_evidence("contract", format!("{}.must_run_after", name)),
                    );
                }
            }
        }
    }

    fn check_parents(
        context: &DetectionContext<'_>,
        table: &ContractTable,
        failures: &mut Vec<FailureRecord>,
    ) {
        let mut reported: HashSet<&str> = HashSet::new();

        for (name, expected) in table.parent_requirements() {
            for (index, span) in context.agents().filter(|(_, s)| s.name == name) {
                let actual = context.parent(index).map(|(_, parent)| parent.name.as_str());
                if actual == Some(expected) || !reported.insert(span.span_id.as_str()) {
                    continue;
                }
                failures.push(
                    FailureRecord::new(
                        FailureSubtype::WrongParent,
                        Severity::High,
                        span,
                        format!("{} must be child of {}", name, expected),
                    )
                    .with_evidence("actual_parent", actual.unwrap_or("none"))
                    .with_evidence("expected_parent", expected),
                );
            }
        }
    }

    fn check_span_limits(
        span: &SpanRecord,
        output_lower: &str,
        contract: &AgentContract,
        failures: &mut Vec<FailureRecord>,
    ) {
        if let (Some(max), Some(duration)) = (contract.max_duration_ms, span.duration_ms) {
            if duration > max {
                failures.push(
                    FailureRecord::new(
                        FailureSubtype::DurationExceeded,
                        Severity::Low,
                        span,
                        "Agent exceeded maximum allowed duration",
                    )
                    .with_evidence("duration_ms", duration)
                    .with_evidence("max_allowed_ms", max),
                );
            }
        }

        let missing: Vec<&str> = contract
            .required_output_fields
            .iter()
            .filter(|field| !output_lower.contains(field.to_lowercase().as_str()))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            failures.push(
                FailureRecord::new(
                    FailureSubtype::MissingOutputFields,
                    Severity::Medium,
                    span,
                    format!("Agent output is missing required fields: {}", missing.join(", ")),
                )
                .with_evidence("missing_fields", missing)
                .with_evidence("required_fields", contract.required_output_fields.clone()),
            );
        }
    }
}

impl Default for ContractPass {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectionPass for ContractPass {
    fn id(&self) -> &str {
        "contract_violation"
    }

    fn name(&self) -> &str {
        "Contract Violations"
    }

    fn description(&self) -> &str {
        "Checks agents against the coordination contracts of their workflow"
    }

    fn failure_type(&self) -> FailureType {
        FailureType::ContractViolation
    }

    fn is_applicable(&self, context: &DetectionContext<'_>) -> bool {
        context.workflow.contracts.is_some()
    }

    fn detect(&self, context: &DetectionContext<'_>) -> Vec<FailureRecord> {
        let Some(table) = context.workflow.contracts else {
            return Vec::new();
        };
        let mut failures = Vec::new();

        for (name, _) in table.agents.iter().filter(|(_, c)| c.must_run_first) {
            Self::check_run_first(context, name, &mut failures);
        }
        for (name, contract) in table.agents.iter().filter(|(_, c)| !c.must_run_after.is_empty()) {
            Self::check_run_after(context, name, contract, &mut failures);
        }
        Self::check_parents(context, table, &mut failures);

        for (index, span) in context.agents() {
            if let Some(contract) = table.agents.get(&span.name) {
                let output_lower = &context.text(index).output_lower;
                Self::check_span_limits(span, output_lower, contract, &mut failures);
            }
        }

        tracing::debug!(
            workflow_type = %context.workflow.workflow_type,
            count = failures.len(),
            "Contract pass complete"
        );
        failures
    }
}
