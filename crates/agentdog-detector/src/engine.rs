//! Coordination failure detection engine
//!
//! Resolves the workflow type of a finished trace, runs every registered
//! detection pass over the flattened span tree, and aggregates the findings
//! into a scored report.

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;

use agentdog_span::Trace;

use crate::config::DetectorConfig;
use crate::error::{DetectorError, Result};
use crate::failure::{DetectionResult, DetectionSummary, FailureRecord, FailureType, ScoringWeights};
use crate::rules::consistency::ConsistencyPass;
use crate::rules::context::MissingContextPass;
use crate::rules::contract::ContractPass;
use crate::rules::hallucination::HallucinationPass;
use crate::rules::{BoxedPass, DetectionContext, DetectionPass};
use crate::text::Lexicon;
use crate::workflow::WorkflowMetadata;

/// The coordination failure detector
///
/// Holds only immutable configuration and compiled patterns; one instance
/// can analyze any number of traces, from any number of threads.
pub struct CoordinationFailureDetector {
    config: DetectorConfig,
    lexicon: Lexicon,
    passes: Vec<Arc<dyn DetectionPass>>,
}

impl std::fmt::Debug for CoordinationFailureDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinationFailureDetector")
            .field("passes", &self.passes.iter().map(|p| p.id()).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl CoordinationFailureDetector {
    /// Create a detector with the default passes
    pub fn new(config: DetectorConfig) -> Result<Self> {
        let mut detector = Self::empty(config)?;
        detector.register_default_passes();
        Ok(detector)
    }

    /// Create a detector with the default configuration
    pub fn with_defaults() -> Result<Self> {
        Self::new(DetectorConfig::default())
    }

    /// Create a detector with no passes registered
    pub fn empty(config: DetectorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            lexicon: Lexicon::new(&config)?,
            config,
            passes: Vec::new(),
        })
    }

    /// Register the four passes in reporting order
    fn register_default_passes(&mut self) {
        self.register(Arc::new(HallucinationPass::new()));
        self.register(Arc::new(ConsistencyPass::new()));
        self.register(Arc::new(MissingContextPass::new()));
        self.register(Arc::new(ContractPass::new()));
    }

    /// Register a detection pass
    pub fn register(&mut self, pass: Arc<dyn DetectionPass>) {
        self.passes.push(pass);
    }

    /// Register a boxed pass
    pub fn register_boxed(&mut self, pass: BoxedPass) {
        self.passes.push(Arc::from(pass));
    }

    pub fn passes(&self) -> &[Arc<dyn DetectionPass>] {
        &self.passes
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Analyze a finished trace.
    ///
    /// Fails with `DetectorError::NoRoot` when the trace has no root span;
    /// otherwise always produces a report, possibly without failures.
    pub fn detect(&self, trace: &Trace, metadata: &WorkflowMetadata) -> Result<DetectionResult> {
        let root = trace.root().ok_or(DetectorError::NoRoot)?;
        let workflow = self
            .config
            .registry
            .resolve(root, metadata.workflow_type.as_deref());
        let run_id = metadata.run_id.clone().or_else(|| trace.run_id.clone());
        let context = DetectionContext::new(root, workflow, &self.config, &self.lexicon);

        let mut builder = DetectionResultBuilder::new(run_id, context.workflow.workflow_type.clone());
        for pass in &self.passes {
            if !pass.is_applicable(&context) {
                tracing::debug!(pass = pass.id(), "Pass not applicable, skipping");
                continue;
            }
            builder.add_pass_result(pass.failure_type(), pass.detect(&context));
        }

        let result = builder.finalize(&self.config.scoring);
        tracing::info!(
            run_id = result.run_id.as_deref().unwrap_or("-"),
            workflow_type = %result.workflow_type,
            spans = context.spans.len(),
            failures = result.failure_count,
            health_score = result.summary.health_score,
            "Coordination analysis complete"
        );
        Ok(result)
    }

    /// Analyze a stored workflow document carrying `run_id` and
    /// `detailed_trace`.
    ///
    /// Returns `None` when the document holds no trace or the trace has no
    /// root span.
    pub fn analyze_workflow(&self, workflow_doc: &Value) -> Option<DetectionResult> {
        let (trace, metadata) = WorkflowMetadata::from_workflow_document(workflow_doc)?;
        match self.detect(&trace, &metadata) {
            Ok(result) => Some(result),
            Err(err) => {
                tracing::debug!(error = %err, "Workflow document not analyzed");
                None
            }
        }
    }
}

/// Analyze a stored workflow document with the default configuration.
pub fn analyze_workflow_coordination(workflow_doc: &Value) -> Option<DetectionResult> {
    match CoordinationFailureDetector::with_defaults() {
        Ok(detector) => detector.analyze_workflow(workflow_doc),
        Err(err) => {
            tracing::warn!(error = %err, "Failed to build default detector");
            None
        }
    }
}

/// Accumulates pass findings in registration order
pub struct DetectionResultBuilder {
    run_id: Option<String>,
    workflow_type: String,
    failures: Vec<FailureRecord>,
}

impl DetectionResultBuilder {
    pub fn new(run_id: Option<String>, workflow_type: String) -> Self {
        Self {
            run_id,
            workflow_type,
            failures: Vec::new(),
        }
    }

    /// Append one pass's findings
    pub fn add_pass_result(&mut self, failure_type: FailureType, failures: Vec<FailureRecord>) {
        tracing::debug!(failure_type = %failure_type, count = failures.len(), "Pass finished");
        self.failures.extend(failures);
    }

    /// Build the final result
    pub fn finalize(self, weights: &ScoringWeights) -> DetectionResult {
        let summary = DetectionSummary::from_failures(&self.failures, weights);
        DetectionResult {
            run_id: self.run_id,
            workflow_type: self.workflow_type,
            detected_at: Utc::now(),
            has_failures: !self.failures.is_empty(),
            failure_count: self.failures.len(),
            failures: self.failures,
            summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failure::FailureSubtype;
    use agentdog_span::{SpanRecord, SpanType};
    use serde_json::json;

    fn trace_with(root: SpanRecord) -> Trace {
        Trace {
            run_id: Some("trace-run".to_string()),
            trace: Some(root),
            ..Trace::default()
        }
    }

    #[test]
    fn test_default_passes_in_order() {
        let detector = CoordinationFailureDetector::with_defaults().unwrap();
        let ids: Vec<&str> = detector.passes().iter().map(|p| p.id()).collect();
        assert_eq!(
            ids,
            vec!["hallucination", "logical_consistency", "missing_context", "contract_violation"]
        );
    }

    #[test]
    fn test_no_root_is_an_error() {
        let detector = CoordinationFailureDetector::with_defaults().unwrap();
        let err = detector
            .detect(&Trace::default(), &WorkflowMetadata::default())
            .unwrap_err();
        assert!(matches!(err, DetectorError::NoRoot));
    }

    #[test]
    fn test_clean_trace_reports_no_failures() {
        let detector = CoordinationFailureDetector::with_defaults().unwrap();
        let root = SpanRecord::new("r", "workflow", SpanType::Root);
        let result = detector
            .detect(&trace_with(root), &WorkflowMetadata::new("run-1"))
            .unwrap();

        assert_eq!(result.run_id.as_deref(), Some("run-1"));
        assert_eq!(result.workflow_type, "unknown");
        assert!(!result.has_failures);
        assert_eq!(result.summary.health_score, 100.0);
    }

    #[test]
    fn test_run_id_falls_back_to_trace() {
        let detector = CoordinationFailureDetector::with_defaults().unwrap();
        let root = SpanRecord::new("r", "workflow", SpanType::Root);
        let result = detector
            .detect(&trace_with(root), &WorkflowMetadata::default())
            .unwrap();
        assert_eq!(result.run_id.as_deref(), Some("trace-run"));
    }

    #[test]
    fn test_failures_ordered_by_pass() {
        let detector = CoordinationFailureDetector::with_defaults().unwrap();
        let mut agent = SpanRecord::new("a", "writer", SpanType::Agent);
        agent.status = Some(agentdog_span::SpanStatus::Error);
        agent.model = Some("gpt-5".to_string());
        let mut root = SpanRecord::new("r", "workflow", SpanType::Root);
        root.children.push(agent);

        let result = detector
            .detect(&trace_with(root), &WorkflowMetadata::default())
            .unwrap();
        let subtypes: Vec<FailureSubtype> = result.failures.iter().map(|f| f.subtype).collect();
        assert_eq!(
            subtypes,
            vec![FailureSubtype::InvalidModel, FailureSubtype::MissingErrorDetails]
        );
        assert_eq!(result.summary.health_score, 80.0);
    }

    #[test]
    fn test_analyze_workflow_document() {
        let doc = json!({
            "run_id": "run-doc",
            "detailed_trace": {
                "trace": {
                    "span_id": "r",
                    "name": "workflow",
                    "span_type": "root",
                    "status": "success",
                    "error": "boom"
                }
            }
        });
        let result = analyze_workflow_coordination(&doc).unwrap();
        assert_eq!(result.run_id.as_deref(), Some("run-doc"));
        assert_eq!(result.failure_count, 1);

        assert!(analyze_workflow_coordination(&json!({"run_id": "x"})).is_none());
        assert!(analyze_workflow_coordination(&json!({"detailed_trace": {"run_id": "x"}})).is_none());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = DetectorConfig::default();
        config.api_path_pattern = "(".to_string();
        assert!(matches!(
            CoordinationFailureDetector::new(config),
            Err(DetectorError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_detector_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CoordinationFailureDetector>();
    }
}
