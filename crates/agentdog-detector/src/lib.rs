//! Coordination failure detection for multi-agent workflow traces.
//!
//! Given a finished trace recorded by `agentdog-span`, the detector infers
//! the workflow type, resolves its valid models and coordination contracts,
//! and runs four passes:
//!
//! 1. **Hallucination**: invented models, span types, API endpoints, fields
//! 2. **Logical consistency**: status/error, token and duration contradictions
//! 3. **Missing context**: unverifiable claims and dangling "based on" references
//! 4. **Contract violations**: ordering, parentage, duration and output rules
//!
//! Findings are aggregated into a `DetectionResult` with a 0-100 health score.
//!
//! ```no_run
//! use agentdog_detector::{CoordinationFailureDetector, WorkflowMetadata};
//! use agentdog_span::Trace;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let trace: Trace = serde_json::from_str(&std::fs::read_to_string("trace.json")?)?;
//! let detector = CoordinationFailureDetector::with_defaults()?;
//! let report = detector.detect(&trace, &WorkflowMetadata::new("run-1"))?;
//! println!("health: {}", report.summary.health_score);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod contracts;
pub mod engine;
pub mod error;
pub mod failure;
pub mod rules;
pub mod text;
pub mod workflow;

pub use config::{DetectorConfig, Thresholds};
pub use contracts::{AgentContract, AgentGroupContract, ContractTable};
pub use engine::{analyze_workflow_coordination, CoordinationFailureDetector, DetectionResultBuilder};
pub use error::{DetectorError, Result};
pub use failure::{
    DetectionResult, DetectionSummary, FailureRecord, FailureSubtype, FailureType, ScoringWeights,
    Severity,
};
pub use rules::{DetectionContext, DetectionPass};
pub use workflow::{InferenceSource, WorkflowMetadata, WorkflowProfile, WorkflowRegistry};
