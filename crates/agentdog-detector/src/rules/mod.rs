//! Detection passes
//!
//! Each pass inspects the flattened trace and reports failures of one
//! `FailureType`. Passes are deterministic and never mutate the trace.

pub mod consistency;
pub mod context;
pub mod contract;
pub mod hallucination;

use agentdog_span::{flatten, FlatSpan, SpanRecord, SpanType};

use crate::config::{DetectorConfig, Thresholds};
use crate::failure::{FailureRecord, FailureType};
use crate::text::Lexicon;
use crate::workflow::ResolvedWorkflow;

/// Pre-rendered payload text of one span
#[derive(Debug, Clone)]
pub struct SpanText {
    pub input: String,
    pub output: String,
    pub input_lower: String,
    pub output_lower: String,
    pub metadata_lower: String,
}

impl SpanText {
    fn new(span: &SpanRecord) -> Self {
        let input = span.input_text();
        let output = span.output_text();
        Self {
            input_lower: input.to_lowercase(),
            output_lower: output.to_lowercase(),
            metadata_lower: span.metadata_text().to_lowercase(),
            input,
            output,
        }
    }
}

/// Everything a pass may look at for one run
pub struct DetectionContext<'a> {
    pub spans: Vec<FlatSpan<'a>>,
    texts: Vec<SpanText>,
    pub workflow: ResolvedWorkflow<'a>,
    pub config: &'a DetectorConfig,
    pub lexicon: &'a Lexicon,
}

impl<'a> DetectionContext<'a> {
    pub fn new(
        root: &'a SpanRecord,
        workflow: ResolvedWorkflow<'a>,
        config: &'a DetectorConfig,
        lexicon: &'a Lexicon,
    ) -> Self {
        let spans = flatten(root);
        let texts = spans.iter().map(|flat| SpanText::new(flat.span)).collect();
        Self {
            spans,
            texts,
            workflow,
            config,
            lexicon,
        }
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.config.thresholds
    }

    /// Payload text of the span at `index`
    pub fn text(&self, index: usize) -> &SpanText {
        &self.texts[index]
    }

    /// Direct parent of the span at `index`
    pub fn parent(&self, index: usize) -> Option<(usize, &'a SpanRecord)> {
        let parent = self.spans[index].parent?;
        Some((parent, self.spans[parent].span))
    }

    /// All spans with their flat index
    pub fn iter(&self) -> impl Iterator<Item = (usize, &'a SpanRecord)> + '_ {
        self.spans.iter().enumerate().map(|(i, flat)| (i, flat.span))
    }

    /// Agent spans with their flat index
    pub fn agents(&self) -> impl Iterator<Item = (usize, &'a SpanRecord)> + '_ {
        self.iter().filter(|(_, span)| span.is_type(&SpanType::Agent))
    }

    /// First agent span with the given name, in pre-order
    pub fn agent_named(&self, name: &str) -> Option<(usize, &'a SpanRecord)> {
        self.agents().find(|(_, span)| span.name == name)
    }

    pub fn texts(&self) -> &[SpanText] {
        &self.texts
    }
}

/// Trait for implementing detection passes
pub trait DetectionPass: Send + Sync {
    /// Unique identifier for this pass
    fn id(&self) -> &str;

    /// Human-readable name for this pass
    fn name(&self) -> &str;

    /// Description of what this pass detects
    fn description(&self) -> &str;

    /// Failure type this pass reports
    fn failure_type(&self) -> FailureType;

    /// Check if this pass applies to the run
    fn is_applicable(&self, _context: &DetectionContext<'_>) -> bool {
        true
    }

    /// Run the pass; findings are in span pre-order
    fn detect(&self, context: &DetectionContext<'_>) -> Vec<FailureRecord>;
}

/// A boxed pass for dynamic dispatch
pub type BoxedPass = Box<dyn DetectionPass>;
