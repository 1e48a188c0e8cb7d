//! Span tree traversal.
//!
//! Converts between the tracer's arena and the nested wire form, and
//! flattens nested trees with an explicit stack so pathological depths
//! never exhaust the call stack.

use serde::Serialize;
use std::collections::HashMap;

use crate::record::SpanRecord;
use crate::span::{Span, SpanId};

/// A span reached during a flatten walk.
#[derive(Debug, Clone, Copy)]
pub struct FlatSpan<'a> {
    pub span: &'a SpanRecord,
    /// Index of the parent within the flattened list.
    pub parent: Option<usize>,
    pub depth: usize,
}

/// Flatten a span tree in pre-order (parent before children, children in
/// recorded order), attaching parent indices during the walk.
pub fn flatten(root: &SpanRecord) -> Vec<FlatSpan<'_>> {
    let mut flat = Vec::new();
    let mut stack: Vec<(&SpanRecord, Option<usize>, usize)> = vec![(root, None, 0)];

    while let Some((span, parent, depth)) = stack.pop() {
        let index = flat.len();
        flat.push(FlatSpan {
            span,
            parent,
            depth,
        });
        for child in span.children.iter().rev() {
            stack.push((child, Some(index), depth + 1));
        }
    }

    flat
}

/// A span annotated with its position in the tree and timeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpanView {
    #[serde(flatten)]
    pub span: SpanRecord,
    /// Distance to the root; the root has depth 0.
    pub depth: usize,
    /// Start time relative to the root's start, in milliseconds.
    pub start_offset_ms: Option<i64>,
}

/// Flat views of a recorded (deserialized) trace, in pre-order.
pub fn views(root: &SpanRecord) -> Vec<SpanView> {
    let root_start = root.start_time;

    flatten(root)
        .into_iter()
        .map(|flat| SpanView {
            span: leaf(flat.span),
            depth: flat.depth,
            start_offset_ms: match (root_start, flat.span.start_time) {
                (Some(root_start), Some(start)) => Some((start - root_start).num_milliseconds()),
                _ => None,
            },
        })
        .collect()
}

fn leaf(span: &SpanRecord) -> SpanRecord {
    SpanRecord {
        children: Vec::new(),
        ..span.clone()
    }
}

impl From<&Span> for SpanRecord {
    /// Wire form of an arena span, without children.
    fn from(span: &Span) -> Self {
        let llm = span.llm.as_ref();
        let api = span.api.as_ref();
        let db = span.db.as_ref();

        SpanRecord {
            span_id: span.span_id.clone(),
            name: span.name.clone(),
            span_type: Some(span.span_type.clone()),
            parent_span_id: span.parent_span_id.clone(),
            status: Some(span.status),
            start_time: Some(span.start_time),
            end_time: span.end_time,
            duration_ms: span.duration_ms,
            metadata: span.metadata.clone(),
            input: span.input.clone(),
            output: span.output.clone(),
            error: span.error.clone(),
            model: llm.map(|l| l.model.clone()),
            tokens_input: llm.map(|l| l.tokens_input),
            tokens_output: llm.map(|l| l.tokens_output),
            tokens_total: llm.map(|l| l.tokens_total()),
            cost_usd: llm.map(|l| l.cost_usd),
            temperature: llm.and_then(|l| l.temperature),
            max_tokens: llm.and_then(|l| l.max_tokens),
            streaming: llm.map(|l| l.streaming).unwrap_or(false),
            http_method: api.map(|a| a.method.clone()),
            http_url: api.map(|a| a.url.clone()),
            http_status: api.map(|a| a.status),
            db_operation: db.map(|d| d.operation.clone()),
            db_collection: db.map(|d| d.collection.clone()),
            children: Vec::new(),
        }
    }
}

/// Build the nested tree rooted at `root_id` from an arena.
///
/// Children are assembled bottom-up from a post-order listing, so the
/// construction is iterative as well. Ids referenced as children but absent
/// from the arena are skipped.
pub fn build_nested(spans: &HashMap<SpanId, Span>, root_id: &str) -> Option<SpanRecord> {
    let root = spans.get(root_id)?;

    // Pre-order listing; reversed it visits every child before its parent.
    let mut order: Vec<&Span> = Vec::new();
    let mut stack = vec![root];
    while let Some(span) = stack.pop() {
        order.push(span);
        for child_id in span.children.iter().rev() {
            if let Some(child) = spans.get(child_id) {
                stack.push(child);
            }
        }
    }

    let mut built: HashMap<&str, SpanRecord> = HashMap::with_capacity(order.len());
    for span in order.into_iter().rev() {
        let mut record = SpanRecord::from(span);
        record.children = span
            .children
            .iter()
            .filter_map(|child_id| built.remove(child_id.as_str()))
            .collect();
        built.insert(span.span_id.as_str(), record);
    }

    built.remove(root_id)
}
