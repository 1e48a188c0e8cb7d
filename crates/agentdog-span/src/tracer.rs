//! Live trace recording for one workflow run.
//!
//! A `Tracer` owns an arena of spans keyed by id. All mutation goes through a
//! single `RwLock`, so agents running on different threads can open and close
//! spans under a shared parent without losing child appends or reordering
//! the flat index. Once the root span ends the trace is sealed.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::clock::{Clock, SystemClock};
use crate::error::{Result, TraceError};
use crate::record::Trace;
use crate::span::{ApiDetails, DbDetails, LlmDetails, Metadata, Span, SpanId, SpanStatus, SpanType};
use crate::tree::{self, SpanView};

#[derive(Debug, Default)]
struct TraceArena {
    spans: HashMap<SpanId, Span>,
    /// Span ids in creation order.
    order: Vec<SpanId>,
    root_id: Option<SpanId>,
}

impl TraceArena {
    fn get_mut(&mut self, span_id: &str) -> Result<&mut Span> {
        self.spans
            .get_mut(span_id)
            .ok_or_else(|| TraceError::SpanNotFound(span_id.to_string()))
    }

    fn ensure_open(&self) -> Result<()> {
        match self.root_id.as_ref().and_then(|id| self.spans.get(id)) {
            Some(root) if root.is_ended() => Err(TraceError::TraceSealed(root.span_id.clone())),
            _ => Ok(()),
        }
    }

    /// Distance from `span_id` to the root, following parent links.
    ///
    /// The walk is capped at the arena size so a corrupted parent chain
    /// cannot loop forever.
    fn depth(&self, span_id: &str) -> usize {
        let mut depth = 0;
        let mut current = self.spans.get(span_id);
        while let Some(parent_id) = current.and_then(|s| s.parent_span_id.as_deref()) {
            if depth >= self.spans.len() {
                break;
            }
            depth += 1;
            current = self.spans.get(parent_id);
        }
        depth
    }
}

/// Records the span tree of a single workflow run.
///
/// One tracer corresponds to one trace; share it between agents with
/// `Arc<Tracer>`.
pub struct Tracer {
    run_id: String,
    clock: Arc<dyn Clock>,
    state: RwLock<TraceArena>,
}

impl std::fmt::Debug for Tracer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracer")
            .field("run_id", &self.run_id)
            .finish_non_exhaustive()
    }
}

impl Tracer {
    /// Create a tracer backed by the system clock.
    pub fn new(run_id: impl Into<String>) -> Self {
        Self::with_clock(run_id, Arc::new(SystemClock))
    }

    /// Create a tracer with an explicit time source.
    pub fn with_clock(run_id: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            run_id: run_id.into(),
            clock,
            state: RwLock::new(TraceArena::default()),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, TraceArena>> {
        self.state.read().map_err(|_| TraceError::LockPoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, TraceArena>> {
        self.state.write().map_err(|_| TraceError::LockPoisoned)
    }

    /// Start the root span. A tracer accepts exactly one root.
    pub fn start_root(&self, name: impl Into<String>, metadata: Metadata) -> Result<SpanId> {
        let mut state = self.write()?;
        if let Some(existing) = &state.root_id {
            tracing::warn!(run_id = %self.run_id, root = %existing, "Root span already started");
            return Err(TraceError::RootAlreadyStarted(existing.clone()));
        }

        let span = Span::new(name, SpanType::Root, None, metadata, self.clock.now());
        let span_id = span.span_id.clone();
        tracing::debug!(run_id = %self.run_id, span_id = %span_id, name = %span.name, "Started root span");

        state.order.push(span_id.clone());
        state.spans.insert(span_id.clone(), span);
        state.root_id = Some(span_id.clone());
        Ok(span_id)
    }

    /// Start a span under `parent_id`, or under the root when omitted.
    pub fn start_span(
        &self,
        name: impl Into<String>,
        span_type: SpanType,
        parent_id: Option<&str>,
        metadata: Option<Metadata>,
    ) -> Result<SpanId> {
        let mut state = self.write()?;
        state.ensure_open()?;

        let parent_id = match parent_id {
            Some(id) => id.to_string(),
            None => state.root_id.clone().ok_or(TraceError::RootNotStarted)?,
        };

        let span = Span::new(
            name,
            span_type,
            Some(parent_id.clone()),
            metadata.unwrap_or_default(),
            self.clock.now(),
        );
        let span_id = span.span_id.clone();

        state.get_mut(&parent_id)?.children.push(span_id.clone());
        tracing::debug!(
            run_id = %self.run_id,
            span_id = %span_id,
            parent_id = %parent_id,
            span_type = %span.span_type,
            name = %span.name,
            "Started span"
        );
        state.order.push(span_id.clone());
        state.spans.insert(span_id.clone(), span);
        Ok(span_id)
    }

    /// Start an `llm_call` span with the model recorded in its metadata.
    pub fn start_llm_span(
        &self,
        name: impl Into<String>,
        model: &str,
        parent_id: Option<&str>,
        metadata: Option<Metadata>,
    ) -> Result<SpanId> {
        let mut metadata = metadata.unwrap_or_default();
        metadata.insert("model".to_string(), Value::String(model.to_string()));
        self.start_span(name, SpanType::LlmCall, parent_id, Some(metadata))
    }

    /// Start an `api_call` span; the status stays 0 until `set_api_status`.
    pub fn start_api_span(
        &self,
        name: impl Into<String>,
        method: &str,
        url: &str,
        parent_id: Option<&str>,
    ) -> Result<SpanId> {
        let span_id = self.start_span(name, SpanType::ApiCall, parent_id, None)?;
        self.attach_api_details(&span_id, ApiDetails::new(method, url, 0))?;
        Ok(span_id)
    }

    /// Start a `database` span with its operation and collection.
    pub fn start_db_span(
        &self,
        name: impl Into<String>,
        operation: &str,
        collection: &str,
        parent_id: Option<&str>,
    ) -> Result<SpanId> {
        let span_id = self.start_span(name, SpanType::Database, parent_id, None)?;
        self.attach_db_details(&span_id, DbDetails::new(operation, collection))?;
        Ok(span_id)
    }

    /// End a span.
    ///
    /// Ending an already-ended span is a no-op: the first end wins and its
    /// timing is never rewritten.
    pub fn end_span(&self, span_id: &str, status: SpanStatus, error: Option<String>) -> Result<()> {
        let now = self.clock.now();
        let mut state = self.write()?;

        if state.get_mut(span_id)?.is_ended() {
            tracing::debug!(run_id = %self.run_id, span_id = %span_id, "Span already ended");
            return Ok(());
        }
        state.ensure_open()?;

        let span = state.get_mut(span_id)?;
        span.end(now, status, error);
        tracing::debug!(
            run_id = %self.run_id,
            span_id = %span_id,
            status = %span.status,
            duration_ms = span.duration_ms.unwrap_or_default(),
            "Ended span"
        );
        Ok(())
    }

    fn update<F>(&self, span_id: &str, apply: F) -> Result<()>
    where
        F: FnOnce(&mut Span) -> Result<()>,
    {
        let mut state = self.write()?;
        state.ensure_open()?;
        apply(state.get_mut(span_id)?)
    }

    /// Record the span's input payload.
    pub fn set_input(&self, span_id: &str, input: Value) -> Result<()> {
        self.update(span_id, |span| {
            span.input = Some(input);
            Ok(())
        })
    }

    /// Record the span's output payload.
    pub fn set_output(&self, span_id: &str, output: Value) -> Result<()> {
        self.update(span_id, |span| {
            span.output = Some(output);
            Ok(())
        })
    }

    /// Insert one metadata entry.
    pub fn set_metadata(&self, span_id: &str, key: impl Into<String>, value: Value) -> Result<()> {
        self.update(span_id, |span| {
            span.metadata.insert(key.into(), value);
            Ok(())
        })
    }

    /// Attach model details; only valid on `llm_call` spans.
    pub fn attach_llm_details(&self, span_id: &str, details: LlmDetails) -> Result<()> {
        self.update(span_id, |span| {
            require_type(span, SpanType::LlmCall, "llm")?;
            span.llm = Some(details);
            Ok(())
        })
    }

    /// Attach HTTP details; only valid on `api_call` spans.
    pub fn attach_api_details(&self, span_id: &str, details: ApiDetails) -> Result<()> {
        self.update(span_id, |span| {
            require_type(span, SpanType::ApiCall, "api")?;
            span.api = Some(details);
            Ok(())
        })
    }

    /// Update the response status of an `api_call` span.
    pub fn set_api_status(&self, span_id: &str, status: u16) -> Result<()> {
        self.update(span_id, |span| {
            require_type(span, SpanType::ApiCall, "api")?;
            match span.api.as_mut() {
                Some(api) => api.status = status,
                None => span.api = Some(ApiDetails::new("", "", status)),
            }
            Ok(())
        })
    }

    /// Attach storage details; only valid on `database` spans.
    pub fn attach_db_details(&self, span_id: &str, details: DbDetails) -> Result<()> {
        self.update(span_id, |span| {
            require_type(span, SpanType::Database, "database")?;
            span.db = Some(details);
            Ok(())
        })
    }

    /// Snapshot of one span.
    pub fn span(&self, span_id: &str) -> Result<Span> {
        self.read()?
            .spans
            .get(span_id)
            .cloned()
            .ok_or_else(|| TraceError::SpanNotFound(span_id.to_string()))
    }

    /// Id of the root span, if started.
    pub fn root_id(&self) -> Result<Option<SpanId>> {
        Ok(self.read()?.root_id.clone())
    }

    /// Whether the root span has ended.
    pub fn is_sealed(&self) -> Result<bool> {
        Ok(self.read()?.ensure_open().is_err())
    }

    /// The nested trace with aggregates computed over every span.
    pub fn get_trace(&self) -> Result<Trace> {
        let state = self.read()?;
        let root_id = state.root_id.as_deref().ok_or(TraceError::RootNotStarted)?;
        let root = tree::build_nested(&state.spans, root_id)
            .ok_or_else(|| TraceError::SpanNotFound(root_id.to_string()))?;

        Ok(Trace {
            run_id: Some(self.run_id.clone()),
            total_duration_ms: root.duration_ms,
            total_spans: state.spans.len(),
            total_tokens: state.spans.values().filter_map(Span::tokens_total).sum(),
            total_cost_usd: state.spans.values().filter_map(Span::cost_usd).sum(),
            trace: Some(root),
        })
    }

    /// Every span in creation order with its depth and start offset.
    pub fn get_flat_spans(&self) -> Result<Vec<SpanView>> {
        let state = self.read()?;
        let root_start = state
            .root_id
            .as_ref()
            .and_then(|id| state.spans.get(id))
            .map(|root| root.start_time);

        Ok(state
            .order
            .iter()
            .filter_map(|id| state.spans.get(id))
            .map(|span| SpanView {
                span: span.into(),
                depth: state.depth(&span.span_id),
                start_offset_ms: Some(
                    root_start
                        .map(|start| (span.start_time - start).num_milliseconds())
                        .unwrap_or(0),
                ),
            })
            .collect())
    }
}

fn require_type(span: &Span, expected: SpanType, detail: &'static str) -> Result<()> {
    if span.span_type == expected {
        return Ok(());
    }
    tracing::warn!(
        span_id = %span.span_id,
        span_type = %span.span_type,
        detail,
        "Rejected detail block for mismatched span type"
    );
    Err(TraceError::DetailKindMismatch {
        span_id: span.span_id.clone(),
        detail,
        actual: span.span_type.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn manual_tracer() -> (Tracer, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.timestamp_millis_opt(1_700_000_000_000).unwrap(),
        ));
        (Tracer::with_clock("run-1", clock.clone()), clock)
    }

    #[test]
    fn test_start_root_twice_fails() {
        let tracer = Tracer::new("run-1");
        let root = tracer.start_root("workflow", Metadata::new()).unwrap();
        let err = tracer.start_root("workflow", Metadata::new()).unwrap_err();
        assert_eq!(err, TraceError::RootAlreadyStarted(root));
    }

    #[test]
    fn test_start_span_without_root_fails() {
        let tracer = Tracer::new("run-1");
        let err = tracer
            .start_span("agent", SpanType::Agent, None, None)
            .unwrap_err();
        assert_eq!(err, TraceError::RootNotStarted);
    }

    #[test]
    fn test_start_span_defaults_to_root_parent() {
        let tracer = Tracer::new("run-1");
        let root = tracer.start_root("workflow", Metadata::new()).unwrap();
        let agent = tracer.start_span("agent", SpanType::Agent, None, None).unwrap();

        let span = tracer.span(&agent).unwrap();
        assert_eq!(span.parent_span_id.as_deref(), Some(root.as_str()));
        assert_eq!(tracer.span(&root).unwrap().children, vec![agent]);
    }

    #[test]
    fn test_unknown_parent_fails() {
        let tracer = Tracer::new("run-1");
        tracer.start_root("workflow", Metadata::new()).unwrap();
        let err = tracer
            .start_span("agent", SpanType::Agent, Some("missing"), None)
            .unwrap_err();
        assert_eq!(err, TraceError::SpanNotFound("missing".to_string()));
    }

    #[test]
    fn test_end_span_is_first_end_wins() {
        let (tracer, clock) = manual_tracer();
        tracer.start_root("workflow", Metadata::new()).unwrap();
        let agent = tracer.start_span("agent", SpanType::Agent, None, None).unwrap();

        clock.advance(300);
        tracer.end_span(&agent, SpanStatus::Success, None).unwrap();
        clock.advance(900);
        tracer
            .end_span(&agent, SpanStatus::Error, Some("late".to_string()))
            .unwrap();

        let span = tracer.span(&agent).unwrap();
        assert_eq!(span.duration_ms, Some(300));
        assert_eq!(span.status, SpanStatus::Success);
        assert!(span.error.is_none());
    }

    #[test]
    fn test_sealed_trace_rejects_changes() {
        let tracer = Tracer::new("run-1");
        let root = tracer.start_root("workflow", Metadata::new()).unwrap();
        let agent = tracer.start_span("agent", SpanType::Agent, None, None).unwrap();
        tracer.end_span(&root, SpanStatus::Success, None).unwrap();

        assert!(tracer.is_sealed().unwrap());
        assert!(matches!(
            tracer.start_span("late", SpanType::Agent, None, None),
            Err(TraceError::TraceSealed(_))
        ));
        assert!(matches!(
            tracer.end_span(&agent, SpanStatus::Success, None),
            Err(TraceError::TraceSealed(_))
        ));
        // Ending the root again stays a no-op.
        assert!(tracer.end_span(&root, SpanStatus::Success, None).is_ok());

        // The unfinished agent keeps no end time or duration.
        let span = tracer.span(&agent).unwrap();
        assert_eq!(span.status, SpanStatus::Running);
        assert!(span.duration_ms.is_none());
    }

    #[test]
    fn test_detail_kind_mismatch() {
        let tracer = Tracer::new("run-1");
        tracer.start_root("workflow", Metadata::new()).unwrap();
        let agent = tracer.start_span("agent", SpanType::Agent, None, None).unwrap();

        let err = tracer
            .attach_llm_details(&agent, LlmDetails::new("gpt-4", 1, 1, 0.0))
            .unwrap_err();
        assert!(matches!(err, TraceError::DetailKindMismatch { detail: "llm", .. }));
        assert!(tracer.span(&agent).unwrap().llm.is_none());
    }

    #[test]
    fn test_helper_constructors() {
        let tracer = Tracer::new("run-1");
        tracer.start_root("workflow", Metadata::new()).unwrap();

        let llm = tracer.start_llm_span("call", "gpt-4", None, None).unwrap();
        assert_eq!(tracer.span(&llm).unwrap().metadata.get("model"), Some(&json!("gpt-4")));

        let api = tracer
            .start_api_span("fetch", "GET", "https://example.com/api/runs", None)
            .unwrap();
        tracer.set_api_status(&api, 200).unwrap();
        let api_span = tracer.span(&api).unwrap();
        assert_eq!(api_span.api, Some(ApiDetails::new("GET", "https://example.com/api/runs", 200)));

        let db = tracer.start_db_span("save", "insert", "runs", None).unwrap();
        assert_eq!(tracer.span(&db).unwrap().db, Some(DbDetails::new("insert", "runs")));
    }

    #[test]
    fn test_get_trace_aggregates() {
        let (tracer, clock) = manual_tracer();
        let root = tracer.start_root("workflow", Metadata::new()).unwrap();
        let agent = tracer.start_span("writer", SpanType::Agent, None, None).unwrap();
        let llm = tracer
            .start_span("draft", SpanType::LlmCall, Some(&agent), None)
            .unwrap();
        tracer
            .attach_llm_details(&llm, LlmDetails::new("gpt-4", 100, 50, 0.25))
            .unwrap();
        tracer.set_output(&agent, json!("draft ready")).unwrap();

        clock.advance(120);
        tracer.end_span(&llm, SpanStatus::Success, None).unwrap();
        clock.advance(30);
        tracer.end_span(&agent, SpanStatus::Success, None).unwrap();
        clock.advance(10);
        tracer.end_span(&root, SpanStatus::Success, None).unwrap();

        let trace = tracer.get_trace().unwrap();
        assert_eq!(trace.run_id.as_deref(), Some("run-1"));
        assert_eq!(trace.total_spans, 3);
        assert_eq!(trace.total_tokens, 150);
        assert!((trace.total_cost_usd - 0.25).abs() < 1e-9);
        assert_eq!(trace.total_duration_ms, Some(160));

        let root_record = trace.root().unwrap();
        assert_eq!(root_record.children.len(), 1);
        assert_eq!(root_record.children[0].output, Some(json!("draft ready")));
        assert_eq!(root_record.children[0].children[0].tokens_total, Some(150));
    }

    #[test]
    fn test_flat_spans_depth_and_offset() {
        let (tracer, clock) = manual_tracer();
        tracer.start_root("workflow", Metadata::new()).unwrap();
        clock.advance(5);
        let agent = tracer.start_span("agent", SpanType::Agent, None, None).unwrap();
        clock.advance(7);
        tracer
            .start_span("tool", SpanType::Tool, Some(&agent), None)
            .unwrap();

        let flat = tracer.get_flat_spans().unwrap();
        let depths: Vec<usize> = flat.iter().map(|v| v.depth).collect();
        let offsets: Vec<Option<i64>> = flat.iter().map(|v| v.start_offset_ms).collect();
        assert_eq!(depths, vec![0, 1, 2]);
        assert_eq!(offsets, vec![Some(0), Some(5), Some(12)]);
    }
}
