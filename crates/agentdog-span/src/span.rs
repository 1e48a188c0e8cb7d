//! Core span types for workflow tracing.
//!
//! Defines `Span`, `SpanType`, and `SpanStatus` along with the
//! variant-specific detail blocks attached to LLM, API and database spans.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a span inside a trace.
pub type SpanId = String;

/// Free-form span metadata.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Status of a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanStatus {
    Running,
    Success,
    Error,
}

impl SpanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpanStatus::Running => "running",
            SpanStatus::Success => "success",
            SpanStatus::Error => "error",
        }
    }

    /// Whether this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SpanStatus::Running)
    }
}

impl fmt::Display for SpanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of operation a span records.
///
/// Tags outside the recognized set are kept verbatim in `Other` so that a
/// recorded trace round-trips without losing what the producer claimed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SpanType {
    Root,
    Agent,
    LlmCall,
    ApiCall,
    Database,
    Tool,
    Retrieval,
    Other(String),
}

impl SpanType {
    /// Every recognized span type.
    pub const RECOGNIZED: [SpanType; 7] = [
        SpanType::Root,
        SpanType::Agent,
        SpanType::LlmCall,
        SpanType::ApiCall,
        SpanType::Database,
        SpanType::Tool,
        SpanType::Retrieval,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            SpanType::Root => "root",
            SpanType::Agent => "agent",
            SpanType::LlmCall => "llm_call",
            SpanType::ApiCall => "api_call",
            SpanType::Database => "database",
            SpanType::Tool => "tool",
            SpanType::Retrieval => "retrieval",
            SpanType::Other(tag) => tag,
        }
    }

    /// Whether the tag belongs to the fixed enumeration.
    pub fn is_recognized(&self) -> bool {
        !matches!(self, SpanType::Other(_))
    }
}

impl From<String> for SpanType {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "root" => SpanType::Root,
            "agent" => SpanType::Agent,
            "llm_call" => SpanType::LlmCall,
            "api_call" => SpanType::ApiCall,
            "database" => SpanType::Database,
            "tool" => SpanType::Tool,
            "retrieval" => SpanType::Retrieval,
            _ => SpanType::Other(tag),
        }
    }
}

impl From<&str> for SpanType {
    fn from(tag: &str) -> Self {
        SpanType::from(tag.to_string())
    }
}

impl From<SpanType> for String {
    fn from(span_type: SpanType) -> Self {
        match span_type {
            SpanType::Other(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for SpanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Model invocation details for `llm_call` spans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmDetails {
    pub model: String,
    pub tokens_input: u64,
    pub tokens_output: u64,
    pub cost_usd: f64,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u64>,
    #[serde(default)]
    pub streaming: bool,
}

impl LlmDetails {
    pub fn new(model: impl Into<String>, tokens_input: u64, tokens_output: u64, cost_usd: f64) -> Self {
        Self {
            model: model.into(),
            tokens_input,
            tokens_output,
            cost_usd,
            temperature: None,
            max_tokens: None,
            streaming: false,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u64) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn tokens_total(&self) -> u64 {
        self.tokens_input + self.tokens_output
    }
}

/// HTTP call details for `api_call` spans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiDetails {
    pub method: String,
    pub url: String,
    /// Response status; 0 until the response arrives.
    pub status: u16,
}

impl ApiDetails {
    pub fn new(method: impl Into<String>, url: impl Into<String>, status: u16) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            status,
        }
    }
}

/// Storage operation details for `database` spans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbDetails {
    pub operation: String,
    pub collection: String,
}

impl DbDetails {
    pub fn new(operation: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            collection: collection.into(),
        }
    }
}

/// A single span held in the tracer's arena.
///
/// Children are stored as ids and the parent as an id, so the arena has no
/// ownership cycles and serializes without following references.
#[derive(Debug, Clone)]
pub struct Span {
    pub span_id: SpanId,
    pub name: String,
    pub span_type: SpanType,
    pub parent_span_id: Option<SpanId>,
    pub status: SpanStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub metadata: Metadata,
    pub input: Option<serde_json::Value>,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    pub llm: Option<LlmDetails>,
    pub api: Option<ApiDetails>,
    pub db: Option<DbDetails>,
    pub children: Vec<SpanId>,
}

impl Span {
    /// Create a running span started at `started_at`.
    pub fn new(
        name: impl Into<String>,
        span_type: SpanType,
        parent_span_id: Option<SpanId>,
        metadata: Metadata,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            span_id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            span_type,
            parent_span_id,
            status: SpanStatus::Running,
            start_time: started_at,
            end_time: None,
            duration_ms: None,
            metadata,
            input: None,
            output: None,
            error: None,
            llm: None,
            api: None,
            db: None,
            children: Vec::new(),
        }
    }

    /// Whether `end` has already been applied.
    pub fn is_ended(&self) -> bool {
        self.end_time.is_some()
    }

    /// Move the span to a terminal state.
    ///
    /// A supplied error always forces `SpanStatus::Error`. Requesting
    /// `Running` without an error is treated as success. An end instant
    /// earlier than the start (clock stepped back) is stamped as the start.
    pub fn end(&mut self, ended_at: DateTime<Utc>, status: SpanStatus, error: Option<String>) {
        let ended_at = ended_at.max(self.start_time);
        self.end_time = Some(ended_at);
        self.duration_ms = Some(
            u64::try_from((ended_at - self.start_time).num_milliseconds()).unwrap_or_default(),
        );
        self.status = match (&error, status) {
            (Some(_), _) => SpanStatus::Error,
            (None, SpanStatus::Running) => SpanStatus::Success,
            (None, status) => status,
        };
        if error.is_some() {
            self.error = error;
        }
    }

    /// Total tokens recorded by attached LLM details.
    pub fn tokens_total(&self) -> Option<u64> {
        self.llm.as_ref().map(LlmDetails::tokens_total)
    }

    /// Cost recorded by attached LLM details.
    pub fn cost_usd(&self) -> Option<f64> {
        self.llm.as_ref().map(|llm| llm.cost_usd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000 + ms).unwrap()
    }

    #[test]
    fn test_span_type_roundtrip_tags() {
        for known in SpanType::RECOGNIZED {
            let tag: String = known.clone().into();
            assert_eq!(SpanType::from(tag), known);
        }
        assert_eq!(
            SpanType::from("planner"),
            SpanType::Other("planner".to_string())
        );
        assert!(!SpanType::from("planner").is_recognized());
    }

    #[test]
    fn test_span_type_serializes_as_plain_tag() {
        let json = serde_json::to_string(&SpanType::LlmCall).unwrap();
        assert_eq!(json, "\"llm_call\"");

        let other: SpanType = serde_json::from_str("\"memory\"").unwrap();
        assert_eq!(other, SpanType::Other("memory".to_string()));
    }

    #[test]
    fn test_new_span_is_running() {
        let span = Span::new("analyzer", SpanType::Agent, None, Metadata::new(), at(0));
        assert_eq!(span.status, SpanStatus::Running);
        assert!(!span.is_ended());
        assert!(span.duration_ms.is_none());
        assert!(span.children.is_empty());
    }

    #[test]
    fn test_end_computes_duration() {
        let mut span = Span::new("analyzer", SpanType::Agent, None, Metadata::new(), at(0));
        span.end(at(1250), SpanStatus::Success, None);

        assert_eq!(span.status, SpanStatus::Success);
        assert_eq!(span.duration_ms, Some(1250));
        assert_eq!(span.end_time, Some(at(1250)));
        assert!(span.error.is_none());
    }

    #[test]
    fn test_end_before_start_stamps_start() {
        let mut span = Span::new("analyzer", SpanType::Agent, None, Metadata::new(), at(500));
        span.end(at(200), SpanStatus::Success, None);

        let end_time = span.end_time.unwrap();
        assert_eq!(end_time, at(500));
        assert_eq!(span.duration_ms, Some(0));
        assert_eq!(
            span.duration_ms,
            Some((end_time - span.start_time).num_milliseconds() as u64)
        );
    }

    #[test]
    fn test_error_forces_error_status() {
        let mut span = Span::new("analyzer", SpanType::Agent, None, Metadata::new(), at(0));
        span.end(at(10), SpanStatus::Success, Some("upstream timeout".to_string()));

        assert_eq!(span.status, SpanStatus::Error);
        assert_eq!(span.error.as_deref(), Some("upstream timeout"));
    }

    #[test]
    fn test_llm_details_total() {
        let details = LlmDetails::new("gpt-4", 120, 80, 0.004)
            .with_temperature(0.2)
            .with_max_tokens(512)
            .streaming(true);
        assert_eq!(details.tokens_total(), 200);
        assert_eq!(details.temperature, Some(0.2));
        assert!(details.streaming);
    }
}
