//! Wire format for recorded traces.
//!
//! `SpanRecord` is the nested, JSON-serializable form of a span tree as it is
//! stored and later handed to analysis. Decoding is lenient: a field with the
//! wrong shape decodes as absent and a child that is not a span object is
//! dropped, so one malformed span never prevents reading the rest of a trace.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use crate::span::{Metadata, SpanStatus, SpanType};

/// One span of a recorded trace, with its children nested inline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpanRecord {
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub span_id: String,
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient")]
    pub span_type: Option<SpanType>,
    #[serde(default, deserialize_with = "lenient")]
    pub parent_span_id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub status: Option<SpanStatus>,
    #[serde(default, deserialize_with = "lenient")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub duration_ms: Option<u64>,
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub metadata: Metadata,
    #[serde(default)]
    pub input: Option<serde_json::Value>,
    #[serde(default)]
    pub output: Option<serde_json::Value>,
    #[serde(default, deserialize_with = "lenient")]
    pub error: Option<String>,

    // LLM fields
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, deserialize_with = "lenient_count", skip_serializing_if = "Option::is_none")]
    pub tokens_input: Option<u64>,
    #[serde(default, deserialize_with = "lenient_count", skip_serializing_if = "Option::is_none")]
    pub tokens_output: Option<u64>,
    #[serde(default, deserialize_with = "lenient_count", skip_serializing_if = "Option::is_none")]
    pub tokens_total: Option<u64>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, deserialize_with = "lenient_count", skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub streaming: bool,

    // API fields
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub http_method: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub http_url: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,

    // Database fields
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub db_operation: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub db_collection: Option<String>,

    #[serde(default, deserialize_with = "lenient_children", skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SpanRecord>,
}

impl SpanRecord {
    /// Create a bare record, mostly useful for assembling traces by hand.
    pub fn new(span_id: impl Into<String>, name: impl Into<String>, span_type: SpanType) -> Self {
        Self {
            span_id: span_id.into(),
            name: name.into(),
            span_type: Some(span_type),
            ..Default::default()
        }
    }

    /// Whether the span carries the given type tag.
    pub fn is_type(&self, span_type: &SpanType) -> bool {
        self.span_type.as_ref() == Some(span_type)
    }

    /// Input rendered as text.
    pub fn input_text(&self) -> String {
        value_text(self.input.as_ref())
    }

    /// Output rendered as text.
    pub fn output_text(&self) -> String {
        value_text(self.output.as_ref())
    }

    /// Metadata rendered as text.
    pub fn metadata_text(&self) -> String {
        if self.metadata.is_empty() {
            return String::new();
        }
        serde_json::to_string(&self.metadata).unwrap_or_default()
    }

    /// Error message, treating an empty string as absent.
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref().filter(|e| !e.is_empty())
    }
}

/// Render an opaque payload as text: strings verbatim, null as empty,
/// anything else as compact JSON.
pub fn value_text(value: Option<&serde_json::Value>) -> String {
    match value {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// A recorded workflow run: the root span tree plus read-time aggregates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    #[serde(default, deserialize_with = "lenient")]
    pub run_id: Option<String>,
    /// Root of the span tree; `None` when the run never produced one.
    #[serde(default, deserialize_with = "lenient")]
    pub trace: Option<SpanRecord>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub total_duration_ms: Option<u64>,
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub total_spans: usize,
    #[serde(default, deserialize_with = "lenient_count_or_default")]
    pub total_tokens: u64,
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub total_cost_usd: f64,
}

impl Trace {
    /// The root span, if any.
    pub fn root(&self) -> Option<&SpanRecord> {
        self.trace.as_ref()
    }
}

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| serde_json::from_value(v).ok()))
}

fn lenient_or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    lenient(deserializer).map(Option::unwrap_or_default)
}

/// Counts and millisecond durations: non-negative integers, or floats with
/// no fractional part (`3500.0`).
fn lenient_count<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(count_from_value))
}

fn lenient_count_or_default<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    lenient_count(deserializer).map(Option::unwrap_or_default)
}

fn count_from_value(value: &serde_json::Value) -> Option<u64> {
    if let Some(count) = value.as_u64() {
        return Some(count);
    }
    let float = value.as_f64()?;
    let integral = float.is_finite() && float >= 0.0 && float.fract() == 0.0;
    (integral && float < u64::MAX as f64).then_some(float as u64)
}

fn lenient_children<'de, D>(deserializer: D) -> Result<Vec<SpanRecord>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    let Some(serde_json::Value::Array(items)) = value else {
        return Ok(Vec::new());
    };

    Ok(items
        .into_iter()
        .filter(serde_json::Value::is_object)
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_malformed_fields_decode_as_absent() {
        let record: SpanRecord = serde_json::from_value(json!({
            "span_id": "s1",
            "name": "writer",
            "span_type": "agent",
            "status": "exploded",
            "duration_ms": "fast",
            "tokens_total": -4,
            "metadata": "not a map",
            "start_time": "yesterday"
        }))
        .unwrap();

        assert_eq!(record.span_id, "s1");
        assert_eq!(record.span_type, Some(SpanType::Agent));
        assert!(record.status.is_none());
        assert!(record.duration_ms.is_none());
        assert!(record.tokens_total.is_none());
        assert!(record.metadata.is_empty());
        assert!(record.start_time.is_none());
    }

    #[test]
    fn test_integral_floats_decode_as_counts() {
        let record: SpanRecord = serde_json::from_value(json!({
            "span_id": "s1",
            "duration_ms": 3500.0,
            "tokens_input": 100.0,
            "tokens_output": 50,
            "tokens_total": 150.5,
            "max_tokens": f64::MAX
        }))
        .unwrap();

        assert_eq!(record.duration_ms, Some(3500));
        assert_eq!(record.tokens_input, Some(100));
        assert_eq!(record.tokens_output, Some(50));
        assert!(record.tokens_total.is_none());
        assert!(record.max_tokens.is_none());

        let trace: Trace =
            serde_json::from_value(json!({"total_duration_ms": 20.0, "total_tokens": 7.0})).unwrap();
        assert_eq!(trace.total_duration_ms, Some(20));
        assert_eq!(trace.total_tokens, 7);
    }

    #[test]
    fn test_malformed_child_is_dropped() {
        let record: SpanRecord = serde_json::from_value(json!({
            "span_id": "root",
            "name": "workflow",
            "children": [
                "garbage",
                {"span_id": "a", "name": "analyzer", "span_type": "agent"},
                42
            ]
        }))
        .unwrap();

        assert_eq!(record.children.len(), 1);
        assert_eq!(record.children[0].name, "analyzer");
    }

    #[test]
    fn test_unknown_span_type_preserved() {
        let record: SpanRecord =
            serde_json::from_value(json!({"span_type": "reflection"})).unwrap();
        assert_eq!(record.span_type, Some(SpanType::Other("reflection".to_string())));
    }

    #[test]
    fn test_value_text() {
        assert_eq!(value_text(None), "");
        assert_eq!(value_text(Some(&json!(null))), "");
        assert_eq!(value_text(Some(&json!("plain"))), "plain");
        assert_eq!(value_text(Some(&json!({"k": 1}))), "{\"k\":1}");
    }

    #[test]
    fn test_trace_without_root() {
        let trace: Trace = serde_json::from_value(json!({"run_id": "run-1"})).unwrap();
        assert_eq!(trace.run_id.as_deref(), Some("run-1"));
        assert!(trace.root().is_none());
    }

    #[test]
    fn test_iso_timestamps_with_offset_parse() {
        let record: SpanRecord = serde_json::from_value(json!({
            "start_time": "2025-01-15T10:00:00.250000+00:00"
        }))
        .unwrap();
        assert!(record.start_time.is_some());
    }
}
