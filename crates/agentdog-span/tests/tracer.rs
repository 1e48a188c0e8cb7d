//! Integration tests for the span tracer
//!
//! Covers:
//! - Tree shape and depth of recorded traces
//! - Duration exactness under a manual clock
//! - Concurrent span creation under a shared parent
//! - Wire round trip of a finished trace

use agentdog_span::{
    flatten, LlmDetails, ManualClock, Metadata, SpanStatus, SpanType, Trace, TraceError, Tracer,
};
use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;

/// Helper to create a tracer on a fixed manual clock
fn create_manual_tracer() -> (Tracer, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(
        Utc.timestamp_millis_opt(1_736_935_200_000).unwrap(),
    ));
    (Tracer::with_clock("run-test", clock.clone()), clock)
}

#[test]
fn test_social_media_run_shape() {
    let (tracer, clock) = create_manual_tracer();
    let mut root_meta = Metadata::new();
    root_meta.insert("workflow_type".to_string(), json!("social_media"));
    let root = tracer.start_root("social_media_workflow", root_meta).unwrap();

    let strategist = tracer
        .start_span("content_strategist", SpanType::Agent, None, None)
        .unwrap();
    let call = tracer
        .start_llm_span("strategy_call", "gpt-4", Some(&strategist), None)
        .unwrap();
    tracer
        .attach_llm_details(&call, LlmDetails::new("gpt-4", 120, 80, 0.01))
        .unwrap();
    clock.advance(200);
    tracer.end_span(&call, SpanStatus::Success, None).unwrap();
    tracer
        .set_output(&strategist, json!("strategy: playful; target_audience: devs; tone: light"))
        .unwrap();
    tracer.end_span(&strategist, SpanStatus::Success, None).unwrap();

    for writer in ["twitter_writer", "linkedin_writer"] {
        let id = tracer.start_span(writer, SpanType::Agent, None, None).unwrap();
        clock.advance(50);
        tracer.end_span(&id, SpanStatus::Success, None).unwrap();
    }
    tracer.end_span(&root, SpanStatus::Success, None).unwrap();

    let trace = tracer.get_trace().unwrap();
    assert_eq!(trace.total_spans, 5);
    assert_eq!(trace.total_tokens, 200);
    assert_eq!(trace.total_duration_ms, Some(300));

    let names: Vec<&str> = flatten(trace.root().unwrap())
        .iter()
        .map(|f| f.span.name.as_str())
        .collect();
    assert_eq!(
        names,
        vec![
            "social_media_workflow",
            "content_strategist",
            "strategy_call",
            "twitter_writer",
            "linkedin_writer"
        ]
    );
}

#[test]
fn test_error_end_records_message() {
    let tracer = Tracer::new("run-test");
    tracer.start_root("workflow", Metadata::new()).unwrap();
    let agent = tracer.start_span("analyzer", SpanType::Agent, None, None).unwrap();

    tracer
        .end_span(&agent, SpanStatus::Success, Some("upstream timeout".to_string()))
        .unwrap();

    let span = tracer.span(&agent).unwrap();
    assert_eq!(span.status, SpanStatus::Error);
    assert_eq!(span.error.as_deref(), Some("upstream timeout"));
}

#[test]
fn test_concurrent_children_are_not_lost() {
    let tracer = Tracer::new("run-concurrent");
    let root = tracer.start_root("workflow", Metadata::new()).unwrap();
    let parent = tracer
        .start_span("coordinator", SpanType::Agent, None, None)
        .unwrap();

    std::thread::scope(|scope| {
        for worker in 0..8 {
            let tracer = &tracer;
            let parent = parent.as_str();
            scope.spawn(move || {
                for i in 0..25 {
                    let id = tracer
                        .start_span(format!("worker_{}_{}", worker, i), SpanType::Tool, Some(parent), None)
                        .unwrap();
                    tracer.end_span(&id, SpanStatus::Success, None).unwrap();
                }
            });
        }
    });

    assert_eq!(tracer.span(&parent).unwrap().children.len(), 200);
    tracer.end_span(&root, SpanStatus::Success, None).unwrap();

    let trace = tracer.get_trace().unwrap();
    assert_eq!(trace.total_spans, 202);
    assert_eq!(tracer.get_flat_spans().unwrap().len(), 202);
}

#[test]
fn test_sealed_trace_is_rejected_after_root_end() {
    let tracer = Tracer::new("run-test");
    let root = tracer.start_root("workflow", Metadata::new()).unwrap();
    tracer.end_span(&root, SpanStatus::Success, None).unwrap();

    let err = tracer
        .set_output(&root, json!("too late"))
        .unwrap_err();
    assert!(matches!(err, TraceError::TraceSealed(_)));
    assert!(err.is_usage_error());
}

#[test]
fn test_trace_wire_round_trip() {
    let (tracer, clock) = create_manual_tracer();
    let root = tracer.start_root("workflow", Metadata::new()).unwrap();
    let api = tracer
        .start_api_span("fetch_runs", "GET", "http://localhost:8000/api/runs", None)
        .unwrap();
    tracer.set_api_status(&api, 200).unwrap();
    clock.advance(15);
    tracer.end_span(&api, SpanStatus::Success, None).unwrap();
    tracer.end_span(&root, SpanStatus::Success, None).unwrap();

    let trace = tracer.get_trace().unwrap();
    let encoded = serde_json::to_string(&trace).unwrap();
    let decoded: Trace = serde_json::from_str(&encoded).unwrap();
    assert_eq!(decoded, trace);

    let child = &decoded.root().unwrap().children[0];
    assert_eq!(child.http_status, Some(200));
    assert_eq!(child.duration_ms, Some(15));
}

proptest! {
    #[test]
    fn prop_depth_matches_nesting(levels in 1usize..40) {
        let tracer = Tracer::new("run-prop");
        tracer.start_root("workflow", Metadata::new()).unwrap();

        let mut parent: Option<String> = None;
        for i in 0..levels {
            let id = tracer
                .start_span(format!("level_{}", i), SpanType::Agent, parent.as_deref(), None)
                .unwrap();
            parent = Some(id);
        }

        let flat = tracer.get_flat_spans().unwrap();
        prop_assert_eq!(flat.len(), levels + 1);
        for (index, view) in flat.iter().enumerate() {
            prop_assert_eq!(view.depth, index);
        }
    }

    #[test]
    fn prop_duration_is_end_minus_start(elapsed in 0i64..86_400_000) {
        let (tracer, clock) = create_manual_tracer();
        tracer.start_root("workflow", Metadata::new()).unwrap();
        let agent = tracer.start_span("agent", SpanType::Agent, None, None).unwrap();
        clock.advance(elapsed);
        tracer.end_span(&agent, SpanStatus::Success, None).unwrap();

        let span = tracer.span(&agent).unwrap();
        let end = span.end_time.unwrap();
        prop_assert_eq!(span.duration_ms, Some(elapsed as u64));
        prop_assert_eq!((end - span.start_time).num_milliseconds(), elapsed);
    }

    #[test]
    fn prop_error_always_forces_error_status(
        message in "[a-z ]{1,30}",
        requested in prop_oneof![
            Just(SpanStatus::Running),
            Just(SpanStatus::Success),
            Just(SpanStatus::Error)
        ]
    ) {
        let tracer = Tracer::new("run-prop");
        tracer.start_root("workflow", Metadata::new()).unwrap();
        let agent = tracer.start_span("agent", SpanType::Agent, None, None).unwrap();
        tracer.end_span(&agent, requested, Some(message.clone())).unwrap();

        let span = tracer.span(&agent).unwrap();
        prop_assert_eq!(span.status, SpanStatus::Error);
        prop_assert_eq!(span.error, Some(message));
    }
}
