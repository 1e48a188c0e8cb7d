//! Hierarchical span tracing for multi-agent workflow runs.
//!
//! A workflow run is recorded as a tree of spans: one `root` span for the
//! workflow, `agent` spans for each participating agent, and leaf spans for
//! the LLM calls, HTTP calls, database operations and tool invocations those
//! agents make.
//!
//! # Span Hierarchy
//!
//! ```text
//! root (workflow)
//!   └─ agent (content_strategist, twitter_writer, ...)
//!       ├─ llm_call
//!       ├─ api_call
//!       └─ database
//! ```
//!
//! # Usage
//!
//! 1. Create a `Tracer` per run and share it across agents with `Arc`.
//! 2. Open the root with `Tracer::start_root`, then nest spans under it.
//! 3. Read the finished tree with `Tracer::get_trace`, or a flat timeline
//!    with `Tracer::get_flat_spans`.
//!
//! Recorded traces serialize to the `Trace`/`SpanRecord` wire format, which
//! is what the coordination failure detector consumes.

pub mod clock;
pub mod error;
pub mod record;
pub mod span;
pub mod tracer;
pub mod tree;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Result, TraceError};
pub use record::{value_text, SpanRecord, Trace};
pub use span::{ApiDetails, DbDetails, LlmDetails, Metadata, Span, SpanId, SpanStatus, SpanType};
pub use tracer::Tracer;
pub use tree::{flatten, views, FlatSpan, SpanView};
