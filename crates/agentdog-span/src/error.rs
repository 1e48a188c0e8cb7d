//! Error types for trace recording.

use thiserror::Error;

use crate::span::SpanType;

/// Errors raised by misuse of a `Tracer`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TraceError {
    /// `start_root` was called on a tracer that already has a root
    #[error("Root span already started: {0}")]
    RootAlreadyStarted(String),

    /// A span was requested without a parent before any root existed
    #[error("No root span has been started")]
    RootNotStarted,

    /// The referenced span id is not part of this trace
    #[error("Span not found: {0}")]
    SpanNotFound(String),

    /// The root span has ended; the trace no longer accepts changes
    #[error("Trace is sealed; root span {0} has ended")]
    TraceSealed(String),

    /// A detail block was attached to a span of the wrong type
    #[error("Cannot attach {detail} details to span {span_id} of type '{actual}'")]
    DetailKindMismatch {
        span_id: String,
        detail: &'static str,
        actual: SpanType,
    },

    /// The arena lock was poisoned by a panicking writer
    #[error("Trace state lock poisoned")]
    LockPoisoned,
}

impl TraceError {
    /// Whether the error came from caller misuse rather than internal state
    pub fn is_usage_error(&self) -> bool {
        !matches!(self, TraceError::LockPoisoned)
    }
}

/// Result type alias for tracer operations
pub type Result<T> = std::result::Result<T, TraceError>;
