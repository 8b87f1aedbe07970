//! Observation state shared with handlers.
//!
//! # Responsibilities
//! - Hold names, tags and trace identity of one observation
//! - Track the lifecycle (not started → started → stopped)
//! - Record timing and the error, each written once by the wrapper
//!
//! # Design Decisions
//! - Tags live in ordered maps so exported records are deterministic
//! - Lifecycle fields have crate-private setters; handlers only read

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::observation::trace::TraceContext;

/// Key-value annotations attached to an observation.
pub type Tags = BTreeMap<String, String>;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObservationId(u64);

impl ObservationId {
    fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    NotStarted,
    Started,
    Stopped,
}

/// Failure recorded on an observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    kind: String,
    message: String,
}

impl ErrorInfo {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Capture an error value: its type's short name and its display text.
    pub fn from_error<E: fmt::Display>(error: &E) -> Self {
        Self::new(short_type_name::<E>(), error.to_string())
    }

    /// The observed future was dropped before it completed.
    pub fn cancelled() -> Self {
        Self::new("Cancelled", "observation dropped before the work completed")
    }

    /// The work panicked.
    pub fn panicked() -> Self {
        Self::new("Panic", "work panicked")
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// `a::b::ClientError<x::Y>` → `ClientError`.
fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Full state of one observation, as seen by handlers.
#[derive(Debug, Clone)]
pub struct ObservationContext {
    id: ObservationId,
    parent_id: Option<ObservationId>,
    technical_name: String,
    contextual_name: Option<String>,
    low_cardinality_tags: Tags,
    high_cardinality_tags: Tags,
    trace: Option<TraceContext>,
    start_time: Option<SystemTime>,
    end_time: Option<SystemTime>,
    duration: Option<Duration>,
    error: Option<ErrorInfo>,
    state: Lifecycle,
}

impl ObservationContext {
    pub(crate) fn new(technical_name: String) -> Self {
        Self {
            id: ObservationId::next(),
            parent_id: None,
            technical_name,
            contextual_name: None,
            low_cardinality_tags: Tags::new(),
            high_cardinality_tags: Tags::new(),
            trace: None,
            start_time: None,
            end_time: None,
            duration: None,
            error: None,
            state: Lifecycle::NotStarted,
        }
    }

    pub fn id(&self) -> ObservationId {
        self.id
    }

    pub fn parent_id(&self) -> Option<ObservationId> {
        self.parent_id
    }

    /// Stable name used for metrics.
    pub fn technical_name(&self) -> &str {
        &self.technical_name
    }

    /// Per-call-site name used for spans, if one was given.
    pub fn contextual_name(&self) -> Option<&str> {
        self.contextual_name.as_deref()
    }

    /// Contextual name, falling back to the technical name.
    pub fn span_name(&self) -> &str {
        self.contextual_name
            .as_deref()
            .unwrap_or(&self.technical_name)
    }

    pub fn low_cardinality_tags(&self) -> &Tags {
        &self.low_cardinality_tags
    }

    pub fn high_cardinality_tags(&self) -> &Tags {
        &self.high_cardinality_tags
    }

    /// Trace identity; `None` until started.
    pub fn trace(&self) -> Option<&TraceContext> {
        self.trace.as_ref()
    }

    pub fn start_time(&self) -> Option<SystemTime> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<SystemTime> {
        self.end_time
    }

    /// Monotonic duration between start and stop.
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    pub fn error(&self) -> Option<&ErrorInfo> {
        self.error.as_ref()
    }

    pub fn state(&self) -> Lifecycle {
        self.state
    }

    pub(crate) fn set_contextual_name(&mut self, name: String) {
        self.contextual_name = Some(name);
    }

    pub(crate) fn insert_low_cardinality(&mut self, key: String, value: String) {
        self.low_cardinality_tags.insert(key, value);
    }

    pub(crate) fn insert_high_cardinality(&mut self, key: String, value: String) {
        self.high_cardinality_tags.insert(key, value);
    }

    pub(crate) fn mark_started(
        &mut self,
        trace: TraceContext,
        parent_id: Option<ObservationId>,
        now: SystemTime,
    ) {
        debug_assert_eq!(self.state, Lifecycle::NotStarted);
        self.trace = Some(trace);
        self.parent_id = parent_id;
        self.start_time = Some(now);
        self.state = Lifecycle::Started;
    }

    /// First error wins.
    pub(crate) fn record_error(&mut self, error: ErrorInfo) -> bool {
        if self.error.is_some() || self.state != Lifecycle::Started {
            return false;
        }
        self.error = Some(error);
        true
    }

    pub(crate) fn mark_stopped(&mut self, elapsed: Duration) {
        if self.state != Lifecycle::Started {
            return;
        }
        // End time derives from the monotonic clock so it never precedes the start.
        self.end_time = self.start_time.map(|start| start + elapsed);
        self.duration = Some(elapsed);
        self.state = Lifecycle::Stopped;
    }
}

/// Cheap snapshot of a running observation, handed out as "current".
#[derive(Debug, Clone)]
pub struct ObservationHandle {
    id: ObservationId,
    parent_id: Option<ObservationId>,
    technical_name: Arc<str>,
    contextual_name: Option<Arc<str>>,
    trace: TraceContext,
}

impl ObservationHandle {
    pub(crate) fn new(context: &ObservationContext, trace: TraceContext) -> Self {
        Self {
            id: context.id,
            parent_id: context.parent_id,
            technical_name: Arc::from(context.technical_name.as_str()),
            contextual_name: context.contextual_name.as_deref().map(Arc::from),
            trace,
        }
    }

    pub fn id(&self) -> ObservationId {
        self.id
    }

    pub fn parent_id(&self) -> Option<ObservationId> {
        self.parent_id
    }

    pub fn technical_name(&self) -> &str {
        &self.technical_name
    }

    pub fn contextual_name(&self) -> Option<&str> {
        self.contextual_name.as_deref()
    }

    pub fn trace(&self) -> &TraceContext {
        &self.trace
    }
}
