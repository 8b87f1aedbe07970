//! The observation wrapper.
//!
//! # Lifecycle
//! ```text
//! create → tag → run/observe
//!     start        (trace identity, start time, handlers: on_start)
//!     open scope   (current observation, tracing span, handlers: on_scope_opened)
//!     work
//!     on Err       (error recorded, handlers: on_error)
//!     close scope  (handlers: on_scope_closed, previous current restored)
//!     stop         (end time, duration, handlers: on_stop)
//! ```
//!
//! # Design Decisions
//! - Builder methods consume the not-started `Observation`; running it
//!   consumes it too, so tags cannot be attached once started
//! - Finalization lives in `Drop`, so panics and dropped futures still stop
//!   the observation exactly once
//! - The work's result is returned untouched

use std::convert::Infallible;
use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Instant, SystemTime};

use crate::observation::context::{
    ErrorInfo, ObservationContext, ObservationHandle, Tags,
};
use crate::observation::error::{validate_name, ObservationError};
use crate::observation::registry::{LifecycleEvent, ObservationRegistry};
use crate::observation::scope;

/// A unit of work to be measured, not yet started.
///
/// Tags can only be attached before the observation runs; `run` and
/// `observe` take it by value:
///
/// ```compile_fail
/// use observed_client::observation::{Observation, ObservationRegistry};
///
/// let registry = ObservationRegistry::noop();
/// let observation = Observation::create("my.op", &registry).unwrap();
/// let _ = observation.run(|| 42);
/// let _ = observation.low_cardinality_tag("late", "tag");
/// ```
#[derive(Debug)]
pub struct Observation {
    registry: ObservationRegistry,
    context: ObservationContext,
    parent: Option<ObservationHandle>,
    enabled: bool,
}

impl Observation {
    /// Create a not-started observation bound to `registry`.
    ///
    /// Registry-wide common tags are applied here; tags set later with the
    /// same key override them.
    pub fn create(
        technical_name: impl Into<String>,
        registry: &ObservationRegistry,
    ) -> Result<Self, ObservationError> {
        let technical_name = technical_name.into();
        validate_name(&technical_name)?;

        let enabled = registry.is_enabled(&technical_name);
        let mut context = ObservationContext::new(technical_name);
        for (key, value) in registry.common_tags() {
            context.insert_low_cardinality(key.clone(), value.clone());
        }

        Ok(Self {
            registry: registry.clone(),
            context,
            parent: None,
            enabled,
        })
    }

    /// Innermost running observation on this thread or task.
    pub fn current() -> Option<ObservationHandle> {
        scope::current()
    }

    /// Tag with a bounded value space; becomes a metric dimension.
    pub fn low_cardinality_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert_low_cardinality(key.into(), value.into());
        self
    }

    /// Tag with an unbounded value space; only exported on spans.
    pub fn high_cardinality_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert_high_cardinality(key.into(), value.into());
        self
    }

    /// Span name for this call site; the technical name stays the metric name.
    pub fn contextual_name(mut self, name: impl Into<String>) -> Self {
        self.context.set_contextual_name(name.into());
        self
    }

    /// Use `parent` instead of whatever is current when the observation starts.
    pub fn parent(mut self, parent: &ObservationHandle) -> Self {
        self.parent = Some(parent.clone());
        self
    }

    pub fn context(&self) -> &ObservationContext {
        &self.context
    }

    /// True when the registry disabled this name; the work still runs.
    pub fn is_noop(&self) -> bool {
        !self.enabled
    }

    /// Run infallible work inside the observation.
    pub fn run<T, W>(self, work: W) -> T
    where
        W: FnOnce() -> T,
    {
        match self.observe(|| Ok::<T, Infallible>(work())) {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    /// Run fallible work; an `Err` is recorded and returned unchanged.
    pub fn observe<T, E, W>(self, work: W) -> Result<T, E>
    where
        E: Display,
        W: FnOnce() -> Result<T, E>,
    {
        self.observe_with(work, no_outcome_tags::<T, E>)
    }

    /// Like [`observe`](Self::observe), with low-cardinality tags derived
    /// from the result (status codes, outcome classes). Keys already set on
    /// the observation are left as they were.
    ///
    /// Derived tags are added just before stop, so handlers only see them
    /// in `on_stop`. They are absent from `on_start`, `on_error`, the scope
    /// events and the `tracing` span fields.
    pub fn observe_with<T, E, W, C>(self, work: W, outcome_tags: C) -> Result<T, E>
    where
        E: Display,
        W: FnOnce() -> Result<T, E>,
        C: FnOnce(&Result<T, E>) -> Tags,
    {
        if !self.enabled {
            return work();
        }

        let mut active = ActiveObservation::start(self);
        let current = scope::enter(active.handle.clone());
        active.open_scope();

        let result = active.span.in_scope(work);

        active.complete(&result, Some(outcome_tags));
        active.close_scope();
        drop(current);
        active.stop();
        result
    }

    /// Observe a future. The observation starts on first poll and is current
    /// during every poll. Dropping the future early stops it with a
    /// `Cancelled` error.
    pub fn observe_async<F, T, E>(self, work: F) -> ObservedFuture<F, fn(&Result<T, E>) -> Tags>
    where
        F: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.observe_async_with(work, no_outcome_tags::<T, E> as fn(&Result<T, E>) -> Tags)
    }

    /// Async counterpart of [`observe_with`](Self::observe_with); derived
    /// tags likewise reach handlers only in `on_stop`.
    pub fn observe_async_with<F, T, E, C>(mut self, work: F, outcome_tags: C) -> ObservedFuture<F, C>
    where
        F: Future<Output = Result<T, E>>,
        E: Display,
        C: FnOnce(&Result<T, E>) -> Tags,
    {
        // Resolve the parent now, so spawning the future keeps the lineage.
        if self.parent.is_none() {
            self.parent = scope::current();
        }
        ObservedFuture {
            inner: Box::pin(work),
            pending: Some(self),
            active: None,
            outcome_tags: Some(outcome_tags),
        }
    }
}

fn no_outcome_tags<T, E>(_: &Result<T, E>) -> Tags {
    Tags::new()
}

/// A started observation; stops itself on drop if nobody else did.
struct ActiveObservation {
    registry: ObservationRegistry,
    context: ObservationContext,
    handle: ObservationHandle,
    span: tracing::Span,
    started_at: Instant,
    outcome: Tags,
    scope_open: bool,
    stopped: bool,
}

impl ActiveObservation {
    fn start(observation: Observation) -> Self {
        let Observation {
            registry,
            mut context,
            parent,
            ..
        } = observation;

        let parent = parent.or_else(scope::current);
        let trace = registry
            .trace_identity()
            .start(context.technical_name(), parent.as_ref().map(ObservationHandle::trace));
        context.mark_started(trace, parent.as_ref().map(ObservationHandle::id), SystemTime::now());
        let started_at = Instant::now();

        let handle = ObservationHandle::new(&context, trace);
        let span = tracing::info_span!(
            "observation",
            observation = %context.technical_name(),
            contextual_name = %context.span_name(),
            trace_id = %trace.trace_id,
            span_id = %trace.span_id,
        );

        registry.dispatch(LifecycleEvent::Start, &context);

        Self {
            registry,
            context,
            handle,
            span,
            started_at,
            outcome: Tags::new(),
            scope_open: false,
            stopped: false,
        }
    }

    fn open_scope(&mut self) {
        if !self.scope_open {
            self.scope_open = true;
            self.registry.dispatch(LifecycleEvent::ScopeOpened, &self.context);
        }
    }

    fn complete<T, E, C>(&mut self, result: &Result<T, E>, outcome_tags: Option<C>)
    where
        E: Display,
        C: FnOnce(&Result<T, E>) -> Tags,
    {
        if let Some(outcome_tags) = outcome_tags {
            self.outcome = outcome_tags(result);
        }
        if let Err(error) = result {
            self.fail(ErrorInfo::from_error(error));
        }
    }

    fn fail(&mut self, error: ErrorInfo) {
        if self.context.record_error(error) {
            self.registry.dispatch(LifecycleEvent::Error, &self.context);
        }
    }

    fn close_scope(&mut self) {
        if self.scope_open {
            self.scope_open = false;
            self.registry.dispatch(LifecycleEvent::ScopeClosed, &self.context);
        }
    }

    fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        for (key, value) in std::mem::take(&mut self.outcome) {
            if !self.context.low_cardinality_tags().contains_key(&key) {
                self.context.insert_low_cardinality(key, value);
            }
        }
        self.context.mark_stopped(self.started_at.elapsed());
        self.registry.dispatch(LifecycleEvent::Stop, &self.context);
    }
}

impl Drop for ActiveObservation {
    fn drop(&mut self) {
        if self.stopped {
            return;
        }
        let error = if std::thread::panicking() {
            ErrorInfo::panicked()
        } else {
            ErrorInfo::cancelled()
        };
        self.fail(error);
        self.close_scope();
        self.stop();
    }
}

/// Future returned by [`Observation::observe_async`].
pub struct ObservedFuture<F, C> {
    // Declared first so the work is dropped before its observation stops.
    inner: Pin<Box<F>>,
    pending: Option<Observation>,
    active: Option<ActiveObservation>,
    outcome_tags: Option<C>,
}

impl<F, C> Unpin for ObservedFuture<F, C> {}

impl<F, T, E, C> Future for ObservedFuture<F, C>
where
    F: Future<Output = Result<T, E>>,
    E: Display,
    C: FnOnce(&Result<T, E>) -> Tags,
{
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if let Some(observation) = this.pending.take() {
            if observation.enabled {
                this.active = Some(ActiveObservation::start(observation));
            }
        }

        let Some(active) = this.active.as_mut() else {
            return this.inner.as_mut().poll(cx);
        };
        active.open_scope();

        let poll = {
            let _current = scope::enter(active.handle.clone());
            let _entered = active.span.enter();
            this.inner.as_mut().poll(cx)
        };

        if let Poll::Ready(result) = poll {
            if let Some(mut active) = this.active.take() {
                active.complete(&result, this.outcome_tags.take());
                active.close_scope();
                active.stop();
            }
            return Poll::Ready(result);
        }
        Poll::Pending
    }
}
