//! Observation registry and handler fan-out.
//!
//! # Responsibilities
//! - Hold the handlers that turn observations into metrics and spans
//! - Apply registry-wide settings: common tags, disabled names, sampling
//! - Notify handlers of lifecycle events, isolating handler panics
//!
//! # Design Decisions
//! - Immutable once built; cloning shares one `Arc`
//! - Zero handlers is a valid, silent configuration
//! - Handlers are notified in registration order, except scope-close and
//!   stop which run in reverse so handlers unwind like a stack

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::observation::context::{ObservationContext, Tags};
use opentelemetry_sdk::trace::Sampler;

use crate::observation::trace::TraceIdentity;

/// Receives lifecycle notifications for observations.
///
/// Implementations must tolerate concurrent calls from observations running
/// on different threads.
pub trait ObservationHandler: Send + Sync {
    /// Name used when reporting handler failures.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Whether this handler wants events for `ctx` at all.
    fn supports_context(&self, _ctx: &ObservationContext) -> bool {
        true
    }

    fn on_start(&self, _ctx: &ObservationContext) {}

    fn on_error(&self, _ctx: &ObservationContext) {}

    fn on_scope_opened(&self, _ctx: &ObservationContext) {}

    fn on_scope_closed(&self, _ctx: &ObservationContext) {}

    fn on_stop(&self, _ctx: &ObservationContext) {}
}

/// Lifecycle event delivered to handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LifecycleEvent {
    Start,
    Error,
    ScopeOpened,
    ScopeClosed,
    Stop,
}

struct RegistryInner {
    handlers: Vec<Arc<dyn ObservationHandler>>,
    common_tags: Tags,
    disabled_prefixes: Vec<String>,
    identity: TraceIdentity,
}

/// Fan-out point for observation lifecycle events.
#[derive(Clone)]
pub struct ObservationRegistry {
    inner: Arc<RegistryInner>,
}

impl ObservationRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Registry with no handlers: observations run but emit nothing.
    pub fn noop() -> Self {
        Self::builder().build()
    }

    pub fn handler_count(&self) -> usize {
        self.inner.handlers.len()
    }

    pub fn common_tags(&self) -> &Tags {
        &self.inner.common_tags
    }

    /// Id generator and parent-based sampler for new observations.
    pub fn trace_identity(&self) -> &TraceIdentity {
        &self.inner.identity
    }

    /// False when a disabled prefix matches `technical_name`.
    pub fn is_enabled(&self, technical_name: &str) -> bool {
        !self
            .inner
            .disabled_prefixes
            .iter()
            .any(|prefix| technical_name.starts_with(prefix.as_str()))
    }

    pub(crate) fn dispatch(&self, event: LifecycleEvent, ctx: &ObservationContext) {
        let reverse = matches!(event, LifecycleEvent::ScopeClosed | LifecycleEvent::Stop);
        if reverse {
            for handler in self.inner.handlers.iter().rev() {
                notify(handler.as_ref(), event, ctx);
            }
        } else {
            for handler in &self.inner.handlers {
                notify(handler.as_ref(), event, ctx);
            }
        }
    }
}

impl Default for ObservationRegistry {
    fn default() -> Self {
        Self::noop()
    }
}

impl std::fmt::Debug for ObservationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservationRegistry")
            .field(
                "handlers",
                &self.inner.handlers.iter().map(|h| h.name()).collect::<Vec<_>>(),
            )
            .field("common_tags", &self.inner.common_tags)
            .field("disabled_prefixes", &self.inner.disabled_prefixes)
            .field("sampler", self.inner.identity.sampler())
            .finish()
    }
}

fn notify(handler: &dyn ObservationHandler, event: LifecycleEvent, ctx: &ObservationContext) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        if !handler.supports_context(ctx) {
            return;
        }
        match event {
            LifecycleEvent::Start => handler.on_start(ctx),
            LifecycleEvent::Error => handler.on_error(ctx),
            LifecycleEvent::ScopeOpened => handler.on_scope_opened(ctx),
            LifecycleEvent::ScopeClosed => handler.on_scope_closed(ctx),
            LifecycleEvent::Stop => handler.on_stop(ctx),
        }
    }));

    if outcome.is_err() {
        tracing::error!(
            handler = handler.name(),
            event = ?event,
            observation = %ctx.technical_name(),
            "Observation handler panicked; continuing with remaining handlers"
        );
    }
}

/// Builder for [`ObservationRegistry`].
#[derive(Default)]
pub struct RegistryBuilder {
    handlers: Vec<Arc<dyn ObservationHandler>>,
    common_tags: Tags,
    disabled_prefixes: Vec<String>,
    sampler: Option<Sampler>,
}

impl RegistryBuilder {
    pub fn handler<H: ObservationHandler + 'static>(mut self, handler: H) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    pub fn shared_handler(mut self, handler: Arc<dyn ObservationHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Low-cardinality tag added to every observation.
    pub fn common_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.common_tags.insert(key.into(), value.into());
        self
    }

    /// Turn observations whose technical name starts with `prefix` into no-ops.
    pub fn disable(mut self, prefix: impl Into<String>) -> Self {
        self.disabled_prefixes.push(prefix.into());
        self
    }

    /// Sampling decision for root observations; children follow their parent.
    pub fn sampler(mut self, sampler: Sampler) -> Self {
        self.sampler = Some(sampler);
        self
    }

    pub fn build(self) -> ObservationRegistry {
        ObservationRegistry {
            inner: Arc::new(RegistryInner {
                handlers: self.handlers,
                common_tags: self.common_tags,
                disabled_prefixes: self.disabled_prefixes,
                identity: TraceIdentity::new(self.sampler.unwrap_or(Sampler::AlwaysOn)),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct Order {
        label: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl ObservationHandler for Order {
        fn on_start(&self, _ctx: &ObservationContext) {
            self.log.lock().unwrap().push(format!("start:{}", self.label));
        }

        fn on_stop(&self, _ctx: &ObservationContext) {
            self.log.lock().unwrap().push(format!("stop:{}", self.label));
        }
    }

    struct Panicky;

    impl ObservationHandler for Panicky {
        fn on_start(&self, _ctx: &ObservationContext) {
            panic!("handler exploded");
        }
    }

    struct Counting(Arc<AtomicUsize>);

    impl ObservationHandler for Counting {
        fn on_start(&self, _ctx: &ObservationContext) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_stop_runs_in_reverse_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = ObservationRegistry::builder()
            .handler(Order { label: "a", log: log.clone() })
            .handler(Order { label: "b", log: log.clone() })
            .build();
        let ctx = ObservationContext::new("test.op".into());

        registry.dispatch(LifecycleEvent::Start, &ctx);
        registry.dispatch(LifecycleEvent::Stop, &ctx);

        assert_eq!(
            *log.lock().unwrap(),
            vec!["start:a", "start:b", "stop:b", "stop:a"]
        );
    }

    #[test]
    fn test_panicking_handler_does_not_stop_others() {
        let count = Arc::new(AtomicUsize::new(0));
        let registry = ObservationRegistry::builder()
            .handler(Panicky)
            .handler(Counting(count.clone()))
            .build();
        let ctx = ObservationContext::new("test.op".into());

        registry.dispatch(LifecycleEvent::Start, &ctx);

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_disabled_prefixes() {
        let registry = ObservationRegistry::builder().disable("http.client").build();
        assert!(!registry.is_enabled("http.client.requests"));
        assert!(registry.is_enabled("my.observation"));
    }

    #[test]
    fn test_noop_registry_has_no_handlers() {
        let registry = ObservationRegistry::noop();
        assert_eq!(registry.handler_count(), 0);
        assert!(registry.common_tags().is_empty());
    }
}
