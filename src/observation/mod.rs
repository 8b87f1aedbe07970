//! Observation subsystem.
//!
//! # Data Flow
//! ```text
//! Observation::create(name, registry)
//!     → builder (tags, contextual name, parent)
//!     → run / observe / observe_async (observe.rs)
//!         → scope.rs (current observation stack)
//!         → registry.rs (fan-out to handlers)
//!             → metrics handler (timers, active gauges)
//!             → tracing handler (finished spans → exporter)
//! ```
//!
//! # Design Decisions
//! - No global registry; callers pass one explicitly
//! - "Current" is per thread, re-entered per poll for async work
//! - Work failures are recorded, never swallowed or rewritten

pub mod context;
pub mod error;
pub mod observe;
pub mod registry;
pub mod scope;
pub mod trace;

pub use context::{ErrorInfo, Lifecycle, ObservationContext, ObservationHandle, ObservationId, Tags};
pub use error::ObservationError;
pub use observe::{Observation, ObservedFuture};
pub use registry::{ObservationHandler, ObservationRegistry, RegistryBuilder};
pub use opentelemetry::trace::{SpanId, TraceId};
pub use opentelemetry_sdk::trace::Sampler;
pub use trace::{ratio_sampler, TraceContext, TraceIdentity};
