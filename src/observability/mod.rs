//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Observations stop:
//!     → metrics.rs (timers, active gauges → Prometheus)
//!     → spans.rs (OpenTelemetry spans → exporter)
//!         → log exporter (structured log line)
//!         → OTLP exporter (batched gRPC export)
//!
//! Everything logs through:
//!     → logging.rs (fmt subscriber, pretty or JSON)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Trace identity flows into every log line emitted inside an observation
//! - Metrics are cheap (atomic updates behind the `metrics` facade)
//! - Span export is optional and never blocks the observed work

pub mod logging;
pub mod metrics;
pub mod spans;

pub use self::metrics::{init_metrics, MetricsHandler};
pub use logging::{init_logging, LoggingError};
pub use spans::{
    attribute, span_kind, tracer_provider, ExporterError, LogSpanExporter, TracingHandler,
};
