//! Distributed tracing support.
//!
//! # Responsibilities
//! - Turn stopped, sampled observations into OpenTelemetry spans
//! - Build the tracer provider and its exporter from configuration
//!
//! # Design Decisions
//! - Span name is the contextual name; the technical name stays on metrics
//! - Both tag sets are exported as span attributes
//! - Spans reuse the ids the observation started with, so log lines,
//!   `traceparent` headers and exported spans agree
//! - Export goes through the SDK's batch processor and never blocks the
//!   observed work

use std::borrow::Cow;
use std::time::Duration;

use futures_util::future::BoxFuture;
use opentelemetry::trace::{
    Span as _, SpanKind, Status, TraceContextExt, Tracer as _, TracerProvider as _,
};
use opentelemetry::{Context, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::export::trace::{ExportResult, SpanData, SpanExporter};
use opentelemetry_sdk::runtime;
use opentelemetry_sdk::trace::{
    BatchConfigBuilder, BatchSpanProcessor, Config, Tracer, TracerProvider,
};
use opentelemetry_sdk::Resource;
use thiserror::Error;

use crate::config::{ExporterKind, TracingConfig};
use crate::observation::{ObservationContext, ObservationHandler, TraceContext};

/// Instrumentation scope name of exported spans.
pub const TRACER_NAME: &str = "observed-client";

#[derive(Debug, Error)]
#[error("span exporter setup failed: {0}")]
pub struct ExporterError(String);

/// Observation handler that reports spans.
#[derive(Clone)]
pub struct TracingHandler {
    tracer: Tracer,
}

impl TracingHandler {
    pub fn new(provider: &TracerProvider) -> Self {
        Self {
            tracer: provider.tracer(TRACER_NAME),
        }
    }
}

impl ObservationHandler for TracingHandler {
    fn name(&self) -> &'static str {
        "tracing"
    }

    fn on_stop(&self, ctx: &ObservationContext) {
        let (Some(trace), Some(start), Some(end)) = (ctx.trace(), ctx.start_time(), ctx.end_time())
        else {
            return;
        };
        if !trace.sampled {
            return;
        }

        let parent_cx = match trace.parent_span_id {
            Some(parent_span_id) => {
                let parent = TraceContext {
                    span_id: parent_span_id,
                    parent_span_id: None,
                    ..*trace
                };
                Context::new().with_remote_span_context(parent.span_context())
            }
            None => Context::new(),
        };

        let mut attributes: Vec<KeyValue> = ctx
            .low_cardinality_tags()
            .iter()
            .chain(ctx.high_cardinality_tags())
            .map(|(k, v)| KeyValue::new(k.clone(), v.clone()))
            .collect();
        if let Some(error) = ctx.error() {
            attributes.push(KeyValue::new("error", error.kind().to_string()));
        }

        let mut span = self
            .tracer
            .span_builder(ctx.span_name().to_string())
            .with_kind(span_kind(ctx))
            .with_trace_id(trace.trace_id)
            .with_span_id(trace.span_id)
            .with_start_time(start)
            .with_attributes(attributes)
            .start_with_context(&self.tracer, &parent_cx);

        if let Some(error) = ctx.error() {
            span.set_status(Status::error(error.to_string()));
        }
        span.end_with_timestamp(end);
    }
}

/// `Client` for outbound HTTP observations, `Internal` otherwise.
pub fn span_kind(ctx: &ObservationContext) -> SpanKind {
    if ctx.technical_name().starts_with("http.client") {
        SpanKind::Client
    } else {
        SpanKind::Internal
    }
}

/// Writes one structured log line per span.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSpanExporter;

impl SpanExporter for LogSpanExporter {
    fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
        for span in batch {
            let duration = span
                .end_time
                .duration_since(span.start_time)
                .unwrap_or_default();
            let error = match &span.status {
                Status::Error { description } => Some(description.to_string()),
                _ => None,
            };
            tracing::info!(
                target: "observed_client::spans",
                trace_id = %span.span_context.trace_id(),
                span_id = %span.span_context.span_id(),
                parent_span_id = %span.parent_span_id,
                kind = ?span.span_kind,
                duration_ms = duration.as_secs_f64() * 1000.0,
                attributes = ?span.attributes,
                error,
                "Span finished: {}",
                span.name
            );
        }
        Box::pin(std::future::ready(Ok(())))
    }
}

/// Tracer provider for the configured exporter, or `None` when spans are
/// not exported.
///
/// The OTLP exporter must be built inside a Tokio runtime.
pub fn tracer_provider(config: &TracingConfig) -> Result<Option<TracerProvider>, ExporterError> {
    if !config.enabled {
        return Ok(None);
    }

    let builder = TracerProvider::builder().with_config(
        Config::default().with_resource(Resource::new(vec![
            KeyValue::new("service.name", config.service_name.clone()),
            KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
        ])),
    );

    let provider = match config.exporter {
        ExporterKind::Log => builder.with_simple_exporter(LogSpanExporter).build(),
        ExporterKind::Otlp => {
            let exporter = opentelemetry_otlp::SpanExporter::builder()
                .with_tonic()
                .with_endpoint(config.otlp_endpoint.clone())
                .build()
                .map_err(|e| ExporterError(e.to_string()))?;
            let batch = BatchConfigBuilder::default()
                .with_max_queue_size(config.max_queue_size)
                .with_scheduled_delay(Duration::from_millis(config.flush_interval_ms))
                .build();
            let processor = BatchSpanProcessor::builder(exporter, runtime::Tokio)
                .with_batch_config(batch)
                .build();
            builder.with_span_processor(processor).build()
        }
        ExporterKind::None => return Ok(None),
    };
    Ok(Some(provider))
}

/// Attribute value on an exported span.
pub fn attribute<'a>(span: &'a SpanData, key: &str) -> Option<Cow<'a, str>> {
    span.attributes
        .iter()
        .find(|kv| kv.key.as_str() == key)
        .map(|kv| kv.value.as_str())
}
