//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Turn stopped observations into timers
//! - Track in-flight observations with an active gauge
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! For an observation with technical name `<name>`:
//! - `<name>` (histogram, seconds): duration, labelled by low-cardinality
//!   tags plus `error`. The Prometheus exporter renders it as a summary whose
//!   `_count` series doubles as the completed-observation counter
//! - `<name>.active` (gauge, unlabelled): observations currently running.
//!   Outcome tags only exist at stop, so labels would unbalance the gauge
//!
//! The Prometheus exporter rewrites `.` to `_` in names.
//!
//! # Design Decisions
//! - Only low-cardinality tags become labels; high-cardinality tags would
//!   explode the series count
//! - Goes through the `metrics` facade, so any installed recorder works

use std::net::SocketAddr;

use metrics::Label;
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::observation::{ObservationContext, ObservationHandler};

/// Label added to every timer: `none` or the recorded error kind.
pub const ERROR_LABEL: &str = "error";

/// Install the Prometheus recorder and its scrape endpoint.
///
/// Failures are logged; the client keeps running without metrics.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Records observation timings through the `metrics` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsHandler;

impl MetricsHandler {
    pub fn new() -> Self {
        Self
    }
}

fn tag_labels(ctx: &ObservationContext) -> Vec<Label> {
    ctx.low_cardinality_tags()
        .iter()
        .map(|(k, v)| Label::new(k.clone(), v.clone()))
        .collect()
}

impl ObservationHandler for MetricsHandler {
    fn name(&self) -> &'static str {
        "metrics"
    }

    fn on_start(&self, ctx: &ObservationContext) {
        metrics::gauge!(format!("{}.active", ctx.technical_name())).increment(1.0);
    }

    fn on_stop(&self, ctx: &ObservationContext) {
        let name = ctx.technical_name();
        metrics::gauge!(format!("{name}.active")).decrement(1.0);

        let mut labels = tag_labels(ctx);
        let error = ctx.error().map_or("none", |e| e.kind());
        labels.push(Label::new(ERROR_LABEL, error.to_string()));

        let duration = ctx.duration().unwrap_or_default();
        metrics::histogram!(name.to_string(), labels).record(duration.as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::{Observation, ObservationRegistry};
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};
    use metrics_util::MetricKind;

    type Entry = (String, MetricKind, Vec<(String, String)>, DebugValue);

    fn capture(f: impl FnOnce()) -> Vec<Entry> {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        metrics::with_local_recorder(&recorder, f);
        snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .map(|(key, _, _, value)| {
                let kind = key.kind();
                let key = key.key();
                let labels = key
                    .labels()
                    .map(|l| (l.key().to_string(), l.value().to_string()))
                    .collect();
                (key.name().to_string(), kind, labels, value)
            })
            .collect()
    }

    fn registry() -> ObservationRegistry {
        ObservationRegistry::builder().handler(MetricsHandler::new()).build()
    }

    #[test]
    fn test_timer_uses_low_cardinality_tags_only() {
        let entries = capture(|| {
            Observation::create("my.observation", &registry())
                .unwrap()
                .low_cardinality_tag("low.key", "low")
                .high_cardinality_tag("high.key", "high")
                .run(|| ());
        });

        let (_, _, labels, value) = entries
            .iter()
            .find(|(name, kind, _, _)| name == "my.observation" && *kind == MetricKind::Histogram)
            .expect("timer recorded");
        assert!(labels.contains(&("low.key".into(), "low".into())));
        assert!(labels.contains(&("error".into(), "none".into())));
        assert!(!labels.iter().any(|(k, _)| k == "high.key"));
        match value {
            DebugValue::Histogram(samples) => assert_eq!(samples.len(), 1),
            other => panic!("unexpected value {other:?}"),
        }
    }

    #[test]
    fn test_error_label_on_timer() {
        let entries = capture(|| {
            let _ = Observation::create("failing.op", &registry())
                .unwrap()
                .observe(|| Err::<(), _>(std::fmt::Error));
        });

        let (_, _, labels, value) = entries
            .iter()
            .find(|(name, kind, _, _)| name == "failing.op" && *kind == MetricKind::Histogram)
            .expect("timer recorded");
        assert!(labels.contains(&("error".into(), "Error".into())));
        match value {
            DebugValue::Histogram(samples) => assert_eq!(samples.len(), 1),
            other => panic!("unexpected value {other:?}"),
        }
        assert!(!entries.iter().any(|(_, kind, _, _)| *kind == MetricKind::Counter));
    }

    #[test]
    fn test_active_gauge_returns_to_zero() {
        let entries = capture(|| {
            Observation::create("gauge.op", &registry()).unwrap().run(|| ());
        });

        let (_, _, _, value) = entries
            .iter()
            .find(|(name, kind, _, _)| name == "gauge.op.active" && *kind == MetricKind::Gauge)
            .expect("gauge recorded");
        match value {
            DebugValue::Gauge(v) => assert_eq!(v.into_inner(), 0.0),
            other => panic!("unexpected value {other:?}"),
        }
    }

    #[test]
    fn test_prometheus_render_has_unique_series() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            let registry = registry();
            Observation::create("my.observation", &registry)
                .unwrap()
                .low_cardinality_tag("low.cardinality.key", "low cardinality value")
                .run(|| ());
            let _ = Observation::create("my.observation", &registry)
                .unwrap()
                .low_cardinality_tag("low.cardinality.key", "low cardinality value")
                .observe(|| Err::<(), _>(std::fmt::Error));
        });
        let rendered = handle.render();

        for name in ["my_observation", "my_observation_active"] {
            let type_lines = rendered
                .lines()
                .filter(|line| line.starts_with(&format!("# TYPE {name} ")))
                .count();
            assert_eq!(type_lines, 1, "{name} in:\n{rendered}");
        }
        assert!(!rendered.contains(" counter"), "unexpected counter in:\n{rendered}");

        let count_lines: Vec<&str> = rendered
            .lines()
            .filter(|line| line.starts_with("my_observation_count{"))
            .collect();
        assert_eq!(count_lines.len(), 2, "{rendered}");
        assert!(count_lines.iter().any(|line| line.contains(r#"error="none""#)));
        assert!(count_lines.iter().any(|line| line.contains(r#"error="Error""#)));
    }
}
