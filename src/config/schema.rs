//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the client.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Outbound HTTP client settings.
    pub client: ClientConfig,

    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,

    /// Span export settings.
    pub tracing: TracingConfig,
}

/// Outbound HTTP client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// URL requested by the command-line runner.
    pub target_url: String,

    /// Connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Total request timeout in seconds.
    pub request_timeout_secs: u64,

    /// User-Agent header value.
    pub user_agent: String,

    /// Value of the `client.name` tag; defaults to the target host.
    pub client_name: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            target_url: "http://localhost:7654/foo".to_string(),
            connect_timeout_secs: 5,
            request_timeout_secs: 30,
            user_agent: concat!("observed-client/", env!("CARGO_PKG_VERSION")).to_string(),
            client_name: None,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log filter directive (trace, debug, info, warn, error, or a full
    /// `EnvFilter` directive). `RUST_LOG` takes precedence.
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,

    /// Low-cardinality tags added to every observation.
    pub common_tags: BTreeMap<String, String>,

    /// Technical-name prefixes whose observations become no-ops.
    pub disabled_observations: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
            common_tags: BTreeMap::new(),
            disabled_observations: Vec::new(),
        }
    }
}

/// Where finished spans go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExporterKind {
    /// One log line per finished span.
    #[default]
    Log,
    /// OTLP over gRPC, batched.
    Otlp,
    /// Spans are dropped.
    None,
}

/// Span export configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TracingConfig {
    /// Enable the tracing handler.
    pub enabled: bool,

    /// Span exporter.
    pub exporter: ExporterKind,

    /// OTLP collector endpoint.
    pub otlp_endpoint: String,

    /// Service name reported with each span.
    pub service_name: String,

    /// Fraction of root observations that are sampled (0.0 to 1.0).
    pub sampling_probability: f64,

    /// Spans buffered for export before new ones are dropped.
    pub max_queue_size: usize,

    /// Delay between batched exports in milliseconds.
    pub flush_interval_ms: u64,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            exporter: ExporterKind::Log,
            otlp_endpoint: "http://localhost:4317".to_string(),
            service_name: "client".to_string(),
            sampling_probability: 1.0,
            max_queue_size: 2048,
            flush_interval_ms: 1000,
        }
    }
}
