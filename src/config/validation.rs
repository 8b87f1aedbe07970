//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate URLs and socket addresses
//! - Validate value ranges (timeouts > 0, probability within [0, 1])
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;
use tracing_subscriber::EnvFilter;
use url::Url;

use crate::config::schema::{AppConfig, ExporterKind};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field}: invalid URL `{value}`")]
    InvalidUrl { field: &'static str, value: String },

    #[error("{field}: invalid socket address `{value}`")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field}: must be greater than zero")]
    Zero { field: &'static str },

    #[error("tracing.sampling_probability: {0} is outside [0, 1]")]
    Probability(String),

    #[error("observability.log_level: invalid filter `{0}`")]
    LogLevel(String),

    #[error("{field}: keys and prefixes must not be empty")]
    EmptyKey { field: &'static str },
}

/// Validate the whole configuration, collecting every problem.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let client = &config.client;
    if !is_http_url(&client.target_url) {
        errors.push(ValidationError::InvalidUrl {
            field: "client.target_url",
            value: client.target_url.clone(),
        });
    }
    if client.connect_timeout_secs == 0 {
        errors.push(ValidationError::Zero { field: "client.connect_timeout_secs" });
    }
    if client.request_timeout_secs == 0 {
        errors.push(ValidationError::Zero { field: "client.request_timeout_secs" });
    }

    let observability = &config.observability;
    if EnvFilter::try_new(&observability.log_level).is_err() {
        errors.push(ValidationError::LogLevel(observability.log_level.clone()));
    }
    if observability.metrics_enabled
        && observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: observability.metrics_address.clone(),
        });
    }
    if observability.common_tags.keys().any(|k| k.trim().is_empty()) {
        errors.push(ValidationError::EmptyKey { field: "observability.common_tags" });
    }
    if observability
        .disabled_observations
        .iter()
        .any(|p| p.trim().is_empty())
    {
        errors.push(ValidationError::EmptyKey { field: "observability.disabled_observations" });
    }

    let tracing = &config.tracing;
    if !(0.0..=1.0).contains(&tracing.sampling_probability) {
        errors.push(ValidationError::Probability(tracing.sampling_probability.to_string()));
    }
    if tracing.max_queue_size == 0 {
        errors.push(ValidationError::Zero { field: "tracing.max_queue_size" });
    }
    if tracing.flush_interval_ms == 0 {
        errors.push(ValidationError::Zero { field: "tracing.flush_interval_ms" });
    }
    if tracing.enabled
        && tracing.exporter == ExporterKind::Otlp
        && !is_http_url(&tracing.otlp_endpoint)
    {
        errors.push(ValidationError::InvalidUrl {
            field: "tracing.otlp_endpoint",
            value: tracing.otlp_endpoint.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_http_url(value: &str) -> bool {
    Url::parse(value)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.host().is_some())
        .unwrap_or(false)
}
