//! Startup orchestration.
//!
//! # Responsibilities
//! - Install the metrics recorder when enabled
//! - Build the tracer provider and its span exporter
//! - Assemble the observation registry and the observed client
//!
//! # Design Decisions
//! - Expects a validated config; logging is initialised by the caller
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently

use std::fmt;
use std::net::SocketAddr;

use opentelemetry_sdk::trace::TracerProvider;
use thiserror::Error;
use url::Url;

use crate::config::AppConfig;
use crate::http::{build_client, ClientError, ObservedClient};
use crate::observability::{
    init_metrics, tracer_provider, ExporterError, MetricsHandler, TracingHandler,
};
use crate::observation::{ratio_sampler, Observation, ObservationRegistry};

/// Technical name of the demo observation wrapping one run.
pub const RUN_OBSERVATION: &str = "my.observation";

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid metrics address `{0}`")]
    MetricsAddress(String),

    #[error(transparent)]
    Exporter(#[from] ExporterError),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] ClientError),
}

/// A fully wired client application.
pub struct Application {
    config: AppConfig,
    registry: ObservationRegistry,
    client: ObservedClient,
    tracer_provider: Option<TracerProvider>,
}

impl fmt::Debug for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Application")
            .field("registry", &self.registry)
            .field("client", &self.client)
            .field("exporting_spans", &self.tracer_provider.is_some())
            .finish_non_exhaustive()
    }
}

/// Wire backends, registry and client from `config`.
///
/// Must be called inside a Tokio runtime when the OTLP exporter is used.
pub fn bootstrap(config: AppConfig) -> Result<Application, StartupError> {
    if config.observability.metrics_enabled {
        let addr: SocketAddr = config
            .observability
            .metrics_address
            .parse()
            .map_err(|_| StartupError::MetricsAddress(config.observability.metrics_address.clone()))?;
        init_metrics(addr);
    }

    let mut builder = ObservationRegistry::builder();

    if config.observability.metrics_enabled {
        builder = builder.handler(MetricsHandler::new());
    }

    let tracer_provider = tracer_provider(&config.tracing)?;
    if let Some(provider) = &tracer_provider {
        builder = builder.handler(TracingHandler::new(provider));
    }

    for (key, value) in &config.observability.common_tags {
        builder = builder.common_tag(key.clone(), value.clone());
    }
    for prefix in &config.observability.disabled_observations {
        builder = builder.disable(prefix.clone());
    }
    let registry = builder
        .sampler(ratio_sampler(config.tracing.sampling_probability))
        .build();

    let client_name = config
        .client
        .client_name
        .clone()
        .or_else(|| {
            Url::parse(&config.client.target_url)
                .ok()
                .and_then(|url| url.host_str().map(str::to_string))
        });
    let client = ObservedClient::new(build_client(&config.client)?, registry.clone(), client_name);

    tracing::info!(
        handlers = registry.handler_count(),
        exporter = ?config.tracing.exporter,
        sampling_probability = config.tracing.sampling_probability,
        target_url = %config.client.target_url,
        "Observation registry ready"
    );

    Ok(Application {
        config,
        registry,
        client,
        tracer_provider,
    })
}

impl Application {
    pub fn registry(&self) -> &ObservationRegistry {
        &self.registry
    }

    pub fn client(&self) -> &ObservedClient {
        &self.client
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Send one request to the target inside the demo observation and
    /// return the response body.
    pub async fn run_once(&self) -> Result<String, ClientError> {
        let observation = Observation::create(RUN_OBSERVATION, &self.registry)?
            .low_cardinality_tag("low.cardinality.key", "low cardinality value")
            .high_cardinality_tag("high.cardinality.key", "high cardinality value")
            .contextual_name("command-line-runner");

        let target = self.config.client.target_url.as_str();
        observation
            .observe_async(async {
                tracing::info!("Will send a request to the server");
                let body = self.client.get_text(target).await?;
                tracing::info!("Got response [{}]", body);
                Ok::<_, ClientError>(body)
            })
            .await
    }

    /// Flush finished spans and shut the exporter down.
    pub async fn shutdown(self) {
        if let Some(provider) = self.tracer_provider {
            // The batch processor blocks until its worker task answers, so
            // keep it off the runtime threads.
            let flushed = tokio::task::spawn_blocking(move || provider.shutdown()).await;
            match flushed {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "Span exporter shutdown failed"),
                Err(e) => tracing::error!(error = %e, "Span exporter shutdown task failed"),
            }
        }
        tracing::info!("Shutdown complete");
    }
}
