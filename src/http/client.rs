//! Instrumented outbound HTTP client.
//!
//! # Responsibilities
//! - Build the reqwest client from configuration
//! - Wrap each request in an `http.client.requests` observation, nested
//!   under whatever observation is current
//! - Propagate the trace to the server via W3C `traceparent`
//!
//! # Tags
//! - low cardinality: `method`, `uri` (path only), `client.name`, `status`,
//!   `outcome`
//! - high cardinality: `http.url`

use std::time::Duration;

use reqwest::header::{HeaderValue, USER_AGENT};
use reqwest::StatusCode;
use thiserror::Error;
use url::Url;

use crate::config::ClientConfig;
use crate::http::propagation::trace_headers;
use crate::observation::{Observation, ObservationError, ObservationRegistry, Tags};

/// Technical name of client request observations.
pub const HTTP_CLIENT_REQUESTS: &str = "http.client.requests";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{url} returned {status}")]
    Status { status: StatusCode, url: String },

    #[error("observation setup failed: {0}")]
    Observation(#[from] ObservationError),
}

/// Build the underlying client with timeouts and user agent.
pub fn build_client(config: &ClientConfig) -> Result<reqwest::Client, ClientError> {
    let user_agent = HeaderValue::from_str(&config.user_agent)
        .unwrap_or_else(|_| HeaderValue::from_static("observed-client"));

    let mut headers = reqwest::header::HeaderMap::new();
    headers.insert(USER_AGENT, user_agent);

    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .default_headers(headers)
        .build()?;
    Ok(client)
}

/// Client whose requests become child observations.
#[derive(Debug, Clone)]
pub struct ObservedClient {
    client: reqwest::Client,
    registry: ObservationRegistry,
    client_name: Option<String>,
}

impl ObservedClient {
    /// `client_name` overrides the `client.name` tag (default: request host).
    pub fn new(
        client: reqwest::Client,
        registry: ObservationRegistry,
        client_name: Option<String>,
    ) -> Self {
        Self {
            client,
            registry,
            client_name,
        }
    }

    /// GET `url` and return the body. Non-2xx responses are errors.
    pub async fn get_text(&self, url: &str) -> Result<String, ClientError> {
        let url = Url::parse(url)?;
        let client_name = self
            .client_name
            .clone()
            .or_else(|| url.host_str().map(str::to_string))
            .unwrap_or_else(|| "none".to_string());

        let observation = Observation::create(HTTP_CLIENT_REQUESTS, &self.registry)?
            .contextual_name("http get")
            .low_cardinality_tag("method", "GET")
            .low_cardinality_tag("uri", url.path())
            .low_cardinality_tag("client.name", client_name)
            .high_cardinality_tag("http.url", url.as_str());

        let client = self.client.clone();
        let exchange = async move {
            let mut request = client.get(url.clone());
            if let Some(current) = Observation::current() {
                for (name, value) in trace_headers(current.trace()) {
                    request = request.header(name, value);
                }
            }

            let response = request.send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(ClientError::Status {
                    status,
                    url: url.to_string(),
                });
            }
            let body = response.text().await?;
            Ok((status, body))
        };

        let (_, body) = observation
            .observe_async_with(exchange, exchange_tags)
            .await?;
        Ok(body)
    }
}

/// Outcome tags derived from the exchange result.
fn exchange_tags(result: &Result<(StatusCode, String), ClientError>) -> Tags {
    let status = match result {
        Ok((status, _)) | Err(ClientError::Status { status, .. }) => Some(*status),
        Err(ClientError::Request(e)) => e.status(),
        Err(_) => None,
    };

    let mut tags = Tags::new();
    match status {
        Some(status) => {
            tags.insert("status".into(), status.as_u16().to_string());
            tags.insert("outcome".into(), outcome(status).into());
        }
        None => {
            tags.insert("status".into(), "CLIENT_ERROR".into());
            tags.insert("outcome".into(), "UNKNOWN".into());
        }
    }
    tags
}

fn outcome(status: StatusCode) -> &'static str {
    if status.is_informational() {
        "INFORMATIONAL"
    } else if status.is_success() {
        "SUCCESS"
    } else if status.is_redirection() {
        "REDIRECTION"
    } else if status.is_client_error() {
        "CLIENT_ERROR"
    } else if status.is_server_error() {
        "SERVER_ERROR"
    } else {
        "UNKNOWN"
    }
}
