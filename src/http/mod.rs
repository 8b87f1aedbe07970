//! Outbound HTTP subsystem.
//!
//! # Data Flow
//! ```text
//! caller (inside an observation)
//!     → client.rs (child `http.client.requests` observation)
//!     → propagation.rs (`traceparent` from the current trace)
//!     → reqwest → server
//!     → status and outcome tags derived from the response
//! ```

pub mod client;
pub mod propagation;

pub use client::{build_client, ClientError, ObservedClient, HTTP_CLIENT_REQUESTS};
pub use propagation::trace_headers;
