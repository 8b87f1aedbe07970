//! Observed HTTP client library.
//!
//! Wraps units of work in observations and fans their lifecycle out to
//! metrics, tracing and logging backends.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod observation;

pub use config::schema::AppConfig;
pub use http::ObservedClient;
pub use lifecycle::{bootstrap, Application};
pub use observation::{Observation, ObservationHandler, ObservationRegistry};
