//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validated config → metrics recorder → tracer provider → registry → client
//!
//! Run:
//!     One observed request, raced against signals.rs
//!
//! Shutdown (startup.rs, `Application::shutdown`):
//!     Tracer provider flushes queued spans → exit
//! ```
//!
//! # Design Decisions
//! - Ordered startup: backends before the registry, registry before the client
//! - Fail fast: any startup error is fatal
//! - Shutdown waits for the span flush so finished spans are not lost

pub mod signals;
pub mod startup;

pub use signals::shutdown_signal;
pub use startup::{bootstrap, Application, StartupError};
