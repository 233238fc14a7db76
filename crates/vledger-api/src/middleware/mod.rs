//! # Middleware Stack
//!
//! Tower middleware for the API layer:
//! - [`tracing_layer`]: request/response tracing with `TraceLayer`.
//! - [`metrics`]: Prometheus request metrics and ledger gauges.
//! - [`rate_limit`]: per-caller fixed-window rate limiting.

pub mod metrics;
pub mod rate_limit;
pub mod tracing_layer;
