//! Middleware stack for the gateway.
//!
//! Layer order: Request → Tracing → CORS → Handler. Rate limiting is not a
//! layer: cache hits must bypass it, so the facade applies it after the
//! cache lookup.

pub mod cors;
pub mod metrics;
pub mod tracing;

pub use cors::create_cors_layer;
pub use metrics::{GatewayMetrics, RequestTimer};
pub use tracing::TracingLayer;
