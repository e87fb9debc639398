//! Observability infrastructure.
//!
//! Provides:
//! - Structured logging via tracing
//! - OpenTelemetry metrics for cursor and page activity

pub mod metrics;
pub mod tracing;
