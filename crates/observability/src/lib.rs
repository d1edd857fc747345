//! # parley-observability
//!
//! Observability-Crate fuer Parley:
//! - Prometheus-kompatible Metriken (`/metrics`)
//! - Health-Check-Endpunkt (`/health`)
//! - Structured Logging via tracing-subscriber
//! - HTTP-Request-Tracing

pub mod health;
pub mod logging;
pub mod metrics;
pub mod middleware;

pub use health::{health_router, HealthResponse, HealthStatus};
pub use logging::{logging_initialisieren, LogFormat};
pub use metrics::{metrics_router, ParleyMetrics, StatistikQuelle, StatistikStand};
pub use middleware::request_trace_layer;
