//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events through `tracing`)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (human readable or JSON lines)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured fields (`route = %identity`) instead of formatted messages
//! - Request ID is attached by the HTTP layer and flows through request spans
//! - Metric updates are no-ops until an exporter is installed

pub mod logging;
pub mod metrics;
