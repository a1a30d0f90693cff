//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! net::wrapper (accept, filter, detection)
//!     → logging.rs (structured log events)
//!     → metrics.rs (outcome counters)
//!
//! Consumers:
//!     → stdout (pretty or JSON lines)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```

pub mod logging;
pub mod metrics;
