//! SepSight Telemetry
//!
//! Metrics for the risk pipeline.
//!
//! Provides:
//! - In-process counters backing the stats endpoint
//! - `metrics` facade emission for the Prometheus exporter
//! - Distinct accounting of every degrade event, so a stage working as
//!   intended can be told apart from a systemic outage

pub mod metrics;

pub use crate::metrics::{describe_metrics, DegradeEvent, MetricsCollector, MetricsSnapshot, Stage};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::metrics::{DegradeEvent, MetricsCollector, Stage};
}
