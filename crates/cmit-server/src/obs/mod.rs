//! In-process metrics.
//!
//! Counters, gauges and histograms live in `DashMap`s keyed by label sets and
//! are rendered in Prometheus text format on demand.

pub mod metrics;

pub use metrics::ServerMetrics;
