mod metrics;

pub use metrics::{LATENCY_WINDOW, LatencyStats, Metrics, MetricsSnapshot};
