use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Rolling window of latency samples kept per key.
pub const LATENCY_WINDOW: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencyStats {
    pub count: usize,
    pub min_ms: f64,
    pub max_ms: f64,
    pub avg_ms: f64,
    pub p95_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_seconds: f64,
    pub counters: BTreeMap<String, u64>,
    pub latencies: BTreeMap<String, LatencyStats>,
}

#[derive(Default)]
struct MetricsInner {
    counters: BTreeMap<String, u64>,
    latencies: BTreeMap<String, VecDeque<Duration>>,
}

/// In-process counters and latency samples.
pub struct Metrics {
    started_at: Instant,
    inner: Mutex<MetricsInner>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            inner: Mutex::new(MetricsInner::default()),
        }
    }

    pub fn inc(&self, name: &str) {
        self.add(name, 1);
    }

    pub fn add(&self, name: &str, delta: u64) {
        if let Ok(mut inner) = self.inner.lock() {
            *inner.counters.entry(name.to_string()).or_insert(0) += delta;
        }
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.inner
            .lock()
            .ok()
            .and_then(|inner| inner.counters.get(name).copied())
            .unwrap_or(0)
    }

    pub fn record_latency(&self, name: &str, elapsed: Duration) {
        if let Ok(mut inner) = self.inner.lock() {
            let samples = inner.latencies.entry(name.to_string()).or_default();
            samples.push_back(elapsed);
            while samples.len() > LATENCY_WINDOW {
                samples.pop_front();
            }
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let uptime_seconds = round1(self.started_at.elapsed().as_secs_f64());
        let Ok(inner) = self.inner.lock() else {
            return MetricsSnapshot {
                uptime_seconds,
                counters: BTreeMap::new(),
                latencies: BTreeMap::new(),
            };
        };

        let latencies = inner
            .latencies
            .iter()
            .filter(|(_, samples)| !samples.is_empty())
            .map(|(key, samples)| {
                let mut sorted: Vec<Duration> = samples.iter().copied().collect();
                sorted.sort();
                let count = sorted.len();
                let total: Duration = sorted.iter().sum();
                let p95_index = ((count as f64) * 0.95) as usize;
                let stats = LatencyStats {
                    count,
                    min_ms: round1(millis(sorted[0])),
                    max_ms: round1(millis(sorted[count - 1])),
                    avg_ms: round1(millis(total) / count as f64),
                    p95_ms: round1(millis(sorted[p95_index.min(count - 1)])),
                };
                (key.clone(), stats)
            })
            .collect();

        MetricsSnapshot {
            uptime_seconds,
            counters: inner.counters.clone(),
            latencies,
        }
    }

    pub fn reset(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.counters.clear();
            inner.latencies.clear();
        }
    }
}
