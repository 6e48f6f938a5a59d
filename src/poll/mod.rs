//! Geometric-backoff polling for peer-driven state changes.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::PollingConfig;

/// Interval schedule: starts at `min`, grows by `factor` after every miss,
/// saturates at `max`, and snaps back to `min` on a hit.
#[derive(Debug, Clone)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    factor: f64,
    current: Duration,
}

impl Backoff {
    pub fn new(min: Duration, max: Duration, factor: f64) -> Self {
        Self {
            min,
            max: max.max(min),
            factor: factor.max(1.0),
            current: min,
        }
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    /// Advance after an unsuccessful check; returns the interval to sleep.
    pub fn miss(&mut self) -> Duration {
        let sleep = self.current;
        self.current = self.current.mul_f64(self.factor).min(self.max);
        sleep
    }

    pub fn reset(&mut self) {
        self.current = self.min;
    }
}

#[derive(Debug, Clone)]
pub struct AdaptivePoller {
    min: Duration,
    max: Duration,
    factor: f64,
}

impl Default for AdaptivePoller {
    fn default() -> Self {
        Self::from_config(&PollingConfig::default())
    }
}

impl AdaptivePoller {
    pub fn from_config(config: &PollingConfig) -> Self {
        Self {
            min: Duration::from_millis(config.min_interval_ms),
            max: Duration::from_millis(config.max_interval_ms),
            factor: config.backoff_factor,
        }
    }

    pub fn backoff(&self) -> Backoff {
        Backoff::new(self.min, self.max, self.factor)
    }

    /// Run `check` until it yields a value or `timeout` elapses.
    ///
    /// Returns `None` on expiry; callers treat that as terminal for the step
    /// they were waiting on.
    pub async fn poll_until<T>(
        &self,
        timeout: Duration,
        mut check: impl FnMut() -> Option<T>,
    ) -> Option<T> {
        self.drive(timeout, || std::future::ready(check())).await
    }

    /// [`poll_until`](Self::poll_until) for checks that do blocking file
    /// I/O. Each check runs on the blocking pool, so a reader backing off on
    /// a busy file never stalls a runtime worker.
    pub async fn poll_blocking_until<T, F>(&self, timeout: Duration, check: F) -> Option<T>
    where
        F: Fn() -> Option<T> + Send + Sync + 'static,
        T: Send + 'static,
    {
        let check = Arc::new(check);
        self.drive(timeout, || {
            let attempt = Arc::clone(&check);
            async move {
                match tokio::task::spawn_blocking(move || attempt()).await {
                    Ok(observed) => observed,
                    Err(e) => {
                        tracing::warn!(error = %e, "poll check did not complete");
                        None
                    }
                }
            }
        })
        .await
    }

    async fn drive<T, Fut>(&self, timeout: Duration, mut check: impl FnMut() -> Fut) -> Option<T>
    where
        Fut: Future<Output = Option<T>>,
    {
        let deadline = Instant::now() + timeout;
        let mut backoff = self.backoff();
        let mut checks: u32 = 0;

        loop {
            checks += 1;
            if let Some(value) = check().await {
                tracing::debug!(checks, "poll observed change");
                return Some(value);
            }
            let now = Instant::now();
            if now >= deadline {
                tracing::debug!(checks, timeout_ms = timeout.as_millis() as u64, "poll timed out");
                return None;
            }
            let sleep = backoff.miss().min(deadline - now);
            tokio::time::sleep(sleep).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn poller() -> AdaptivePoller {
        AdaptivePoller::default()
    }

    #[test]
    fn backoff_grows_geometrically_and_caps() {
        let mut backoff = poller().backoff();
        assert_eq!(backoff.miss(), Duration::from_millis(50));
        let second = backoff.miss();
        assert!(second.abs_diff(Duration::from_millis(75)) < Duration::from_micros(1));
        let third = backoff.miss();
        assert!(third.abs_diff(Duration::from_micros(112_500)) < Duration::from_micros(1));
        for _ in 0..20 {
            backoff.miss();
        }
        assert_eq!(backoff.current(), Duration::from_millis(500));
    }

    #[test]
    fn reset_returns_to_minimum() {
        let mut backoff = poller().backoff();
        backoff.miss();
        backoff.miss();
        backoff.reset();
        assert_eq!(backoff.current(), Duration::from_millis(50));
    }

    #[test]
    fn immediate_hit_needs_no_runtime_sleep() {
        let value = tokio_test::block_on(poller().poll_until(Duration::ZERO, || Some(7)));
        assert_eq!(value, Some(7));
    }

    #[tokio::test(start_paused = true)]
    async fn returns_value_once_check_succeeds() {
        let calls = Cell::new(0);
        let value = poller()
            .poll_until(Duration::from_secs(5), || {
                calls.set(calls.get() + 1);
                (calls.get() == 4).then_some("answer")
            })
            .await;
        assert_eq!(value, Some("answer"));
        assert_eq!(calls.get(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_with_none() {
        let started = Instant::now();
        let value: Option<()> = poller()
            .poll_until(Duration::from_secs(2), || None)
            .await;
        assert!(value.is_none());
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(2));
        assert!(elapsed < Duration::from_millis(2_600));
    }

    #[tokio::test]
    async fn blocking_checks_run_on_the_blocking_pool() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let poller = AdaptivePoller::from_config(&PollingConfig {
            min_interval_ms: 1,
            max_interval_ms: 5,
            backoff_factor: 1.5,
        });
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let value = poller
            .poll_blocking_until(Duration::from_secs(5), move || {
                std::thread::sleep(Duration::from_millis(2));
                (counter.fetch_add(1, Ordering::SeqCst) + 1 == 3).then_some("seen")
            })
            .await;
        assert_eq!(value, Some("seen"));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }
}
