use std::time::{Duration, Instant};

use serde::Serialize;
use strum::Display;

use crate::error::RemoteError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Three-state guard in front of the remote host.
///
/// `failure_threshold` consecutive failures open the circuit. Once
/// `recovery_timeout` has passed since the last failure, the next state
/// check moves it to half-open and exactly one probe is admitted; the probe's
/// outcome closes or reopens the circuit.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    recovery_timeout: Duration,
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
    probe_in_flight: bool,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            recovery_timeout,
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure: None,
            probe_in_flight: false,
        }
    }

    /// Current state, applying the open → half-open transition when the
    /// cooldown has elapsed.
    pub fn state(&mut self) -> CircuitState {
        if self.state == CircuitState::Open && self.retry_after().is_zero() {
            self.state = CircuitState::HalfOpen;
            self.probe_in_flight = false;
            tracing::info!("circuit breaker half-open, attempting recovery");
        }
        self.state
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    pub fn allow_request(&mut self) -> bool {
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::HalfOpen if !self.probe_in_flight => {
                self.probe_in_flight = true;
                true
            }
            CircuitState::HalfOpen | CircuitState::Open => false,
        }
    }

    /// Free the half-open probe slot when the admitted request ended without
    /// an outcome (its future was dropped). Counters are left alone.
    pub fn release_half_open(&mut self) {
        if self.probe_in_flight {
            tracing::debug!("half-open probe abandoned, slot released");
        }
        self.probe_in_flight = false;
    }

    pub fn record_success(&mut self) {
        if self.state != CircuitState::Closed {
            tracing::info!("circuit breaker closed, connection recovered");
        }
        self.state = CircuitState::Closed;
        self.failure_count = 0;
        self.probe_in_flight = false;
    }

    pub fn record_failure(&mut self) {
        self.failure_count = self.failure_count.saturating_add(1);
        self.last_failure = Some(Instant::now());
        self.probe_in_flight = false;

        let reopen = self.state == CircuitState::HalfOpen;
        if reopen || self.failure_count >= self.failure_threshold {
            if self.state != CircuitState::Open {
                tracing::warn!(
                    failures = self.failure_count,
                    cooldown_secs = self.recovery_timeout.as_secs(),
                    "circuit breaker open"
                );
            }
            self.state = CircuitState::Open;
        }
    }

    /// Time left before an open circuit admits a probe.
    pub fn retry_after(&self) -> Duration {
        self.last_failure.map_or(Duration::ZERO, |at| {
            self.recovery_timeout.saturating_sub(at.elapsed())
        })
    }

    pub fn rejection(&self) -> RemoteError {
        RemoteError::CircuitOpen {
            failures: self.failure_count,
            retry_after: self.retry_after(),
        }
    }
}
