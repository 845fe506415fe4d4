//! Per-service circuit breakers.
//!
//! A breaker stops the pipeline from calling a service that keeps failing.
//! The [`BreakerRegistry`] creates one lazily for each service name.
//!
//! # Transitions
//!
//! ```text
//! CLOSED (healthy) --[N failures]--> OPEN (rejecting) --[reset timeout]--> HALF_OPEN (one probe)
//!                                      ^                                       |
//!                                      +---------------[failure]---------------+
//!                                                                              |
//! CLOSED <-------------------------------[success]-----------------------------+
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::clock::Clock;
use crate::error::AppError;

/// Where a breaker is in its open/close cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Calls go through.
    Closed,
    /// Calls are rejected without I/O until the reset timeout elapses.
    Open,
    /// One probe call decides whether to close or reopen.
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Thresholds for one service's breaker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive terminal failures that open the breaker.
    pub failure_threshold: u32,
    /// How long an open breaker rejects calls before admitting a probe.
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    successes: u32,
    last_failure_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    probe_after: Option<Instant>,
    probe_in_flight: bool,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            successes: 0,
            last_failure_at: None,
            last_error: None,
            probe_after: None,
            probe_in_flight: false,
        }
    }
}

/// Point-in-time view of one breaker, for logs and operators.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerStats {
    pub service_name: String,
    pub state: CircuitState,
    pub failures: u32,
    pub successes: u32,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub next_attempt_time: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Breaker guarding one external service. Clones share state.
///
/// Each instance has its own lock, so unrelated services never contend.
#[derive(Clone)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    inner: Arc<Mutex<BreakerState>>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            name: name.into(),
            config,
            clock,
            inner: Arc::new(Mutex::new(BreakerState::new())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// A panic while holding the lock leaves the counters usable, so poison is ignored.
    fn lock_inner(&self) -> std::sync::MutexGuard<'_, BreakerState> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            tracing::warn!(circuit = %self.name, "Breaker lock was poisoned; continuing");
            poisoned.into_inner()
        })
    }

    pub fn state(&self) -> CircuitState {
        self.lock_inner().state
    }

    /// Decides whether a call may proceed.
    ///
    /// - Closed: always.
    /// - Open: only once the reset timeout has elapsed, which moves the
    ///   breaker to Half-Open and admits this call as the probe.
    /// - Half-Open: only if no probe is already in flight.
    pub fn can_execute(&self) -> bool {
        let mut inner = self.lock_inner();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let now = self.clock.now();
                match inner.probe_after {
                    Some(next) if now >= next => {
                        tracing::info!(
                            circuit = %self.name,
                            "Reset timeout elapsed, admitting probe"
                        );
                        inner.state = CircuitState::HalfOpen;
                        inner.probe_in_flight = true;
                        true
                    }
                    _ => false,
                }
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    false
                } else {
                    inner.probe_in_flight = true;
                    true
                }
            }
        }
    }

    /// Like [`can_execute`](Self::can_execute) but yields the fail-fast error.
    pub fn acquire(&self) -> Result<(), AppError> {
        if self.can_execute() {
            Ok(())
        } else {
            Err(AppError::CircuitOpen {
                service: self.name.clone(),
                retry_after: self.time_until_probe_after(),
            })
        }
    }

    pub fn on_success(&self) {
        let mut inner = self.lock_inner();
        inner.successes += 1;

        match inner.state {
            CircuitState::HalfOpen => {
                tracing::info!(circuit = %self.name, "Probe succeeded, breaker closed");
                inner.state = CircuitState::Closed;
                inner.consecutive_failures = 0;
                inner.successes = 0;
                inner.probe_after = None;
                inner.probe_in_flight = false;
                inner.last_error = None;
            }
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
            }
            CircuitState::Open => {}
        }
    }

    pub fn on_failure(&self, error: &str) {
        let mut inner = self.lock_inner();
        let now = self.clock.now();
        inner.consecutive_failures += 1;
        inner.last_failure_at = Some(Utc::now());
        inner.last_error = Some(error.to_string());

        match inner.state {
            CircuitState::Closed => {
                if inner.consecutive_failures >= self.config.failure_threshold {
                    tracing::warn!(
                        circuit = %self.name,
                        failures = inner.consecutive_failures,
                        %error,
                        "Failure threshold reached, breaker opened"
                    );
                    inner.state = CircuitState::Open;
                    inner.probe_after = Some(now + self.config.reset_timeout);
                }
            }
            CircuitState::HalfOpen => {
                tracing::warn!(
                    circuit = %self.name,
                    %error,
                    "Probe failed, breaker reopened"
                );
                inner.state = CircuitState::Open;
                inner.probe_after = Some(now + self.config.reset_timeout);
                inner.probe_in_flight = false;
            }
            CircuitState::Open => {}
        }
    }

    /// Frees the half-open probe slot when a probe ends without an outcome
    /// (e.g. the caller cancelled it).
    pub fn release_probe(&self) {
        self.lock_inner().probe_in_flight = false;
    }

    pub fn reset(&self) {
        let mut inner = self.lock_inner();
        tracing::info!(circuit = %self.name, "Breaker reset by operator");
        *inner = BreakerState::new();
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        let inner = self.lock_inner();
        let now = self.clock.now();
        let next_attempt_time = match (inner.state, inner.probe_after) {
            (CircuitState::Open, Some(next)) => {
                let remaining = next.saturating_duration_since(now);
                Some(Utc::now() + chrono::TimeDelta::from_std(remaining).unwrap_or(chrono::TimeDelta::zero()))
            }
            _ => None,
        };

        CircuitBreakerStats {
            service_name: self.name.clone(),
            state: inner.state,
            failures: inner.consecutive_failures,
            successes: inner.successes,
            last_failure_time: inner.last_failure_at,
            next_attempt_time,
            last_error: inner.last_error.clone(),
        }
    }

    fn time_until_probe_after(&self) -> Duration {
        let inner = self.lock_inner();
        match (inner.state, inner.probe_after) {
            (CircuitState::Open, Some(next)) => next.saturating_duration_since(self.clock.now()),
            _ => Duration::ZERO,
        }
    }
}

/// Process-wide set of breakers, one per service name.
///
/// The map lock is only held to look up or insert an entry; state changes
/// happen under each breaker's own lock.
#[derive(Clone)]
pub struct BreakerRegistry {
    clock: Arc<dyn Clock>,
    breakers: Arc<RwLock<HashMap<String, CircuitBreaker>>>,
}

impl fmt::Debug for BreakerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BreakerRegistry")
            .field("services", &self.service_names())
            .finish()
    }
}

impl BreakerRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            breakers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Returns the breaker for `service`, creating it with `config` on first use.
    ///
    /// The config of an existing breaker is never replaced.
    pub fn get_or_create(&self, service: &str, config: &CircuitBreakerConfig) -> CircuitBreaker {
        if let Some(breaker) = self.get(service) {
            return breaker;
        }
        let mut map = self.breakers.write().unwrap_or_else(|p| p.into_inner());
        map.entry(service.to_string())
            .or_insert_with(|| {
                tracing::debug!(circuit = %service, "Creating circuit breaker");
                CircuitBreaker::new(service, config.clone(), Arc::clone(&self.clock))
            })
            .clone()
    }

    pub fn get(&self, service: &str) -> Option<CircuitBreaker> {
        let map = self.breakers.read().unwrap_or_else(|p| p.into_inner());
        map.get(service).cloned()
    }

    pub fn service_names(&self) -> Vec<String> {
        let map = self.breakers.read().unwrap_or_else(|p| p.into_inner());
        let mut names: Vec<String> = map.keys().cloned().collect();
        names.sort();
        names
    }

    /// Snapshots of every known breaker, ordered by service name.
    pub fn stats(&self) -> Vec<CircuitBreakerStats> {
        let breakers: Vec<CircuitBreaker> = {
            let map = self.breakers.read().unwrap_or_else(|p| p.into_inner());
            map.values().cloned().collect()
        };
        let mut stats: Vec<_> = breakers.iter().map(CircuitBreaker::stats).collect();
        stats.sort_by(|a, b| a.service_name.cmp(&b.service_name));
        stats
    }

    pub fn stats_for(&self, service: &str) -> Option<CircuitBreakerStats> {
        self.get(service).map(|b| b.stats())
    }

    /// Forces the named breaker to Closed. Returns false if it does not exist.
    pub fn reset_circuit_breaker(&self, service: &str) -> bool {
        match self.get(service) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }
}
