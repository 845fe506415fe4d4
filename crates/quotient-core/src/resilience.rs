//! Retry, backoff, timeout, and circuit breaking for external calls.
//!
//! [`ResilientExecutor::execute`] is the only way the pipeline talks to the
//! document service. Each call names a [`ServiceProfile`]; the executor
//! resolves that service's breaker, runs attempts strictly one after another,
//! and sleeps between them on the injected [`Clock`] so only the calling task
//! waits.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::circuit_breaker::{BreakerRegistry, CircuitBreakerConfig};
use crate::clock::{Clock, TokioClock};
use crate::error::AppError;
use crate::error_classifier::{CallFailure, ClassifiedError, classify};

/// Retry behaviour for one service. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub exponential_base: f64,
    /// Upper bound of the random multiplier added on top of the exponential delay.
    pub jitter_factor: f64,
    /// Per-attempt timeout.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            exponential_base: 2.0,
            jitter_factor: 0.1,
            timeout: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Backoff before the retry that follows failed attempt `attempt` (1-indexed).
    ///
    /// `min(max_delay, base * exp_base^(attempt-1) * (1 + jitter_factor * jitter_sample))`
    /// where `jitter_sample` is uniform in `[0, 1)`.
    pub fn backoff_delay(&self, attempt: u32, jitter_sample: f64) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let exponential = self.base_delay.as_secs_f64() * self.exponential_base.powi(exponent);
        let jittered = exponential * (1.0 + self.jitter_factor * jitter_sample.clamp(0.0, 1.0));
        let capped = jittered.min(self.max_delay.as_secs_f64());
        if capped.is_finite() && capped > 0.0 {
            Duration::from_secs_f64(capped)
        } else {
            Duration::ZERO
        }
    }

    fn delay_for(&self, attempt: u32, error: &ClassifiedError) -> Duration {
        error
            .retry_after
            .unwrap_or_else(|| self.backoff_delay(attempt, rand::random::<f64>()))
    }
}

/// Named bundle of retry and breaker settings for one external service.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceProfile {
    pub name: String,
    pub retry: RetryPolicy,
    pub breaker: CircuitBreakerConfig,
}

impl ServiceProfile {
    pub fn new(name: impl Into<String>, retry: RetryPolicy, breaker: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            retry,
            breaker,
        }
    }
}

/// Per-service counters, shared by every concurrent caller.
#[derive(Debug, Default)]
pub struct ServiceMetrics {
    attempts: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    retries: AtomicU64,
    short_circuits: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub retries: u64,
    pub short_circuits: u64,
}

impl ServiceMetrics {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            attempts: self.attempts.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            short_circuits: self.short_circuits.load(Ordering::Relaxed),
        }
    }
}

/// Runs calls through breaker, timeout, and retry-with-backoff.
#[derive(Clone, Debug)]
pub struct ResilientExecutor {
    clock: Arc<dyn Clock>,
    registry: BreakerRegistry,
    metrics: Arc<RwLock<HashMap<String, Arc<ServiceMetrics>>>>,
}

impl Default for ResilientExecutor {
    fn default() -> Self {
        Self::new(Arc::new(TokioClock))
    }
}

impl ResilientExecutor {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            registry: BreakerRegistry::new(Arc::clone(&clock)),
            clock,
            metrics: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn registry(&self) -> &BreakerRegistry {
        &self.registry
    }

    pub fn metrics(&self, service: &str) -> Option<MetricsSnapshot> {
        let map = self.metrics.read().unwrap_or_else(|p| p.into_inner());
        map.get(service).map(|m| m.snapshot())
    }

    fn metrics_for(&self, service: &str) -> Arc<ServiceMetrics> {
        if let Some(m) = self
            .metrics
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(service)
        {
            return Arc::clone(m);
        }
        let mut map = self.metrics.write().unwrap_or_else(|p| p.into_inner());
        Arc::clone(map.entry(service.to_string()).or_default())
    }

    /// Execute `call` under `profile`.
    ///
    /// - Open circuit: fails immediately with [`AppError::CircuitOpen`], `call` is never invoked.
    /// - Each attempt is bounded by `retry.timeout`; exceeding it counts as a Timeout failure.
    /// - Retryable failures sleep `Retry-After` if given, else exponential backoff with jitter.
    /// - Terminal failures are reported to the breaker once and surface as
    ///   [`AppError::ServiceCall`] carrying the classified kind.
    pub async fn execute<T, F, Fut>(
        &self,
        profile: &ServiceProfile,
        cancel: &CancellationToken,
        call: F,
    ) -> Result<T, AppError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CallFailure>>,
    {
        self.execute_before(profile, None, cancel, call).await
    }

    /// Like [`execute`](Self::execute), but never runs past `deadline` on the
    /// executor's clock: attempt timeouts shrink to the time left, and a retry
    /// whose backoff would end past the deadline is not taken.
    pub async fn execute_before<T, F, Fut>(
        &self,
        profile: &ServiceProfile,
        deadline: Option<Instant>,
        cancel: &CancellationToken,
        mut call: F,
    ) -> Result<T, AppError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CallFailure>>,
    {
        let service = profile.name.as_str();
        let policy = &profile.retry;
        let breaker = self.registry.get_or_create(service, &profile.breaker);
        let metrics = self.metrics_for(service);

        if let Err(err) = breaker.acquire() {
            ServiceMetrics::bump(&metrics.short_circuits);
            tracing::warn!(%service, error = %err, "Rejected call: circuit open");
            return Err(err);
        }

        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            if cancel.is_cancelled() {
                breaker.release_probe();
                return Err(AppError::Cancelled);
            }
            attempt += 1;
            ServiceMetrics::bump(&metrics.attempts);
            let attempt_timeout = match deadline {
                Some(deadline) => policy
                    .timeout
                    .min(deadline.saturating_duration_since(self.clock.now())),
                None => policy.timeout,
            };

            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    breaker.release_probe();
                    return Err(AppError::Cancelled);
                }
                outcome = tokio::time::timeout(attempt_timeout, call()) => outcome,
            };

            let failure = match outcome {
                Ok(Ok(value)) => {
                    breaker.on_success();
                    ServiceMetrics::bump(&metrics.successes);
                    if attempt > 1 {
                        tracing::info!(%service, attempt, "Call succeeded after retry");
                    }
                    return Ok(value);
                }
                Ok(Err(failure)) => failure,
                Err(_) => CallFailure::Timeout(format!(
                    "no response within {}ms",
                    attempt_timeout.as_millis()
                )),
            };

            let classified = classify(&failure);
            let delay = policy.delay_for(attempt, &classified);
            let past_deadline = deadline.is_some_and(|d| self.clock.now() + delay >= d);
            if past_deadline && classified.retryable && attempt < max_attempts {
                tracing::debug!(%service, attempt, "Next retry would end past the deadline, giving up");
            }

            if !classified.retryable || attempt >= max_attempts || past_deadline {
                breaker.on_failure(&classified.to_string());
                ServiceMetrics::bump(&metrics.failures);
                tracing::error!(
                    %service,
                    attempt,
                    kind = %classified.kind,
                    status = ?classified.status_code,
                    error = %classified.message,
                    "Call failed terminally"
                );
                return Err(AppError::ServiceCall {
                    service: service.to_string(),
                    attempts: attempt,
                    source: classified,
                });
            }

            ServiceMetrics::bump(&metrics.retries);
            tracing::warn!(
                %service,
                attempt,
                max_attempts,
                kind = %classified.kind,
                delay_ms = delay.as_millis() as u64,
                "Transient failure, retrying"
            );

            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    breaker.release_probe();
                    return Err(AppError::Cancelled);
                }
                () = self.clock.sleep(delay) => {}
            }
        }
    }
}
