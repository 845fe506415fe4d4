use std::sync::Arc;
use std::time::Duration;

use quotient_client::{HttpDocumentIntelligence, IntelligenceConfig};
use quotient_core::circuit_breaker::CircuitBreakerConfig;
use quotient_core::clock::ManualClock;
use quotient_core::job::PollConfig;
use quotient_core::resilience::{ResilientExecutor, RetryPolicy, ServiceProfile};
use wiremock::MockServer;

pub const API_KEY: &str = "test-key";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("quotient=debug")
        .with_test_writer()
        .try_init();
}

pub fn test_config(server: &MockServer) -> IntelligenceConfig {
    IntelligenceConfig::new(API_KEY)
        .with_base_url(&server.uri())
        .expect("mock server uri is a valid base url")
        .with_poll(PollConfig {
            interval: Duration::from_secs(10),
            max_polls: 5,
        })
}

/// Profile with a short real timeout; backoff sleeps go through the manual clock.
pub fn profile(name: &str, max_attempts: u32, failure_threshold: u32) -> ServiceProfile {
    ServiceProfile::new(
        name,
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            exponential_base: 2.0,
            jitter_factor: 0.0,
            timeout: Duration::from_secs(5),
        },
        CircuitBreakerConfig {
            failure_threshold,
            reset_timeout: Duration::from_secs(60),
        },
    )
}

/// Client wired to `server` with a manual clock, so retries and polls are instant.
pub fn client_with(config: IntelligenceConfig) -> (HttpDocumentIntelligence, ManualClock) {
    init_tracing();
    let clock = ManualClock::new();
    let executor = ResilientExecutor::new(Arc::new(clock.clone()));
    let client = HttpDocumentIntelligence::with_executor(config, executor)
        .expect("client should build");
    (client, clock)
}

pub fn client(server: &MockServer) -> (HttpDocumentIntelligence, ManualClock) {
    client_with(test_config(server))
}
