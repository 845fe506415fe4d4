use std::time::Duration;

use quotient_core::AppError;
use quotient_core::circuit_breaker::CircuitBreakerConfig;
use quotient_core::job::PollConfig;
use quotient_core::resilience::{RetryPolicy, ServiceProfile};

pub const DEFAULT_BASE_URL: &str = "https://api.cloud.llamaindex.ai";

pub const UPLOAD_SERVICE: &str = "document-upload";
pub const STATUS_SERVICE: &str = "document-status";
pub const RESULTS_SERVICE: &str = "document-results";

/// Connection and resilience settings for the document-intelligence service.
#[derive(Debug, Clone)]
pub struct IntelligenceConfig {
    pub api_key: String,
    pub base_url: String,
    pub poll: PollConfig,
    pub upload: ServiceProfile,
    pub status: ServiceProfile,
    pub results: ServiceProfile,
}

/// Uploads are large and slow; retry more and keep the breaker open longer.
pub fn upload_profile() -> ServiceProfile {
    ServiceProfile::new(
        UPLOAD_SERVICE,
        RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            exponential_base: 2.0,
            jitter_factor: 0.1,
            timeout: Duration::from_secs(180),
        },
        CircuitBreakerConfig {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(300),
        },
    )
}

/// Status polls are cheap and frequent.
pub fn status_profile() -> ServiceProfile {
    ServiceProfile::new(
        STATUS_SERVICE,
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            exponential_base: 2.0,
            jitter_factor: 0.1,
            timeout: Duration::from_secs(30),
        },
        CircuitBreakerConfig {
            failure_threshold: 10,
            reset_timeout: Duration::from_secs(60),
        },
    )
}

pub fn results_profile() -> ServiceProfile {
    ServiceProfile::new(
        RESULTS_SERVICE,
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(20),
            exponential_base: 2.0,
            jitter_factor: 0.1,
            timeout: Duration::from_secs(60),
        },
        CircuitBreakerConfig {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(120),
        },
    )
}

impl IntelligenceConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            poll: PollConfig::default(),
            upload: upload_profile(),
            status: status_profile(),
            results: results_profile(),
        }
    }

    /// Read configuration from environment variables.
    ///
    /// - `QUOTIENT_API_KEY` (required)
    /// - `QUOTIENT_BASE_URL` (optional, defaults to the hosted service)
    /// - `QUOTIENT_POLL_INTERVAL_SECS` (optional, defaults to 10)
    /// - `QUOTIENT_MAX_POLLS` (optional, defaults to 30)
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let api_key = lookup("QUOTIENT_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                AppError::ConfigError(
                    "QUOTIENT_API_KEY not set. Required to reach the document service.".into(),
                )
            })?;

        let mut config = Self::new(api_key);

        if let Some(base_url) = lookup("QUOTIENT_BASE_URL") {
            config = config.with_base_url(&base_url)?;
        }
        if let Some(raw) = lookup("QUOTIENT_POLL_INTERVAL_SECS") {
            config.poll.interval = Duration::from_secs(positive("QUOTIENT_POLL_INTERVAL_SECS", &raw)?);
        }
        if let Some(raw) = lookup("QUOTIENT_MAX_POLLS") {
            let max_polls = positive("QUOTIENT_MAX_POLLS", &raw)?;
            config.poll.max_polls = u32::try_from(max_polls).map_err(|_| {
                AppError::ConfigError(format!("QUOTIENT_MAX_POLLS '{raw}' is too large"))
            })?;
        }

        Ok(config)
    }

    /// Point at another deployment. The URL must be absolute http(s).
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self, AppError> {
        let parsed = url::Url::parse(base_url).map_err(|e| {
            AppError::ConfigError(format!("Invalid QUOTIENT_BASE_URL '{base_url}': {e}"))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AppError::ConfigError(format!(
                "QUOTIENT_BASE_URL scheme '{}' is not allowed (only http/https)",
                parsed.scheme()
            )));
        }
        self.base_url = base_url.trim_end_matches('/').to_string();
        Ok(self)
    }

    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_upload_profile(mut self, profile: ServiceProfile) -> Self {
        self.upload = profile;
        self
    }

    pub fn with_status_profile(mut self, profile: ServiceProfile) -> Self {
        self.status = profile;
        self
    }

    pub fn with_results_profile(mut self, profile: ServiceProfile) -> Self {
        self.results = profile;
        self
    }
}

fn positive(name: &str, raw: &str) -> Result<u64, AppError> {
    let parsed: u64 = raw.trim().parse().map_err(|_| {
        AppError::ConfigError(format!("Invalid {name} '{raw}': must be a positive integer"))
    })?;
    if parsed == 0 {
        return Err(AppError::ConfigError(format!("{name} must be at least 1")));
    }
    Ok(parsed)
}
