//! Parsing jobs on the document-intelligence service and the bounded
//! polling loop that waits for them.
//!
//! Polling is an explicit state machine:
//!
//! ```text
//! Pending(n) --status=Success--> Succeeded
//!            --status=Error----> Failed(reason)
//!            --status=Pending / transient poll error, n+1 < max--> Pending(n+1)
//!            --n+1 == max------> TimedOut
//! ```
//!
//! Sleeping between polls goes through the injected [`Clock`], so tests run
//! instantly. The loop also stops at `max_polls * interval` on that clock,
//! however long individual status checks took.

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::error::AppError;

/// Status of a parsing job as reported by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "SUCCESS")]
    Success,
    #[serde(rename = "ERROR")]
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Success => "SUCCESS",
            JobStatus::Error => "ERROR",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Error)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "PENDING" => Ok(JobStatus::Pending),
            "SUCCESS" => Ok(JobStatus::Success),
            "ERROR" => Ok(JobStatus::Error),
            _ => Err(format!("Unknown job status: {}", s)),
        }
    }
}

/// A job created by one upload. Lives only for one parse call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsingJob {
    pub id: String,
    pub status: JobStatus,
}

impl ParsingJob {
    pub fn pending(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: JobStatus::Pending,
        }
    }
}

/// One status observation from the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatusReport {
    pub status: JobStatus,
    #[serde(default)]
    pub error: Option<String>,
}

impl JobStatusReport {
    pub fn pending() -> Self {
        Self {
            status: JobStatus::Pending,
            error: None,
        }
    }

    pub fn success() -> Self {
        Self {
            status: JobStatus::Success,
            error: None,
        }
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Error,
            error: Some(reason.into()),
        }
    }
}

/// Polling budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_polls: u32,
}

impl Default for PollConfig {
    /// 30 polls, 10 seconds apart: a five minute ceiling.
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            max_polls: 30,
        }
    }
}

impl PollConfig {
    pub fn budget(&self) -> Duration {
        self.interval * self.max_polls
    }
}

/// State of the polling loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollState {
    /// Waiting; `polls` observations made so far.
    Pending { polls: u32 },
    Succeeded,
    Failed(String),
    TimedOut { polls: u32 },
}

impl PollState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PollState::Pending { .. })
    }

    /// Advance after one poll. A failed poll counts against the budget but is
    /// otherwise treated like a Pending answer.
    pub fn advance(self, observation: Result<&JobStatusReport, &AppError>, max_polls: u32) -> PollState {
        let polls = match self {
            PollState::Pending { polls } => polls + 1,
            terminal => return terminal,
        };

        match observation {
            Ok(report) if report.status == JobStatus::Success => PollState::Succeeded,
            Ok(report) if report.status == JobStatus::Error => PollState::Failed(
                report
                    .error
                    .clone()
                    .unwrap_or_else(|| "service reported an error without details".to_string()),
            ),
            _ if polls >= max_polls => PollState::TimedOut { polls },
            _ => PollState::Pending { polls },
        }
    }
}

/// Poll `check` until the job reaches a terminal state or the budget runs out.
///
/// `check` is handed the budget deadline so its own retries can stop short
/// of it. Transient poll failures are tolerated within the budget; a
/// non-retryable poll failure (bad credentials, unknown job) ends the loop
/// immediately.
pub async fn wait_for_job<F, Fut>(
    job_id: &str,
    config: &PollConfig,
    clock: &dyn Clock,
    cancel: &CancellationToken,
    mut check: F,
) -> Result<ParsingJob, AppError>
where
    F: FnMut(Instant) -> Fut,
    Fut: Future<Output = Result<JobStatusReport, AppError>>,
{
    let max_polls = config.max_polls.max(1);
    let started = clock.now();
    let deadline = started + config.budget();
    let mut state = PollState::Pending { polls: 0 };

    loop {
        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }

        let observation = match check(deadline).await {
            Ok(report) => {
                tracing::debug!(%job_id, status = %report.status, "Polled job status");
                Ok(report)
            }
            Err(e) if e.is_retryable() => {
                tracing::warn!(%job_id, error = %e, "Status poll failed, will keep polling");
                Err(e)
            }
            Err(e) => return Err(e),
        };

        state = state.advance(observation.as_ref(), max_polls);

        match &state {
            PollState::Succeeded => {
                tracing::info!(
                    %job_id,
                    elapsed_secs = (clock.now() - started).as_secs(),
                    "Parsing job completed"
                );
                return Ok(ParsingJob {
                    id: job_id.to_string(),
                    status: JobStatus::Success,
                });
            }
            PollState::Failed(reason) => {
                return Err(AppError::JobFailed {
                    job_id: job_id.to_string(),
                    reason: reason.clone(),
                });
            }
            PollState::TimedOut { polls } => {
                return Err(AppError::JobTimedOut {
                    job_id: job_id.to_string(),
                    polls: *polls,
                    elapsed_secs: (clock.now() - started).as_secs(),
                });
            }
            PollState::Pending { polls } => {
                let remaining = deadline.saturating_duration_since(clock.now());
                if remaining.is_zero() {
                    tracing::warn!(%job_id, polls, "Polling budget spent before the poll limit");
                    return Err(AppError::JobTimedOut {
                        job_id: job_id.to_string(),
                        polls: *polls,
                        elapsed_secs: (clock.now() - started).as_secs(),
                    });
                }

                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Err(AppError::Cancelled),
                    () = clock.sleep(config.interval.min(remaining)) => {}
                }
            }
        }
    }
}
