//! Failure classification for calls to external services.
//!
//! Every failed call is reduced to a [`CallFailure`] by the transport layer and
//! then classified into a [`ClassifiedError`]. The classification decides
//! whether the resilient executor retries, so this module is the only place
//! retry eligibility is defined.
//!
//! Priority order:
//!
//! ```text
//! HTTP 429        -> RateLimit   (retryable, honours Retry-After)
//! HTTP >= 500     -> ServerError (retryable)
//! HTTP 401 / 403  -> Auth
//! HTTP >= 400     -> ClientError
//! connect failure -> Network     (retryable)
//! timeout         -> Timeout     (retryable)
//! anything else   -> Permanent
//! ```

use std::fmt;
use std::time::Duration;

use serde::Serialize;

/// Failure taxonomy shared by the resilience layer and callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    RateLimit,
    Timeout,
    ServerError,
    ClientError,
    Auth,
    Permanent,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::Timeout => "timeout",
            ErrorKind::ServerError => "server_error",
            ErrorKind::ClientError => "client_error",
            ErrorKind::Auth => "auth",
            ErrorKind::Permanent => "permanent",
        }
    }

    /// Whether failures of this kind are worth retrying locally.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorKind::Network | ErrorKind::RateLimit | ErrorKind::Timeout | ErrorKind::ServerError
        )
    }

    /// Operator-facing explanation used when re-wrapping errors.
    pub fn human_message(&self) -> &'static str {
        match self {
            ErrorKind::Network => "could not reach the document service; check network connectivity",
            ErrorKind::RateLimit => "the document service is rate limiting requests; try again later",
            ErrorKind::Timeout => "the document service did not respond in time",
            ErrorKind::ServerError => "the document service reported an internal error",
            ErrorKind::ClientError => "the document service rejected the request",
            ErrorKind::Auth => "the document service rejected our credentials; check the API key",
            ErrorKind::Permanent => "the request failed and will not succeed on retry",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw outcome of a failed call, as reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallFailure {
    /// The service answered with a non-success HTTP status.
    Http {
        status: u16,
        retry_after: Option<Duration>,
        body: String,
    },
    /// No response: the connection could not be established or was dropped.
    Connect(String),
    /// No response: the request exceeded its deadline.
    Timeout(String),
    /// Anything else (decode failures, malformed responses, ...).
    Other(String),
}

impl CallFailure {
    pub fn http(status: u16, body: impl Into<String>) -> Self {
        CallFailure::Http {
            status,
            retry_after: None,
            body: body.into(),
        }
    }

    pub fn with_retry_after(self, retry_after: Option<Duration>) -> Self {
        match self {
            CallFailure::Http { status, body, .. } => CallFailure::Http {
                status,
                retry_after,
                body,
            },
            other => other,
        }
    }
}

impl fmt::Display for CallFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallFailure::Http { status, body, .. } if body.is_empty() => write!(f, "HTTP {status}"),
            CallFailure::Http { status, body, .. } => write!(f, "HTTP {status}: {body}"),
            CallFailure::Connect(msg) => write!(f, "connection failed: {msg}"),
            CallFailure::Timeout(msg) => write!(f, "timed out: {msg}"),
            CallFailure::Other(msg) => f.write_str(msg),
        }
    }
}

/// A failure with its retry decision attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub retryable: bool,
    pub retry_after: Option<Duration>,
    pub status_code: Option<u16>,
    /// Text of the underlying failure, kept for logs.
    pub message: String,
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error: {}", self.kind, self.message)
    }
}

impl std::error::Error for ClassifiedError {}

/// Classify a failed call.
pub fn classify(failure: &CallFailure) -> ClassifiedError {
    let message = failure.to_string();
    match failure {
        CallFailure::Http {
            status,
            retry_after,
            ..
        } => {
            let status = *status;
            let (kind, retry_after) = match status {
                429 => (ErrorKind::RateLimit, *retry_after),
                s if s >= 500 => (ErrorKind::ServerError, None),
                401 | 403 => (ErrorKind::Auth, None),
                s if s >= 400 => (ErrorKind::ClientError, None),
                _ => (ErrorKind::Permanent, None),
            };
            ClassifiedError {
                kind,
                retryable: kind.is_transient(),
                retry_after,
                status_code: Some(status),
                message,
            }
        }
        CallFailure::Connect(_) => transient(ErrorKind::Network, message),
        CallFailure::Timeout(_) => transient(ErrorKind::Timeout, message),
        CallFailure::Other(_) => ClassifiedError {
            kind: ErrorKind::Permanent,
            retryable: false,
            retry_after: None,
            status_code: None,
            message,
        },
    }
}

fn transient(kind: ErrorKind, message: String) -> ClassifiedError {
    ClassifiedError {
        kind,
        retryable: true,
        retry_after: None,
        status_code: None,
        message,
    }
}

/// Parse a `Retry-After` header value given in seconds.
///
/// HTTP-date values are not supported and yield `None`, which falls back to
/// exponential backoff.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_carries_retry_after() {
        let failure = CallFailure::http(429, "slow down").with_retry_after(Some(Duration::from_secs(7)));
        let classified = classify(&failure);
        assert_eq!(classified.kind, ErrorKind::RateLimit);
        assert!(classified.retryable);
        assert_eq!(classified.retry_after, Some(Duration::from_millis(7000)));
        assert_eq!(classified.status_code, Some(429));
    }

    #[test]
    fn server_errors_are_retryable() {
        for status in [500, 502, 503, 504] {
            let classified = classify(&CallFailure::http(status, ""));
            assert_eq!(classified.kind, ErrorKind::ServerError);
            assert!(classified.retryable);
        }
    }

    #[test]
    fn auth_and_client_errors_are_terminal() {
        assert_eq!(classify(&CallFailure::http(401, "")).kind, ErrorKind::Auth);
        assert_eq!(classify(&CallFailure::http(403, "")).kind, ErrorKind::Auth);
        let bad_request = classify(&CallFailure::http(400, "bad form"));
        assert_eq!(bad_request.kind, ErrorKind::ClientError);
        assert!(!bad_request.retryable);
        assert!(!classify(&CallFailure::http(404, "")).retryable);
    }

    #[test]
    fn retry_after_ignored_outside_rate_limits() {
        let failure = CallFailure::http(503, "").with_retry_after(Some(Duration::from_secs(3)));
        assert_eq!(classify(&failure).retry_after, None);
    }

    #[test]
    fn transport_failures() {
        let network = classify(&CallFailure::Connect("refused".into()));
        assert_eq!(network.kind, ErrorKind::Network);
        assert!(network.retryable);

        let timeout = classify(&CallFailure::Timeout("deadline".into()));
        assert_eq!(timeout.kind, ErrorKind::Timeout);
        assert!(timeout.retryable);

        let other = classify(&CallFailure::Other("garbage".into()));
        assert_eq!(other.kind, ErrorKind::Permanent);
        assert!(!other.retryable);
    }

    #[test]
    fn retry_after_header_parsing() {
        assert_eq!(parse_retry_after(" 12 "), Some(Duration::from_secs(12)));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }
}
