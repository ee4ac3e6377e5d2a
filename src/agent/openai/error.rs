//! HTTP error types with retry classification.
//!
//! Separates transient failures (retried with backoff) from permanent ones.

use std::time::Duration;

/// Error from an OpenAI-compatible endpoint.
#[derive(Debug)]
pub struct HttpError {
    pub kind: HttpErrorKind,
    /// HTTP status code, if the server answered
    pub status_code: Option<u16>,
    pub message: String,
    /// Delay requested by the server via `Retry-After`
    pub retry_after: Option<Duration>,
}

impl HttpError {
    pub fn rate_limited(message: String, retry_after: Option<Duration>) -> Self {
        Self {
            kind: HttpErrorKind::RateLimited,
            status_code: Some(429),
            message,
            retry_after,
        }
    }

    pub fn server_error(status_code: u16, message: String) -> Self {
        Self {
            kind: HttpErrorKind::ServerError,
            status_code: Some(status_code),
            message,
            retry_after: None,
        }
    }

    pub fn client_error(status_code: u16, message: String) -> Self {
        Self {
            kind: HttpErrorKind::ClientError,
            status_code: Some(status_code),
            message,
            retry_after: None,
        }
    }

    pub fn network_error(message: String) -> Self {
        Self {
            kind: HttpErrorKind::NetworkError,
            status_code: None,
            message,
            retry_after: None,
        }
    }

    pub fn parse_error(message: String) -> Self {
        Self {
            kind: HttpErrorKind::ParseError,
            status_code: None,
            message,
            retry_after: None,
        }
    }

    /// Build an error from a non-success response.
    pub fn from_status(status: u16, body: &str, retry_after: Option<Duration>) -> Self {
        match classify_http_status(status) {
            HttpErrorKind::RateLimited => Self::rate_limited(body.to_string(), retry_after),
            HttpErrorKind::ClientError => Self::client_error(status, body.to_string()),
            _ => Self::server_error(status, body.to_string()),
        }
    }

    /// Classify a transport-level `reqwest` failure.
    pub fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::network_error(format!("Request timeout: {}", e))
        } else if e.is_connect() {
            Self::network_error(format!("Connection failed: {}", e))
        } else if e.is_decode() {
            Self::parse_error(format!("Failed to decode response: {}", e))
        } else {
            Self::network_error(format!("Request failed: {}", e))
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }

    /// Delay before retry `attempt` (0-based).
    ///
    /// Uses `retry_after` when set, otherwise exponential backoff from a
    /// per-kind base with deterministic jitter, capped at 60 seconds.
    pub fn suggested_delay(&self, attempt: u32) -> Duration {
        if let Some(retry_after) = self.retry_after {
            return retry_after;
        }

        let base_delay = match self.kind {
            HttpErrorKind::RateLimited => Duration::from_secs(5),
            HttpErrorKind::ServerError => Duration::from_secs(2),
            _ => Duration::from_secs(1),
        };

        let multiplier = 2u64.saturating_pow(attempt);
        let delay_secs = base_delay.as_secs().saturating_mul(multiplier);

        let jitter_range = delay_secs / 4;
        let jitter = if jitter_range > 0 {
            (attempt as u64 * 7) % jitter_range
        } else {
            0
        };

        Duration::from_secs((delay_secs + jitter).min(60))
    }
}

impl std::fmt::Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status_code {
            Some(code) => write!(f, "{} (HTTP {}): {}", self.kind, code, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for HttpError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpErrorKind {
    /// 429
    RateLimited,
    /// 5xx
    ServerError,
    /// 4xx other than 429
    ClientError,
    /// Connection failure or timeout
    NetworkError,
    /// Unexpected response body
    ParseError,
}

impl HttpErrorKind {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            HttpErrorKind::RateLimited | HttpErrorKind::ServerError | HttpErrorKind::NetworkError
        )
    }
}

impl std::fmt::Display for HttpErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpErrorKind::RateLimited => write!(f, "Rate limited"),
            HttpErrorKind::ServerError => write!(f, "Server error"),
            HttpErrorKind::ClientError => write!(f, "Client error"),
            HttpErrorKind::NetworkError => write!(f, "Network error"),
            HttpErrorKind::ParseError => write!(f, "Parse error"),
        }
    }
}

/// Retry behaviour for the non-streaming call.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    /// Upper bound on time spent across all attempts
    pub max_retry_duration: Duration,
    pub retry_rate_limits: bool,
    pub retry_server_errors: bool,
    pub retry_network_errors: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            max_retry_duration: Duration::from_secs(120),
            retry_rate_limits: true,
            retry_server_errors: true,
            retry_network_errors: true,
        }
    }
}

impl RetryConfig {
    /// No retries at all.
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn should_retry(&self, error: &HttpError) -> bool {
        match error.kind {
            HttpErrorKind::RateLimited => self.retry_rate_limits,
            HttpErrorKind::ServerError => self.retry_server_errors,
            HttpErrorKind::NetworkError => self.retry_network_errors,
            HttpErrorKind::ClientError | HttpErrorKind::ParseError => false,
        }
    }
}

pub fn classify_http_status(status: u16) -> HttpErrorKind {
    match status {
        429 => HttpErrorKind::RateLimited,
        400..=499 => HttpErrorKind::ClientError,
        _ => HttpErrorKind::ServerError,
    }
}

pub(crate) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
