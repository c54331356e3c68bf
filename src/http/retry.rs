//! Retry policy for index and artifact requests.
//!
//! Transport failures and 5xx responses are retried; 4xx responses mean the
//! index or artifact URL itself is wrong and retrying will not help.

use reqwest::StatusCode;

/// Maximum number of attempts for a single request.
pub const MAX_RETRIES: usize = 3;

/// Delay between attempts in milliseconds.
pub const RETRY_DELAY_MS: u64 = 1000;

/// An HTTP status that will not change on retry.
#[derive(Debug)]
pub enum NonRetryableError {
    /// HTTP 404 or 410: the version or file does not exist on the server
    NotFound { status: u16 },
    /// HTTP 401 or 403: the mirror or index refuses access
    Denied { status: u16 },
    /// HTTP 429
    Throttled,
    /// Any other 4xx
    Rejected { status: u16 },
}

impl NonRetryableError {
    pub fn status(&self) -> u16 {
        match self {
            NonRetryableError::NotFound { status }
            | NonRetryableError::Denied { status }
            | NonRetryableError::Rejected { status } => *status,
            NonRetryableError::Throttled => StatusCode::TOO_MANY_REQUESTS.as_u16(),
        }
    }
}

impl std::fmt::Display for NonRetryableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NonRetryableError::NotFound { status } => {
                write!(f, "HTTP {}: resource does not exist on the server", status)
            }
            NonRetryableError::Denied { status } => {
                write!(
                    f,
                    "HTTP {}: access denied. Check the configured index or mirror URL",
                    status
                )
            }
            NonRetryableError::Throttled => {
                write!(f, "HTTP 429: server is throttling requests, try again later")
            }
            NonRetryableError::Rejected { status } => {
                write!(f, "HTTP {}: request rejected by server", status)
            }
        }
    }
}

impl std::error::Error for NonRetryableError {}

/// Map a response status onto the non-retryable kinds. `None` means retry.
pub fn classify_status(status: StatusCode) -> Option<NonRetryableError> {
    let code = status.as_u16();
    match status {
        StatusCode::NOT_FOUND | StatusCode::GONE => Some(NonRetryableError::NotFound { status: code }),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Some(NonRetryableError::Denied { status: code })
        }
        StatusCode::TOO_MANY_REQUESTS => Some(NonRetryableError::Throttled),
        s if s.is_client_error() => Some(NonRetryableError::Rejected { status: code }),
        _ => None,
    }
}

/// Convert an `error_for_status()` failure into an anyhow error, tagging it
/// as non-retryable when the status says so.
pub fn check_retryable(error: reqwest::Error) -> anyhow::Error {
    match error.status().and_then(classify_status) {
        Some(non_retryable) => anyhow::Error::from(non_retryable),
        None => anyhow::Error::from(error),
    }
}

/// Whether another attempt may succeed.
pub fn is_retryable(error: &anyhow::Error) -> bool {
    error.downcast_ref::<NonRetryableError>().is_none()
}
