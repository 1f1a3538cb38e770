//! Settlement provider call failures.

use axum::http::StatusCode;

/// How a [`ProviderError`] should be handled by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Worth a bounded retry: timeouts, connection failures, 5xx and 429.
    Transient,
    /// The provider refused the request, e.g. an expired token. Not retried.
    Rejected,
    /// The response body did not match the order schema. Not retried.
    MalformedResponse,
}

/// Failure of a single provider request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// The provider answered with a non-success status.
    #[error("provider returned HTTP {status_code}: {raw_body}")]
    Status {
        /// HTTP status code.
        status_code: u16,
        /// Response body as received.
        raw_body: String,
    },

    /// The request exceeded the configured timeout.
    #[error("provider request timed out")]
    Timeout,

    /// The request could not be sent or the response not read.
    #[error("provider transport failure: {0}")]
    Transport(String),

    /// The body could not be parsed into an order page.
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
}

impl ProviderError {
    /// Classifies the error.
    #[must_use]
    pub const fn kind(&self) -> ProviderErrorKind {
        match self {
            Self::Timeout | Self::Transport(_) => ProviderErrorKind::Transient,
            Self::Status { status_code, .. } if *status_code >= 500 || *status_code == 429 => {
                ProviderErrorKind::Transient
            }
            Self::Status { .. } => ProviderErrorKind::Rejected,
            Self::MalformedResponse(_) => ProviderErrorKind::MalformedResponse,
        }
    }

    /// Returns `true` if a bounded retry may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self.kind(), ProviderErrorKind::Transient)
    }

    /// Numeric error code in the 5xxx provider range.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self.kind() {
            ProviderErrorKind::Transient => 5001,
            ProviderErrorKind::Rejected => 5002,
            ProviderErrorKind::MalformedResponse => 5003,
        }
    }

    /// HTTP status surfaced to our own callers.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::BAD_GATEWAY,
        }
    }

    /// Message without provider internals.
    #[must_use]
    pub const fn public_message(&self) -> &'static str {
        match self.kind() {
            ProviderErrorKind::Transient => "settlement provider is temporarily unavailable",
            ProviderErrorKind::Rejected => "settlement provider rejected the request",
            ProviderErrorKind::MalformedResponse => {
                "settlement provider returned an unreadable response"
            }
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::MalformedResponse(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}
