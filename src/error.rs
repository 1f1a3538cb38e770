//! Ledger error types with HTTP status code mapping.
//!
//! [`AppError`] is the central error type. Each variant maps to a stable
//! numeric code and HTTP status. The public message never carries raw
//! provider bodies; elevated handlers opt into details with
//! [`AppError::with_details`].

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::{ReconciliationAnomaly, TransactionId};
use crate::provider::ProviderError;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 1102,
///     "message": "forbidden",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Stable numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Internal details, only present for elevated callers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category        | HTTP Status                  |
/// |-----------|-----------------|------------------------------|
/// | 1000–1099 | Validation      | 400 Bad Request              |
/// | 1100–1199 | Authorization   | 401 / 403                    |
/// | 2000–2999 | Not Found       | 404 Not Found                |
/// | 3000–3999 | Server / Config | 500 / 503                    |
/// | 4000–4999 | Reconciliation  | 409 Conflict                 |
/// | 5000–5999 | Provider        | 502 Bad Gateway / 504        |
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No identity was supplied.
    #[error("unauthorized")]
    Unauthorized,

    /// The identity may not access the requested wallet or resource.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Transaction does not exist or is outside the caller's scope.
    #[error("transaction not found: {0}")]
    TransactionNotFound(TransactionId),

    /// The provider credential is missing or carries no token.
    #[error("settlement provider credential not configured: {0}")]
    NotConfigured(String),

    /// The settlement provider call failed.
    #[error("settlement provider error: {0}")]
    Provider(#[from] ProviderError),

    /// A provider report was refused.
    #[error("{0}")]
    Anomaly(#[from] ReconciliationAnomaly),

    /// Persistence layer failure.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::Unauthorized => 1101,
            Self::Forbidden(_) => 1102,
            Self::TransactionNotFound(_) => 2001,
            Self::Internal(_) => 3000,
            Self::Persistence(_) => 3001,
            Self::NotConfigured(_) => 3101,
            Self::Anomaly(_) => 4001,
            Self::Provider(err) => err.error_code(),
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::TransactionNotFound(_) => StatusCode::NOT_FOUND,
            Self::Persistence(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Anomaly(_) => StatusCode::CONFLICT,
            Self::Provider(err) => err.status_code(),
        }
    }

    /// Message safe to show any caller.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::InvalidRequest(_)
            | Self::Unauthorized
            | Self::Forbidden(_)
            | Self::TransactionNotFound(_) => self.to_string(),
            Self::NotConfigured(_) => "settlement provider is not configured".to_string(),
            Self::Provider(err) => err.public_message().to_string(),
            Self::Anomaly(_) => "provider data conflicts with the local ledger".to_string(),
            Self::Persistence(_) | Self::Internal(_) => "internal server error".to_string(),
        }
    }

    /// Wraps the error so the response includes internal details.
    ///
    /// Only handlers serving elevated callers should use this.
    #[must_use]
    pub fn with_details(self) -> DetailedError {
        DetailedError(self)
    }

    fn to_response(&self, details: Option<String>) -> Response {
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.public_message(),
                details,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = self.status_code();
        response
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status_code().is_server_error() {
            tracing::error!(code = self.error_code(), error = %self, "request failed");
        }
        self.to_response(None)
    }
}

/// An [`AppError`] rendered with its internal details.
#[derive(Debug)]
pub struct DetailedError(pub AppError);

impl From<AppError> for DetailedError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl IntoResponse for DetailedError {
    fn into_response(self) -> Response {
        let details = match &self.0 {
            AppError::Provider(err) => Some(err.to_string()),
            AppError::Unauthorized | AppError::Forbidden(_) => None,
            other => Some(other.to_string()),
        };
        self.0.to_response(details)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::AnomalyKind;

    async fn body_json(response: Response) -> serde_json::Value {
        let Ok(bytes) = axum::body::to_bytes(response.into_body(), usize::MAX).await else {
            panic!("body read failed");
        };
        serde_json::from_slice(&bytes).unwrap_or_default()
    }

    #[test]
    fn authorization_errors_map_to_401_and_403() {
        assert_eq!(
            AppError::Unauthorized.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::Forbidden("x".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(AppError::Unauthorized.error_code(), 1101);
    }

    #[test]
    fn not_configured_is_distinct_from_provider_errors() {
        let missing = AppError::NotConfigured("no row".into());
        let rejected = AppError::Provider(ProviderError::Status {
            status_code: 401,
            raw_body: "token expired".into(),
        });
        assert_ne!(missing.error_code(), rejected.error_code());
        assert_eq!(missing.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(rejected.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn provider_body_is_hidden_from_regular_callers() {
        let err = AppError::Provider(ProviderError::Status {
            status_code: 401,
            raw_body: "secret-provider-body".into(),
        });
        let json = body_json(err.into_response()).await;
        let text = json.to_string();
        assert!(!text.contains("secret-provider-body"));
        assert!(json["error"].get("details").is_none());
    }

    #[tokio::test]
    async fn detailed_error_exposes_provider_body() {
        let err = AppError::Provider(ProviderError::Status {
            status_code: 401,
            raw_body: "secret-provider-body".into(),
        });
        let json = body_json(err.with_details().into_response()).await;
        let details = json["error"]["details"].as_str().unwrap_or_default();
        assert!(details.contains("secret-provider-body"));
    }

    #[test]
    fn anomaly_maps_to_conflict() {
        let err = AppError::from(ReconciliationAnomaly::new(
            TransactionId::new("o1"),
            None,
            AnomalyKind::UnknownWallet {
                wallet: "0x1".into(),
            },
        ));
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.error_code(), 4001);
    }
}
