//! Axum extractors for the identity forwarded by the session layer and for
//! query strings rendered as coded errors.

use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use serde::de::DeserializeOwned;

use crate::domain::{Identity, Role, UserId};
use crate::error::AppError;

/// Header carrying the authenticated user id.
pub const IDENTITY_ID_HEADER: &str = "x-identity-id";

/// Header carrying the role (`user` or `admin`). Defaults to `user`.
pub const IDENTITY_ROLE_HEADER: &str = "x-identity-role";

/// The authenticated caller of a request.
///
/// Extraction rejects a missing identity or a malformed role with
/// [`AppError::Unauthorized`]. Handlers list it before any other extractor
/// so anonymous requests fail before their parameters are looked at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller(pub Identity);

impl Caller {
    /// Identity in the form the service layer takes.
    #[must_use]
    pub const fn identity(&self) -> Option<&Identity> {
        Some(&self.0)
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = header(parts, IDENTITY_ID_HEADER).ok_or(AppError::Unauthorized)?;
        let role = match header(parts, IDENTITY_ROLE_HEADER) {
            Some(raw) => raw.parse::<Role>().map_err(|_| AppError::Unauthorized)?,
            None => Role::User,
        };
        Ok(Self(Identity {
            id: UserId::new(id),
            role,
        }))
    }
}

/// Query-string extractor whose rejection is [`AppError::InvalidRequest`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiQuery<T>(pub T);

impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Query::<T>::from_request_parts(parts, state)
            .await
            .map(|Query(value)| Self(value))
            .map_err(|rejection| AppError::InvalidRequest(rejection.body_text()))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(request: Request<()>) -> Result<Caller, AppError> {
        let (mut parts, ()) = request.into_parts();
        Caller::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn missing_identity_is_unauthorized() {
        let Ok(request) = Request::builder().body(()) else {
            panic!("request should build");
        };
        assert!(matches!(extract(request).await, Err(AppError::Unauthorized)));

        let Ok(blank) = Request::builder()
            .header(IDENTITY_ID_HEADER, "  ")
            .header(IDENTITY_ROLE_HEADER, "admin")
            .body(())
        else {
            panic!("request should build");
        };
        assert!(matches!(extract(blank).await, Err(AppError::Unauthorized)));
    }

    #[tokio::test]
    async fn role_defaults_to_user() {
        let Ok(request) = Request::builder()
            .header(IDENTITY_ID_HEADER, "user-1")
            .body(())
        else {
            panic!("request should build");
        };
        let Ok(caller) = extract(request).await else {
            panic!("extraction should succeed");
        };
        assert_eq!(caller.identity(), Some(&Identity::user("user-1")));
    }

    #[tokio::test]
    async fn admin_role_is_recognised() {
        let Ok(request) = Request::builder()
            .header(IDENTITY_ID_HEADER, "ops")
            .header(IDENTITY_ROLE_HEADER, "ADMIN")
            .body(())
        else {
            panic!("request should build");
        };
        let Ok(caller) = extract(request).await else {
            panic!("extraction should succeed");
        };
        assert!(caller.identity().is_some_and(Identity::is_elevated));
    }

    #[tokio::test]
    async fn unknown_role_is_unauthorized() {
        let Ok(request) = Request::builder()
            .header(IDENTITY_ID_HEADER, "ops")
            .header(IDENTITY_ROLE_HEADER, "root")
            .body(())
        else {
            panic!("request should build");
        };
        assert!(matches!(
            extract(request).await,
            Err(AppError::Unauthorized)
        ));
    }

    #[derive(Debug, serde::Deserialize)]
    struct Paging {
        page: Option<u32>,
    }

    #[tokio::test]
    async fn malformed_query_is_an_invalid_request() {
        let Ok(request) = Request::builder().uri("/x?page=abc").body(()) else {
            panic!("request should build");
        };
        let (mut parts, ()) = request.into_parts();
        let result = ApiQuery::<Paging>::from_request_parts(&mut parts, &()).await;
        let Err(err) = result else {
            panic!("page=abc should be rejected");
        };
        assert_eq!(err.error_code(), 1001);

        let Ok(request) = Request::builder().uri("/x?page=2").body(()) else {
            panic!("request should build");
        };
        let (mut parts, ()) = request.into_parts();
        let Ok(ApiQuery(paging)) = ApiQuery::<Paging>::from_request_parts(&mut parts, &()).await
        else {
            panic!("page=2 should parse");
        };
        assert_eq!(paging.page, Some(2));
    }
}
