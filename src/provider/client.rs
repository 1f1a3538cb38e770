//! HTTP client for the settlement provider's order-query endpoint.
//!
//! The client performs exactly one request per call. Retries belong to the
//! reconciler.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{ACCEPT, CACHE_CONTROL};

use super::error::ProviderError;
use super::models::{OrderFilter, OrderPage};
use crate::credential::AccessToken;

/// Header carrying the provider credential.
pub const ACCESS_TOKEN_HEADER: &str = "access-token";

/// Source of provider order pages.
#[async_trait]
pub trait OrderSource: Send + Sync + fmt::Debug {
    /// Fetches one page of orders.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] for non-success statuses, transport
    /// failures, timeouts, and bodies that do not parse.
    async fn fetch_orders(
        &self,
        filter: &OrderFilter,
        token: &AccessToken,
    ) -> Result<OrderPage, ProviderError>;
}

/// `reqwest`-backed provider client.
#[derive(Debug, Clone)]
pub struct ProviderClient {
    http: Client,
    base_url: String,
}

impl ProviderClient {
    /// Creates a client for `base_url` with a fixed request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Transport`] if the HTTP client cannot be
    /// built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    /// Base URL the client targets.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn orders_url(&self) -> String {
        format!("{}/orders", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl OrderSource for ProviderClient {
    async fn fetch_orders(
        &self,
        filter: &OrderFilter,
        token: &AccessToken,
    ) -> Result<OrderPage, ProviderError> {
        let response = self
            .http
            .get(self.orders_url())
            .query(&filter.query_pairs())
            .header(ACCESS_TOKEN_HEADER, token.as_str())
            .header(ACCEPT, "application/json")
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            tracing::debug!(
                status_code = status.as_u16(),
                wallet = %filter.wallet_address,
                "provider returned non-success status"
            );
            return Err(ProviderError::Status {
                status_code: status.as_u16(),
                raw_body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        serde_json::from_slice::<OrderPage>(&body)
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use mockito::Matcher;

    use crate::provider::StatusFilter;

    fn token() -> AccessToken {
        AccessToken::new("tok-123", None)
    }

    fn client(url: &str) -> ProviderClient {
        let Ok(client) = ProviderClient::new(url, Duration::from_secs(2)) else {
            panic!("client should build");
        };
        client
    }

    #[tokio::test]
    async fn sends_filter_and_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/orders")
            .match_header(ACCESS_TOKEN_HEADER, "tok-123")
            .match_header(CACHE_CONTROL, "no-cache")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("limit".into(), "100".into()),
                Matcher::UrlEncoded("skip".into(), "0".into()),
                Matcher::UrlEncoded("filter[productsAvailed]".into(), r#"["BUY"]"#.into()),
                Matcher::UrlEncoded("filter[status]".into(), "COMPLETED".into()),
                Matcher::UrlEncoded("filter[sortOrder]".into(), "desc".into()),
                Matcher::UrlEncoded("filter[walletAddress]".into(), "0xabc".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"data":[{"id":"o1","status":"COMPLETED"}]}"#)
            .create_async()
            .await;

        let page = client(&server.url())
            .fetch_orders(&OrderFilter::for_wallet("0xabc"), &token())
            .await;

        mock.assert_async().await;
        let Ok(page) = page else {
            panic!("expected a page");
        };
        assert_eq!(page.data.len(), 1);
    }

    #[tokio::test]
    async fn non_success_status_carries_raw_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/orders")
            .match_query(Matcher::Any)
            .with_status(401)
            .with_body("token expired")
            .create_async()
            .await;

        let result = client(&server.url())
            .fetch_orders(
                &OrderFilter::for_wallet("0xabc").with_status(StatusFilter::Any),
                &token(),
            )
            .await;

        assert_eq!(
            result,
            Err(ProviderError::Status {
                status_code: 401,
                raw_body: "token expired".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn unparsable_body_is_malformed() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/orders")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"orders": "nope"}"#)
            .create_async()
            .await;

        let result = client(&server.url())
            .fetch_orders(&OrderFilter::for_wallet("0xabc"), &token())
            .await;

        assert!(matches!(result, Err(ProviderError::MalformedResponse(_))));
    }

    #[test]
    fn orders_url_tolerates_trailing_slash() {
        let client = client("https://provider.test/api/v2/");
        assert_eq!(client.orders_url(), "https://provider.test/api/v2/orders");
    }
}
