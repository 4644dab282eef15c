//! SharePoint REST client
//!
//! Wraps `reqwest::Client` with the site URL, bearer authentication and the
//! retry loop for throttled answers.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use reqwest::Method;
//! use sharekit_rest::client::SharePointClient;
//!
//! # async fn example() -> Result<(), sharekit_rest::RestError> {
//! let client = SharePointClient::new("https://contoso.sharepoint.com/sites/dev", "token")?;
//! let response = client
//!     .execute_with_retry("read", || client.request(Method::GET, "_api/web"))
//!     .await?;
//! println!("{}", response.status());
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use tracing::{debug, info, warn};
use url::Url;

use crate::rate_limit::{parse_retry_after, AdaptiveRateLimiter};
use crate::translate::{self, HttpBody, HttpCall, ACCEPT_JSON};
use crate::RestError;

/// Delay used when a throttled answer has no `Retry-After`
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(30);

/// Retries for 429/503 when no rate limiter is configured
const DEFAULT_MAX_RETRIES: u32 = 5;

/// Authenticated HTTP client bound to one site
pub struct SharePointClient {
    client: Client,
    site: Url,
    access_token: String,
    rate_limiter: Option<Arc<AdaptiveRateLimiter>>,
}

impl std::fmt::Debug for SharePointClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharePointClient")
            .field("site", &self.site.as_str())
            .field("rate_limiter", &self.rate_limiter)
            .finish_non_exhaustive()
    }
}

impl SharePointClient {
    /// Creates a client for `site_url`
    ///
    /// # Errors
    /// [`RestError::Configuration`] when the URL does not parse.
    pub fn new(site_url: &str, access_token: impl Into<String>) -> Result<Self, RestError> {
        Self::with_http_client(Client::new(), site_url, access_token)
    }

    /// Creates a client on a preconfigured `reqwest::Client` (timeouts,
    /// user agent, proxies)
    pub fn with_http_client(
        client: Client,
        site_url: &str,
        access_token: impl Into<String>,
    ) -> Result<Self, RestError> {
        let site = Url::parse(site_url.trim_end_matches('/'))
            .map_err(|e| RestError::Configuration(format!("invalid site url '{site_url}': {e}")))?;
        Ok(Self {
            client,
            site,
            access_token: access_token.into(),
            rate_limiter: None,
        })
    }

    pub fn with_rate_limiter(mut self, limiter: Arc<AdaptiveRateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    pub fn rate_limiter(&self) -> Option<&Arc<AdaptiveRateLimiter>> {
        self.rate_limiter.as_ref()
    }

    /// Replaces the access token (after the caller refreshed it)
    pub fn set_access_token(&mut self, token: impl Into<String>) {
        self.access_token = token.into();
        debug!("Updated SharePointClient access token");
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn site(&self) -> &Url {
        &self.site
    }

    /// Authenticated request for a site-relative path
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!(
            "{}/{}",
            self.site.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        self.authorize(self.client.request(method, url))
    }

    /// Authenticated request for a translated call
    pub fn request_for(&self, call: &HttpCall) -> RequestBuilder {
        let mut builder = self.authorize(self.client.request(call.method.clone(), call.url.clone()));
        for (name, value) in &call.headers {
            builder = builder.header(*name, *value);
        }
        if let Some(content_type) = call.content_type() {
            builder = builder.header(CONTENT_TYPE, content_type);
        }
        match &call.body {
            HttpBody::Empty => builder,
            HttpBody::Json(value) => builder.body(value.to_string()),
            HttpBody::Binary(bytes) => builder.body(bytes.clone()),
        }
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .bearer_auth(&self.access_token)
            .header(ACCEPT, ACCEPT_JSON)
    }

    /// Sends a request, waiting out 429/503 answers
    ///
    /// `build` is called once per attempt. With a rate limiter a token for
    /// `category` is taken before each attempt and the limiter is told about
    /// throttles and successes.
    ///
    /// # Errors
    /// [`RestError::Throttled`] (429) or [`RestError::ServerError`] (503)
    /// once retries are exhausted, [`RestError::Network`] when the request
    /// cannot be sent. Other error
    /// statuses are returned as responses for the caller to map.
    pub async fn execute_with_retry<F>(&self, category: &str, build: F) -> Result<Response, RestError>
    where
        F: Fn() -> RequestBuilder,
    {
        let (max_retries, default_retry_after) = self
            .rate_limiter
            .as_ref()
            .map(|rl| (rl.max_retries(), rl.default_retry_after()))
            .unwrap_or((DEFAULT_MAX_RETRIES, DEFAULT_RETRY_AFTER));

        let mut attempt = 0;
        loop {
            if let Some(limiter) = &self.rate_limiter {
                limiter.acquire(category).await;
            }

            let response = build().send().await?;
            let status = response.status();
            if status != StatusCode::TOO_MANY_REQUESTS && status != StatusCode::SERVICE_UNAVAILABLE {
                if let Some(limiter) = &self.rate_limiter {
                    limiter.on_success(category);
                }
                if attempt > 0 {
                    info!(category, attempt, "Request succeeded after retry");
                }
                return Ok(response);
            }

            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .map(|v| parse_retry_after(v, default_retry_after))
                .unwrap_or(default_retry_after);
            if let Some(limiter) = &self.rate_limiter {
                limiter.on_throttle(category);
            }

            if attempt >= max_retries {
                warn!(category, attempts = attempt + 1, %status, "Retry limit exhausted");
                if status == StatusCode::SERVICE_UNAVAILABLE {
                    return Err(RestError::ServerError {
                        status: status.as_u16(),
                        message: "service unavailable".to_string(),
                    });
                }
                return Err(RestError::Throttled { retry_after });
            }
            info!(
                category,
                attempt,
                %status,
                retry_after_ms = retry_after.as_millis(),
                "Throttled, backing off"
            );
            tokio::time::sleep(retry_after).await;
            attempt += 1;
        }
    }

    /// Sends one translated call and returns the parsed body
    ///
    /// # Errors
    /// Error statuses map through [`RestError::from_status`] with the
    /// service's message.
    pub async fn send_call(&self, call: &HttpCall) -> Result<(u16, sharekit_core::domain::PropertyBag), RestError> {
        debug!(method = %call.method, url = %call.url, "Sending request");
        let response = self
            .execute_with_retry(call.category(), || self.request_for(call))
            .await?;
        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            return Err(RestError::from_status(
                status.as_u16(),
                translate::error_message(&body),
            ));
        }
        Ok((status.as_u16(), translate::parse_body(&body)?))
    }
}
