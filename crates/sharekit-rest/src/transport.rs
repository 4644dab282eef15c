//! REST adapter for the batch transport port
//!
//! Runs of requests go out as `$batch` posts of at most `max_batch_size`
//! parts. Binary uploads cannot be embedded in a batch and are sent on their
//! own, in order, between the chunks around them.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use sharekit_core::config::{Config, MAX_BATCH_SIZE};
use sharekit_core::ports::{IBatchTransport, TransportFault, TransportRequest, TransportResponse};
use tracing::{debug, warn};

use crate::client::SharePointClient;
use crate::multipart::{self, PartResponse};
use crate::rate_limit::{self, AdaptiveRateLimiter, RateLimitConfig};
use crate::translate::{self, HttpCall};
use crate::RestError;

type Outcome = Result<TransportResponse, TransportFault>;

/// [`IBatchTransport`] over the SharePoint REST API
#[derive(Debug)]
pub struct RestTransport {
    client: SharePointClient,
    use_batch_endpoint: bool,
    max_batch_size: usize,
}

impl RestTransport {
    pub fn new(client: SharePointClient) -> Self {
        Self {
            client,
            use_batch_endpoint: true,
            max_batch_size: MAX_BATCH_SIZE,
        }
    }

    /// Builds the transport described by `config`
    ///
    /// # Errors
    /// [`RestError::Configuration`] when the site URL or the access token is
    /// missing, or the HTTP client cannot be built.
    pub fn from_config(config: &Config) -> Result<Self, RestError> {
        if config.site.url.trim().is_empty() {
            return Err(RestError::Configuration("site.url is not set".to_string()));
        }
        let token = config.auth.resolve_access_token().ok_or_else(|| {
            RestError::Configuration(format!(
                "no access token in auth.access_token or ${}",
                config.auth.token_env
            ))
        })?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.transport.timeout_secs))
            .user_agent(config.transport.user_agent.clone())
            .build()
            .map_err(|e| RestError::Configuration(format!("cannot build http client: {e}")))?;
        let limiter = AdaptiveRateLimiter::new(RateLimitConfig::from(&config.rate_limiting));
        let client = SharePointClient::with_http_client(http, &config.site.url, token)?
            .with_rate_limiter(Arc::new(limiter));

        Ok(Self::new(client)
            .with_batch_endpoint(config.transport.use_batch_endpoint)
            .with_max_batch_size(config.transport.max_batch_size))
    }

    pub fn with_batch_endpoint(mut self, enabled: bool) -> Self {
        self.use_batch_endpoint = enabled;
        self
    }

    /// Caps the parts per `$batch` post, clamped to `1..=MAX_BATCH_SIZE`
    pub fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size.clamp(1, MAX_BATCH_SIZE);
        self
    }

    pub fn client(&self) -> &SharePointClient {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut SharePointClient {
        &mut self.client
    }

    /// Sends one chunk as a `$batch` post
    async fn post_batch(&self, requests: &[TransportRequest], calls: &[HttpCall]) -> Vec<Outcome> {
        let encoded = match multipart::encode(calls) {
            Ok(encoded) => encoded,
            Err(e) => return vec![Err(e.into())],
        };
        debug!(parts = calls.len(), boundary = %encoded.boundary, "Posting $batch");

        let content_type = encoded.content_type();
        let response = self
            .client
            .execute_with_retry(rate_limit::BATCH, || {
                self.client
                    .request(Method::POST, "_api/$batch")
                    .header(CONTENT_TYPE, content_type.as_str())
                    .body(encoded.body.clone())
            })
            .await;
        let parts = match read_batch_response(response).await {
            Ok(parts) => parts,
            Err(e) => {
                warn!(error = %e, "$batch post failed");
                return vec![Err(e.into())];
            }
        };
        if parts.len() != requests.len() {
            warn!(
                sent = requests.len(),
                received = parts.len(),
                "$batch response part count differs"
            );
        }

        let mut results = Vec::with_capacity(parts.len());
        for (request, part) in requests.iter().zip(parts) {
            let outcome = part_outcome(request, part);
            let failed = outcome.is_err();
            results.push(outcome);
            if failed {
                break;
            }
        }
        results
    }
}

async fn read_batch_response(
    response: Result<reqwest::Response, RestError>,
) -> Result<Vec<PartResponse>, RestError> {
    let response = response?;
    let status = response.status();
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let body = response.bytes().await?;
    if !status.is_success() {
        return Err(RestError::from_status(
            status.as_u16(),
            translate::error_message(&body),
        ));
    }
    multipart::decode(&content_type, &body)
}

fn part_outcome(request: &TransportRequest, part: PartResponse) -> Outcome {
    if !part.is_success() {
        let message = translate::error_message(&part.body);
        return Err(RestError::from_status(part.status, message).into());
    }
    let body = translate::parse_body(&part.body)?;
    Ok(TransportResponse::new(request.correlation_id, part.status, body))
}

#[async_trait::async_trait]
impl IBatchTransport for RestTransport {
    async fn send(&self, request: &TransportRequest) -> Result<TransportResponse, TransportFault> {
        let call = translate::to_http(self.client.site(), request)?;
        let (status, body) = self.client.send_call(&call).await?;
        Ok(TransportResponse::new(request.correlation_id, status, body))
    }

    async fn send_batch(&self, requests: &[TransportRequest]) -> Vec<Outcome> {
        if !self.use_batch_endpoint || requests.len() <= 1 {
            let mut results = Vec::with_capacity(requests.len());
            for request in requests {
                let outcome = self.send(request).await;
                let failed = outcome.is_err();
                results.push(outcome);
                if failed {
                    break;
                }
            }
            return results;
        }

        let mut results = Vec::with_capacity(requests.len());
        let mut start = 0;
        while start < requests.len() {
            if requests[start].is_binary() {
                let outcome = self.send(&requests[start]).await;
                let failed = outcome.is_err();
                results.push(outcome);
                if failed {
                    return results;
                }
                start += 1;
                continue;
            }

            let end = requests[start..]
                .iter()
                .take(self.max_batch_size)
                .position(TransportRequest::is_binary)
                .map_or_else(
                    || (start + self.max_batch_size).min(requests.len()),
                    |offset| start + offset,
                );
            let chunk = &requests[start..end];

            let calls: Result<Vec<_>, _> = chunk
                .iter()
                .map(|r| translate::to_http(self.client.site(), r))
                .collect();
            let chunk_results = match calls {
                Ok(calls) if calls.len() == 1 => vec![self.send(&chunk[0]).await],
                Ok(calls) => self.post_batch(chunk, &calls).await,
                Err(e) => vec![Err(e.into())],
            };

            let complete = chunk_results.len() == chunk.len()
                && chunk_results.iter().all(Result::is_ok);
            results.extend(chunk_results);
            if !complete {
                return results;
            }
            start = end;
        }
        results
    }
}
