//! Core HTTP operations with rate limiting and retry logic
//!
//! Every catalog request goes through [`HttpHandler::execute`], which waits on
//! a shared rate limiter and retries connect failures, timeouts, 429 and 5xx
//! answers with jittered exponential backoff. Any other status is handed back
//! to the caller to interpret.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::{clock::DefaultClock, state::InMemoryState, Jitter, Quota, RateLimiter};
use reqwest::{Client, RequestBuilder, Response, StatusCode};

use super::config::ClientConfig;
use crate::constants::limits;
use crate::errors::{TransportError, TransportResult};

type DirectRateLimiter = RateLimiter<governor::state::NotKeyed, InMemoryState, DefaultClock>;

/// HTTP operations handler with resilience patterns
#[derive(Debug)]
pub struct HttpHandler {
    client: Client,
    rate_limiter: DirectRateLimiter,
    api_key: Option<String>,
    max_retries: u32,
    retry_base_delay: Duration,
}

impl HttpHandler {
    /// Creates a handler around `client` using the limits in `config`
    pub fn new(client: Client, config: &ClientConfig) -> Self {
        Self {
            client,
            rate_limiter: Self::build_rate_limiter(config.rate_limit_rps),
            api_key: config.api_key.clone(),
            max_retries: config.max_retries,
            retry_base_delay: config.retry_base_delay,
        }
    }

    fn build_rate_limiter(rate_limit_rps: u32) -> DirectRateLimiter {
        let rate = NonZeroU32::new(rate_limit_rps).unwrap_or_else(|| {
            tracing::warn!("Rate limit of 0 requests/s is not usable, using 1");
            NonZeroU32::MIN
        });
        RateLimiter::direct(Quota::per_second(rate))
    }

    /// Delay before retry number `attempt` (1-based), with up to 10% jitter
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self
            .retry_base_delay
            .saturating_mul(2_u32.saturating_pow(attempt.saturating_sub(1)));
        let jitter = base.mul_f64(fastrand::f64() * limits::BACKOFF_JITTER_FACTOR);
        base + jitter
    }

    /// Sends the request produced by `build`, retrying transient failures
    ///
    /// `build` is called once per attempt so the request body can be rebuilt.
    /// The bearer token, if configured, is attached here.
    pub async fn execute<F>(&self, endpoint: &str, build: F) -> TransportResult<Response>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        self.rate_limiter
            .until_ready_with_jitter(Jitter::up_to(Duration::from_millis(50)))
            .await;

        let mut retries = 0;
        loop {
            let mut request = build(&self.client);
            if let Some(key) = &self.api_key {
                request = request.bearer_auth(key);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    let retryable =
                        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
                    if !retryable {
                        tracing::debug!("{} answered {}", endpoint, status);
                        return Ok(response);
                    }

                    if retries < self.max_retries {
                        retries += 1;
                        let delay = self.backoff_delay(retries);
                        tracing::warn!(
                            "Catalog answered {} for {} (attempt {}/{}). Backing off for {}ms",
                            status,
                            endpoint,
                            retries,
                            self.max_retries,
                            delay.as_millis()
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    return Err(if status == StatusCode::TOO_MANY_REQUESTS {
                        TransportError::RateLimitExceeded
                    } else {
                        TransportError::UnexpectedStatus {
                            status: status.as_u16(),
                            endpoint: endpoint.to_string(),
                        }
                    });
                }
                Err(e) if e.is_connect() || e.is_timeout() => {
                    if retries < self.max_retries {
                        retries += 1;
                        let delay = self.backoff_delay(retries);
                        tracing::warn!(
                            "Request to {} failed (attempt {}/{}): {}. Retrying in {}ms",
                            endpoint,
                            retries,
                            self.max_retries,
                            e,
                            delay.as_millis()
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    tracing::error!(
                        "Request to {} failed after {} retries: {}",
                        endpoint,
                        self.max_retries,
                        e
                    );
                    return Err(TransportError::MaxRetriesExceeded {
                        max_retries: self.max_retries,
                        endpoint: endpoint.to_string(),
                    });
                }
                Err(e) => return Err(TransportError::Http(e)),
            }
        }
    }

    /// Get a reference to the underlying HTTP client
    pub fn client(&self) -> &Client {
        &self.client
    }
}
