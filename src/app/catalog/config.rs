//! Catalog HTTP client configuration and building logic

use std::time::Duration;

use reqwest::Client;

use crate::constants::{catalog, http, limits};
use crate::errors::{TransportError, TransportResult};

/// Configuration for the catalog HTTP client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Catalog API root, e.g. `https://catalog.example.org/api/v1`
    pub base_url: String,
    /// Bearer token sent with every request
    pub api_key: Option<String>,
    /// TCP nodelay (disable Nagle's algorithm)
    pub tcp_nodelay: bool,
    /// Connection pool idle timeout
    pub pool_idle_timeout: Option<Duration>,
    /// Maximum number of idle connections per host
    pub pool_max_per_host: usize,
    /// Request timeout
    pub request_timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
    /// Rate limit (requests per second)
    pub rate_limit_rps: u32,
    /// Retries on connect errors, 429 and 5xx
    pub max_retries: u32,
    /// First backoff delay; doubles on every retry
    pub retry_base_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: catalog::DEFAULT_BASE_URL.to_string(),
            api_key: None,
            tcp_nodelay: true,
            pool_idle_timeout: Some(http::POOL_IDLE_TIMEOUT),
            pool_max_per_host: http::POOL_MAX_PER_HOST,
            request_timeout: http::DEFAULT_TIMEOUT,
            connect_timeout: http::CONNECT_TIMEOUT,
            rate_limit_rps: limits::DEFAULT_RATE_LIMIT_RPS,
            max_retries: limits::MAX_RETRIES,
            retry_base_delay: Duration::from_millis(limits::RETRY_BASE_DELAY_MS),
        }
    }
}

impl ClientConfig {
    /// Builds the HTTP client with the specified configuration
    pub fn build_http_client(&self) -> TransportResult<Client> {
        let mut client_builder = Client::builder()
            .timeout(self.request_timeout)
            .connect_timeout(self.connect_timeout)
            .user_agent(http::USER_AGENT)
            .tcp_nodelay(self.tcp_nodelay)
            .pool_max_idle_per_host(self.pool_max_per_host);

        if let Some(idle_timeout) = self.pool_idle_timeout {
            client_builder = client_builder.pool_idle_timeout(idle_timeout);
        }

        client_builder.build().map_err(TransportError::Http)
    }
}
