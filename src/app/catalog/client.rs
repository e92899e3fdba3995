//! HTTP implementation of [`Catalog`]

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use super::config::ClientConfig;
use super::http::HttpHandler;
use super::types::{CatalogPage, Registration, WorkRecord};
use super::Catalog;
use crate::app::models::RegistrationPayload;
use crate::constants::catalog;
use crate::errors::{TransportError, TransportResult};

/// Catalog service client
#[derive(Debug)]
pub struct CatalogClient {
    http_handler: HttpHandler,
    base_url: Url,
}

impl CatalogClient {
    /// Creates a client for the catalog at `config.base_url`
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if the base URL is invalid or the HTTP client
    /// cannot be built
    pub fn new(config: &ClientConfig) -> TransportResult<Self> {
        let base_url =
            Url::parse(&config.base_url).map_err(|e| TransportError::InvalidUrl {
                url: config.base_url.clone(),
                error: e.to_string(),
            })?;
        if base_url.cannot_be_a_base() {
            return Err(TransportError::InvalidUrl {
                url: config.base_url.clone(),
                error: "URL cannot be used as an API root".to_string(),
            });
        }

        let client = config.build_http_client()?;
        tracing::info!("Created catalog client for {}", base_url);
        Ok(Self {
            http_handler: HttpHandler::new(client, config),
            base_url,
        })
    }

    /// Base URL of the catalog API
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Append path segments to the base URL, percent-encoding each one
    fn endpoint(&self, segments: &[&str]) -> TransportResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| TransportError::InvalidUrl {
                url: self.base_url.to_string(),
                error: "URL cannot be used as an API root".to_string(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn decode<T: DeserializeOwned>(response: Response, endpoint: &str) -> TransportResult<T> {
        response
            .json::<T>()
            .await
            .map_err(|e| TransportError::MalformedResponse {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })
    }

    fn unexpected(status: StatusCode, endpoint: &str) -> TransportError {
        TransportError::UnexpectedStatus {
            status: status.as_u16(),
            endpoint: endpoint.to_string(),
        }
    }
}

#[async_trait]
impl Catalog for CatalogClient {
    async fn list_registered(
        &self,
        period: &str,
        limit: u32,
        offset: u64,
    ) -> TransportResult<CatalogPage> {
        let segments: Vec<&str> = catalog::BUCKET_LIST_PATH.split('/').collect();
        let mut url = self.endpoint(&segments)?;
        url.query_pairs_mut()
            .append_pair("month", period)
            .append_pair("limit", &limit.to_string())
            .append_pair("offset", &offset.to_string());

        let endpoint = url.path().to_string();
        let response = self
            .http_handler
            .execute(&endpoint, |client| client.get(url.as_str()))
            .await?;

        match response.status() {
            StatusCode::OK => Self::decode(response, &endpoint).await,
            status => Err(Self::unexpected(status, &endpoint)),
        }
    }

    async fn lookup_by_key(&self, s3_key: &str) -> TransportResult<Option<WorkRecord>> {
        let mut url = self.endpoint(&[catalog::WORKS_PATH])?;
        url.query_pairs_mut().append_pair("s3Key", s3_key);

        let endpoint = url.path().to_string();
        let response = self
            .http_handler
            .execute(&endpoint, |client| client.get(url.as_str()))
            .await?;

        match response.status() {
            StatusCode::OK => Self::decode(response, &endpoint).await.map(Some),
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(Self::unexpected(status, &endpoint)),
        }
    }

    async fn register(&self, payload: &RegistrationPayload) -> TransportResult<Registration> {
        let url = self.endpoint(&[catalog::WORKS_PATH])?;
        let endpoint = url.path().to_string();
        let response = self
            .http_handler
            .execute(&endpoint, |client| client.post(url.as_str()).json(payload))
            .await?;

        match response.status() {
            StatusCode::CREATED | StatusCode::OK => {
                // The record echo is informational; an empty body is fine
                let record = response.json::<WorkRecord>().await.ok();
                tracing::debug!("Registered {} v{}", payload.doi, payload.version);
                Ok(Registration::Created(record))
            }
            StatusCode::CONFLICT => {
                tracing::debug!(
                    "{} v{} already registered",
                    payload.doi,
                    payload.version
                );
                Ok(Registration::AlreadyExists)
            }
            status => Err(Self::unexpected(status, &endpoint)),
        }
    }

    async fn fetch_work(&self, doi: &str) -> TransportResult<Option<WorkRecord>> {
        let (prefix, suffix) = doi
            .trim()
            .split_once('/')
            .filter(|(p, s)| !p.is_empty() && !s.is_empty())
            .ok_or_else(|| TransportError::InvalidUrl {
                url: doi.to_string(),
                error: "DOI must have the form <prefix>/<suffix>".to_string(),
            })?;

        let url = self.endpoint(&[catalog::WORKS_PATH, prefix, suffix])?;
        let endpoint = url.path().to_string();
        let response = self
            .http_handler
            .execute(&endpoint, |client| client.get(url.as_str()))
            .await?;

        match response.status() {
            StatusCode::OK => Self::decode(response, &endpoint).await.map(Some),
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(Self::unexpected(status, &endpoint)),
        }
    }
}
