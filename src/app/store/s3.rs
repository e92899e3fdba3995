//! S3 implementation of [`ObjectStore`]

use std::path::Path;

use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::types::RequestPayer;
use chrono::{DateTime, Utc};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::{ByteRange, ListPage, ObjectHead, ObjectStore, ObjectSummary, StoreConfig};
use crate::app::models::Server;
use crate::errors::{TransportError, TransportResult};

/// Object store backed by the AWS SDK
#[derive(Debug, Clone)]
pub struct S3Store {
    client: aws_sdk_s3::Client,
    config: StoreConfig,
}

impl S3Store {
    /// Build a client from the default AWS credential chain and `config`
    pub async fn new(config: StoreConfig) -> Self {
        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(url) = &config.endpoint_url {
            builder = builder.endpoint_url(url);
        }
        if config.force_path_style {
            builder = builder.force_path_style(true);
        }

        tracing::info!(
            "Created S3 store client (region {}, requester pays: {})",
            config.region,
            config.requester_pays
        );

        Self {
            client: aws_sdk_s3::Client::from_conf(builder.build()),
            config,
        }
    }

    /// Store configuration this client was built with
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn request_payer(&self) -> Option<RequestPayer> {
        self.config
            .requester_pays
            .then_some(RequestPayer::Requester)
    }
}

fn store_error(operation: &'static str, target: &str, err: impl std::error::Error) -> TransportError {
    TransportError::Store {
        operation,
        target: target.to_string(),
        message: DisplayErrorContext(err).to_string(),
    }
}

fn to_chrono(value: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(value.secs(), value.subsec_nanos())
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn list_page(
        &self,
        server: Server,
        prefix: &str,
        continuation: Option<String>,
        max_keys: i32,
    ) -> TransportResult<ListPage> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(self.config.bucket_for(server))
            .prefix(prefix)
            .max_keys(max_keys)
            .set_continuation_token(continuation)
            .set_request_payer(self.request_payer())
            .send()
            .await
            .map_err(|e| store_error("list", prefix, e))?;

        let objects = output
            .contents()
            .iter()
            .filter_map(|object| {
                Some(ObjectSummary {
                    key: object.key()?.to_string(),
                    size: object.size().unwrap_or(0).max(0) as u64,
                    last_modified: object.last_modified().and_then(to_chrono),
                })
            })
            .collect::<Vec<_>>();

        let next_token = if output.is_truncated().unwrap_or(false) {
            output.next_continuation_token().map(str::to_string)
        } else {
            None
        };

        debug!(
            "Listed {} objects under {} (more: {})",
            objects.len(),
            prefix,
            next_token.is_some()
        );
        Ok(ListPage {
            objects,
            next_token,
        })
    }

    async fn head(&self, server: Server, key: &str) -> TransportResult<ObjectHead> {
        let output = self
            .client
            .head_object()
            .bucket(self.config.bucket_for(server))
            .key(key)
            .set_request_payer(self.request_payer())
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().map(|se| se.is_not_found()) == Some(true) {
                    TransportError::ObjectNotFound {
                        key: key.to_string(),
                    }
                } else {
                    store_error("head", key, e)
                }
            })?;

        Ok(ObjectHead {
            size: output.content_length().unwrap_or(0).max(0) as u64,
            content_type: output.content_type().map(str::to_string),
            last_modified: output.last_modified().and_then(to_chrono),
        })
    }

    async fn get_range(
        &self,
        server: Server,
        key: &str,
        range: ByteRange,
    ) -> TransportResult<Vec<u8>> {
        let output = self
            .client
            .get_object()
            .bucket(self.config.bucket_for(server))
            .key(key)
            .range(range.header_value())
            .set_request_payer(self.request_payer())
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().map(|se| se.is_no_such_key()) == Some(true) {
                    TransportError::ObjectNotFound {
                        key: key.to_string(),
                    }
                } else {
                    store_error("get", key, e)
                }
            })?;

        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| store_error("get", key, e))?
            .into_bytes();
        Ok(bytes.to_vec())
    }

    async fn download_to(
        &self,
        server: Server,
        key: &str,
        destination: &Path,
    ) -> TransportResult<u64> {
        let output = self
            .client
            .get_object()
            .bucket(self.config.bucket_for(server))
            .key(key)
            .set_request_payer(self.request_payer())
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().map(|se| se.is_no_such_key()) == Some(true) {
                    TransportError::ObjectNotFound {
                        key: key.to_string(),
                    }
                } else {
                    store_error("get", key, e)
                }
            })?;

        let io_error = |source| TransportError::Io {
            key: key.to_string(),
            source,
        };

        let mut file = File::create(destination).await.map_err(io_error)?;
        let mut body = output.body;
        let mut written = 0u64;
        while let Some(chunk) = body
            .try_next()
            .await
            .map_err(|e| store_error("get", key, e))?
        {
            file.write_all(&chunk).await.map_err(io_error)?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(io_error)?;

        debug!("Downloaded {} ({} bytes) to {}", key, written, destination.display());
        Ok(written)
    }
}
