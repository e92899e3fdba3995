//! In-memory [`ObjectStore`] for tests and offline runs

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{ByteRange, ListPage, ObjectHead, ObjectStore, ObjectSummary};
use crate::app::models::Server;
use crate::errors::{TransportError, TransportResult};

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Vec<u8>,
    last_modified: Option<DateTime<Utc>>,
}

/// Object store holding every object in a sorted map
///
/// Listing pages are capped at `page_size` regardless of the requested
/// `max_keys`, so pagination can be exercised with a handful of objects.
#[derive(Debug)]
pub struct MemoryStore {
    objects: RwLock<BTreeMap<(Server, String), StoredObject>>,
    page_size: usize,
    fail_listing: AtomicBool,
    list_calls: AtomicUsize,
    heads: AtomicUsize,
    downloads: AtomicUsize,
    range_reads: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
            page_size: 1000,
            fail_listing: AtomicBool::new(false),
            list_calls: AtomicUsize::new(0),
            heads: AtomicUsize::new(0),
            downloads: AtomicUsize::new(0),
            range_reads: AtomicUsize::new(0),
        }
    }

    /// Cap listing pages at `page_size` objects
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Add or replace an object
    pub fn insert(&self, server: Server, key: impl Into<String>, bytes: Vec<u8>) {
        if let Ok(mut objects) = self.objects.write() {
            objects.insert(
                (server, key.into()),
                StoredObject {
                    bytes,
                    last_modified: Some(Utc::now()),
                },
            );
        }
    }

    /// Make every subsequent listing fail
    pub fn fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }

    /// Number of listing requests served
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Number of head requests served
    pub fn heads(&self) -> usize {
        self.heads.load(Ordering::SeqCst)
    }

    /// Number of whole-object downloads served
    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    /// Number of ranged reads served
    pub fn range_reads(&self) -> usize {
        self.range_reads.load(Ordering::SeqCst)
    }

    fn object(&self, server: Server, key: &str) -> TransportResult<StoredObject> {
        let objects = self.objects.read().map_err(|_| TransportError::Store {
            operation: "get",
            target: key.to_string(),
            message: "store lock poisoned".to_string(),
        })?;
        objects
            .get(&(server, key.to_string()))
            .cloned()
            .ok_or_else(|| TransportError::ObjectNotFound {
                key: key.to_string(),
            })
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list_page(
        &self,
        server: Server,
        prefix: &str,
        continuation: Option<String>,
        max_keys: i32,
    ) -> TransportResult<ListPage> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(TransportError::Store {
                operation: "list",
                target: prefix.to_string(),
                message: "access denied".to_string(),
            });
        }

        let objects = self.objects.read().map_err(|_| TransportError::Store {
            operation: "list",
            target: prefix.to_string(),
            message: "store lock poisoned".to_string(),
        })?;

        let limit = self.page_size.min(max_keys.max(1) as usize);
        let mut page = Vec::new();
        let mut more = false;
        for ((s, key), object) in objects.iter() {
            if *s != server || !key.starts_with(prefix) {
                continue;
            }
            if let Some(after) = &continuation {
                if key <= after {
                    continue;
                }
            }
            if page.len() == limit {
                more = true;
                break;
            }
            page.push(ObjectSummary {
                key: key.clone(),
                size: object.bytes.len() as u64,
                last_modified: object.last_modified,
            });
        }

        let next_token = if more {
            page.last().map(|o| o.key.clone())
        } else {
            None
        };
        Ok(ListPage {
            objects: page,
            next_token,
        })
    }

    async fn head(&self, server: Server, key: &str) -> TransportResult<ObjectHead> {
        self.heads.fetch_add(1, Ordering::SeqCst);
        let object = self.object(server, key)?;
        Ok(ObjectHead {
            size: object.bytes.len() as u64,
            content_type: Some("application/zip".to_string()),
            last_modified: object.last_modified,
        })
    }

    async fn get_range(
        &self,
        server: Server,
        key: &str,
        range: ByteRange,
    ) -> TransportResult<Vec<u8>> {
        self.range_reads.fetch_add(1, Ordering::SeqCst);
        let object = self.object(server, key)?;
        let len = object.bytes.len() as u64;
        if range.start >= len {
            return Err(TransportError::UnexpectedStatus {
                status: 416,
                endpoint: key.to_string(),
            });
        }
        let end = range.end.min(len - 1);
        Ok(object.bytes[range.start as usize..=end as usize].to_vec())
    }

    async fn download_to(
        &self,
        server: Server,
        key: &str,
        destination: &Path,
    ) -> TransportResult<u64> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        let object = self.object(server, key)?;
        tokio::fs::write(destination, &object.bytes)
            .await
            .map_err(|source| TransportError::Io {
                key: key.to_string(),
                source,
            })?;
        Ok(object.bytes.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test pagination follows continuation tokens without repeating keys
    #[tokio::test]
    async fn test_paginated_listing() {
        let store = MemoryStore::new().with_page_size(2);
        for i in 0..5 {
            store.insert(Server::Biorxiv, format!("p/{i}.meca"), vec![0; i]);
        }
        store.insert(Server::Medrxiv, "p/other.meca", vec![]);

        let mut keys = Vec::new();
        let mut token = None;
        loop {
            let page = store
                .list_page(Server::Biorxiv, "p/", token, 1000)
                .await
                .unwrap();
            keys.extend(page.objects.into_iter().map(|o| o.key));
            token = page.next_token;
            if token.is_none() {
                break;
            }
        }
        assert_eq!(keys.len(), 5);
        assert_eq!(store.list_calls(), 3);
    }

    /// Test ranged reads clamp to the object end
    #[tokio::test]
    async fn test_range_clamps() {
        let store = MemoryStore::new();
        store.insert(Server::Biorxiv, "k", (0u8..10).collect());
        let bytes = store
            .get_range(Server::Biorxiv, "k", ByteRange::new(8, 100))
            .await
            .unwrap();
        assert_eq!(bytes, vec![8, 9]);
        assert!(store
            .get_range(Server::Biorxiv, "k", ByteRange::new(10, 1))
            .await
            .is_err());
    }

    /// Test missing objects map to ObjectNotFound
    #[tokio::test]
    async fn test_missing_object() {
        let store = MemoryStore::new();
        let err = store.head(Server::Biorxiv, "nope").await.unwrap_err();
        assert!(matches!(err, TransportError::ObjectNotFound { .. }));
    }
}
