//! In-memory [`Catalog`] for tests and dry runs

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::types::{CatalogFile, CatalogPage, Pagination, Registration, WorkRecord};
use super::Catalog;
use crate::app::models::RegistrationPayload;
use crate::errors::{TransportError, TransportResult};

/// Catalog keeping records in a map keyed by `(doi, version)`
///
/// Mirrors the uniqueness contract of the real service: registering an
/// existing pair answers [`Registration::AlreadyExists`].
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    works: Mutex<BTreeMap<(String, u32), WorkRecord>>,
    fail_bulk_listing: AtomicBool,
    fail_lookups: AtomicBool,
    fail_registration: AtomicBool,
    registrations: AtomicUsize,
    conflicts: AtomicUsize,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an existing registration
    pub fn seed(&self, doi: &str, version: u32, batch: &str, s3_key: &str) {
        let record = WorkRecord {
            doi: doi.to_string(),
            version,
            s3_key: Some(s3_key.to_string()),
            batch: Some(batch.to_string()),
            server: None,
            received_date: None,
            accepted_date: None,
            file_size: None,
            title: None,
        };
        if let Ok(mut works) = self.works.lock() {
            works.insert((doi.to_string(), version), record);
        }
    }

    /// Make the period listing fail, forcing the per-key fallback
    pub fn fail_bulk_listing(&self, fail: bool) {
        self.fail_bulk_listing.store(fail, Ordering::SeqCst);
    }

    /// Make per-key lookups fail with a 500
    pub fn fail_lookups(&self, fail: bool) {
        self.fail_lookups.store(fail, Ordering::SeqCst);
    }

    /// Make registrations fail with a 500
    pub fn fail_registration(&self, fail: bool) {
        self.fail_registration.store(fail, Ordering::SeqCst);
    }

    /// Number of successful (201) registrations
    pub fn registrations(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }

    /// Number of registrations answered with a conflict
    pub fn conflicts(&self) -> usize {
        self.conflicts.load(Ordering::SeqCst)
    }

    /// Snapshot of all records
    pub fn records(&self) -> Vec<WorkRecord> {
        self.works
            .lock()
            .map(|works| works.values().cloned().collect())
            .unwrap_or_default()
    }

    fn lock_error(endpoint: &str) -> TransportError {
        TransportError::UnexpectedStatus {
            status: 500,
            endpoint: endpoint.to_string(),
        }
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn list_registered(
        &self,
        period: &str,
        limit: u32,
        offset: u64,
    ) -> TransportResult<CatalogPage> {
        if self.fail_bulk_listing.load(Ordering::SeqCst) {
            return Err(TransportError::UnexpectedStatus {
                status: 502,
                endpoint: "/bucket/list".to_string(),
            });
        }

        let works = self.works.lock().map_err(|_| Self::lock_error("/bucket/list"))?;
        let mut keys: Vec<CatalogFile> = works
            .values()
            .filter(|record| record.batch.as_deref() == Some(period))
            .filter_map(|record| {
                Some(CatalogFile {
                    s3_key: record.s3_key.clone()?,
                    doi: Some(record.doi.clone()),
                    version: Some(record.version),
                })
            })
            .collect();
        keys.sort_by(|a, b| a.s3_key.cmp(&b.s3_key));

        let total = keys.len() as u64;
        let files: Vec<CatalogFile> = keys
            .into_iter()
            .skip(offset as usize)
            .take(limit.max(1) as usize)
            .collect();
        let next = offset + files.len() as u64;
        let has_more = next < total;

        Ok(CatalogPage {
            files,
            pagination: Pagination {
                total,
                limit,
                offset,
                has_more,
                next_offset: has_more.then_some(next),
            },
        })
    }

    async fn lookup_by_key(&self, s3_key: &str) -> TransportResult<Option<WorkRecord>> {
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(Self::lock_error("/works"));
        }
        let works = self.works.lock().map_err(|_| Self::lock_error("/works"))?;
        Ok(works
            .values()
            .find(|record| record.s3_key.as_deref() == Some(s3_key))
            .cloned())
    }

    async fn register(&self, payload: &RegistrationPayload) -> TransportResult<Registration> {
        if self.fail_registration.load(Ordering::SeqCst) {
            return Err(Self::lock_error("/works"));
        }
        let mut works = self.works.lock().map_err(|_| Self::lock_error("/works"))?;
        let id = (payload.doi.clone(), payload.version);
        if works.contains_key(&id) {
            self.conflicts.fetch_add(1, Ordering::SeqCst);
            return Ok(Registration::AlreadyExists);
        }
        let record = WorkRecord::from(payload);
        works.insert(id, record.clone());
        self.registrations.fetch_add(1, Ordering::SeqCst);
        Ok(Registration::Created(Some(record)))
    }

    async fn fetch_work(&self, doi: &str) -> TransportResult<Option<WorkRecord>> {
        let works = self.works.lock().map_err(|_| Self::lock_error("/works"))?;
        Ok(works
            .range((doi.to_string(), 0)..=(doi.to_string(), u32::MAX))
            .next_back()
            .map(|(_, record)| record.clone()))
    }
}
