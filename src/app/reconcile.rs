//! Reconciliation of listed archives against the catalog
//!
//! The primary path pulls every registered key of the period in pages and
//! checks membership locally. When the period cannot be derived from the keys,
//! or the bulk listing fails, every candidate is looked up individually and an
//! unresolved lookup counts as "not processed".

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::app::catalog::Catalog;
use crate::app::models::RemoteArchiveEntry;
use crate::constants::catalog;
use crate::errors::{TransportError, TransportResult};

/// Paging bounds for the bulk listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOptions {
    pub page_size: u32,
    pub max_pages: u32,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            page_size: catalog::DEFAULT_PAGE_SIZE,
            max_pages: catalog::MAX_PAGES,
        }
    }
}

/// How the registered set was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileMethod {
    /// Nothing to reconcile
    Empty,
    /// Paged period listing
    Bulk,
    /// One lookup per candidate key
    PerKey,
}

/// Registered keys among a period's candidates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub registered: HashSet<String>,
    pub method: ReconcileMethod,
    /// Per-key lookups that failed and were treated as not processed
    pub unresolved: usize,
}

impl Reconciliation {
    pub fn is_registered(&self, key: &str) -> bool {
        self.registered.contains(key)
    }

    /// Split candidates into (pending, already registered), keeping order
    pub fn partition(
        &self,
        candidates: Vec<RemoteArchiveEntry>,
    ) -> (Vec<RemoteArchiveEntry>, Vec<RemoteArchiveEntry>) {
        candidates
            .into_iter()
            .partition(|entry| !self.is_registered(&entry.key))
    }
}

/// Period label shared by all keys, taken from the segment below the era root
///
/// `Current_Content/January_2024/x.meca` yields `January_2024`. Returns `None`
/// when the keys are empty, too shallow, or disagree.
pub fn derive_period_label<'a, I>(keys: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut label: Option<&str> = None;
    for key in keys {
        let mut segments = key.split('/');
        let _root = segments.next()?;
        let segment = segments.next().filter(|s| !s.is_empty())?;
        // A file directly under the root has no period segment
        segments.next()?;
        match label {
            None => label = Some(segment),
            Some(existing) if existing == segment => {}
            Some(_) => return None,
        }
    }
    label.map(str::to_string)
}

/// Determine which candidates are already registered
pub async fn reconcile(
    catalog: &dyn Catalog,
    candidates: &[RemoteArchiveEntry],
    options: ReconcileOptions,
) -> Reconciliation {
    if candidates.is_empty() {
        return Reconciliation {
            registered: HashSet::new(),
            method: ReconcileMethod::Empty,
            unresolved: 0,
        };
    }

    match derive_period_label(candidates.iter().map(|e| e.key.as_str())) {
        Some(period) => match registered_keys(catalog, &period, options).await {
            Ok(all) => {
                let registered: HashSet<String> = candidates
                    .iter()
                    .filter(|entry| all.contains(&entry.key))
                    .map(|entry| entry.key.clone())
                    .collect();
                info!(
                    "Catalog lists {} keys for {}; {} of {} candidates already registered",
                    all.len(),
                    period,
                    registered.len(),
                    candidates.len()
                );
                return Reconciliation {
                    registered,
                    method: ReconcileMethod::Bulk,
                    unresolved: 0,
                };
            }
            Err(e) => warn!(
                "Bulk reconciliation for {} failed ({}), falling back to per-key lookups",
                period, e
            ),
        },
        None => warn!("Candidates do not share one period, falling back to per-key lookups"),
    }

    per_key(catalog, candidates).await
}

/// All registered keys of a period, following pagination
pub async fn registered_keys(
    catalog: &dyn Catalog,
    period: &str,
    options: ReconcileOptions,
) -> TransportResult<HashSet<String>> {
    let mut keys = HashSet::new();
    let mut offset = 0u64;

    for page_number in 1..=options.max_pages {
        let page = catalog
            .list_registered(period, options.page_size, offset)
            .await?;
        let received = page.files.len() as u64;
        keys.extend(page.files.into_iter().map(|file| file.s3_key));
        debug!(
            "Catalog page {} for {}: {} keys (offset {})",
            page_number, period, received, offset
        );

        if !page.pagination.has_more {
            return Ok(keys);
        }

        let next = page.pagination.next_offset.unwrap_or(offset + received);
        if next <= offset {
            return Err(TransportError::MalformedResponse {
                endpoint: catalog::BUCKET_LIST_PATH.to_string(),
                reason: format!("pagination did not advance past offset {offset}"),
            });
        }
        offset = next;
    }

    Err(TransportError::MalformedResponse {
        endpoint: catalog::BUCKET_LIST_PATH.to_string(),
        reason: format!("more than {} pages for {}", options.max_pages, period),
    })
}

async fn per_key(catalog: &dyn Catalog, candidates: &[RemoteArchiveEntry]) -> Reconciliation {
    let mut registered = HashSet::new();
    let mut unresolved = 0;

    for entry in candidates {
        match catalog.lookup_by_key(&entry.key).await {
            Ok(Some(_)) => {
                registered.insert(entry.key.clone());
            }
            Ok(None) => {}
            Err(e) => {
                unresolved += 1;
                warn!(
                    "Could not resolve {} in catalog ({}), treating as not processed",
                    entry.key, e
                );
            }
        }
    }

    info!(
        "Per-key reconciliation: {} of {} candidates already registered, {} unresolved",
        registered.len(),
        candidates.len(),
        unresolved
    );
    Reconciliation {
        registered,
        method: ReconcileMethod::PerKey,
        unresolved,
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::app::catalog::{CatalogPage, MemoryCatalog, Pagination, Registration, WorkRecord};
    use crate::app::models::RegistrationPayload;

    fn entry(key: &str) -> RemoteArchiveEntry {
        RemoteArchiveEntry {
            key: key.to_string(),
            size_bytes: 10,
            last_modified: None,
            batch_label: "January_2024".to_string(),
        }
    }

    fn candidates() -> Vec<RemoteArchiveEntry> {
        ["a", "b", "c"]
            .iter()
            .map(|n| entry(&format!("Current_Content/January_2024/{n}.meca")))
            .collect()
    }

    #[test]
    fn test_derive_period_label() {
        let keys = [
            "Current_Content/January_2024/a.meca",
            "Current_Content/January_2024/b.meca",
        ];
        assert_eq!(derive_period_label(keys), Some("January_2024".to_string()));

        let mixed = ["Current_Content/January_2024/a.meca", "Current_Content/May_2024/b.meca"];
        assert_eq!(derive_period_label(mixed), None);
        assert_eq!(derive_period_label(["a.meca"]), None);
        assert_eq!(derive_period_label(["Back_Content/x.meca"]), None);
        assert_eq!(derive_period_label(Vec::<&str>::new()), None);
    }

    /// Test bulk reconciliation across several pages
    #[tokio::test]
    async fn test_bulk_reconciliation() {
        let catalog = MemoryCatalog::new();
        catalog.seed("10.1101/a", 1, "January_2024", "Current_Content/January_2024/a.meca");
        catalog.seed("10.1101/b", 1, "January_2024", "Current_Content/January_2024/b.meca");
        catalog.seed("10.1101/z", 1, "January_2024", "Current_Content/January_2024/z.meca");

        let options = ReconcileOptions {
            page_size: 1,
            max_pages: 10,
        };
        let result = reconcile(&catalog, &candidates(), options).await;
        assert_eq!(result.method, ReconcileMethod::Bulk);
        assert_eq!(result.registered.len(), 2);

        let (pending, done) = result.partition(candidates());
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].key, "Current_Content/January_2024/c.meca");
        assert_eq!(done.len(), 2);
    }

    /// Test failure of the bulk listing falls back to per-key lookups
    #[tokio::test]
    async fn test_fallback_per_key() {
        let catalog = MemoryCatalog::new();
        catalog.seed("10.1101/a", 1, "January_2024", "Current_Content/January_2024/a.meca");
        catalog.fail_bulk_listing(true);

        let result = reconcile(&catalog, &candidates(), ReconcileOptions::default()).await;
        assert_eq!(result.method, ReconcileMethod::PerKey);
        assert!(result.is_registered("Current_Content/January_2024/a.meca"));
        assert_eq!(result.registered.len(), 1);
        assert_eq!(result.unresolved, 0);
    }

    /// Test unresolved lookups count as not processed
    #[tokio::test]
    async fn test_unresolved_lookups() {
        let catalog = MemoryCatalog::new();
        catalog.seed("10.1101/a", 1, "January_2024", "Current_Content/January_2024/a.meca");
        catalog.fail_bulk_listing(true);
        catalog.fail_lookups(true);

        let result = reconcile(&catalog, &candidates(), ReconcileOptions::default()).await;
        assert!(result.registered.is_empty());
        assert_eq!(result.unresolved, 3);
    }

    #[derive(Debug)]
    struct StuckCatalog;

    #[async_trait]
    impl Catalog for StuckCatalog {
        async fn list_registered(
            &self,
            _period: &str,
            limit: u32,
            offset: u64,
        ) -> TransportResult<CatalogPage> {
            Ok(CatalogPage {
                files: vec![],
                pagination: Pagination {
                    total: 100,
                    limit,
                    offset,
                    has_more: true,
                    next_offset: Some(offset),
                },
            })
        }

        async fn lookup_by_key(&self, _s3_key: &str) -> TransportResult<Option<WorkRecord>> {
            Ok(None)
        }

        async fn register(&self, _payload: &RegistrationPayload) -> TransportResult<Registration> {
            Ok(Registration::AlreadyExists)
        }

        async fn fetch_work(&self, _doi: &str) -> TransportResult<Option<WorkRecord>> {
            Ok(None)
        }
    }

    /// Test a non-advancing listing is rejected instead of looping
    #[tokio::test]
    async fn test_non_advancing_pagination() {
        let err = registered_keys(&StuckCatalog, "January_2024", ReconcileOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::MalformedResponse { .. }));

        let result = reconcile(&StuckCatalog, &candidates(), ReconcileOptions::default()).await;
        assert_eq!(result.method, ReconcileMethod::PerKey);
    }
}
