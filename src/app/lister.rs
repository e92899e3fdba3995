//! Archive enumeration under a folder prefix

use tracing::{debug, warn};

use crate::app::models::{FolderReference, RemoteArchiveEntry};
use crate::app::store::ObjectStore;
use crate::constants::store::LIST_PAGE_SIZE;
use crate::errors::TransportResult;

/// List archives under `folder.prefix` whose key ends with `extension`
///
/// Follows continuation tokens until the listing is exhausted or `limit`
/// entries have been collected. Entries come back in provider order and the
/// extension match ignores case.
pub async fn list_archives(
    store: &dyn ObjectStore,
    folder: &FolderReference,
    extension: &str,
    limit: Option<usize>,
) -> TransportResult<Vec<RemoteArchiveEntry>> {
    let extension = extension.to_ascii_lowercase();
    let mut entries = Vec::new();
    let mut token: Option<String> = None;
    let mut pages = 0usize;

    if limit == Some(0) {
        return Ok(entries);
    }

    loop {
        let page = store
            .list_page(folder.server, &folder.prefix, token.clone(), LIST_PAGE_SIZE)
            .await?;
        pages += 1;

        entries.extend(
            page.objects
                .into_iter()
                .filter(|object| object.key.to_ascii_lowercase().ends_with(&extension))
                .map(|object| RemoteArchiveEntry {
                    key: object.key,
                    size_bytes: object.size,
                    last_modified: object.last_modified,
                    batch_label: folder.batch_label.clone(),
                }),
        );

        if let Some(max) = limit {
            if entries.len() >= max {
                entries.truncate(max);
                break;
            }
        }

        match page.next_token {
            Some(next) if token.as_deref() == Some(next.as_str()) => {
                warn!(
                    "Listing of {} returned the same continuation token twice, stopping",
                    folder.prefix
                );
                break;
            }
            Some(next) => token = Some(next),
            None => break,
        }
    }

    debug!(
        "Listed {} archives under {} in {} pages",
        entries.len(),
        folder.prefix,
        pages
    );
    Ok(entries)
}
