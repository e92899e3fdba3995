//! Selective extraction straight from the object store with ranged reads
//!
//! The archive is modelled as a sparse file of its full size. Reads that hit
//! bytes not fetched yet fail with a [`MissingRange`] payload; the async side
//! fetches the missing range and retries the synchronous zip operation.
//!
//! Opening uses a bounded doubling tail: fetch the last `initial_tail` bytes,
//! try to read the central directory, and double the tail on every miss up to
//! `max_attempts` times. Entry bytes are faulted in the same way, doubling the
//! chunk on every miss within the same budget. Exhausting either budget gives
//! [`ExtractionError::RangedReadExhausted`] so the caller can fall back to a
//! full download.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::debug;
use zip::ZipArchive;

use super::{extract_selective, zip_error};
use crate::app::models::Server;
use crate::app::store::{ByteRange, ObjectStore};
use crate::errors::{AppError, ExtractionError, ExtractionResult, Result};

/// I/O error payload for a read of bytes that have not been fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissingRange {
    pub offset: u64,
}

impl fmt::Display for MissingRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bytes at offset {} have not been fetched", self.offset)
    }
}

impl std::error::Error for MissingRange {}

/// Offset a failed extraction was missing, if that is why it failed
pub fn missing_offset(err: &ExtractionError) -> Option<u64> {
    match err {
        ExtractionError::Io(io_error) => io_error
            .get_ref()
            .and_then(|inner| inner.downcast_ref::<MissingRange>())
            .map(|missing| missing.offset),
        _ => None,
    }
}

/// Fetched byte ranges keyed by start offset
#[derive(Debug, Default)]
struct Segments {
    map: BTreeMap<u64, Vec<u8>>,
}

impl Segments {
    fn insert(&mut self, start: u64, bytes: Vec<u8>) {
        if !bytes.is_empty() {
            self.map.insert(start, bytes);
        }
    }

    /// Copy bytes at `offset` into `buf`, `None` when no segment covers it
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Option<usize> {
        let (start, bytes) = self
            .map
            .range(..=offset)
            .rev()
            .find(|(start, bytes)| offset < **start + bytes.len() as u64)?;
        let from = (offset - start) as usize;
        let n = buf.len().min(bytes.len() - from);
        buf[..n].copy_from_slice(&bytes[from..from + n]);
        Some(n)
    }
}

/// `Read + Seek` view of the sparse archive
#[derive(Debug)]
pub struct SparseReader {
    segments: Arc<Mutex<Segments>>,
    len: u64,
    pos: u64,
}

impl Read for SparseReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.pos >= self.len {
            return Ok(0);
        }
        let segments = self
            .segments
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "segment lock poisoned"))?;
        let remaining = (self.len - self.pos).min(buf.len() as u64) as usize;
        match segments.read_at(self.pos, &mut buf[..remaining]) {
            Some(n) => {
                self.pos += n as u64;
                Ok(n)
            }
            None => Err(io::Error::new(
                io::ErrorKind::Other,
                MissingRange { offset: self.pos },
            )),
        }
    }
}

impl Seek for SparseReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.len.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        };
        match target {
            Some(offset) => {
                self.pos = offset;
                Ok(offset)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of archive",
            )),
        }
    }
}

enum Fault {
    Missing(u64),
    Failed(AppError),
}

/// An archive read through ranged GETs
#[derive(Debug)]
pub struct RangedArchive {
    store: Arc<dyn ObjectStore>,
    server: Server,
    key: String,
    len: u64,
    segments: Arc<Mutex<Segments>>,
    initial_chunk: u64,
    max_attempts: u32,
}

impl RangedArchive {
    /// Fetch enough of the tail to read the central directory
    ///
    /// # Errors
    ///
    /// `RangedReadExhausted` when the directory is still out of reach after
    /// `max_attempts` doublings; transport and corrupt-archive errors as they
    /// occur.
    pub async fn open(
        store: Arc<dyn ObjectStore>,
        server: Server,
        key: &str,
        len: u64,
        initial_tail: u64,
        max_attempts: u32,
    ) -> Result<Self> {
        if len == 0 {
            return Err(ExtractionError::CorruptArchive {
                archive: key.to_string(),
                reason: "object is empty".to_string(),
            }
            .into());
        }

        let archive = Self {
            store,
            server,
            key: key.to_string(),
            len,
            segments: Arc::new(Mutex::new(Segments::default())),
            initial_chunk: initial_tail.max(1),
            max_attempts,
        };

        let mut tail = archive.initial_chunk.min(len);
        let mut fetched_from = len;
        for attempt in 1..=max_attempts {
            let start = len - tail;
            if start < fetched_from {
                archive.fetch(start, fetched_from - start).await?;
                fetched_from = start;
            }

            match archive.with_zip(|zip, _| Ok(zip.len())).await {
                Ok(entries) => {
                    debug!(
                        "Opened {} with a {} byte tail after {} attempts ({} entries)",
                        archive.key, tail, attempt, entries
                    );
                    return Ok(archive);
                }
                Err(Fault::Missing(offset)) => {
                    debug!(
                        "Central directory of {} needs offset {}, tail was {}",
                        archive.key, offset, tail
                    );
                    tail = tail.saturating_mul(2).min(len);
                }
                Err(Fault::Failed(e)) => return Err(e),
            }
        }

        Err(ExtractionError::RangedReadExhausted {
            key: archive.key,
            attempts: max_attempts,
        }
        .into())
    }

    /// Object size in bytes
    pub fn size_bytes(&self) -> u64 {
        self.len
    }

    /// Extract the article XML into `scratch_dir`, faulting in entry bytes
    pub async fn extract_article(&self, scratch_dir: &Path) -> Result<PathBuf> {
        let mut chunk = self.initial_chunk;

        for _ in 0..self.max_attempts {
            let scratch = scratch_dir.to_path_buf();
            match self
                .with_zip(move |zip, label| extract_selective(zip, label, &scratch))
                .await
            {
                Ok(path) => return Ok(path),
                Err(Fault::Missing(offset)) => {
                    let n = chunk.min(self.len - offset);
                    self.fetch(offset, n).await?;
                    chunk = chunk.saturating_mul(2);
                }
                Err(Fault::Failed(e)) => return Err(e),
            }
        }

        Err(ExtractionError::RangedReadExhausted {
            key: self.key.clone(),
            attempts: self.max_attempts,
        }
        .into())
    }

    async fn fetch(&self, start: u64, len: u64) -> Result<()> {
        let range = ByteRange::new(start, len);
        let bytes = self.store.get_range(self.server, &self.key, range).await?;
        debug!("Fetched {} of {} ({} bytes)", range.header_value(), self.key, bytes.len());
        self.segments
            .lock()
            .map_err(|_| AppError::generic("segment lock poisoned"))?
            .insert(start, bytes);
        Ok(())
    }

    /// Run a zip operation on the blocking pool against the fetched segments
    async fn with_zip<T, F>(&self, op: F) -> std::result::Result<T, Fault>
    where
        T: Send + 'static,
        F: FnOnce(ZipArchive<SparseReader>, &str) -> ExtractionResult<T> + Send + 'static,
    {
        let reader = SparseReader {
            segments: Arc::clone(&self.segments),
            len: self.len,
            pos: 0,
        };
        let label = self.key.clone();

        let result = tokio::task::spawn_blocking(move || {
            let zip = ZipArchive::new(reader).map_err(|e| zip_error(&label, e))?;
            op(zip, &label)
        })
        .await
        .map_err(|e| Fault::Failed(AppError::generic(format!("extraction task failed: {e}"))))?;

        result.map_err(|e| match missing_offset(&e) {
            Some(offset) => Fault::Missing(offset),
            None => Fault::Failed(e.into()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::archive::test_support::{article, build_archive, manifest, meca, ARTICLE_PATH};
    use crate::app::store::MemoryStore;

    fn store_with(key: &str, bytes: Vec<u8>) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.insert(Server::Biorxiv, key, bytes);
        store
    }

    #[test]
    fn test_sparse_reader_reports_missing_offset() {
        let segments = Arc::new(Mutex::new(Segments::default()));
        segments.lock().unwrap().insert(10, vec![1, 2, 3]);
        let mut reader = SparseReader {
            segments,
            len: 20,
            pos: 0,
        };

        reader.seek(SeekFrom::Start(11)).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(reader.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[2, 3]);

        let err = reader.read(&mut buf).unwrap_err();
        let missing = err.get_ref().unwrap().downcast_ref::<MissingRange>().unwrap();
        assert_eq!(missing.offset, 13);

        assert!(reader.seek(SeekFrom::End(-21)).is_err());
        assert_eq!(reader.seek(SeekFrom::End(0)).unwrap(), 20);
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }

    /// Test a small initial tail grows until the directory is readable
    #[tokio::test]
    async fn test_open_and_extract_without_download() {
        let mut bytes = Vec::new();
        let noise: Vec<u8> = (0..200_000).map(|_| fastrand::u8(..)).collect();
        let manifest = manifest(ARTICLE_PATH);
        let article = article("10.1101/ranged");
        bytes.extend(build_archive(&[
            ("content/486231.pdf", &noise),
            ("manifest.xml", manifest.as_bytes()),
            (ARTICLE_PATH, article.as_bytes()),
        ]));
        let len = bytes.len() as u64;
        let store = store_with("k.meca", bytes);

        let archive = RangedArchive::open(store.clone(), Server::Biorxiv, "k.meca", len, 256, 8)
            .await
            .unwrap();
        assert_eq!(archive.size_bytes(), len);

        let dir = tempfile::tempdir().unwrap();
        let xml = archive.extract_article(dir.path()).await.unwrap();
        assert_eq!(xml, dir.path().join(ARTICLE_PATH));
        let text = std::fs::read_to_string(&xml).unwrap();
        assert!(text.contains("10.1101/ranged"));
        assert_eq!(store.downloads(), 0);
        assert!(store.range_reads() >= 2);
    }

    /// Test exhausting the tail budget is reported for fallback
    #[tokio::test]
    async fn test_open_budget_exhausted() {
        let bytes = meca("10.1101/x");
        let len = bytes.len() as u64;
        let store = store_with("k.meca", bytes);

        let err = RangedArchive::open(store, Server::Biorxiv, "k.meca", len, 16, 2)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Extraction(ExtractionError::RangedReadExhausted { attempts: 2, .. })
        ));
    }

    /// Test a garbage object is corrupt rather than exhausted
    #[tokio::test]
    async fn test_open_garbage() {
        let bytes = vec![7u8; 4096];
        let store = store_with("k.meca", bytes);
        let err = RangedArchive::open(store, Server::Biorxiv, "k.meca", 4096, 64, 8)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Extraction(ExtractionError::CorruptArchive { .. })
                | AppError::Extraction(ExtractionError::RangedReadExhausted { .. })
        ));
    }
}
