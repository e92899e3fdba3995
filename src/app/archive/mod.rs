//! Manuscript extraction from MECA archives
//!
//! Two strategies pull the article XML out of a downloaded archive:
//!
//! - **Selective** reads the central directory, extracts `manifest.xml`,
//!   resolves the article instance and extracts that one entry.
//! - **Full** decompresses everything, then resolves the article on disk.
//!
//! [`ranged`] applies the selective strategy to an archive that is never
//! downloaded, faulting in byte ranges from the object store on demand.
//!
//! Zip decoding is synchronous and runs on the blocking thread pool.

use std::fs::{self, File};
use std::io::{self, BufReader, Read, Seek};
use std::path::{Path, PathBuf};

use tracing::debug;
use zip::result::ZipError;
use zip::ZipArchive;

use crate::constants::archive;
use crate::errors::{ExtractionError, ExtractionResult};

pub mod manifest;
pub mod ranged;

pub use ranged::RangedArchive;

/// How an archive is unpacked
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExtractionStrategy {
    /// Only the manifest and the article XML
    #[default]
    Selective,
    /// Every entry
    Full,
}

impl ExtractionStrategy {
    /// Full when forced or when the archive exceeds `threshold` bytes
    pub fn choose(size_bytes: u64, full_extract: bool, threshold: u64) -> Self {
        if full_extract || size_bytes > threshold {
            ExtractionStrategy::Full
        } else {
            ExtractionStrategy::Selective
        }
    }
}

impl std::fmt::Display for ExtractionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractionStrategy::Selective => f.write_str("selective"),
            ExtractionStrategy::Full => f.write_str("full"),
        }
    }
}

/// Extract the article XML of a local archive into `scratch_dir`
///
/// Returns the path of the extracted XML, which is guaranteed to exist.
pub async fn extract_article(
    archive_path: &Path,
    scratch_dir: &Path,
    strategy: ExtractionStrategy,
) -> ExtractionResult<PathBuf> {
    let archive_path = archive_path.to_path_buf();
    let scratch_dir = scratch_dir.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let label = archive_path.display().to_string();
        let file = File::open(&archive_path)?;
        let zip = ZipArchive::new(BufReader::new(file)).map_err(|e| zip_error(&label, e))?;
        match strategy {
            ExtractionStrategy::Selective => extract_selective(zip, &label, &scratch_dir),
            ExtractionStrategy::Full => extract_full(zip, &label, &scratch_dir),
        }
    })
    .await
    .map_err(|e| ExtractionError::Io(io::Error::new(io::ErrorKind::Other, e)))?
}

/// Map a zip error, keeping I/O errors intact so their payload survives
pub(crate) fn zip_error(archive: &str, err: ZipError) -> ExtractionError {
    match err {
        ZipError::Io(e) => ExtractionError::Io(e),
        other => ExtractionError::CorruptArchive {
            archive: archive.to_string(),
            reason: other.to_string(),
        },
    }
}

/// Name of the manifest entry, preferring the archive root
pub(crate) fn manifest_entry_name<R: Read + Seek>(zip: &ZipArchive<R>) -> Option<String> {
    let mut nested = None;
    for name in zip.file_names() {
        if name == archive::MANIFEST_NAME {
            return Some(name.to_string());
        }
        if nested.is_none() && name.ends_with(&format!("/{}", archive::MANIFEST_NAME)) {
            nested = Some(name.to_string());
        }
    }
    nested
}

fn read_entry_to_string<R: Read + Seek>(
    zip: &mut ZipArchive<R>,
    label: &str,
    name: &str,
) -> ExtractionResult<String> {
    let mut entry = zip.by_name(name).map_err(|e| zip_error(label, e))?;
    let mut bytes = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut bytes)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn article_href_from(manifest_xml: &str, label: &str) -> ExtractionResult<String> {
    let root = manifest::parse_manifest(manifest_xml).map_err(|e| {
        ExtractionError::CorruptArchive {
            archive: label.to_string(),
            reason: format!("unreadable manifest: {e}"),
        }
    })?;
    manifest::article_href(&root).ok_or_else(|| ExtractionError::ArticleNotListed {
        archive: label.to_string(),
    })
}

/// Selective extraction over any seekable source
pub(crate) fn extract_selective<R: Read + Seek>(
    mut zip: ZipArchive<R>,
    label: &str,
    scratch_dir: &Path,
) -> ExtractionResult<PathBuf> {
    let manifest_name = manifest_entry_name(&zip).ok_or_else(|| ExtractionError::ManifestMissing {
        archive: label.to_string(),
    })?;
    let manifest_xml = read_entry_to_string(&mut zip, label, &manifest_name)?;
    let href = article_href_from(&manifest_xml, label)?;

    let entry_name = manifest::entry_candidates(&manifest_name, &href)
        .into_iter()
        .find(|candidate| zip.file_names().any(|name| name == candidate.as_str()))
        .ok_or_else(|| ExtractionError::EntryMissing {
            archive: label.to_string(),
            entry: href.clone(),
        })?;

    let mut entry = zip.by_name(&entry_name).map_err(|e| zip_error(label, e))?;
    let relative = entry
        .enclosed_name()
        .map(Path::to_path_buf)
        .ok_or_else(|| ExtractionError::UnsafePath {
            entry: entry_name.clone(),
        })?;

    let target = scratch_dir.join(relative);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut out = File::create(&target)?;
    let written = io::copy(&mut entry, &mut out)?;
    debug!("Extracted {} ({} bytes) from {}", entry_name, written, label);

    verify_target(target)
}

/// Full extraction followed by manifest resolution on disk
fn extract_full<R: Read + Seek>(
    mut zip: ZipArchive<R>,
    label: &str,
    scratch_dir: &Path,
) -> ExtractionResult<PathBuf> {
    let manifest_name = manifest_entry_name(&zip).ok_or_else(|| ExtractionError::ManifestMissing {
        archive: label.to_string(),
    })?;

    fs::create_dir_all(scratch_dir)?;
    zip.extract(scratch_dir).map_err(|e| zip_error(label, e))?;
    debug!("Extracted {} entries of {} to {}", zip.len(), label, scratch_dir.display());

    let manifest_path = manifest::safe_relative_path(&manifest_name)
        .map(|relative| scratch_dir.join(relative))
        .ok_or_else(|| ExtractionError::UnsafePath {
            entry: manifest_name.clone(),
        })?;
    let manifest_xml = String::from_utf8_lossy(&fs::read(&manifest_path)?).into_owned();
    let href = article_href_from(&manifest_xml, label)?;

    let target = manifest::entry_candidates(&manifest_name, &href)
        .into_iter()
        .filter_map(|candidate| manifest::safe_relative_path(&candidate))
        .map(|relative| scratch_dir.join(relative))
        .find(|path| path.is_file())
        .ok_or_else(|| ExtractionError::EntryMissing {
            archive: label.to_string(),
            entry: href.clone(),
        })?;

    verify_target(target)
}

fn verify_target(target: PathBuf) -> ExtractionResult<PathBuf> {
    if target.is_file() {
        Ok(target)
    } else {
        Err(ExtractionError::TargetMissing { path: target })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::io::{Cursor, Write};

    use zip::write::FileOptions;
    use zip::{CompressionMethod, ZipWriter};

    pub const ARTICLE_PATH: &str = "content/486231.xml";

    pub fn manifest(article_href: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<manifest xmlns="http://manuscriptexchange.org" xmlns:xlink="http://www.w3.org/1999/xlink">
  <item type="article">
    <instance media-type="application/pdf" xlink:href="content/486231.pdf"/>
    <instance media-type="application/xml" xlink:href="{article_href}"/>
  </item>
</manifest>"#
        )
    }

    pub fn article(doi: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<article><front><article-meta>
<article-id pub-id-type="doi">{doi}</article-id>
<article-version>1.1</article-version>
<title-group><article-title>Test manuscript</article-title></title-group>
<history><date date-type="received"><day>05</day><month>01</month><year>2024</year></date></history>
</article-meta></front></article>"#
        )
    }

    /// Build a MECA-like zip in memory
    pub fn build_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        for (name, bytes) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(bytes).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    pub fn meca(doi: &str) -> Vec<u8> {
        let manifest = manifest(ARTICLE_PATH);
        let article = article(doi);
        build_archive(&[
            ("manifest.xml", manifest.as_bytes()),
            ("content/486231.pdf", b"%PDF-1.4 not really"),
            (ARTICLE_PATH, article.as_bytes()),
        ])
    }
}
