//! Metadata extraction from JATS manuscript XML
//!
//! The manuscript description is repaired at the text level ([`preprocess`]),
//! parsed into a generic tree ([`tree`]) and queried for the fields the
//! catalog needs: DOI, version, received/accepted dates and title.

use std::path::Path;

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::app::models::ExtractedMetadata;
use crate::errors::{MetadataError, MetadataResult};

pub mod preprocess;
pub mod tree;

pub use preprocess::preprocess;
pub use tree::{Element, XmlNode};

/// Version assumed when the document carries none
pub const DEFAULT_VERSION: u32 = 1;

/// Extract metadata from manuscript XML text
pub fn extract_metadata(xml: &str) -> MetadataResult<ExtractedMetadata> {
    let cleaned = preprocess(xml);
    let root = tree::parse(&cleaned)?;
    metadata_from_tree(&root)
}

/// Read and extract metadata from a manuscript file on disk
pub async fn extract_metadata_from_file(path: &Path) -> MetadataResult<ExtractedMetadata> {
    let bytes = tokio::fs::read(path).await?;
    let text = String::from_utf8_lossy(&bytes);
    extract_metadata(&text)
}

/// Extract metadata from an already parsed document
pub fn metadata_from_tree(root: &Element) -> MetadataResult<ExtractedMetadata> {
    let doi = find_doi(root).ok_or(MetadataError::MissingDoi)?;
    let version_number = find_version(root);
    let accepted_date = history_date(root, "accepted");

    let received_date = match history_date(root, "received") {
        Some(date) => date,
        None => match epub_date(root) {
            Some(date) => {
                debug!("{}: no received date in history, using epub date", doi);
                date
            }
            None => match accepted_date {
                Some(date) => {
                    warn!("{}: no received or epub date, using accepted date", doi);
                    date
                }
                None => return Err(MetadataError::MissingDates),
            },
        },
    };

    Ok(ExtractedMetadata {
        doi,
        version_number,
        received_date,
        accepted_date,
        title: find_title(root),
    })
}

fn find_doi(root: &Element) -> Option<String> {
    let doi = root
        .find(|e| e.name == "article-id" && e.has_attr("pub-id-type", "doi"))?
        .text();
    let doi = doi.trim();
    (!doi.is_empty()).then(|| doi.to_string())
}

fn find_version(root: &Element) -> u32 {
    let Some(element) = root.find_named("article-version") else {
        debug!("No article-version element, assuming version {}", DEFAULT_VERSION);
        return DEFAULT_VERSION;
    };
    let text = element.text();
    parse_version(&text).unwrap_or_else(|| {
        debug!(
            "Unparseable article-version '{}', assuming version {}",
            text.trim(),
            DEFAULT_VERSION
        );
        DEFAULT_VERSION
    })
}

/// Version number from `major.minor` (the minor component) or a bare integer
pub fn parse_version(text: &str) -> Option<u32> {
    let text = text.trim();
    match text.split_once('.') {
        Some((_, rest)) => rest.split('.').next()?.trim().parse().ok(),
        None => text.parse().ok(),
    }
}

fn history_date(root: &Element, date_type: &str) -> Option<NaiveDate> {
    let history = root.find_named("history")?;
    history
        .find(|e| e.name == "date" && e.has_attr("date-type", date_type))
        .and_then(compose_date)
}

fn epub_date(root: &Element) -> Option<NaiveDate> {
    root.find(|e| e.name == "pub-date" && e.has_attr("pub-type", "epub"))
        .and_then(compose_date)
}

/// Date from `year`/`month`/`day` children; month and day default to 1
///
/// An impossible calendar date counts as absent.
pub fn compose_date(element: &Element) -> Option<NaiveDate> {
    let part = |name: &str| -> Option<String> {
        element
            .child(name)
            .map(|e| e.text().trim().to_string())
            .filter(|s| !s.is_empty())
    };

    let year: i32 = part("year")?.parse().ok()?;
    let month: u32 = match part("month") {
        Some(m) => m.parse().ok()?,
        None => 1,
    };
    let day: u32 = match part("day") {
        Some(d) => d.parse().ok()?,
        None => 1,
    };
    NaiveDate::from_ymd_opt(year, month, day)
}

fn find_title(root: &Element) -> Option<String> {
    let title = root.find_named("article-title")?.text();
    let collapsed = title.split_whitespace().collect::<Vec<_>>().join(" ");
    (!collapsed.is_empty()).then_some(collapsed)
}
