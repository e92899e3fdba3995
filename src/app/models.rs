//! Data models for meca_ingest
//!
//! This module defines the core data structures that flow through a run:
//! resolved folders, listed archives, extracted metadata, registration
//! payloads and per-file outcomes. None of them outlive the run.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, ConfigError, FailureKind};

/// Preprint server whose archives are ingested
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Server {
    #[default]
    #[serde(alias = "bioRxiv")]
    Biorxiv,
    #[serde(alias = "medRxiv")]
    Medrxiv,
}

impl Server {
    /// Lowercase identifier used in payloads and configuration
    pub fn slug(&self) -> &'static str {
        match self {
            Server::Biorxiv => "biorxiv",
            Server::Medrxiv => "medrxiv",
        }
    }

    /// Display spelling used in server-qualified batch labels
    pub fn canonical_name(&self) -> &'static str {
        match self {
            Server::Biorxiv => "bioRxiv",
            Server::Medrxiv => "medRxiv",
        }
    }

    /// Match a server name at the start of `input`, case-insensitively
    ///
    /// Returns the server and the remainder of the input.
    pub fn strip_prefix(input: &str) -> Option<(Self, &str)> {
        [Server::Biorxiv, Server::Medrxiv].into_iter().find_map(|server| {
            let slug = server.slug();
            match input.get(..slug.len()) {
                Some(head) if head.eq_ignore_ascii_case(slug) => {
                    Some((server, &input[slug.len()..]))
                }
                _ => None,
            }
        })
    }
}

impl fmt::Display for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for Server {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "biorxiv" => Ok(Server::Biorxiv),
            "medrxiv" => Ok(Server::Medrxiv),
            _ => Err(ConfigError::UnknownServer {
                input: s.to_string(),
            }),
        }
    }
}

/// Storage era of a folder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentEra {
    /// Monthly folders at or after the cutoff
    Current,
    /// Numbered batches of older content
    Back,
}

impl fmt::Display for ContentEra {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentEra::Current => f.write_str("current"),
            ContentEra::Back => f.write_str("back"),
        }
    }
}

/// A resolved period: where its archives live and how the catalog groups them
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FolderReference {
    pub server: Server,
    pub era: ContentEra,
    /// `Month_Year` or `Batch_NN` (possibly server-qualified)
    pub batch_label: String,
    /// Object-store prefix, always ending in `/`
    pub prefix: String,
}

/// One archive object found under a folder prefix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteArchiveEntry {
    pub key: String,
    pub size_bytes: u64,
    pub last_modified: Option<DateTime<Utc>>,
    pub batch_label: String,
}

impl RemoteArchiveEntry {
    /// Final path component of the key
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }

    /// File name without its extension, used to name local scratch files
    pub fn file_stem(&self) -> &str {
        let name = self.file_name();
        match name.rfind('.') {
            Some(idx) if idx > 0 => &name[..idx],
            _ => name,
        }
    }
}

/// Failure details attached to an outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeError {
    pub kind: FailureKind,
    pub message: String,
}

/// Result of attempting one archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingOutcome {
    pub key: String,
    pub succeeded: bool,
    /// Registration hit an existing record (tolerated as success)
    pub duplicate: bool,
    pub error: Option<OutcomeError>,
}

impl ProcessingOutcome {
    /// Successful outcome
    pub fn success(key: impl Into<String>, duplicate: bool) -> Self {
        Self {
            key: key.into(),
            succeeded: true,
            duplicate,
            error: None,
        }
    }

    /// Failed outcome classified from the error that stopped the file
    pub fn failure(key: impl Into<String>, error: &AppError) -> Self {
        Self::failure_with(key, error.kind(), error.to_string())
    }

    /// Failed outcome with an explicit kind
    pub fn failure_with(key: impl Into<String>, kind: FailureKind, message: String) -> Self {
        Self {
            key: key.into(),
            succeeded: false,
            duplicate: false,
            error: Some(OutcomeError { kind, message }),
        }
    }
}

/// Bibliographic metadata pulled from the manuscript XML
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedMetadata {
    pub doi: String,
    pub version_number: u32,
    pub received_date: NaiveDate,
    pub accepted_date: Option<NaiveDate>,
    pub title: Option<String>,
}

/// Body of `POST /works`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationPayload {
    pub doi: String,
    pub version: u32,
    pub received_date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted_date: Option<NaiveDate>,
    pub batch: String,
    pub server: Server,
    pub s3_key: String,
    pub file_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl RegistrationPayload {
    /// Combine extracted metadata with the listing entry it came from
    pub fn new(metadata: ExtractedMetadata, entry: &RemoteArchiveEntry, server: Server) -> Self {
        Self {
            doi: metadata.doi,
            version: metadata.version_number,
            received_date: metadata.received_date,
            accepted_date: metadata.accepted_date,
            batch: entry.batch_label.clone(),
            server,
            s3_key: entry.key.clone(),
            file_size: entry.size_bytes,
            title: metadata.title,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::MetadataError;

    fn entry(key: &str) -> RemoteArchiveEntry {
        RemoteArchiveEntry {
            key: key.to_string(),
            size_bytes: 2048,
            last_modified: None,
            batch_label: "January_2024".to_string(),
        }
    }

    #[test]
    fn test_server_parsing() {
        assert_eq!("bioRxiv".parse::<Server>().unwrap(), Server::Biorxiv);
        assert_eq!(" MEDRXIV ".parse::<Server>().unwrap(), Server::Medrxiv);
        assert!("arxiv".parse::<Server>().is_err());

        let (server, rest) = Server::strip_prefix("medRxiv_Batch_03").unwrap();
        assert_eq!(server, Server::Medrxiv);
        assert_eq!(rest, "_Batch_03");
        assert!(Server::strip_prefix("Batch_03").is_none());
    }

    #[test]
    fn test_entry_names() {
        let e = entry("Current_Content/January_2024/0a1b-2c3d.meca");
        assert_eq!(e.file_name(), "0a1b-2c3d.meca");
        assert_eq!(e.file_stem(), "0a1b-2c3d");

        let bare = entry("noext");
        assert_eq!(bare.file_stem(), "noext");
    }

    #[test]
    fn test_outcome_failure_carries_kind() {
        let outcome = ProcessingOutcome::failure("k", &AppError::from(MetadataError::MissingDoi));
        assert!(!outcome.succeeded);
        assert_eq!(outcome.error.unwrap().kind, FailureKind::Metadata);
    }

    #[test]
    fn test_payload_serializes_camel_case() {
        let metadata = ExtractedMetadata {
            doi: "10.1101/2024.01.05.123456".to_string(),
            version_number: 2,
            received_date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            accepted_date: None,
            title: Some("A study".to_string()),
        };
        let payload = RegistrationPayload::new(
            metadata,
            &entry("Current_Content/January_2024/x.meca"),
            Server::Biorxiv,
        );
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["receivedDate"], "2024-01-05");
        assert_eq!(json["s3Key"], "Current_Content/January_2024/x.meca");
        assert_eq!(json["fileSize"], 2048);
        assert_eq!(json["server"], "biorxiv");
        assert!(json.get("acceptedDate").is_none());
    }
}
