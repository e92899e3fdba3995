//! Catalog wire types

use serde::{Deserialize, Serialize};

use crate::app::models::{RegistrationPayload, Server};

/// One page of `GET /bucket/list`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogPage {
    #[serde(default)]
    pub files: Vec<CatalogFile>,
    pub pagination: Pagination,
}

/// Paging block of a period listing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub limit: u32,
    #[serde(default)]
    pub offset: u64,
    pub has_more: bool,
    #[serde(default)]
    pub next_offset: Option<u64>,
}

/// A registered file as returned by the period listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogFile {
    pub s3_key: String,
    #[serde(default)]
    pub doi: Option<String>,
    #[serde(default)]
    pub version: Option<u32>,
}

/// A registered manuscript version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkRecord {
    pub doi: String,
    pub version: u32,
    #[serde(default)]
    pub s3_key: Option<String>,
    #[serde(default)]
    pub batch: Option<String>,
    #[serde(default)]
    pub server: Option<Server>,
    #[serde(default)]
    pub received_date: Option<String>,
    #[serde(default)]
    pub accepted_date: Option<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub title: Option<String>,
}

impl From<&RegistrationPayload> for WorkRecord {
    fn from(payload: &RegistrationPayload) -> Self {
        Self {
            doi: payload.doi.clone(),
            version: payload.version,
            s3_key: Some(payload.s3_key.clone()),
            batch: Some(payload.batch.clone()),
            server: Some(payload.server),
            received_date: Some(payload.received_date.to_string()),
            accepted_date: payload.accepted_date.map(|d| d.to_string()),
            file_size: Some(payload.file_size),
            title: payload.title.clone(),
        }
    }
}

/// Result of `POST /works`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    /// `201`, with the stored record when the catalog echoes it
    Created(Option<WorkRecord>),
    /// `409`: the `(doi, version)` pair is already registered
    AlreadyExists,
}

impl Registration {
    /// Whether the catalog reported a duplicate
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Registration::AlreadyExists)
    }
}
