//! Removal of per-archive scratch files
//!
//! Every archive owns three local paths under the output directory: the
//! downloaded archive, its `.tmp` partial download and its `_extract` scratch
//! directory. Cleanup never fails the file it runs for; errors are logged.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::app::archive::ExtractionStrategy;
use crate::app::models::RemoteArchiveEntry;
use crate::constants::files;

/// Local paths owned by one archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchPaths {
    /// Downloaded archive
    pub archive: PathBuf,
    /// Partial download, renamed to `archive` on completion
    pub temp: PathBuf,
    /// Extraction target directory
    pub scratch_dir: PathBuf,
}

impl ScratchPaths {
    pub fn for_entry(output_dir: &Path, entry: &RemoteArchiveEntry) -> Self {
        let name = entry.file_name();
        Self {
            archive: output_dir.join(name),
            temp: output_dir.join(format!("{}{}", name, files::TEMP_FILE_SUFFIX)),
            scratch_dir: output_dir.join(format!(
                "{}{}",
                entry.file_stem(),
                files::SCRATCH_DIR_SUFFIX
            )),
        }
    }
}

/// Remove an archive's scratch files, honouring retention
///
/// With `keep`, the archive survives and so does the scratch directory of a
/// full extraction; selective and ranged scratch content is always removed.
/// Returns how many paths were removed.
pub async fn cleanup(paths: &ScratchPaths, keep: bool, strategy: Option<ExtractionStrategy>) -> usize {
    let mut removed = 0;

    if remove_file(&paths.temp).await {
        removed += 1;
    }
    if !keep && remove_file(&paths.archive).await {
        removed += 1;
    }

    let keep_tree = keep && strategy == Some(ExtractionStrategy::Full);
    if !keep_tree && remove_dir(&paths.scratch_dir).await {
        removed += 1;
    }

    debug!(
        "Cleanup of {} removed {} paths (keep: {})",
        paths.archive.display(),
        removed,
        keep
    );
    removed
}

async fn remove_file(path: &Path) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => true,
        Err(e) if e.kind() == ErrorKind::NotFound => false,
        Err(e) => {
            warn!("Failed to remove {}: {}", path.display(), e);
            false
        }
    }
}

async fn remove_dir(path: &Path) -> bool {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => true,
        Err(e) if e.kind() == ErrorKind::NotFound => false,
        Err(e) => {
            warn!("Failed to remove directory {}: {}", path.display(), e);
            false
        }
    }
}
