//! Index directory management.
//!
//! This module handles the file system layout of an index:
//!
//! ```text
//! <root>/
//! ├─ LOCK                 # Advisory lock for single-process access
//! ├─ segments             # Segment registry
//! ├─ _0/ _1/ ...          # Persistent segments (documents.dat)
//! ├─ txlog/<ab>/<uuid>/   # One transaction log record per open batch
//! └─ reindexProcessing    # Present while a full rebuild is running
//! ```
//!
//! The LOCK file ensures only one process opens the index at a time.

use crate::error::{IndexError, IndexResult};
use crate::types::SegmentName;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const REGISTRY_FILE: &str = "segments";
const TXLOG_DIR: &str = "txlog";
const REBUILD_MARKER: &str = "reindexProcessing";

/// File holding a persistent segment's records.
pub const SEGMENT_DATA_FILE: &str = "documents.dat";

/// Holds the index root and its exclusive process lock.
///
/// Only one `IndexDir` can exist per directory at a time; the lock is
/// released when the value is dropped.
#[derive(Debug)]
pub struct IndexDir {
    path: PathBuf,
    _lock_file: File,
}

impl IndexDir {
    /// Opens or creates an index directory.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory doesn't exist and `create_if_missing` is false
    /// - Another process holds the lock ([`IndexError::IndexLocked`])
    /// - I/O errors occur
    pub fn open(path: &Path, create_if_missing: bool) -> IndexResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(IndexError::configuration(format!(
                    "index directory does not exist: {}",
                    path.display()
                )));
            }
        }
        if !path.is_dir() {
            return Err(IndexError::configuration(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }
        let path = path.canonicalize()?;

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(IndexError::IndexLocked);
        }

        fs::create_dir_all(path.join(TXLOG_DIR))?;

        Ok(Self {
            path,
            _lock_file: lock_file,
        })
    }

    /// Root of the index.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the segment registry file.
    #[must_use]
    pub fn registry_path(&self) -> PathBuf {
        self.path.join(REGISTRY_FILE)
    }

    /// Directory holding transaction log records.
    #[must_use]
    pub fn txlog_dir(&self) -> PathBuf {
        self.path.join(TXLOG_DIR)
    }

    /// Path of the interrupted-rebuild marker.
    #[must_use]
    pub fn rebuild_marker_path(&self) -> PathBuf {
        self.path.join(REBUILD_MARKER)
    }

    /// Directory of a persistent segment.
    #[must_use]
    pub fn segment_dir(&self, name: &SegmentName) -> PathBuf {
        self.path.join(name.as_str())
    }

    /// Names of every `_*` directory under the root, registered or not.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the root cannot be listed.
    pub fn list_segment_dirs(&self) -> IndexResult<Vec<SegmentName>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if let Ok(name) = SegmentName::parse(name) {
                    names.push(name);
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Syncs a directory so created, renamed or deleted entries are durable.
#[cfg(unix)]
pub(crate) fn sync_directory(dir: &Path) -> IndexResult<()> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

/// NTFS journals metadata, so there is nothing to sync.
#[cfg(not(unix))]
pub(crate) fn sync_directory(_dir: &Path) -> IndexResult<()> {
    Ok(())
}
