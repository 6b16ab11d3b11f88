//! Directory lock service.
//!
//! Segment directories and transaction log subtrees are created and removed
//! concurrently by writer threads and the background flush. Creation holds a
//! shared lock on every directory it may have to create, removal takes an
//! exclusive try-lock on each directory it deletes. A removal that loses the
//! race simply leaves the directory behind.
//!
//! Locks are keyed by path, created lazily and kept for the lifetime of the
//! service.

use crate::error::{IndexError, IndexResult};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Per-path reader/writer locks for directory creation and removal.
#[derive(Debug, Default)]
pub struct DirectoryLocks {
    locks: Mutex<HashMap<PathBuf, Arc<RwLock<()>>>>,
}

impl DirectoryLocks {
    /// Creates an empty lock map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn lock_for(&self, path: &Path) -> Arc<RwLock<()>> {
        let mut locks = self.locks.lock();
        Arc::clone(locks.entry(path.to_path_buf()).or_default())
    }

    /// Creates `parent/name`, making the `lock_depth` directories ending at
    /// `parent` first.
    ///
    /// Each of those directories is share-locked from the outermost inward
    /// and stays locked until the file exists, so a concurrent
    /// [`remove_directory`](Self::remove_directory) cannot delete them in
    /// between.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::TransactionLog`] if the file already exists, if
    /// `parent` has fewer than `lock_depth` path components, or if the
    /// directory above the locked range does not exist.
    pub fn create_file(&self, parent: &Path, name: &str, lock_depth: usize) -> IndexResult<File> {
        let chain = Self::ancestor_chain(parent, lock_depth.max(1))?;

        let base = chain
            .last()
            .and_then(|top| top.parent())
            .ok_or_else(|| {
                IndexError::transaction_log(format!("no base directory above {}", parent.display()))
            })?;
        if !base.is_dir() {
            return Err(IndexError::transaction_log(format!(
                "base directory {} does not exist",
                base.display()
            )));
        }

        let locks: Vec<Arc<RwLock<()>>> = chain.iter().rev().map(|dir| self.lock_for(dir)).collect();
        let _guards: Vec<_> = locks.iter().map(|lock| lock.read()).collect();

        for dir in chain.iter().rev() {
            match fs::create_dir(dir) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
                Err(e) => {
                    return Err(IndexError::transaction_log(format!(
                        "cannot create {}: {e}",
                        dir.display()
                    )))
                }
            }
        }

        let path = parent.join(name);
        OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| {
                IndexError::transaction_log(format!("cannot create {}: {e}", path.display()))
            })
    }

    /// Removes `dir` recursively, then up to `max_depth` empty ancestors.
    ///
    /// Returns `Ok(false)` without touching anything when `dir` is missing or
    /// currently locked. The ancestor walk stops at the first directory that
    /// is locked, non-empty, or fails to delete.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if `dir` itself could not be deleted.
    pub fn remove_directory(&self, dir: &Path, max_depth: usize) -> IndexResult<bool> {
        let lock = self.lock_for(dir);
        let Some(guard) = lock.try_write() else {
            debug!(path = %dir.display(), "directory busy, skipping removal");
            return Ok(false);
        };
        match fs::remove_dir_all(dir) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        }
        drop(guard);

        self.prune_ancestors(dir, max_depth);
        Ok(true)
    }

    /// Removes a single file, then up to `max_depth` empty ancestors.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file itself could not be deleted.
    pub fn remove_file(&self, file: &Path, max_depth: usize) -> IndexResult<bool> {
        let lock = self.lock_for(file);
        let Some(guard) = lock.try_write() else {
            return Ok(false);
        };
        match fs::remove_file(file) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        }
        drop(guard);

        self.prune_ancestors(file, max_depth);
        Ok(true)
    }

    fn prune_ancestors(&self, start: &Path, max_depth: usize) {
        for ancestor in start.ancestors().skip(1).take(max_depth) {
            let lock = self.lock_for(ancestor);
            let Some(_guard) = lock.try_write() else {
                return;
            };
            let empty = fs::read_dir(ancestor)
                .map(|mut entries| entries.next().is_none())
                .unwrap_or(false);
            if !empty || fs::remove_dir(ancestor).is_err() {
                return;
            }
        }
    }

    /// `parent` and its ancestors, innermost first, `depth` entries long.
    fn ancestor_chain(parent: &Path, depth: usize) -> IndexResult<Vec<PathBuf>> {
        let chain: Vec<PathBuf> = parent
            .ancestors()
            .filter(|p| !p.as_os_str().is_empty())
            .take(depth)
            .map(Path::to_path_buf)
            .collect();
        if chain.len() < depth {
            return Err(IndexError::transaction_log(format!(
                "{} has fewer than {depth} levels to lock",
                parent.display()
            )));
        }
        Ok(chain)
    }
}
