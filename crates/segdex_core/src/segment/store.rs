//! Persistent segment store.
//!
//! Each persistent segment is a directory `_<base36>` holding an append-only
//! `documents.dat` of put and tombstone records. The registry lists the live
//! segments; an in-memory index maps every live document to the record that
//! holds it.
//!
//! ## Write order
//!
//! 1. Tombstones for replaced or removed documents, appended to the segment
//!    that holds them
//! 2. A new segment with the written documents
//! 3. Registry rewrite
//!
//! A crash between 1 and 3 can lose the affected documents, never resurrect
//! removed ones; the transaction log covers the loss.

use crate::dir::{sync_directory, IndexDir, SEGMENT_DATA_FILE};
use crate::document::Document;
use crate::error::{IndexError, IndexResult};
use crate::lock::DirectoryLocks;
use crate::policy::{AggregatePolicy, SegmentStats, ThresholdPolicy};
use crate::registry::SegmentRegistry;
use crate::segment::record::{scan_records, SegmentRecord};
use crate::transaction::{IndexTransaction, ModificationReport};
use crate::types::{DocumentId, SegmentName};
use parking_lot::{Mutex, RwLock};
use segdex_storage::{FileBackend, StorageBackend};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// An open segment data file.
pub(crate) struct SegmentFile {
    name: SegmentName,
    backend: RwLock<FileBackend>,
}

impl fmt::Debug for SegmentFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentFile").field("name", &self.name).finish()
    }
}

impl SegmentFile {
    fn read_document(&self, offset: u64, len: usize) -> IndexResult<Document> {
        let bytes = self.backend.read().read_at(offset, len)?;
        let Some((record, _)) = SegmentRecord::decode(&bytes)? else {
            return Err(IndexError::index(format!(
                "short record at offset {offset} in {}",
                self.name
            )));
        };
        if record.is_tombstone() {
            return Err(IndexError::index(format!(
                "index points at tombstone of {} in {}",
                record.id, self.name
            )));
        }
        Document::decode(&record.payload)
    }

    fn append(&self, record: &SegmentRecord) -> IndexResult<(u64, usize)> {
        let bytes = record.encode()?;
        let offset = self.backend.write().append(&bytes)?;
        Ok((offset, bytes.len()))
    }

    fn sync(&self) -> IndexResult<()> {
        self.backend.write().sync()?;
        Ok(())
    }

    fn size(&self) -> IndexResult<u64> {
        Ok(self.backend.read().size()?)
    }
}

#[derive(Debug, Clone)]
struct Location {
    segment: Arc<SegmentFile>,
    offset: u64,
    len: usize,
}

impl Location {
    fn read(&self) -> IndexResult<Document> {
        self.segment.read_document(self.offset, self.len)
    }
}

type DocIndex = BTreeMap<DocumentId, Location>;

/// Point-in-time view of the persistent segments.
///
/// The view keeps the segment files it needs open, so documents stay
/// readable after a later merge deletes their segment.
#[derive(Debug, Clone)]
pub struct PersistentView {
    index: Arc<DocIndex>,
    fields: Arc<BTreeSet<String>>,
}

impl PersistentView {
    /// Number of live documents.
    #[must_use]
    pub fn num_docs(&self) -> usize {
        self.index.len()
    }

    /// Returns true if `id` is live in this view.
    #[must_use]
    pub fn contains(&self, id: &DocumentId) -> bool {
        self.index.contains_key(id)
    }

    /// Reads a document.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be read or decoded.
    pub fn document(&self, id: &DocumentId) -> IndexResult<Option<Document>> {
        self.index.get(id).map(Location::read).transpose()
    }

    /// Iterates over live document ids in order.
    pub fn document_ids(&self) -> impl Iterator<Item = &DocumentId> {
        self.index.keys()
    }

    /// Field names of the documents in the view's segments.
    #[must_use]
    pub fn field_names(&self) -> &BTreeSet<String> {
        &self.fields
    }
}

struct SegmentMeta {
    file: Arc<SegmentFile>,
    live: usize,
    bytes: u64,
    fields: BTreeSet<String>,
    last_modified: Instant,
}

impl SegmentMeta {
    fn stats(&self, now: Instant) -> SegmentStats {
        SegmentStats {
            key: self.file.name.key(),
            document_count: self.live,
            byte_size: self.bytes,
            idle: now.saturating_duration_since(self.last_modified),
        }
    }
}

struct StoreState {
    registry: SegmentRegistry,
    segments: Vec<SegmentMeta>,
    index: Arc<DocIndex>,
    fields: Arc<BTreeSet<String>>,
    open: bool,
    merges: u64,
}

impl StoreState {
    fn ensure_open(&self) -> IndexResult<()> {
        if self.open {
            Ok(())
        } else {
            Err(IndexError::index("persistent store is closed"))
        }
    }

    fn meta_mut(&mut self, name: &SegmentName) -> Option<&mut SegmentMeta> {
        self.segments.iter_mut().find(|m| &m.file.name == name)
    }

    fn refresh_fields(&mut self) {
        let fields = self
            .segments
            .iter()
            .filter(|m| m.live > 0)
            .flat_map(|m| m.fields.iter().cloned())
            .collect();
        self.fields = Arc::new(fields);
    }

    /// Appends tombstones for every listed id that is live.
    fn tombstone<'a>(
        &mut self,
        ids: impl IntoIterator<Item = &'a DocumentId>,
        sync: bool,
    ) -> IndexResult<BTreeSet<DocumentId>> {
        let mut removed = BTreeSet::new();
        let mut touched: Vec<Arc<SegmentFile>> = Vec::new();

        for id in ids {
            let Some(location) = self.index.get(id).cloned() else {
                continue;
            };
            let (_, len) = location.segment.append(&SegmentRecord::tombstone(id.clone()))?;
            Arc::make_mut(&mut self.index).remove(id);
            if let Some(meta) = self.meta_mut(&location.segment.name) {
                meta.live = meta.live.saturating_sub(1);
                meta.bytes += len as u64;
                meta.last_modified = Instant::now();
            }
            if !touched.iter().any(|s| Arc::ptr_eq(s, &location.segment)) {
                touched.push(location.segment);
            }
            removed.insert(id.clone());
        }

        if sync {
            for segment in &touched {
                segment.sync()?;
            }
        }
        if !removed.is_empty() {
            self.refresh_fields();
        }
        Ok(removed)
    }

    /// Writes `docs` into a new registered segment.
    fn write_segment(
        &mut self,
        root: &Path,
        locks: &DirectoryLocks,
        docs: &[&Document],
        sync: bool,
    ) -> IndexResult<Option<SegmentName>> {
        if docs.is_empty() {
            return Ok(None);
        }
        let name = self.registry.new_name();
        let dir = root.join(name.as_str());

        let written = fill_segment(&name, &dir, locks, docs, sync)
            .and_then(|filled| self.registry.add_name(name.clone()).map(|()| filled));
        let (file, entries, fields) = match written {
            Ok(filled) => filled,
            Err(e) => {
                if let Err(cleanup) = locks.remove_directory(&dir, 0) {
                    warn!(segment = %name, error = %cleanup, "cannot remove failed segment");
                }
                return Err(e);
            }
        };

        let mut displaced = Vec::new();
        {
            let index = Arc::make_mut(&mut self.index);
            for (id, offset, len) in &entries {
                let location = Location {
                    segment: Arc::clone(&file),
                    offset: *offset,
                    len: *len,
                };
                if let Some(old) = index.insert(id.clone(), location) {
                    displaced.push(old.segment.name.clone());
                }
            }
        }
        for old in displaced {
            if let Some(meta) = self.meta_mut(&old) {
                meta.live = meta.live.saturating_sub(1);
            }
        }

        self.segments.push(SegmentMeta {
            bytes: file.size()?,
            file,
            live: entries.len(),
            fields,
            last_modified: Instant::now(),
        });
        self.refresh_fields();
        Ok(Some(name))
    }
}

type FilledSegment = (Arc<SegmentFile>, Vec<(DocumentId, u64, usize)>, BTreeSet<String>);

fn fill_segment(
    name: &SegmentName,
    dir: &Path,
    locks: &DirectoryLocks,
    docs: &[&Document],
    sync: bool,
) -> IndexResult<FilledSegment> {
    drop(locks.create_file(dir, SEGMENT_DATA_FILE, 1)?);
    let backend = FileBackend::open_existing(&dir.join(SEGMENT_DATA_FILE))?;
    let file = Arc::new(SegmentFile {
        name: name.clone(),
        backend: RwLock::new(backend),
    });

    let mut entries = Vec::with_capacity(docs.len());
    let mut fields = BTreeSet::new();
    for doc in docs {
        let record = SegmentRecord::put(doc.id().clone(), doc.encode()?);
        let (offset, len) = file.append(&record)?;
        entries.push((doc.id().clone(), offset, len));
        fields.extend(doc.field_names().map(str::to_string));
    }

    if sync {
        file.sync()?;
        if let Some(root) = dir.parent() {
            sync_directory(root)?;
        }
    }
    Ok((file, entries, fields))
}

/// The durable segment set.
pub struct PersistentStore {
    root: PathBuf,
    locks: Arc<DirectoryLocks>,
    merge_policy: ThresholdPolicy,
    sync: bool,
    state: Mutex<StoreState>,
}

impl fmt::Debug for PersistentStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistentStore")
            .field("root", &self.root)
            .field("merge_policy", &self.merge_policy)
            .finish_non_exhaustive()
    }
}

impl PersistentStore {
    /// Opens the segments registered in `dir`.
    ///
    /// Unregistered `_*` directories are removed. A torn record at the end
    /// of a segment is truncated away.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry is corrupt, a registered segment is
    /// missing, or a segment record fails its checksum.
    pub fn open(
        dir: &IndexDir,
        locks: Arc<DirectoryLocks>,
        merge_policy: ThresholdPolicy,
        sync: bool,
    ) -> IndexResult<Self> {
        let registry = SegmentRegistry::open(dir.registry_path())?;

        let registered: BTreeSet<&SegmentName> = registry.names().iter().collect();
        for name in dir.list_segment_dirs()? {
            if !registered.contains(&name) {
                warn!(segment = %name, "removing unregistered segment directory");
                locks.remove_directory(&dir.segment_dir(&name), 0)?;
            }
        }

        let mut segments: Vec<SegmentMeta> = Vec::with_capacity(registry.names().len());
        let mut index = DocIndex::new();
        for name in registry.names() {
            let (meta, live) = load_segment(dir, name)?;
            for (id, location) in live {
                if let Some(old) = index.insert(id, location) {
                    let prev = segments
                        .iter_mut()
                        .find(|m| m.file.name == old.segment.name);
                    if let Some(prev) = prev {
                        prev.live = prev.live.saturating_sub(1);
                    }
                }
            }
            segments.push(meta);
        }

        info!(
            segments = segments.len(),
            documents = index.len(),
            "persistent store opened"
        );

        let mut state = StoreState {
            registry,
            segments,
            index: Arc::new(index),
            fields: Arc::new(BTreeSet::new()),
            open: true,
            merges: 0,
        };
        state.refresh_fields();

        Ok(Self {
            root: dir.path().to_path_buf(),
            locks,
            merge_policy,
            sync,
            state: Mutex::new(state),
        })
    }

    /// Applies a batch: removals and updates are tombstoned, added and
    /// updated bodies are written to one new segment.
    ///
    /// Adding a document that already exists replaces it. The report claims
    /// every id in the batch.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is closed or a write fails.
    pub fn apply(&self, txn: &IndexTransaction) -> IndexResult<ModificationReport> {
        let mut state = self.state.lock();
        state.ensure_open()?;

        let stale = txn
            .removed()
            .iter()
            .chain(txn.updated().keys())
            .chain(txn.added().keys());
        let tombstoned = state.tombstone(stale, self.sync)?;

        let docs: Vec<&Document> = txn.added().values().chain(txn.updated().values()).collect();
        let created = state.write_segment(&self.root, &self.locks, &docs, self.sync)?;
        state.registry.write()?;

        debug!(
            written = docs.len(),
            tombstoned = tombstoned.len(),
            segment = created.as_ref().map(SegmentName::as_str),
            "persistent batch applied"
        );
        self.merge_after_write(&mut state);

        Ok(ModificationReport::from_sets(
            txn.added().keys().cloned().collect(),
            txn.updated().keys().cloned().collect(),
            txn.removed().clone(),
        ))
    }

    /// Writes documents into one new segment, replacing existing copies.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is closed or a write fails.
    pub fn add_documents(&self, docs: &[&Document]) -> IndexResult<Option<SegmentName>> {
        let mut state = self.state.lock();
        state.ensure_open()?;

        state.tombstone(docs.iter().map(|d| d.id()), self.sync)?;
        let created = state.write_segment(&self.root, &self.locks, docs, self.sync)?;
        state.registry.write()?;
        self.merge_after_write(&mut state);
        Ok(created)
    }

    /// Removes documents, returning the ids that were live.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is closed or a tombstone cannot be
    /// written.
    pub fn remove_documents(
        &self,
        ids: &BTreeSet<DocumentId>,
    ) -> IndexResult<BTreeSet<DocumentId>> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        state.tombstone(ids, self.sync)
    }

    fn merge_after_write(&self, state: &mut StoreState) {
        if let Err(e) = self.merge_locked(state) {
            warn!(error = %e, "persistent segment merge failed");
        }
    }

    /// Runs the merge policy once, returning how many segments were merged.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is closed or the merge fails.
    pub fn merge(&self) -> IndexResult<usize> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        self.merge_locked(&mut state)
    }

    fn merge_locked(&self, state: &mut StoreState) -> IndexResult<usize> {
        let now = Instant::now();
        let stats: Vec<SegmentStats> = state.segments.iter().map(|m| m.stats(now)).collect();
        let picked = self.merge_policy.find_candidates(&stats);
        if picked.len() < 2 {
            return Ok(0);
        }

        let mut names = Vec::with_capacity(picked.len());
        for key in &picked {
            let Some(meta) = state.segments.iter().find(|m| m.file.name.key() == *key) else {
                return Err(IndexError::concurrent_modification(format!(
                    "merge candidate {key} is gone"
                )));
            };
            names.push(meta.file.name.clone());
        }

        let index = Arc::clone(&state.index);
        let docs = index
            .values()
            .filter(|location| names.contains(&location.segment.name))
            .map(Location::read)
            .collect::<IndexResult<Vec<Document>>>()?;
        let refs: Vec<&Document> = docs.iter().collect();

        let merged = state.write_segment(&self.root, &self.locks, &refs, self.sync)?;
        for name in &names {
            state.registry.remove_name(name);
        }
        state.registry.write()?;
        state.segments.retain(|m| !names.contains(&m.file.name));
        state.refresh_fields();
        state.merges += 1;

        for name in &names {
            match self.locks.remove_directory(&self.root.join(name.as_str()), 0) {
                Ok(true) => {}
                Ok(false) => warn!(segment = %name, "merged segment busy, left for cleanup"),
                Err(e) => warn!(segment = %name, error = %e, "cannot remove merged segment"),
            }
        }

        info!(
            merged = names.len(),
            documents = docs.len(),
            into = merged.as_ref().map(SegmentName::as_str),
            "persistent segments merged"
        );
        Ok(names.len())
    }

    /// Returns a view of the live documents, or `None` once closed.
    #[must_use]
    pub fn view(&self) -> Option<PersistentView> {
        let state = self.state.lock();
        state.open.then(|| PersistentView {
            index: Arc::clone(&state.index),
            fields: Arc::clone(&state.fields),
        })
    }

    /// Returns true if `id` is live.
    #[must_use]
    pub fn contains(&self, id: &DocumentId) -> bool {
        self.state.lock().index.contains_key(id)
    }

    /// Number of live documents.
    #[must_use]
    pub fn document_count(&self) -> usize {
        self.state.lock().index.len()
    }

    /// Total size of the segment files in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.state.lock().segments.iter().map(|m| m.bytes).sum()
    }

    /// Field names of live segments.
    #[must_use]
    pub fn field_names(&self) -> BTreeSet<String> {
        BTreeSet::clone(&self.state.lock().fields)
    }

    /// Registered segment names in registry order.
    #[must_use]
    pub fn segment_names(&self) -> Vec<SegmentName> {
        self.state.lock().registry.names().to_vec()
    }

    /// Policy view of every segment.
    #[must_use]
    pub fn segment_stats(&self) -> Vec<SegmentStats> {
        let now = Instant::now();
        self.state.lock().segments.iter().map(|m| m.stats(now)).collect()
    }

    /// Number of merges run since open.
    #[must_use]
    pub fn merge_count(&self) -> u64 {
        self.state.lock().merges
    }

    /// Returns true until [`close`](Self::close) is called.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    /// Drops every segment.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is closed or the registry cannot be
    /// rewritten.
    pub fn clear(&self) -> IndexResult<()> {
        let mut state = self.state.lock();
        state.ensure_open()?;

        let names = state.registry.names().to_vec();
        state.registry.clear();
        state.registry.write()?;
        state.segments.clear();
        state.index = Arc::new(DocIndex::new());
        state.refresh_fields();

        for name in &names {
            if let Err(e) = self.locks.remove_directory(&self.root.join(name.as_str()), 0) {
                warn!(segment = %name, error = %e, "cannot remove cleared segment");
            }
        }
        info!(segments = names.len(), "persistent store cleared");
        Ok(())
    }

    /// Stops serving views and accepting writes.
    pub fn close(&self) {
        self.state.lock().open = false;
    }
}

fn load_segment(dir: &IndexDir, name: &SegmentName) -> IndexResult<(SegmentMeta, DocIndex)> {
    let path = dir.segment_dir(name).join(SEGMENT_DATA_FILE);
    if !path.is_file() {
        return Err(IndexError::index(format!(
            "registered segment {name} is missing"
        )));
    }

    let mut backend = FileBackend::open_existing(&path)?;
    let data = backend.read_all()?;
    let (records, valid) = scan_records(&data)?;
    if valid < data.len() as u64 {
        warn!(
            segment = %name,
            discarded = data.len() as u64 - valid,
            "truncating torn segment tail"
        );
        backend.truncate(valid)?;
    }

    let file = Arc::new(SegmentFile {
        name: name.clone(),
        backend: RwLock::new(backend),
    });
    let mut live = DocIndex::new();
    let mut fields = BTreeSet::new();
    for (offset, len, record) in records {
        if record.is_tombstone() {
            live.remove(&record.id);
            continue;
        }
        let doc = Document::decode(&record.payload)?;
        fields.extend(doc.field_names().map(str::to_string));
        live.insert(
            record.id,
            Location {
                segment: Arc::clone(&file),
                offset,
                len,
            },
        );
    }

    let meta = SegmentMeta {
        bytes: valid,
        file,
        live: live.len(),
        fields,
        last_modified: Instant::now(),
    };
    Ok((meta, live))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn doc(id: &str, body: &str) -> Document {
        Document::new(id).with_field("body", body)
    }

    fn open(dir: &IndexDir) -> PersistentStore {
        PersistentStore::open(
            dir,
            Arc::new(DirectoryLocks::new()),
            ThresholdPolicy::new().min_segments(100),
            true,
        )
        .unwrap()
    }

    fn adds(ids: &[&str]) -> IndexTransaction {
        IndexTransaction::from_parts(ids.iter().map(|id| doc(id, "v1")), [], []).unwrap()
    }

    #[test]
    fn applied_documents_survive_reopen() {
        let temp = tempdir().unwrap();
        {
            let dir = IndexDir::open(temp.path(), true).unwrap();
            let store = open(&dir);
            let report = store.apply(&adds(&["a", "b"])).unwrap();
            assert_eq!(report.added().len(), 2);
            assert_eq!(store.segment_names().len(), 1);
        }

        let dir = IndexDir::open(temp.path(), true).unwrap();
        let store = open(&dir);
        assert_eq!(store.document_count(), 2);
        let view = store.view().unwrap();
        assert_eq!(
            view.document(&DocumentId::from("a")).unwrap(),
            Some(doc("a", "v1"))
        );
        assert!(view.field_names().contains("body"));
    }

    #[test]
    fn removal_is_durable() {
        let temp = tempdir().unwrap();
        {
            let dir = IndexDir::open(temp.path(), true).unwrap();
            let store = open(&dir);
            store.apply(&adds(&["a", "b"])).unwrap();
            let txn = IndexTransaction::from_parts([], [], [DocumentId::from("a")]).unwrap();
            store.apply(&txn).unwrap();
            assert!(!store.contains(&DocumentId::from("a")));
        }

        let dir = IndexDir::open(temp.path(), true).unwrap();
        let store = open(&dir);
        assert!(!store.contains(&DocumentId::from("a")));
        assert!(store.contains(&DocumentId::from("b")));
    }

    #[test]
    fn update_replaces_body() {
        let temp = tempdir().unwrap();
        let dir = IndexDir::open(temp.path(), true).unwrap();
        let store = open(&dir);
        store.apply(&adds(&["a"])).unwrap();

        let txn = IndexTransaction::from_parts([], [doc("a", "v2")], []).unwrap();
        let report = store.apply(&txn).unwrap();
        assert!(report.updated().contains(&DocumentId::from("a")));
        assert_eq!(store.document_count(), 1);
        assert_eq!(
            store.view().unwrap().document(&DocumentId::from("a")).unwrap(),
            Some(doc("a", "v2"))
        );
    }

    #[test]
    fn views_are_point_in_time() {
        let temp = tempdir().unwrap();
        let dir = IndexDir::open(temp.path(), true).unwrap();
        let store = open(&dir);
        store.apply(&adds(&["a"])).unwrap();

        let view = store.view().unwrap();
        let txn = IndexTransaction::from_parts([], [], [DocumentId::from("a")]).unwrap();
        store.apply(&txn).unwrap();

        assert!(view.contains(&DocumentId::from("a")));
        assert!(view.document(&DocumentId::from("a")).unwrap().is_some());
        assert_eq!(store.view().unwrap().num_docs(), 0);
    }

    #[test]
    fn merge_policy_collapses_segments() {
        let temp = tempdir().unwrap();
        let dir = IndexDir::open(temp.path(), true).unwrap();
        let store = PersistentStore::open(
            &dir,
            Arc::new(DirectoryLocks::new()),
            ThresholdPolicy::new().min_segments(3),
            true,
        )
        .unwrap();

        store.apply(&adds(&["a"])).unwrap();
        store.apply(&adds(&["b"])).unwrap();
        let txn = IndexTransaction::from_parts([], [], [DocumentId::from("a")]).unwrap();
        store.apply(&txn).unwrap();
        assert_eq!(store.segment_names().len(), 2);

        store.apply(&adds(&["c"])).unwrap();

        let names = store.segment_names();
        assert_eq!(names.len(), 1);
        assert_eq!(store.merge_count(), 1);
        assert_eq!(store.document_count(), 2);
        assert_eq!(dir.list_segment_dirs().unwrap(), names);
        assert!(store.view().unwrap().document(&DocumentId::from("b")).unwrap().is_some());
    }

    #[test]
    fn unregistered_directories_are_removed_on_open() {
        let temp = tempdir().unwrap();
        let dir = IndexDir::open(temp.path(), true).unwrap();
        fs::create_dir(dir.path().join("_7")).unwrap();
        fs::write(dir.path().join("_7").join(SEGMENT_DATA_FILE), b"junk").unwrap();

        let store = open(&dir);
        assert!(!dir.path().join("_7").exists());
        assert_eq!(store.document_count(), 0);
    }

    #[test]
    fn torn_tail_is_truncated() {
        let temp = tempdir().unwrap();
        let name;
        {
            let dir = IndexDir::open(temp.path(), true).unwrap();
            let store = open(&dir);
            store.apply(&adds(&["a"])).unwrap();
            name = store.segment_names()[0].clone();
        }
        let path = temp.path().join(name.as_str()).join(SEGMENT_DATA_FILE);
        let clean_len = fs::metadata(&path).unwrap().len();
        let mut bytes = fs::read(&path).unwrap();
        bytes.extend_from_slice(&[40, 0, 0, 0, 0, 1]);
        fs::write(&path, bytes).unwrap();

        let dir = IndexDir::open(temp.path(), true).unwrap();
        let store = open(&dir);
        assert_eq!(store.document_count(), 1);
        assert_eq!(fs::metadata(&path).unwrap().len(), clean_len);
    }

    #[test]
    fn missing_registered_segment_is_fatal() {
        let temp = tempdir().unwrap();
        let name;
        {
            let dir = IndexDir::open(temp.path(), true).unwrap();
            let store = open(&dir);
            store.apply(&adds(&["a"])).unwrap();
            name = store.segment_names()[0].clone();
        }
        fs::remove_dir_all(temp.path().join(name.as_str())).unwrap();

        let dir = IndexDir::open(temp.path(), true).unwrap();
        let locks = Arc::new(DirectoryLocks::new());
        let err = PersistentStore::open(&dir, locks, ThresholdPolicy::new(), true).unwrap_err();
        assert!(matches!(err, IndexError::Index { .. }));
    }

    #[test]
    fn clear_drops_everything() {
        let temp = tempdir().unwrap();
        let dir = IndexDir::open(temp.path(), true).unwrap();
        let store = open(&dir);
        store.apply(&adds(&["a", "b"])).unwrap();

        store.clear().unwrap();
        assert_eq!(store.document_count(), 0);
        assert!(store.segment_names().is_empty());
        assert!(dir.list_segment_dirs().unwrap().is_empty());
        assert!(store.field_names().is_empty());
    }

    #[test]
    fn closed_store_has_no_view() {
        let temp = tempdir().unwrap();
        let dir = IndexDir::open(temp.path(), true).unwrap();
        let store = open(&dir);
        store.close();

        assert!(store.view().is_none());
        assert!(store.apply(&adds(&["a"])).is_err());
    }
}
