//! Durable context storage.
//!
//! One self-describing JSON record per context under `contexts/`, a
//! denormalized `index.json` catalog for fast listing, and the
//! `active_context` pointer. Every write is an atomic replace.
//!
//! Ordering rules that keep the index honest across crashes:
//! - `save` writes the record first, then the index entry.
//! - `delete` drops the index entry first, then the record.
//!
//! So the index can be stale but never names a record that does not exist.
//! Staleness is detected and repaired before the first `list`/`search`.

mod active;
mod index;
mod paths;
mod search;

#[cfg(test)]
mod tests;

pub use active::ActivePointer;
pub use index::{IndexEntry, ListRange};
pub use paths::StorePaths;
pub use search::{SearchHit, Snippet};

use crate::context::{ContextId, ContextRecord, Message};
use crate::error::StoreError;
use crate::safe_io::{FileLock, atomic_write_json, remove_if_exists};
use index::{ContextIndex, recency_order};
use log::{debug, warn};
use paths::id_from_record_path;
use search::Matcher;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

type StoreResult<T> = Result<T, StoreError>;

/// Repository of context records rooted at the hey home directory.
#[derive(Debug, Clone)]
pub struct ContextStore {
    root: PathBuf,
    active: ActivePointer,
}

impl StorePaths for ContextStore {
    fn root(&self) -> &Path {
        &self.root
    }
}

impl ContextStore {
    /// Open (creating if needed) the store at `root`.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root: PathBuf = root.into();
        let active = ActivePointer::new(root.active_file());
        let store = Self { root, active };
        let contexts_dir = store.contexts_dir();
        fs::create_dir_all(&contexts_dir).map_err(|e| StoreError::io(&contexts_dir, e))?;
        debug!("opened context store at {}", store.root.display());
        Ok(store)
    }

    // === Records ===

    /// Create and persist a new, empty context.
    pub fn create(&self, title: Option<String>, profile: &str) -> StoreResult<ContextRecord> {
        self.create_with_prompt(title, profile, Vec::new())
    }

    /// Create and persist a new context seeded with priming messages.
    ///
    /// The id is allocated under the index lock, above every id the index has
    /// ever handed out and every record file on disk. Ids are never reused,
    /// so a late save to a deleted context cannot land on a new one.
    pub fn create_with_prompt(
        &self,
        title: Option<String>,
        profile: &str,
        prompt: Vec<Message>,
    ) -> StoreResult<ContextRecord> {
        let _lock = self.lock_index()?;
        let mut index = self.index_for_update()?;

        let on_disk = self.scan_record_files()?.into_keys().max();
        let id = index.allocate_id(on_disk)?;

        let mut record = ContextRecord::new(id, title, profile);
        for message in prompt {
            record.messages.push(message);
        }

        self.write_record(&record)?;
        index.upsert(IndexEntry::from_record(&record));
        self.write_index(&index)?;
        debug!("created context {}", id);
        Ok(record)
    }

    pub fn exists(&self, id: ContextId) -> bool {
        self.record_file(id).is_file()
    }

    /// Load a record straight from its file. The index is not consulted.
    pub fn load(&self, id: ContextId) -> StoreResult<ContextRecord> {
        let path = self.record_file(id);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(id));
            }
            Err(e) => return Err(StoreError::io(&path, e)),
        };
        serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupt { path, source })
    }

    /// Persist a record, then bring its index entry up to date.
    pub fn save(&self, record: &ContextRecord) -> StoreResult<()> {
        self.write_record(record)?;

        let _lock = self.lock_index()?;
        let mut index = self.index_for_update()?;
        index.upsert(IndexEntry::from_record(record));
        self.write_index(&index)?;
        debug!(
            "saved context {} ({} messages)",
            record.id,
            record.messages.len()
        );
        Ok(())
    }

    /// Delete a context. Clears the active pointer if it pointed here.
    pub fn delete(&self, id: ContextId) -> StoreResult<()> {
        if !self.exists(id) {
            return Err(StoreError::NotFound(id));
        }

        {
            let _lock = self.lock_index()?;
            let mut index = self.index_for_update()?;
            index.remove(id);
            self.write_index(&index)?;

            let path = self.record_file(id);
            remove_if_exists(&path).map_err(|e| StoreError::io(&path, e))?;
        }

        if self.active_pointer_raw()? == Some(id) {
            self.clear_active()?;
        }
        debug!("deleted context {}", id);
        Ok(())
    }

    /// Change a context's title. A blank title removes it.
    pub fn rename(&self, id: ContextId, title: &str) -> StoreResult<ContextRecord> {
        let mut record = self.load(id)?;
        let title = title.trim();
        record.title = (!title.is_empty()).then(|| title.to_string());
        self.save(&record)?;
        Ok(record)
    }

    // === Listing and search ===

    /// Index entries, most recently updated first, optionally sliced.
    pub fn list(&self, range: Option<ListRange>) -> StoreResult<Vec<IndexEntry>> {
        let entries = self.healthy_index()?.into_entries();
        Ok(match range {
            Some(range) => range.apply(entries),
            None => entries,
        })
    }

    /// Contexts whose title or messages contain `keyword`, case-insensitively.
    pub fn search(&self, keyword: &str) -> StoreResult<Vec<IndexEntry>> {
        Ok(self
            .search_hits(keyword)?
            .into_iter()
            .map(|hit| hit.entry)
            .collect())
    }

    /// Like [`ContextStore::search`], with snippets of the matching messages.
    pub fn search_hits(&self, keyword: &str) -> StoreResult<Vec<SearchHit>> {
        let index = self.healthy_index()?;
        let matcher = Matcher::new(keyword);

        let mut hits = Vec::new();
        for entry in index.entries() {
            match self.load(entry.id) {
                Ok(record) => hits.extend(matcher.hit(&record)),
                // Deleted by another process since the index was read.
                Err(StoreError::NotFound(_)) => continue,
                Err(e @ StoreError::Corrupt { .. }) => warn!("search skipped {}", e),
                Err(e) => return Err(e),
            }
        }
        hits.sort_by(|a, b| recency_order(&a.entry, &b.entry));
        Ok(hits)
    }

    /// Rebuild the index from the record files. Returns the number of contexts indexed.
    pub fn rebuild_index(&self) -> StoreResult<usize> {
        let _lock = self.lock_index()?;
        let previous = self.read_index()?;
        let index = self.index_from_records(previous.as_ref())?;
        self.write_index(&index)?;
        Ok(index.entries().len())
    }

    // === Active pointer ===

    /// The active context, if set and still present.
    pub fn active(&self) -> StoreResult<Option<ContextId>> {
        Ok(self.active_pointer_raw()?.filter(|id| {
            let present = self.exists(*id);
            if !present {
                debug!("active context {} no longer exists", id);
            }
            present
        }))
    }

    pub fn set_active(&self, id: ContextId) -> StoreResult<()> {
        if !self.exists(id) {
            return Err(StoreError::NotFound(id));
        }
        self.active
            .set(id)
            .map_err(|e| StoreError::io(self.active.path(), e))
    }

    pub fn clear_active(&self) -> StoreResult<()> {
        self.active
            .clear()
            .map_err(|e| StoreError::io(self.active.path(), e))
    }

    fn active_pointer_raw(&self) -> StoreResult<Option<ContextId>> {
        self.active
            .get()
            .map_err(|e| StoreError::io(self.active.path(), e))
    }

    // === Internals ===

    fn lock_index(&self) -> StoreResult<FileLock> {
        let path = self.index_lock_file();
        FileLock::acquire(&path).map_err(|e| StoreError::io(&path, e))
    }

    fn write_record(&self, record: &ContextRecord) -> StoreResult<()> {
        let path = self.record_file(record.id);
        atomic_write_json(&path, record).map_err(|e| StoreError::io(&path, e))
    }

    fn write_index(&self, index: &ContextIndex) -> StoreResult<()> {
        let path = self.index_file();
        atomic_write_json(&path, index).map_err(|e| StoreError::io(&path, e))
    }

    /// The index as stored, or `None` if it is missing, unparsable or from
    /// another format version.
    fn read_index(&self) -> StoreResult<Option<ContextIndex>> {
        let path = self.index_file();
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(&path, e)),
        };
        match serde_json::from_slice::<ContextIndex>(&bytes) {
            Ok(index) if index.is_current_version() => Ok(Some(index)),
            Ok(_) => {
                warn!("context index has an unknown version, rebuilding");
                Ok(None)
            }
            Err(e) => {
                warn!("context index is unreadable, rebuilding: {}", e);
                Ok(None)
            }
        }
    }

    /// Starting point for a read-modify-write of the index. Caller holds the lock.
    fn index_for_update(&self) -> StoreResult<ContextIndex> {
        match self.read_index()? {
            Some(index) => Ok(index),
            None => self.index_from_records(None),
        }
    }

    /// Record ids on disk with their modification times.
    fn scan_record_files(&self) -> StoreResult<HashMap<ContextId, SystemTime>> {
        let dir = self.contexts_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(StoreError::io(&dir, e)),
        };

        let mut found = HashMap::new();
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(id) = id_from_record_path(&path) else {
                continue;
            };
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .map_err(|e| StoreError::io(&path, e))?;
            found.insert(id, modified);
        }
        Ok(found)
    }

    /// A fresh index built from the record files, keeping the id high-water
    /// mark of `previous` when the index being replaced is still readable.
    fn index_from_records(&self, previous: Option<&ContextIndex>) -> StoreResult<ContextIndex> {
        let mut entries = Vec::new();
        for id in self.scan_record_files()?.into_keys() {
            match self.load(id) {
                Ok(record) => entries.push(IndexEntry::from_record(&record)),
                Err(StoreError::NotFound(_)) => continue,
                Err(e @ (StoreError::Corrupt { .. } | StoreError::Io { .. })) => {
                    warn!("index rebuild skipped {}", e);
                }
                Err(e) => return Err(e),
            }
        }
        debug!("rebuilt context index with {} entries", entries.len());
        let mut index = ContextIndex::from_entries(entries);
        if let Some(previous) = previous {
            index.inherit_last_id(previous);
        }
        Ok(index)
    }

    /// The index, rebuilt first if it disagrees with the record files.
    fn healthy_index(&self) -> StoreResult<ContextIndex> {
        let on_disk = self.scan_record_files()?;
        if let Some(index) = self.read_index()?
            && self.index_matches(&index, &on_disk)?
        {
            return Ok(index);
        }

        let _lock = self.lock_index()?;
        // Another process may have repaired it while we waited.
        let on_disk = self.scan_record_files()?;
        let current = self.read_index()?;
        if let Some(index) = &current
            && self.index_matches(index, &on_disk)?
        {
            return Ok(index.clone());
        }
        warn!("context index is stale, rebuilding");
        let index = self.index_from_records(current.as_ref())?;
        self.write_index(&index)?;
        Ok(index)
    }

    /// True when the index names exactly the records on disk and no record
    /// was written after the index.
    fn index_matches(
        &self,
        index: &ContextIndex,
        on_disk: &HashMap<ContextId, SystemTime>,
    ) -> StoreResult<bool> {
        if index.entries().len() != on_disk.len()
            || index.entries().iter().any(|e| !on_disk.contains_key(&e.id))
        {
            return Ok(false);
        }

        let path = self.index_file();
        let index_modified = fs::metadata(&path)
            .and_then(|m| m.modified())
            .map_err(|e| StoreError::io(&path, e))?;
        Ok(on_disk.values().all(|modified| *modified <= index_modified))
    }
}
