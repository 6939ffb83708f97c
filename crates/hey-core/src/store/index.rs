//! The context index: a compact catalog of every context, so listing and
//! switching never have to deserialize full message logs.
//!
//! The index is denormalized and always rebuildable from the record files.

use crate::context::{ContextId, ContextRecord, Role, first_line_truncated};
use crate::error::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::str::FromStr;

type StoreResult<T> = Result<T, StoreError>;

const INDEX_VERSION: u32 = 1;
const EXCERPT_MAX_CHARS: usize = 80;

/// Projection of a [`ContextRecord`] kept in the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: ContextId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub message_count: usize,
    /// First line of the first non-system message.
    #[serde(default)]
    pub excerpt: String,
}

impl IndexEntry {
    pub fn from_record(record: &ContextRecord) -> Self {
        let excerpt = record
            .messages
            .iter()
            .find(|m| m.role != Role::System)
            .map(|m| first_line_truncated(&m.content, EXCERPT_MAX_CHARS))
            .unwrap_or_default();
        Self {
            id: record.id,
            title: record.title.clone(),
            created_at: record.created_at,
            updated_at: record.updated_at,
            message_count: record.messages.len(),
            excerpt,
        }
    }

    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("(untitled)")
    }
}

/// Most recently updated first, ties broken by id (descending) for determinism.
pub(crate) fn recency_order(a: &IndexEntry, b: &IndexEntry) -> Ordering {
    b.updated_at
        .cmp(&a.updated_at)
        .then_with(|| b.id.cmp(&a.id))
}

/// On-disk shape of `index.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct ContextIndex {
    version: u32,
    /// Highest id ever handed out, 0 before the first. Ids of deleted
    /// contexts stay at or below it and are never reused.
    #[serde(default)]
    last_id: u64,
    entries: Vec<IndexEntry>,
}

impl ContextIndex {
    pub(crate) fn from_entries(mut entries: Vec<IndexEntry>) -> Self {
        entries.sort_by(recency_order);
        Self {
            version: INDEX_VERSION,
            last_id: 0,
            entries,
        }
    }

    pub(crate) fn is_current_version(&self) -> bool {
        self.version == INDEX_VERSION
    }

    pub(crate) fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub(crate) fn into_entries(self) -> Vec<IndexEntry> {
        self.entries
    }

    /// Hand out a fresh id above every id this index has seen and above
    /// `on_disk`, the highest record id found in the contexts directory.
    pub(crate) fn allocate_id(&mut self, on_disk: Option<ContextId>) -> StoreResult<ContextId> {
        let last = (self.last_id > 0).then(|| ContextId::new(self.last_id));
        let max_entry = self.entries.iter().map(|e| e.id).max();
        let highest = [last, max_entry, on_disk].into_iter().flatten().max();
        let id = match highest {
            Some(highest) => highest.next().ok_or(StoreError::IdsExhausted)?,
            None => ContextId::new(1),
        };
        self.last_id = id.get();
        Ok(id)
    }

    /// Keep the id high-water mark of an index this one replaces.
    pub(crate) fn inherit_last_id(&mut self, previous: &ContextIndex) {
        self.last_id = self.last_id.max(previous.last_id);
    }

    /// Insert or replace the entry for `entry.id`, keeping recency order.
    pub(crate) fn upsert(&mut self, entry: IndexEntry) {
        self.entries.retain(|e| e.id != entry.id);
        let pos = self
            .entries
            .binary_search_by(|probe| recency_order(probe, &entry))
            .unwrap_or_else(|p| p);
        self.entries.insert(pos, entry);
        self.version = INDEX_VERSION;
    }

    pub(crate) fn remove(&mut self, id: ContextId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        self.entries.len() != before
    }
}

/// A slice of the recency-ordered listing, written `start:end`.
///
/// Follows slice notation: either bound may be omitted, negative bounds
/// count from the end, and out-of-range bounds clamp instead of failing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListRange {
    pub start: Option<i64>,
    pub end: Option<i64>,
}

impl ListRange {
    pub fn new(start: Option<i64>, end: Option<i64>) -> Self {
        Self { start, end }
    }

    /// Resolve to concrete `start..end` positions for a listing of `len` items.
    pub fn bounds(&self, len: usize) -> (usize, usize) {
        let len_i = len as i64;
        let clamp = |bound: i64| -> usize {
            let resolved = if bound < 0 { len_i + bound } else { bound };
            resolved.clamp(0, len_i) as usize
        };
        let start = self.start.map(clamp).unwrap_or(0);
        let end = self.end.map(clamp).unwrap_or(len);
        (start, end.max(start))
    }

    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        let (start, end) = self.bounds(items.len());
        items.into_iter().skip(start).take(end - start).collect()
    }
}

impl FromStr for ListRange {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || StoreError::InvalidRange(s.to_string());
        let (start, end) = s.trim().split_once(':').ok_or_else(invalid)?;
        if end.contains(':') {
            return Err(invalid());
        }
        let parse = |part: &str| -> Result<Option<i64>, StoreError> {
            let part = part.trim();
            if part.is_empty() {
                Ok(None)
            } else {
                part.parse::<i64>().map(Some).map_err(|_| invalid())
            }
        };
        Ok(ListRange {
            start: parse(start)?,
            end: parse(end)?,
        })
    }
}
