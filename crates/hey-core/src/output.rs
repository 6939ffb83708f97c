use crate::context::{ContextId, ContextRecord};
use crate::store::{IndexEntry, SearchHit};

/// Semantic events emitted on the command path (non-streaming).
///
/// Core emits all variants unconditionally; clients decide which to display
/// and how to format them.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandEvent {
    /// A new context was created and made active.
    ContextCreated {
        id: ContextId,
        title: Option<String>,
    },
    /// The active pointer now names `id`.
    Switched { id: ContextId },
    Deleted { id: ContextId },
    Renamed { id: ContextId, title: Option<String> },
    /// The last turn was removed.
    Undone { id: ContextId, removed: usize },
    /// Undo found nothing to remove.
    NothingToUndo { id: ContextId },
    /// The index was rebuilt from the record files.
    Reindexed { count: usize },
}

/// Abstraction over how command results are presented.
///
/// hey-cli implements this with `OutputHandler` (tables and text on stdout,
/// notices on stderr).
pub trait OutputSink {
    /// Emit a typed command-path event. Clients filter and format as appropriate.
    fn emit_event(&self, event: CommandEvent);

    /// Show a context's full message log.
    fn emit_history(&self, record: &ContextRecord);

    /// Show a listing of contexts; `active` is marked if present.
    fn emit_listing(&self, entries: &[IndexEntry], active: Option<ContextId>);

    /// Show search results for `keyword`.
    fn emit_search(&self, keyword: &str, hits: &[SearchHit]);
}

/// Output sink that records everything it is given, for tests.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct CaptureSink {
    pub events: std::cell::RefCell<Vec<CommandEvent>>,
    pub histories: std::cell::RefCell<Vec<ContextRecord>>,
    pub listings: std::cell::RefCell<Vec<(Vec<IndexEntry>, Option<ContextId>)>>,
    pub searches: std::cell::RefCell<Vec<(String, Vec<SearchHit>)>>,
}

#[cfg(test)]
impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
impl OutputSink for CaptureSink {
    fn emit_event(&self, event: CommandEvent) {
        self.events.borrow_mut().push(event);
    }
    fn emit_history(&self, record: &ContextRecord) {
        self.histories.borrow_mut().push(record.clone());
    }
    fn emit_listing(&self, entries: &[IndexEntry], active: Option<ContextId>) {
        self.listings.borrow_mut().push((entries.to_vec(), active));
    }
    fn emit_search(&self, keyword: &str, hits: &[SearchHit]) {
        self.searches
            .borrow_mut()
            .push((keyword.to_string(), hits.to_vec()));
    }
}
