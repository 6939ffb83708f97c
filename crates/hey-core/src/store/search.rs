//! Keyword search over titles and message contents.
//!
//! A full scan of the persisted logs. Matching is case-insensitive plain
//! substring; an empty keyword matches everything.

use super::index::IndexEntry;
use crate::context::{ContextRecord, Role};

/// Chars of lead-in kept before a match in a snippet.
const SNIPPET_LEAD_CHARS: usize = 10;
/// Longest snippet body, in chars.
const SNIPPET_MAX_CHARS: usize = 100;

/// A context matching a search, with excerpts of the matching messages.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub entry: IndexEntry,
    pub snippets: Vec<Snippet>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Snippet {
    pub role: Role,
    pub text: String,
}

pub(crate) struct Matcher {
    needle: String,
}

impl Matcher {
    pub(crate) fn new(keyword: &str) -> Self {
        Self {
            needle: keyword.to_lowercase(),
        }
    }

    fn matches_all(&self) -> bool {
        self.needle.is_empty()
    }

    fn find(&self, haystack: &str) -> Option<usize> {
        if self.matches_all() {
            return None;
        }
        haystack.to_lowercase().find(&self.needle)
    }

    /// Match a record, returning `None` if neither its title nor any message contains the keyword.
    /// An empty keyword matches every record, without snippets.
    pub(crate) fn hit(&self, record: &ContextRecord) -> Option<SearchHit> {
        let title_match = record
            .title
            .as_deref()
            .is_some_and(|t| self.find(t).is_some());

        let snippets: Vec<Snippet> = record
            .messages
            .iter()
            .filter_map(|m| {
                self.find(&m.content).map(|pos| Snippet {
                    role: m.role,
                    text: snippet_around(&m.content, pos),
                })
            })
            .collect();

        if self.matches_all() || title_match || !snippets.is_empty() {
            Some(SearchHit {
                entry: IndexEntry::from_record(record),
                snippets,
            })
        } else {
            None
        }
    }
}

/// Window of `content` around a match found at byte offset `lower_pos` of
/// its lowercased form, flattened onto one line.
fn snippet_around(content: &str, lower_pos: usize) -> String {
    // Lowercasing can change byte lengths for some scripts; offsets into the
    // lowercased text then do not map back, so fall back to the start.
    let start_char = if content.to_lowercase().len() == content.len() {
        content
            .get(..lower_pos)
            .map(|before| before.chars().count().saturating_sub(SNIPPET_LEAD_CHARS))
            .unwrap_or(0)
    } else {
        0
    };

    let body: String = content
        .chars()
        .skip(start_char)
        .take(SNIPPET_MAX_CHARS)
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect();
    let truncated = content.chars().count() > start_char + SNIPPET_MAX_CHARS;

    let mut text = String::new();
    if start_char > 0 {
        text.push_str("...");
    }
    text.push_str(body.trim());
    if truncated {
        text.push_str("...");
    }
    text
}
