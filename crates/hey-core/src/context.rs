//! Conversation data model: messages, the per-context message log, and the
//! persisted context record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

/// Longest auto-assigned title, in chars.
const AUTO_TITLE_MAX_CHARS: usize = 50;

pub fn now_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Opaque context identifier. Shown to users as a plain number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(u64);

impl ContextId {
    pub fn new(raw: u64) -> Self {
        ContextId(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }

    /// The id following this one, or `None` at the end of the id space.
    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(ContextId)
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for ContextId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(ContextId)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One turn fragment. Never edited after it is written; only undo removes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Reply cut short by a failed or interrupted stream.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub partial: bool,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: now_timestamp(),
            partial: false,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn partial_assistant(content: impl Into<String>) -> Self {
        Self {
            partial: true,
            ..Self::assistant(content)
        }
    }
}

/// Ordered messages of one context. Append-only apart from [`MessageLog::undo_last_turn`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageLog(Vec<Message>);

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.0.push(message);
    }

    pub fn pop(&mut self) -> Option<Message> {
        self.0.pop()
    }

    pub fn last(&self) -> Option<&Message> {
        self.0.last()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Message] {
        &self.0
    }

    /// Drop the most recent turn and return the removed messages, oldest first.
    ///
    /// A trailing `(user, assistant)` pair goes together. A lone trailing
    /// assistant or user message (left behind by a crash or a failed request)
    /// goes on its own. Priming system messages are never removed, so the
    /// call is a no-op on an empty log or one that ends in a system message.
    pub fn undo_last_turn(&mut self) -> Vec<Message> {
        let trailing = match self.0.last().map(|m| m.role) {
            Some(Role::Assistant) => {
                let n = self.0.len();
                if n >= 2 && self.0[n - 2].role == Role::User {
                    2
                } else {
                    1
                }
            }
            Some(Role::User) => 1,
            Some(Role::System) | None => 0,
        };
        let keep = self.0.len() - trailing;
        self.0.split_off(keep)
    }
}

impl<'a> IntoIterator for &'a MessageLog {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl From<Vec<Message>> for MessageLog {
    fn from(messages: Vec<Message>) -> Self {
        MessageLog(messages)
    }
}

/// A conversation and its metadata. The unit of persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextRecord {
    pub id: ContextId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Name of the profile last used to talk to this context.
    pub profile: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub messages: MessageLog,
}

impl ContextRecord {
    pub fn new(id: ContextId, title: Option<String>, profile: impl Into<String>) -> Self {
        let now = now_timestamp();
        Self {
            id,
            title: title.filter(|t| !t.trim().is_empty()),
            profile: profile.into(),
            created_at: now,
            updated_at: now,
            messages: MessageLog::new(),
        }
    }

    /// Bump `updated_at`, never moving it backwards.
    pub fn touch(&mut self) {
        let now = now_timestamp();
        if now > self.updated_at {
            self.updated_at = now;
        }
    }

    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("(untitled)")
    }

    /// Title an untitled context after the first line of its first user message.
    pub fn assign_auto_title(&mut self) {
        if self.title.is_some() {
            return;
        }
        let first_user = self
            .messages
            .iter()
            .find(|m| m.role == Role::User)
            .map(|m| first_line_truncated(&m.content, AUTO_TITLE_MAX_CHARS));
        if let Some(title) = first_user.filter(|t| !t.is_empty()) {
            self.title = Some(title);
        }
    }
}

/// First non-blank line of `text`, cut to `max_chars` with a trailing `...`.
pub fn first_line_truncated(text: &str, max_chars: usize) -> String {
    let line = text
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("");
    if line.chars().count() <= max_chars {
        line.to_string()
    } else {
        let cut: String = line.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", cut.trim_end())
    }
}
