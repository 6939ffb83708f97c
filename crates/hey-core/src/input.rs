//! Input types describing one invocation: which context, what to do with
//! it, and the per-invocation config overrides.

use crate::config::Overrides;
use crate::context::ContextId;
use crate::store::ListRange;

/// Which context an invocation operates on.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ContextSelection {
    /// Whatever the active pointer names (`continue` creates one if unset).
    #[default]
    Active,
    /// `--context ID`
    Explicit(ContextId),
    /// `--new [TITLE]`: create a fresh context and make it active.
    New { title: Option<String> },
}

/// What operation to perform (mutually exclusive commands).
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Send a prompt and stream the reply.
    SendPrompt { prompt: String },
    /// Re-request a reply for the log as it stands (`--retry`).
    Retry,
    /// Show the message log (`--history`).
    ShowHistory,
    /// List contexts (`--list [RANGE]`).
    ListContexts { range: Option<ListRange> },
    /// Search titles and messages (`--search KEYWORD`).
    Search { keyword: String },
    /// Set the active context (`--switch ID`).
    Switch { id: ContextId },
    /// Delete the selected context (`--delete`).
    Delete,
    /// Retitle the selected context (`--rename TITLE`).
    Rename { title: String },
    /// Drop the last turn (`--undo`).
    Undo,
    /// Rebuild the index from the record files (`--reindex`).
    Reindex,
    /// No operation: selection side effects only (e.g. a bare `--new`).
    NoOp,
}

/// A fully parsed invocation, independent of how it was entered.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub selection: ContextSelection,
    pub command: Command,
    pub overrides: Overrides,
}

impl Invocation {
    pub fn new(command: Command) -> Self {
        Self {
            selection: ContextSelection::Active,
            command,
            overrides: Overrides::default(),
        }
    }

    pub fn with_selection(mut self, selection: ContextSelection) -> Self {
        self.selection = selection;
        self
    }

    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Whether the command needs a context to operate on.
    pub fn needs_context(&self) -> bool {
        !matches!(
            self.command,
            Command::ListContexts { .. }
                | Command::Search { .. }
                | Command::Switch { .. }
                | Command::Reindex
                | Command::NoOp
        )
    }
}
