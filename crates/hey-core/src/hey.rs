//! High-level facade for embedding hey.
//!
//! The `Hey` struct ties the context store and the loaded config together
//! and exposes the operations the command line offers: start, continue and
//! inspect conversations without touching store internals.
//!
//! # Example
//!
//! ```no_run
//! // Requires a reachable OpenAI-compatible endpoint.
//! use hey_core::api::{CollectingSink, OpenAiProvider};
//! use hey_core::config::Overrides;
//! use hey_core::Hey;
//!
//! #[tokio::main]
//! async fn main() -> hey_core::Result<()> {
//!     let hey = Hey::load()?;
//!     let (record, _created) = hey.resolve_or_create(None, None)?;
//!
//!     let provider = OpenAiProvider::new();
//!     let mut sink = CollectingSink::new();
//!     hey.continue_context(
//!         record,
//!         "Hello!",
//!         &Overrides::default(),
//!         &provider,
//!         &mut sink,
//!         std::future::pending(),
//!     )
//!     .await?;
//!
//!     println!("Response: {}", sink.text);
//!     Ok(())
//! }
//! ```

use std::future::Future;
use std::path::{Path, PathBuf};

use log::debug;

use crate::api::{CompletionOrchestrator, CompletionProvider, ResponseSink, TurnOutcome, TurnStatus};
use crate::api::undo_turn;
use crate::config::{Config, Overrides, resolve_home};
use crate::context::{ContextId, ContextRecord, Message, Role};
use crate::error::{Error, Result};
use crate::store::{ContextStore, IndexEntry, ListRange, SearchHit, StorePaths};

/// Options for loading a Hey instance.
///
/// ```
/// use hey_core::LoadOptions;
/// use std::path::PathBuf;
///
/// let opts = LoadOptions {
///     home: Some(PathBuf::from("/tmp/hey")),
///     ..Default::default()
/// };
/// assert!(opts.config_path.is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Override the hey home directory.
    /// If `None`, uses `HEY_HOME` env var or `~/.hey`.
    pub home: Option<PathBuf>,
    /// Read the config from this file instead of `<home>/config.toml`.
    /// Unlike the default location, this file must exist.
    pub config_path: Option<PathBuf>,
}

/// High-level facade over the context store and config.
pub struct Hey {
    pub store: ContextStore,
    pub config: Config,
}

impl Hey {
    /// Load hey from the default home directory.
    pub fn load() -> Result<Self> {
        Self::load_with_options(LoadOptions::default())
    }

    pub fn load_with_options(options: LoadOptions) -> Result<Self> {
        let home = resolve_home(options.home)?;
        let config = match &options.config_path {
            Some(path) => Config::load(path)?,
            None => Config::load_from_home(&home)?,
        };
        let store = ContextStore::open(&home)?;
        Ok(Self::from_parts(store, config))
    }

    pub fn from_parts(store: ContextStore, config: Config) -> Self {
        Self { store, config }
    }

    pub fn home_dir(&self) -> &Path {
        self.store.root()
    }

    // === Context selection ===

    /// Create a context seeded with its profile's prompt and make it active.
    pub fn new_context(
        &self,
        title: Option<String>,
        profile: Option<&str>,
    ) -> Result<ContextRecord> {
        let profile = self.config.choose_profile(profile, None)?;
        let prompt = self.config.prompt_messages(&profile)?;
        let title = title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        let record = self.store.create_with_prompt(title, &profile, prompt)?;
        self.store.set_active(record.id)?;
        debug!("new context {} (profile '{}')", record.id, profile);
        Ok(record)
    }

    /// Load `id`, or the active context when `id` is `None`.
    pub fn resolve(&self, id: Option<ContextId>) -> Result<ContextRecord> {
        let id = match id {
            Some(id) => id,
            None => self.store.active()?.ok_or(Error::NoActiveContext)?,
        };
        Ok(self.store.load(id)?)
    }

    /// Like [`Hey::resolve`], but start a new context when nothing is active.
    /// The flag is `true` when a context was created.
    pub fn resolve_or_create(
        &self,
        id: Option<ContextId>,
        profile: Option<&str>,
    ) -> Result<(ContextRecord, bool)> {
        match self.resolve(id) {
            Ok(record) => Ok((record, false)),
            Err(Error::NoActiveContext) => Ok((self.new_context(None, profile)?, true)),
            Err(e) => Err(e),
        }
    }

    pub fn active(&self) -> Result<Option<ContextId>> {
        Ok(self.store.active()?)
    }

    // === Turns ===

    /// Append `input` to `record`, stream the reply into `sink` and persist
    /// the result.
    ///
    /// Whatever the turn appended is saved even when it fails, and the
    /// context becomes the active one. A turn that did not complete is
    /// returned as [`Error::Turn`] naming what was saved.
    pub async fn continue_context<P, C>(
        &self,
        mut record: ContextRecord,
        input: &str,
        overrides: &Overrides,
        provider: &P,
        sink: &mut dyn ResponseSink,
        cancel: C,
    ) -> Result<ContextRecord>
    where
        P: CompletionProvider,
        C: Future<Output = ()>,
    {
        let profile = self
            .config
            .choose_profile(overrides.profile.as_deref(), Some(&record.profile))?;
        let completion = self.config.resolve(&profile, overrides)?;
        record.profile = profile;

        let outcome = CompletionOrchestrator::new(provider)
            .rollback_on_failure(self.config.rollback_on_failure)
            .run_turn(record, input, &completion, sink, cancel)
            .await;
        self.finish_turn(outcome)
    }

    /// Ask again for a reply to the log as it stands.
    ///
    /// A trailing assistant message (typically a partial one) is replaced.
    /// The log must then end with a user message.
    pub async fn retry<P, C>(
        &self,
        mut record: ContextRecord,
        overrides: &Overrides,
        provider: &P,
        sink: &mut dyn ResponseSink,
        cancel: C,
    ) -> Result<ContextRecord>
    where
        P: CompletionProvider,
        C: Future<Output = ()>,
    {
        if record.messages.last().is_some_and(|m| m.role == Role::Assistant) {
            record.messages.pop();
        }
        if !record.messages.last().is_some_and(|m| m.role == Role::User) {
            return Err(Error::NothingToRetry(record.id));
        }
        self.continue_context(record, "", overrides, provider, sink, cancel)
            .await
    }

    fn finish_turn(&self, outcome: TurnOutcome) -> Result<ContextRecord> {
        if outcome.modified() {
            self.store.save(&outcome.record)?;
        }
        self.store.set_active(outcome.record.id)?;

        match outcome.status {
            TurnStatus::Completed => Ok(outcome.record),
            TurnStatus::Partial { cause } | TurnStatus::NoReply { cause } => Err(Error::Turn {
                context: outcome.record.id,
                cause,
                user_saved: outcome.user_appended,
                assistant_saved: outcome.assistant_appended,
            }),
        }
    }

    // === Catalog ===

    pub fn history(&self, id: Option<ContextId>) -> Result<ContextRecord> {
        self.resolve(id)
    }

    pub fn list(&self, range: Option<ListRange>) -> Result<Vec<IndexEntry>> {
        Ok(self.store.list(range)?)
    }

    pub fn search(&self, keyword: &str) -> Result<Vec<SearchHit>> {
        Ok(self.store.search_hits(keyword)?)
    }

    pub fn switch(&self, id: ContextId) -> Result<()> {
        Ok(self.store.set_active(id)?)
    }

    /// Delete `id`, or the active context. Returns the id that was deleted.
    pub fn delete(&self, id: Option<ContextId>) -> Result<ContextId> {
        let id = match id {
            Some(id) => id,
            None => self.store.active()?.ok_or(Error::NoActiveContext)?,
        };
        self.store.delete(id)?;
        Ok(id)
    }

    pub fn rename(&self, id: Option<ContextId>, title: &str) -> Result<ContextRecord> {
        let record = self.resolve(id)?;
        Ok(self.store.rename(record.id, title)?)
    }

    /// Drop the last turn and persist. Returns the record and what was removed.
    pub fn undo(&self, id: Option<ContextId>) -> Result<(ContextRecord, Vec<Message>)> {
        let mut record = self.resolve(id)?;
        let removed = undo_turn(&mut record);
        if !removed.is_empty() {
            self.store.save(&record)?;
        }
        Ok((record, removed))
    }

    pub fn rebuild_index(&self) -> Result<usize> {
        Ok(self.store.rebuild_index()?)
    }
}
