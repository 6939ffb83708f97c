//! The completion capability the orchestrator drives.

use crate::config::CompletionConfig;
use crate::context::Message;
use crate::error::ProviderError;
use futures_util::stream::BoxStream;
use std::future::Future;

/// Lazy, finite, non-restartable sequence of reply fragments.
pub type DeltaStream = BoxStream<'static, Result<String, ProviderError>>;

/// What a provider hands back for one request.
pub enum Completion {
    /// The whole reply at once.
    Text(String),
    /// Reply fragments as they are generated.
    Stream(DeltaStream),
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Completion::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Completion::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// A remote (or scripted) language-model completion endpoint.
///
/// Providers never retry; transient failures are surfaced to the caller.
pub trait CompletionProvider {
    /// Request a completion for `messages`, streaming if `config.stream` is set.
    fn complete(
        &self,
        messages: &[Message],
        config: &CompletionConfig,
    ) -> impl Future<Output = Result<Completion, ProviderError>>;
}
