//! Response sink abstraction for decoupling completion from presentation.
//!
//! The orchestrator emits events through [`ResponseSink`] without knowing
//! whether they end up on a terminal, in a buffer, or nowhere.

use std::io;

/// Events emitted while a reply is being produced.
#[derive(Debug, Clone)]
pub enum ResponseEvent<'a> {
    /// A chunk of reply text, in provider order.
    TextChunk(&'a str),

    /// A diagnostic message (typically shown on stderr).
    Diagnostic {
        message: String,
        /// If true, only show when verbose mode is enabled.
        verbose_only: bool,
    },

    /// The reply has ended, successfully or not.
    Finished,
}

/// Trait for handling response events during a turn.
///
/// # Example
///
/// ```
/// use hey_core::api::{ResponseEvent, ResponseSink};
/// use std::io;
///
/// struct MySink {
///     text: String,
/// }
///
/// impl ResponseSink for MySink {
///     fn handle(&mut self, event: ResponseEvent<'_>) -> io::Result<()> {
///         if let ResponseEvent::TextChunk(chunk) = event {
///             self.text.push_str(chunk);
///         }
///         Ok(())
///     }
/// }
///
/// let mut sink = MySink { text: String::new() };
/// sink.handle(ResponseEvent::TextChunk("Hello")).unwrap();
/// assert_eq!(sink.text, "Hello");
/// ```
pub trait ResponseSink {
    /// Handle a response event. An error stops the stream; text already
    /// accepted is kept.
    fn handle(&mut self, event: ResponseEvent<'_>) -> io::Result<()>;
}

/// A sink that collects responses for programmatic use.
#[derive(Debug, Default)]
pub struct CollectingSink {
    /// Accumulated reply text.
    pub text: String,
    /// Diagnostic messages emitted.
    pub diagnostics: Vec<String>,
    /// Number of `Finished` events seen.
    pub finished: usize,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResponseSink for CollectingSink {
    fn handle(&mut self, event: ResponseEvent<'_>) -> io::Result<()> {
        match event {
            ResponseEvent::TextChunk(chunk) => self.text.push_str(chunk),
            ResponseEvent::Diagnostic { message, .. } => self.diagnostics.push(message),
            ResponseEvent::Finished => self.finished += 1,
        }
        Ok(())
    }
}
