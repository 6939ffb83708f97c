//! hey-core: context store and completion pipeline for the hey chat client
//!
//! Provides persisted conversations (contexts) with an index for listing
//! and search, the active-context pointer, and the orchestration of one
//! streamed completion turn against an OpenAI-compatible endpoint.
//!
//! # Quick Start
//!
//! For most embedding use cases, use the [`Hey`] facade:
//!
//! ```no_run
//! use hey_core::{Hey, Overrides};
//! use hey_core::api::{CollectingSink, OpenAiProvider};
//!
//! #[tokio::main]
//! async fn main() -> hey_core::Result<()> {
//!     let hey = Hey::load()?;
//!     let record = hey.new_context(Some("scratch".to_string()), None)?;
//!     let mut sink = CollectingSink::new();
//!
//!     hey.continue_context(
//!         record,
//!         "Hello!",
//!         &Overrides::default(),
//!         &OpenAiProvider::new(),
//!         &mut sink,
//!         std::future::pending(),
//!     )
//!     .await?;
//!     println!("Response: {}", sink.text);
//!     Ok(())
//! }
//! ```
//!
//! For lower-level access, use the individual modules directly.

pub mod api;
pub mod config;
pub mod context;
pub mod error;
pub mod execution;
mod hey;
pub mod input;
pub mod output;
pub mod safe_io;
pub mod store;

// Re-export the facade
pub use hey::{Hey, LoadOptions};

// Re-export commonly used types
pub use api::{CollectingSink, ResponseEvent, ResponseSink};
pub use config::{CompletionConfig, Config, Overrides};
pub use context::{ContextId, ContextRecord, Message, Role};
pub use error::{Error, Result};
pub use store::{ContextStore, IndexEntry, ListRange};
