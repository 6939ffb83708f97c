//! Completion API for hey-core.
//!
//! The provider capability, the OpenAI-compatible HTTP provider, and the
//! orchestrator that runs a turn, decoupled from presentation through the
//! `ResponseSink` trait.

pub mod openai;
pub mod orchestrator;
pub mod provider;
pub mod sink;

pub use openai::{OpenAiProvider, SseDecoder, build_request_body, extract_choice_content};
pub use orchestrator::{CompletionOrchestrator, TurnOutcome, TurnStatus, undo_turn};
pub use provider::{Completion, CompletionProvider, DeltaStream};
pub use sink::{CollectingSink, ResponseEvent, ResponseSink};
