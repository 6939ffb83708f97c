//! One conversational turn: append the user's input, ask the provider,
//! stream the reply to the sink and fold it back into the record.
//!
//! Nothing here touches the disk. The caller persists the returned record,
//! which is why every outcome (including failures) hands the record back.

use super::provider::{Completion, CompletionProvider, DeltaStream};
use super::sink::{ResponseEvent, ResponseSink};
use crate::config::CompletionConfig;
use crate::context::{ContextRecord, Message};
use crate::error::StopCause;
use futures_util::StreamExt;
use log::{debug, warn};
use std::future::Future;
use std::pin::{Pin, pin};

/// How a turn ended.
#[derive(Debug, Clone)]
pub enum TurnStatus {
    /// The full reply was received and recorded.
    Completed,
    /// The turn stopped early; the text already shown was recorded as a
    /// partial assistant message.
    Partial { cause: StopCause },
    /// The turn stopped before any reply text was shown.
    NoReply { cause: StopCause },
}

impl TurnStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, TurnStatus::Completed)
    }

    pub fn cause(&self) -> Option<&StopCause> {
        match self {
            TurnStatus::Completed => None,
            TurnStatus::Partial { cause } | TurnStatus::NoReply { cause } => Some(cause),
        }
    }
}

/// The updated record plus an exact account of what was appended to it.
#[derive(Debug)]
pub struct TurnOutcome {
    pub record: ContextRecord,
    pub status: TurnStatus,
    /// The user's message is in `record`.
    pub user_appended: bool,
    /// An assistant message (complete or partial) is in `record`.
    pub assistant_appended: bool,
    /// The user's message was appended and then removed again.
    pub rolled_back: bool,
}

impl TurnOutcome {
    /// Whether `record` differs from what was passed in.
    pub fn modified(&self) -> bool {
        self.user_appended || self.assistant_appended
    }
}

/// Drives single turns against a [`CompletionProvider`].
pub struct CompletionOrchestrator<'p, P> {
    provider: &'p P,
    rollback_on_failure: bool,
}

impl<'p, P: CompletionProvider> CompletionOrchestrator<'p, P> {
    pub fn new(provider: &'p P) -> Self {
        Self {
            provider,
            rollback_on_failure: false,
        }
    }

    /// Remove the user's message again when a turn fails with no reply at all.
    pub fn rollback_on_failure(mut self, rollback: bool) -> Self {
        self.rollback_on_failure = rollback;
        self
    }

    /// Run one turn.
    ///
    /// An empty `input` appends nothing and re-requests a reply for the log
    /// as it stands. `cancel` is raced against the provider for the whole
    /// turn; when it resolves, text already shown is kept as partial.
    pub async fn run_turn<C>(
        &self,
        mut record: ContextRecord,
        input: &str,
        config: &CompletionConfig,
        sink: &mut dyn ResponseSink,
        cancel: C,
    ) -> TurnOutcome
    where
        C: Future<Output = ()>,
    {
        let mut cancel = pin!(cancel);

        let user_appended = !input.trim().is_empty();
        if user_appended {
            record.messages.push(Message::user(input));
        }

        emit_diagnostic(
            sink,
            format!(
                "requesting {} for context {} ({} messages)",
                config.model,
                record.id,
                record.messages.len()
            ),
        );

        let requested = tokio::select! {
            biased;
            _ = &mut cancel => Err(StopCause::Cancelled),
            result = self.provider.complete(record.messages.as_slice(), config) => {
                result.map_err(StopCause::Provider)
            }
        };

        let (reply, stop) = match requested {
            Err(cause) => (String::new(), Some(cause)),
            Ok(Completion::Text(text)) => deliver_text(text, sink),
            Ok(Completion::Stream(stream)) => drain_stream(stream, sink, cancel.as_mut()).await,
        };

        if let Err(e) = sink.handle(ResponseEvent::Finished) {
            warn!("failed to finish response output: {}", e);
        }

        self.reconcile(record, reply, stop, user_appended)
    }

    fn reconcile(
        &self,
        mut record: ContextRecord,
        reply: String,
        stop: Option<StopCause>,
        user_appended: bool,
    ) -> TurnOutcome {
        let mut outcome_user = user_appended;
        let mut rolled_back = false;

        let (status, assistant_appended) = match stop {
            None => {
                record.messages.push(Message::assistant(reply));
                record.assign_auto_title();
                (TurnStatus::Completed, true)
            }
            Some(cause) if !reply.is_empty() => {
                debug!(
                    "context {}: keeping {} chars of partial reply ({})",
                    record.id,
                    reply.len(),
                    cause
                );
                record.messages.push(Message::partial_assistant(reply));
                (TurnStatus::Partial { cause }, true)
            }
            Some(cause) => {
                if user_appended && self.rollback_on_failure {
                    record.messages.pop();
                    outcome_user = false;
                    rolled_back = true;
                }
                (TurnStatus::NoReply { cause }, false)
            }
        };

        if outcome_user || assistant_appended {
            record.touch();
        }

        TurnOutcome {
            record,
            status,
            user_appended: outcome_user,
            assistant_appended,
            rolled_back,
        }
    }
}

/// Drop the last turn from `record`; see [`crate::context::MessageLog::undo_last_turn`].
pub fn undo_turn(record: &mut ContextRecord) -> Vec<Message> {
    let removed = record.messages.undo_last_turn();
    if !removed.is_empty() {
        record.touch();
    }
    removed
}

fn emit_diagnostic(sink: &mut dyn ResponseSink, message: String) {
    let event = ResponseEvent::Diagnostic {
        message,
        verbose_only: true,
    };
    if let Err(e) = sink.handle(event) {
        warn!("failed to emit diagnostic: {}", e);
    }
}

/// A whole reply delivered in one piece: it counts as shown only if the sink took it.
fn deliver_text(text: String, sink: &mut dyn ResponseSink) -> (String, Option<StopCause>) {
    match sink.handle(ResponseEvent::TextChunk(&text)) {
        Ok(()) => (text, None),
        Err(e) => (String::new(), Some(StopCause::Output(e.to_string()))),
    }
}

/// Forward deltas to the sink in order, accumulating exactly what it accepted.
async fn drain_stream<C>(
    mut stream: DeltaStream,
    sink: &mut dyn ResponseSink,
    mut cancel: Pin<&mut C>,
) -> (String, Option<StopCause>)
where
    C: Future<Output = ()>,
{
    let mut reply = String::new();
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.as_mut() => return (reply, Some(StopCause::Cancelled)),
            next = stream.next() => next,
        };

        match next {
            Some(Ok(delta)) => {
                if delta.is_empty() {
                    continue;
                }
                if let Err(e) = sink.handle(ResponseEvent::TextChunk(&delta)) {
                    return (reply, Some(StopCause::Output(e.to_string())));
                }
                reply.push_str(&delta);
            }
            Some(Err(e)) => return (reply, Some(StopCause::Provider(e))),
            None => return (reply, None),
        }
    }
}
