//! Shared command execution.
//!
//! Provides [`execute_command()`]: resolve the context selection, dispatch
//! the command, report results through the caller's `OutputSink` and stream
//! replies through its `ResponseSink`.

use std::future::Future;

use log::warn;

use crate::Hey;
use crate::api::{CompletionProvider, ResponseSink};
use crate::context::ContextId;
use crate::error::Result;
use crate::input::{Command, ContextSelection, Invocation};
use crate::output::{CommandEvent, OutputSink};

/// Execute one invocation against `hey`.
///
/// `cancel` is only awaited by commands that talk to the provider.
pub async fn execute_command<P, C>(
    hey: &Hey,
    invocation: &Invocation,
    provider: &P,
    output: &dyn OutputSink,
    sink: &mut dyn ResponseSink,
    cancel: C,
) -> Result<()>
where
    P: CompletionProvider,
    C: Future<Output = ()>,
{
    let explicit = match &invocation.selection {
        ContextSelection::Active => None,
        ContextSelection::Explicit(id) => {
            if !invocation.needs_context() {
                warn!("--context {} has no effect on this command", id);
            }
            Some(*id)
        }
        ContextSelection::New { title } => {
            let record =
                hey.new_context(title.clone(), invocation.overrides.profile.as_deref())?;
            output.emit_event(CommandEvent::ContextCreated {
                id: record.id,
                title: record.title.clone(),
            });
            Some(record.id)
        }
    };

    dispatch_command(hey, explicit, invocation, provider, output, sink, cancel).await
}

/// Dispatch a command to the appropriate handler.
///
/// Turn commands (SendPrompt, Retry) use the provided `ResponseSink`.
/// Everything else reports through `OutputSink` only.
async fn dispatch_command<P, C>(
    hey: &Hey,
    explicit: Option<ContextId>,
    invocation: &Invocation,
    provider: &P,
    output: &dyn OutputSink,
    sink: &mut dyn ResponseSink,
    cancel: C,
) -> Result<()>
where
    P: CompletionProvider,
    C: Future<Output = ()>,
{
    let overrides = &invocation.overrides;
    match &invocation.command {
        Command::SendPrompt { prompt } => {
            let (record, created) =
                hey.resolve_or_create(explicit, overrides.profile.as_deref())?;
            if created {
                output.emit_event(CommandEvent::ContextCreated {
                    id: record.id,
                    title: record.title.clone(),
                });
            }
            hey.continue_context(record, prompt, overrides, provider, sink, cancel)
                .await?;
        }
        Command::Retry => {
            let record = hey.resolve(explicit)?;
            hey.retry(record, overrides, provider, sink, cancel).await?;
        }
        Command::ShowHistory => {
            output.emit_history(&hey.history(explicit)?);
        }
        Command::ListContexts { range } => {
            let entries = hey.list(*range)?;
            output.emit_listing(&entries, hey.active()?);
        }
        Command::Search { keyword } => {
            let hits = hey.search(keyword)?;
            output.emit_search(keyword, &hits);
        }
        Command::Switch { id } => {
            hey.switch(*id)?;
            output.emit_event(CommandEvent::Switched { id: *id });
        }
        Command::Delete => {
            let id = hey.delete(explicit)?;
            output.emit_event(CommandEvent::Deleted { id });
        }
        Command::Rename { title } => {
            let record = hey.rename(explicit, title)?;
            output.emit_event(CommandEvent::Renamed {
                id: record.id,
                title: record.title,
            });
        }
        Command::Undo => {
            let (record, removed) = hey.undo(explicit)?;
            let event = if removed.is_empty() {
                CommandEvent::NothingToUndo { id: record.id }
            } else {
                CommandEvent::Undone {
                    id: record.id,
                    removed: removed.len(),
                }
            };
            output.emit_event(event);
        }
        Command::Reindex => {
            let count = hey.rebuild_index()?;
            output.emit_event(CommandEvent::Reindexed { count });
        }
        Command::NoOp => {}
    }
    Ok(())
}
