//! Output handling for the CLI.
//!
//! `OutputHandler` implements `OutputSink`: listings, history and search
//! results go to stdout, confirmations to stderr.

use chrono::{DateTime, Local, Utc};
use hey_core::ContextRecord;
use hey_core::context::{ContextId, first_line_truncated};
use hey_core::output::{CommandEvent, OutputSink};
use hey_core::store::{IndexEntry, SearchHit};

const TITLE_WIDTH: usize = 30;
const SUMMARY_WIDTH: usize = 50;
const HISTORY_INDENT: &str = "    ";

/// CLI output handler: text to stdout, notices to stderr.
#[derive(Default)]
pub struct OutputHandler {
    verbose: bool,
}

impl OutputHandler {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl OutputSink for OutputHandler {
    fn emit_event(&self, event: CommandEvent) {
        eprintln!("{}", describe_event(&event));
    }

    fn emit_history(&self, record: &ContextRecord) {
        print!("{}", format_history(record));
    }

    fn emit_listing(&self, entries: &[IndexEntry], active: Option<ContextId>) {
        if entries.is_empty() {
            eprintln!("No contexts.");
            return;
        }
        print!("{}", format_listing(entries, active, self.verbose));
    }

    fn emit_search(&self, keyword: &str, hits: &[SearchHit]) {
        if hits.is_empty() {
            eprintln!("No contexts match '{}'.", keyword);
            return;
        }
        print!("{}", format_search(hits));
    }
}

fn describe_event(event: &CommandEvent) -> String {
    match event {
        CommandEvent::ContextCreated { id, title } => match title {
            Some(title) => format!("[Created context {}: {}]", id, title),
            None => format!("[Created context {}]", id),
        },
        CommandEvent::Switched { id } => format!("[Switched to context {}]", id),
        CommandEvent::Deleted { id } => format!("[Deleted context {}]", id),
        CommandEvent::Renamed { id, title } => match title {
            Some(title) => format!("[Renamed context {} to '{}']", id, title),
            None => format!("[Removed the title of context {}]", id),
        },
        CommandEvent::Undone { id, removed } => {
            format!("[Removed {} message(s) from context {}]", removed, id)
        }
        CommandEvent::NothingToUndo { id } => format!("[Nothing to undo in context {}]", id),
        CommandEvent::Reindexed { count } => format!("[Reindexed {} context(s)]", count),
    }
}

fn local_time(ts: &DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

fn format_history(record: &ContextRecord) -> String {
    let mut out = format!("[{}: {}]\n\n", record.id, record.display_title());
    for message in record.messages.iter() {
        if message.content.is_empty() {
            continue;
        }
        let label = if message.partial {
            format!("{} (partial)", message.role)
        } else {
            message.role.to_string()
        };
        out.push_str(&format!("{}:\n", label));
        for line in message.content.lines() {
            if line.is_empty() {
                out.push('\n');
            } else {
                out.push_str(&format!("{}{}\n", HISTORY_INDENT, line));
            }
        }
        out.push('\n');
    }
    out
}

fn format_listing(entries: &[IndexEntry], active: Option<ContextId>, verbose: bool) -> String {
    let id_width = entries
        .iter()
        .map(|e| e.id.to_string().len())
        .max()
        .unwrap_or(0)
        .max(2);

    let mut out = format!(
        "  {:>id_width$}  {:<TITLE_WIDTH$}  {:<19}  ",
        "ID", "TITLE", "UPDATED"
    );
    if verbose {
        out.push_str("MSGS  ");
    }
    out.push_str("SUMMARY\n");

    for entry in entries {
        let marker = if Some(entry.id) == active { '*' } else { ' ' };
        out.push_str(&format!(
            "{} {:>id_width$}  {:<TITLE_WIDTH$}  {}  ",
            marker,
            entry.id,
            first_line_truncated(entry.display_title(), TITLE_WIDTH),
            local_time(&entry.updated_at),
        ));
        if verbose {
            out.push_str(&format!("{:>4}  ", entry.message_count));
        }
        out.push_str(&first_line_truncated(&entry.excerpt, SUMMARY_WIDTH));
        out.push('\n');
    }
    out
}

fn format_search(hits: &[SearchHit]) -> String {
    let mut out = String::new();
    for hit in hits {
        out.push_str(&format!(
            "[{}: {}]  {}\n",
            hit.entry.id,
            hit.entry.display_title(),
            local_time(&hit.entry.updated_at)
        ));
        for snippet in &hit.snippets {
            out.push_str(&format!("  - {}: {}\n", snippet.role, snippet.text));
        }
    }
    out
}
