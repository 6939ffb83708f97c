//! CLI-specific response sink for terminal output.
//!
//! Reply text is written to stdout as it arrives; diagnostics go to stderr
//! so piped answers stay clean.

use hey_core::{ResponseEvent, ResponseSink};
use std::io::{self, Write};

/// Writes reply chunks to `out`, flushing after each so the reply streams.
pub struct CliResponseSink<W: Write> {
    out: W,
    verbose: bool,
    /// Whether the last chunk ended a line (or nothing was written yet).
    at_line_start: bool,
}

impl<W: Write> CliResponseSink<W> {
    pub fn new(out: W, verbose: bool) -> Self {
        Self {
            out,
            verbose,
            at_line_start: true,
        }
    }
}

impl<W: Write> ResponseSink for CliResponseSink<W> {
    fn handle(&mut self, event: ResponseEvent<'_>) -> io::Result<()> {
        match event {
            ResponseEvent::TextChunk(chunk) => {
                if chunk.is_empty() {
                    return Ok(());
                }
                self.out.write_all(chunk.as_bytes())?;
                self.out.flush()?;
                self.at_line_start = chunk.ends_with('\n');
            }
            ResponseEvent::Diagnostic {
                message,
                verbose_only,
            } => {
                if self.verbose || !verbose_only {
                    eprintln!("[{}]", message);
                }
            }
            ResponseEvent::Finished => {
                if !self.at_line_start {
                    self.out.write_all(b"\n")?;
                    self.out.flush()?;
                    self.at_line_start = true;
                }
            }
        }
        Ok(())
    }
}
