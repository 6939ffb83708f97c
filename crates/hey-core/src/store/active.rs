//! The active pointer: which context a bare `hey` invocation continues.
//!
//! Stored as the decimal id in `<home>/active_context`. Concurrent
//! invocations racing to set it are last-writer-wins; each write is an
//! atomic replace so readers never see a torn value.

use crate::context::ContextId;
use crate::safe_io::{atomic_write, remove_if_exists};
use log::warn;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ActivePointer {
    path: PathBuf,
}

impl ActivePointer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the pointer. A missing file means unset; garbage is logged and
    /// treated as unset rather than failing every invocation.
    pub fn get(&self) -> io::Result<Option<ContextId>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        if raw.trim().is_empty() {
            return Ok(None);
        }
        match raw.parse::<ContextId>() {
            Ok(id) => Ok(Some(id)),
            Err(e) => {
                warn!(
                    "ignoring unreadable active pointer {}: {}",
                    self.path.display(),
                    e
                );
                Ok(None)
            }
        }
    }

    pub fn set(&self, id: ContextId) -> io::Result<()> {
        atomic_write(&self.path, format!("{}\n", id).as_bytes())
    }

    pub fn clear(&self) -> io::Result<()> {
        remove_if_exists(&self.path).map(|_| ())
    }
}
