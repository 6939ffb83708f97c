//! Path computation for the store layout.
//!
//! Pure computations with no I/O: everything is derived from the store root.

use crate::context::ContextId;
use std::path::{Path, PathBuf};

/// Extension used for serialized context records.
pub(crate) const RECORD_EXTENSION: &str = "json";

pub trait StorePaths {
    /// Root of the store (the hey home directory).
    fn root(&self) -> &Path;

    /// Directory holding one record file per context
    fn contexts_dir(&self) -> PathBuf {
        self.root().join("contexts")
    }

    /// Path to a context's record file
    fn record_file(&self, id: ContextId) -> PathBuf {
        self.contexts_dir()
            .join(format!("{}.{}", id, RECORD_EXTENSION))
    }

    /// Path to the index catalog
    fn index_file(&self) -> PathBuf {
        self.root().join("index.json")
    }

    /// Lock file guarding index read-modify-write
    fn index_lock_file(&self) -> PathBuf {
        self.root().join("index.lock")
    }

    /// File holding the active context id
    fn active_file(&self) -> PathBuf {
        self.root().join("active_context")
    }
}

/// A bare root directory, for computing paths before a store exists.
impl StorePaths for PathBuf {
    fn root(&self) -> &Path {
        self
    }
}

/// Parse a context id back out of a record file name (`"12.json"` -> 12).
pub(crate) fn id_from_record_path(path: &Path) -> Option<ContextId> {
    if path.extension()? != RECORD_EXTENSION {
        return None;
    }
    path.file_stem()?.to_str()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let root = PathBuf::from("/home/u/.hey");
        assert!(root.record_file(ContextId::new(3)).ends_with("contexts/3.json"));
        assert!(root.index_file().ends_with(".hey/index.json"));
        assert!(root.active_file().ends_with(".hey/active_context"));
    }

    #[test]
    fn test_id_from_record_path() {
        assert_eq!(
            id_from_record_path(Path::new("/x/contexts/12.json")),
            Some(ContextId::new(12))
        );
        assert_eq!(id_from_record_path(Path::new("/x/contexts/.12.json.abc.tmp")), None);
        assert_eq!(id_from_record_path(Path::new("/x/contexts/notes.json")), None);
        assert_eq!(id_from_record_path(Path::new("/x/contexts/12.txt")), None);
    }
}
