//! Crash-safe file primitives used by the context store.
//!
//! - [`atomic_write()`] / [`atomic_write_json()`]: write to a uniquely named
//!   sibling temp file, fsync, then rename over the target. Readers see
//!   either the old file or the new one, never a torn write.
//! - [`FileLock`]: RAII advisory lock (fs2) used to serialize the index
//!   read-modify-write across concurrent `hey` processes.
//!
//! Temp files carry a random suffix so two processes replacing the same
//! target never share a scratch file.

use fs2::FileExt;
use serde::Serialize;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Serialize `value` as pretty JSON and atomically replace `path` with it.
pub fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
    let json = serde_json::to_vec_pretty(value)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    atomic_write(path, &json)
}

/// Atomically replace `path` with `contents`.
///
/// Parent directories are created as needed. The temp file lives in the
/// same directory as the target so the final rename never crosses a
/// filesystem boundary. On failure the temp file is removed and the target
/// is left untouched.
pub fn atomic_write(path: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = temp_path_for(path);
    let result = write_and_rename(&tmp_path, path, contents);
    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

fn write_and_rename(tmp_path: &Path, path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(tmp_path)?;

    {
        let mut writer = BufWriter::new(&mut file);
        writer.write_all(contents)?;
        writer.flush()?;
    }
    file.sync_all()?;

    fs::rename(tmp_path, path)
}

/// `<dir>/.<name>.<uuid>.tmp`
fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = OsString::from(".");
    name.push(path.file_name().unwrap_or_default());
    name.push(format!(".{}.tmp", Uuid::new_v4().simple()));
    path.with_file_name(name)
}

/// Remove a file, treating "already gone" as success.
pub fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// RAII exclusive advisory lock on a dedicated lock file.
///
/// Acquisition blocks until the lock is free; the lock is released on drop.
/// Only processes that also take the lock are excluded, so plain readers
/// are never blocked.
pub struct FileLock {
    file: File,
}

impl FileLock {
    /// Acquire the lock at `lock_path`, creating the file if needed.
    pub fn acquire(lock_path: &Path) -> io::Result<Self> {
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path)?;

        file.lock_exclusive()?;

        Ok(Self { file })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
