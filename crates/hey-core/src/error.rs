//! Error taxonomy for hey-core.
//!
//! Store errors and configuration errors are kept apart so the CLI can map
//! each to its own exit status and message. Provider failures surface as
//! [`Error::Turn`], raised after a turn that did not complete cleanly, which
//! records which messages were persisted anyway.

use crate::context::ContextId;
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Context {0} not found.")]
    NotFound(ContextId),

    #[error("store I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corrupt store file {}: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid range '{0}' (expected start:end, e.g. ':5' or '-3:')")]
    InvalidRange(String),

    #[error("no context ids left to allocate")]
    IdsExhausted,
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Whether a failed completion is worth retrying by hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Rate limits, network trouble, server-side hiccups.
    Transient,
    /// Bad credentials, unknown model, malformed responses.
    Fatal,
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderErrorKind::Transient => f.write_str("transient"),
            ProviderErrorKind::Fatal => f.write_str("fatal"),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("completion failed ({kind}): {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Fatal,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind == ProviderErrorKind::Transient
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Profile {0} not found.")]
    UnknownProfile(String),

    #[error("temperature {0} is out of range (expected 0.0 to 2.0)")]
    Temperature(f32),

    #[error("home directory not found (set HEY_HOME or pass --home)")]
    NoHome,
}

/// Why a turn stopped before a complete reply was recorded.
#[derive(Debug, Clone)]
pub enum StopCause {
    Provider(ProviderError),
    Cancelled,
    /// Writing to the output sink failed.
    Output(String),
}

impl fmt::Display for StopCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopCause::Provider(e) => write!(f, "{}", e),
            StopCause::Cancelled => f.write_str("interrupted"),
            StopCause::Output(msg) => write!(f, "output failed: {}", msg),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("No active context (use --new or --switch first).")]
    NoActiveContext,

    #[error("Context {0} has no message to retry.")]
    NothingToRetry(ContextId),

    #[error("context {context}: {cause} [{}]", saved_summary(.user_saved, .assistant_saved))]
    Turn {
        context: ContextId,
        cause: StopCause,
        user_saved: bool,
        assistant_saved: bool,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

fn saved_summary(user_saved: &bool, assistant_saved: &bool) -> &'static str {
    match (*user_saved, *assistant_saved) {
        (true, true) => "saved: your message and the partial reply",
        (true, false) => "saved: your message; no reply",
        (false, true) => "saved: the partial reply",
        (false, false) => "nothing saved",
    }
}

impl Error {
    /// Process exit status for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Store(StoreError::NotFound(_)) | Error::NoActiveContext => 2,
            Error::Turn { cause, .. } => match cause {
                StopCause::Provider(e) => provider_exit_code(e),
                StopCause::Cancelled => 130,
                StopCause::Output(_) => 1,
            },
            Error::Config(_) => 5,
            Error::Store(_) | Error::NothingToRetry(_) | Error::Io(_) => 1,
        }
    }
}

fn provider_exit_code(e: &ProviderError) -> i32 {
    if e.is_transient() { 3 } else { 4 }
}
