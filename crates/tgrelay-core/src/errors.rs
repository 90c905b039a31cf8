use std::path::PathBuf;

use crate::forward::RunReport;

/// Core error type for the forwarder.
///
/// Adapter crates map their specific errors into this type so the forwarding
/// engine can tell transient platform failures apart from fatal ones.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("platform error: {message}")]
    Platform { message: String, transient: bool },

    #[error("corrupt state file {path}: {reason}")]
    CorruptState { path: PathBuf, reason: String },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(
        "forwarding aborted after message {last_seen}: {source} (use `resume` to restart from the latest message)"
    )]
    ForwardingAborted {
        last_seen: i64,
        report: Box<RunReport>,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Platform {
            message: message.into(),
            transient: true,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Platform {
            message: message.into(),
            transient: false,
        }
    }

    /// Whether retrying the same platform call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Platform { transient, .. } => *transient,
            Error::Io(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
