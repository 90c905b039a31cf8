//! Persisted "last forwarding pair" for `resume`.
//!
//! File format: two lines, the source chat id then the destination chat id,
//! both decimal.

use std::path::{Path, PathBuf};

use crate::{
    domain::{ChatId, ForwardingSession},
    errors::Error,
    utils::{atomic_write, read_optional},
    Result,
};

#[derive(Clone, Debug)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite the persisted pair.
    pub fn save(&self, session: ForwardingSession) -> Result<()> {
        let txt = format!("{}\n{}", session.source.0, session.destination.0);
        atomic_write(&self.path, txt.as_bytes())?;
        tracing::debug!(
            source = session.source.0,
            destination = session.destination.0,
            path = %self.path.display(),
            "saved forwarding session"
        );
        Ok(())
    }

    /// The persisted pair, or `None` when nothing was saved yet.
    pub fn load(&self) -> Result<Option<ForwardingSession>> {
        let Some(txt) = read_optional(&self.path)? else {
            return Ok(None);
        };
        if txt.trim().is_empty() {
            return Ok(None);
        }
        parse_session(&txt)
            .map(Some)
            .map_err(|reason| Error::CorruptState {
                path: self.path.clone(),
                reason,
            })
    }
}

fn parse_session(txt: &str) -> std::result::Result<ForwardingSession, String> {
    let mut lines = txt.lines().map(str::trim).filter(|l| !l.is_empty());
    let mut next_id = |what: &str| -> std::result::Result<ChatId, String> {
        let line = lines.next().ok_or_else(|| format!("missing {what} chat id"))?;
        line.parse::<i64>()
            .map(ChatId)
            .map_err(|e| format!("invalid {what} chat id {line:?}: {e}"))
    };

    let source = next_id("source")?;
    let destination = next_id("destination")?;
    if lines.next().is_some() {
        return Err("unexpected trailing content".to_string());
    }
    Ok(ForwardingSession {
        source,
        destination,
    })
}
