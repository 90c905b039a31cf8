//! Chat lookup and the index-based selection used by the CLI.

use std::{
    fmt::Write as _,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};

use crate::{
    domain::{ChatId, ChatReference},
    errors::Error,
    platform::ChatPlatform,
    utils::{atomic_write, read_optional},
    Result,
};

/// How the operator names a chat: by platform id, or by its 1-based position
/// in the chat listing (`#3`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatSelector {
    Id(ChatId),
    Index(usize),
}

impl FromStr for ChatSelector {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(idx) = s.strip_prefix('#') {
            let idx: usize = idx
                .parse()
                .map_err(|_| format!("invalid chat index {s:?}"))?;
            if idx == 0 {
                return Err("chat indexes start at 1".to_string());
            }
            return Ok(ChatSelector::Index(idx));
        }
        s.parse::<i64>()
            .map(|id| ChatSelector::Id(ChatId(id)))
            .map_err(|_| format!("invalid chat id {s:?} (use a numeric id or #index)"))
    }
}

#[derive(Clone)]
pub struct ChatDirectory {
    platform: Arc<dyn ChatPlatform>,
    listing: Option<PathBuf>,
}

impl ChatDirectory {
    pub fn new(platform: Arc<dyn ChatPlatform>) -> Self {
        Self {
            platform,
            listing: None,
        }
    }

    /// Resolve `#n` selectors against the listing file at `path` when it
    /// exists, so indexes mean what the operator last saw.
    pub fn with_listing(mut self, path: impl Into<PathBuf>) -> Self {
        self.listing = Some(path.into());
        self
    }

    /// The persisted listing, if one was configured and written.
    pub fn saved_listing(&self) -> Result<Option<Vec<ChatReference>>> {
        match &self.listing {
            Some(path) => read_listing(path),
            None => Ok(None),
        }
    }

    pub fn platform(&self) -> Arc<dyn ChatPlatform> {
        self.platform.clone()
    }

    pub async fn resolve(&self, chat: ChatId) -> Result<ChatReference> {
        self.platform.resolve_chat(chat).await
    }

    pub async fn list_dialogs(&self) -> Result<Vec<ChatReference>> {
        self.platform.list_dialogs().await
    }

    /// Resolve a selector. Indexes use the saved listing and fall back to a
    /// fresh one when nothing was saved yet.
    pub async fn resolve_selector(&self, selector: ChatSelector) -> Result<ChatReference> {
        match selector {
            ChatSelector::Id(id) => self.resolve(id).await,
            ChatSelector::Index(idx) => {
                let chats = match self.saved_listing()? {
                    Some(chats) => chats,
                    None => self.list_dialogs().await?,
                };
                select(&chats, idx).cloned()
            }
        }
    }
}

/// Map a 1-based listing index to a chat.
pub fn select(chats: &[ChatReference], index: usize) -> Result<&ChatReference> {
    index
        .checked_sub(1)
        .and_then(|i| chats.get(i))
        .ok_or_else(|| {
            Error::NotFound(format!(
                "chat index {index} (listing has {} chats)",
                chats.len()
            ))
        })
}

/// One `Index: <n>, Chat ID: <id>, Title: <title>` line per chat.
pub fn format_listing(chats: &[ChatReference]) -> String {
    let mut out = String::new();
    for (i, chat) in chats.iter().enumerate() {
        let _ = writeln!(
            out,
            "Index: {}, Chat ID: {}, Title: {}",
            i + 1,
            chat.id,
            chat.title.replace(['\r', '\n'], " ")
        );
    }
    out
}

pub fn write_listing(path: &Path, chats: &[ChatReference]) -> Result<()> {
    atomic_write(path, format_listing(chats).as_bytes())
}

/// Read a listing written by [`write_listing`]. Missing file is `None`.
pub fn read_listing(path: &Path) -> Result<Option<Vec<ChatReference>>> {
    let Some(text) = read_optional(path)? else {
        return Ok(None);
    };
    parse_listing(&text)
        .map(Some)
        .map_err(|reason| Error::CorruptState {
            path: path.to_path_buf(),
            reason,
        })
}

fn parse_listing(text: &str) -> std::result::Result<Vec<ChatReference>, String> {
    let mut chats = Vec::new();
    for (n, line) in text.lines().filter(|l| !l.trim().is_empty()).enumerate() {
        let bad = || format!("line {}: {line:?}", n + 1);
        let mut parts = line.splitn(3, ", ");
        let index = parts
            .next()
            .and_then(|p| p.strip_prefix("Index: "))
            .and_then(|p| p.parse::<usize>().ok())
            .ok_or_else(bad)?;
        let id = parts
            .next()
            .and_then(|p| p.strip_prefix("Chat ID: "))
            .and_then(|p| p.parse::<i64>().ok())
            .ok_or_else(bad)?;
        let title = parts
            .next()
            .and_then(|p| p.strip_prefix("Title:"))
            .ok_or_else(bad)?;
        if index != n + 1 {
            return Err(format!("line {}: expected index {}", n + 1, n + 1));
        }
        chats.push(ChatReference {
            id: ChatId(id),
            title: title.strip_prefix(' ').unwrap_or(title).to_string(),
        });
    }
    Ok(chats)
}

/// Keep `known` positions stable: refresh titles in place and append chats
/// seen for the first time.
pub fn merge_listing(
    known: Vec<ChatReference>,
    fresh: Vec<ChatReference>,
) -> Vec<ChatReference> {
    let mut out = known;
    for chat in fresh {
        match out.iter_mut().find(|c| c.id == chat.id) {
            Some(existing) => existing.title = chat.title,
            None => out.push(chat),
        }
    }
    out
}
