//! Telegram adapter (teloxide).
//!
//! This crate implements the `tgrelay-core` ChatPlatform port over the
//! Telegram Bot API. The bot must be a member (or admin, for channels) of
//! both the source and the destination chat.

use anyhow::Context;
use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{Chat, Update, UpdateKind},
    ApiError, RequestError,
};

use tokio::{sync::Mutex, time::sleep};

pub mod history;

use history::HistoryBuffer;
use tgrelay_core::{
    config::Config,
    domain::{ChatId, ChatReference, Message, MessageId, MessageRef},
    errors::Error,
    platform::ChatPlatform,
    Result,
};

/// Maximum message length for the Telegram Bot API, in UTF-16 code units.
const MAX_MESSAGE_LEN: usize = 4096;

pub struct TelegramPlatform {
    bot: Bot,
    /// Update offset + recorded history. Held across `getUpdates` so two
    /// concurrent syncs never consume the same batch.
    state: Mutex<SyncState>,
}

struct SyncState {
    offset: i32,
    history: HistoryBuffer,
}

impl SyncState {
    /// Confirm `updates` and record the messages they carry.
    fn ingest(&mut self, updates: Vec<Update>) {
        for update in updates {
            self.offset = self.offset.max(update.id + 1);
            if let Some((chat, message)) = recorded_message(update) {
                self.history.record(chat, message);
            }
        }
    }
}

/// New messages and channel posts; edits and other updates are skipped.
fn recorded_message(update: Update) -> Option<(ChatReference, Message)> {
    let msg = match update.kind {
        UpdateKind::Message(m) | UpdateKind::ChannelPost(m) => m,
        _ => return None,
    };
    let chat = ChatReference {
        id: ChatId(msg.chat.id.0),
        title: chat_title(&msg.chat),
    };
    // Captions count as text, so captioned media relays its caption.
    let text = msg.text().or_else(|| msg.caption()).map(str::to_string);
    let message = Message {
        id: MessageId(msg.id.0 as i64),
        chat_id: chat.id,
        text,
    };
    Some((chat, message))
}

impl TelegramPlatform {
    pub fn new(bot: Bot, history_limit: usize) -> Self {
        Self {
            bot,
            state: Mutex::new(SyncState {
                offset: 0,
                history: HistoryBuffer::new(history_limit),
            }),
        }
    }

    /// Build from config and check the token with `getMe`.
    pub async fn connect(cfg: &Config) -> anyhow::Result<Self> {
        let bot = Bot::new(cfg.bot_token()?);
        let me = bot
            .get_me()
            .await
            .context("Failed to call Telegram getMe")?;
        tracing::info!(bot_username = %me.username(), "Telegram bot authenticated");
        Ok(Self::new(bot, cfg.history_limit))
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn map_err(e: RequestError) -> Error {
        match &e {
            RequestError::Network(_) | RequestError::Io(_) | RequestError::RetryAfter(_) => {
                Error::transient(format!("telegram error: {e}"))
            }
            RequestError::Api(ApiError::ChatNotFound) => {
                Error::NotFound(format!("telegram chat: {e}"))
            }
            _ => Error::permanent(format!("telegram error: {e}")),
        }
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match e {
                    RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        tracing::warn!(wait_ms = d.as_millis() as u64, "telegram flood control");
                        sleep(d).await;
                        continue;
                    }
                    other => return Err(Self::map_err(other)),
                },
            }
        }
    }

    /// Drain pending updates into the history buffer.
    async fn sync(&self) -> Result<tokio::sync::MutexGuard<'_, SyncState>> {
        let mut state = self.state.lock().await;
        loop {
            let offset = state.offset;
            let updates = self
                .with_retry(|| self.bot.get_updates().offset(offset).timeout(0))
                .await?;
            if updates.is_empty() {
                break;
            }

            state.ingest(updates);
        }
        Ok(state)
    }
}

#[async_trait]
impl ChatPlatform for TelegramPlatform {
    async fn recent_message(&self, chat: ChatId) -> Result<Option<Message>> {
        let state = self.sync().await?;
        Ok(state.history.newest(chat))
    }

    async fn messages_since(&self, chat: ChatId, min_id: MessageId) -> Result<Vec<Message>> {
        let state = self.sync().await?;
        Ok(state.history.since(chat, min_id))
    }

    async fn send_text(&self, chat: ChatId, text: &str) -> Result<MessageRef> {
        let mut last = None;
        for chunk in chunk_text(text, MAX_MESSAGE_LEN) {
            let sent = self
                .with_retry(|| self.bot.send_message(Self::tg_chat(chat), chunk.to_string()))
                .await?;
            last = Some(MessageRef {
                chat_id: chat,
                message_id: MessageId(sent.id.0 as i64),
            });
        }
        last.ok_or_else(|| Error::permanent("refusing to send an empty message"))
    }

    async fn resolve_chat(&self, chat: ChatId) -> Result<ChatReference> {
        let tg = self
            .with_retry(|| self.bot.get_chat(Self::tg_chat(chat)))
            .await?;
        Ok(ChatReference {
            id: chat,
            title: chat_title(&tg),
        })
    }

    async fn list_dialogs(&self) -> Result<Vec<ChatReference>> {
        let state = self.sync().await?;
        Ok(state.history.chats())
    }
}

/// Group/channel title, or the user's name for private chats.
fn chat_title(chat: &Chat) -> String {
    if let Some(title) = chat.title() {
        return title.to_string();
    }
    let name = [chat.first_name(), chat.last_name()]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ");
    if !name.is_empty() {
        return name;
    }
    chat.username()
        .map(|u| format!("@{u}"))
        .unwrap_or_else(|| chat.id.0.to_string())
}

/// Split into pieces Telegram accepts: at most `max_units` UTF-16 code units
/// each (the unit Telegram counts), cut after the last newline in the window
/// when that leaves text before it. Whitespace-only pieces are dropped since
/// Telegram rejects them as empty.
fn chunk_text(text: &str, max_units: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        let hard_end = match utf16_prefix_end(remaining, max_units) {
            // A single character wider than the limit still has to go somewhere.
            0 => remaining.chars().next().map_or(remaining.len(), char::len_utf8),
            end => end,
        };
        let split_at = if hard_end == remaining.len() {
            hard_end
        } else {
            match remaining[..hard_end].rfind('\n') {
                Some(pos) if !remaining[..pos].trim().is_empty() => pos + 1,
                _ => hard_end,
            }
        };

        let (piece, rest) = remaining.split_at(split_at);
        if !piece.trim().is_empty() {
            chunks.push(piece);
        }
        remaining = rest;
    }

    chunks
}

/// Byte offset of the longest prefix that fits in `max_units` UTF-16 units.
fn utf16_prefix_end(text: &str, max_units: usize) -> usize {
    let mut units = 0;
    for (i, c) in text.char_indices() {
        units += c.len_utf16();
        if units > max_units {
            return i;
        }
    }
    text.len()
}
