use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

use crate::{
    config::Config,
    domain::{ChatId, ChatReference, Message, MessageId, MessageRef},
    platform::port::ChatPlatform,
    Result,
};

#[derive(Clone, Copy, Debug)]
pub struct ThrottleConfig {
    /// Minimum spacing between any two sends (global flood control).
    pub global_min_interval: Duration,
    /// Minimum spacing between sends to the same chat.
    pub per_chat_min_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            global_min_interval: Duration::from_millis(40), // ~25/sec
            per_chat_min_interval: Duration::from_millis(1050), // ~0.95/sec
        }
    }
}

impl From<&Config> for ThrottleConfig {
    fn from(cfg: &Config) -> Self {
        Self {
            global_min_interval: cfg.throttle_global,
            per_chat_min_interval: cfg.throttle_per_chat,
        }
    }
}

/// Earliest free send slot, overall and per destination chat.
#[derive(Debug)]
struct SendSchedule {
    cfg: ThrottleConfig,
    next_any: Instant,
    next_for_chat: HashMap<ChatId, Instant>,
}

impl SendSchedule {
    fn new(cfg: ThrottleConfig) -> Self {
        Self {
            cfg,
            next_any: Instant::now(),
            next_for_chat: HashMap::new(),
        }
    }

    /// Book the first instant that honours both spacings for `chat`.
    fn book(&mut self, chat: ChatId) -> Instant {
        let mut at = Instant::now().max(self.next_any);
        if let Some(&next) = self.next_for_chat.get(&chat) {
            at = at.max(next);
        }
        self.next_any = at + self.cfg.global_min_interval;
        self.next_for_chat
            .insert(chat, at + self.cfg.per_chat_min_interval);
        at
    }
}

/// ChatPlatform decorator that paces outbound sends.
///
/// A burst of new source messages would otherwise be relayed back-to-back and
/// trip the destination's flood limits. Reads pass straight through.
pub struct ThrottledPlatform {
    inner: Arc<dyn ChatPlatform>,
    schedule: Mutex<SendSchedule>,
}

impl ThrottledPlatform {
    pub fn new(inner: Arc<dyn ChatPlatform>, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            schedule: Mutex::new(SendSchedule::new(cfg)),
        }
    }
}

#[async_trait::async_trait]
impl ChatPlatform for ThrottledPlatform {
    async fn recent_message(&self, chat: ChatId) -> Result<Option<Message>> {
        self.inner.recent_message(chat).await
    }

    async fn messages_since(&self, chat: ChatId, min_id: MessageId) -> Result<Vec<Message>> {
        self.inner.messages_since(chat, min_id).await
    }

    async fn send_text(&self, chat: ChatId, text: &str) -> Result<MessageRef> {
        // The slot is booked before waiting so concurrent senders queue up.
        let slot = self.schedule.lock().await.book(chat);
        sleep_until(slot).await;
        self.inner.send_text(chat, text).await
    }

    async fn resolve_chat(&self, chat: ChatId) -> Result<ChatReference> {
        self.inner.resolve_chat(chat).await
    }

    async fn list_dialogs(&self) -> Result<Vec<ChatReference>> {
        self.inner.list_dialogs().await
    }
}
