use async_trait::async_trait;

use crate::{
    domain::{ChatId, ChatReference, Message, MessageId, MessageRef},
    Result,
};

/// What the forwarder needs from a messaging platform.
///
/// Authentication and connection setup happen before an implementation is
/// handed to the core; every call here assumes an authorized client.
/// Transient network/API failures must be reported as
/// [`Error::Platform`](crate::Error::Platform) with `transient: true` so the
/// engine can retry fetches.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// The newest message in `chat`, or `None` when the chat is empty.
    async fn recent_message(&self, chat: ChatId) -> Result<Option<Message>>;

    /// Every message in `chat` with an id strictly greater than `min_id`.
    /// Ordering is unspecified.
    async fn messages_since(&self, chat: ChatId, min_id: MessageId) -> Result<Vec<Message>>;

    async fn send_text(&self, chat: ChatId, text: &str) -> Result<MessageRef>;

    /// Fails with [`Error::NotFound`](crate::Error::NotFound) for unknown chats.
    async fn resolve_chat(&self, chat: ChatId) -> Result<ChatReference>;

    /// Chats the account can see, in the platform's listing order.
    async fn list_dialogs(&self) -> Result<Vec<ChatReference>>;
}
