/// Platform chat id (numeric; channels and groups are negative on Telegram).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChatId(pub i64);

/// Platform message id. Strictly increasing within one chat. The default is
/// [`MessageId::NONE`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub i64);

impl MessageId {
    /// Sentinel below any id the platform hands out.
    pub const NONE: MessageId = MessageId(0);
}

impl std::fmt::Display for ChatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A stable reference to a sent message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// A chat as the platform describes it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatReference {
    pub id: ChatId,
    pub title: String,
}

/// An incoming message. Only text is relayed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub text: Option<String>,
}

/// The (source, destination) pair of the most recently started forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ForwardingSession {
    pub source: ChatId,
    pub destination: ChatId,
}
