use crate::domain::MessageId;

/// Last processed message id in the source chat.
///
/// Never decreases during a run and is never persisted: a resumed run
/// re-seeds from the newest message instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cursor {
    last_seen: MessageId,
}

impl Cursor {
    /// Seed from the newest message id, or the sentinel for an empty chat.
    pub fn seeded(newest: Option<MessageId>) -> Self {
        Self {
            last_seen: newest.unwrap_or(MessageId::NONE),
        }
    }

    pub fn last_seen(&self) -> MessageId {
        self.last_seen
    }

    pub fn is_new(&self, id: MessageId) -> bool {
        id > self.last_seen
    }

    pub fn advance(&mut self, id: MessageId) {
        self.last_seen = self.last_seen.max(id);
    }
}
