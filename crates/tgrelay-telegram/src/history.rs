//! Per-chat message history built from polled updates.
//!
//! The Bot API only pushes new updates; it has no "fetch messages since" call.
//! The adapter records every message it sees here and answers history
//! queries from this buffer.

use std::collections::{HashMap, VecDeque};

use tgrelay_core::domain::{ChatId, ChatReference, Message, MessageId};

#[derive(Debug)]
pub struct HistoryBuffer {
    limit: usize,
    /// Chats in first-seen order.
    chats: Vec<ChatReference>,
    /// Ascending by id, at most `limit` entries per chat.
    messages: HashMap<i64, VecDeque<Message>>,
}

impl HistoryBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            chats: Vec::new(),
            messages: HashMap::new(),
        }
    }

    pub fn record(&mut self, chat: ChatReference, msg: Message) {
        match self.chats.iter_mut().find(|c| c.id == chat.id) {
            // Titles can change; keep the latest one.
            Some(known) => known.title = chat.title,
            None => self.chats.push(chat),
        }

        let queue = self.messages.entry(msg.chat_id.0).or_default();
        match queue.binary_search_by_key(&msg.id, |m| m.id) {
            Ok(_) => return,
            Err(pos) => queue.insert(pos, msg),
        }
        while queue.len() > self.limit {
            queue.pop_front();
        }
    }

    pub fn newest(&self, chat: ChatId) -> Option<Message> {
        self.messages.get(&chat.0).and_then(|q| q.back().cloned())
    }

    /// Messages above `min_id`, newest first.
    pub fn since(&self, chat: ChatId, min_id: MessageId) -> Vec<Message> {
        let Some(queue) = self.messages.get(&chat.0) else {
            return Vec::new();
        };
        queue
            .iter()
            .rev()
            .take_while(|m| m.id > min_id)
            .cloned()
            .collect()
    }

    pub fn chats(&self) -> Vec<ChatReference> {
        self.chats.clone()
    }
}
