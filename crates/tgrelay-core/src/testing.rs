//! In-memory platform used by unit tests.

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Mutex,
};

use async_trait::async_trait;

use crate::{
    domain::{ChatId, ChatReference, Message, MessageId, MessageRef},
    errors::Error,
    platform::ChatPlatform,
    Result,
};

#[derive(Default)]
pub struct FakePlatform {
    chats: Mutex<Vec<ChatReference>>,
    messages: Mutex<Vec<Message>>,
    sent: Mutex<Vec<(ChatId, String)>>,
    fetch_calls: AtomicUsize,
    /// Remaining scripted fetch failures and whether they are transient.
    fetch_failures: Mutex<(usize, bool)>,
    send_failure_marker: Mutex<Option<String>>,
    inclusive_fetch: AtomicBool,
}

impl FakePlatform {
    pub fn add_chat(&self, id: ChatId, title: &str) {
        self.chats.lock().unwrap().push(ChatReference {
            id,
            title: title.to_string(),
        });
    }

    pub fn push(&self, chat: ChatId, id: i64, text: Option<&str>) {
        self.messages.lock().unwrap().push(Message {
            id: MessageId(id),
            chat_id: chat,
            text: text.map(str::to_string),
        });
    }

    pub fn fail_fetches(&self, count: usize, transient: bool) {
        *self.fetch_failures.lock().unwrap() = (count, transient);
    }

    pub fn fail_send_containing(&self, marker: &str) {
        *self.send_failure_marker.lock().unwrap() = Some(marker.to_string());
    }

    /// Misbehave like a platform that treats `min_id` as inclusive.
    pub fn set_inclusive_fetch(&self, on: bool) {
        self.inclusive_fetch.store(on, Ordering::SeqCst);
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn sent_texts(&self, chat: ChatId) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| *c == chat)
            .map(|(_, t)| t.clone())
            .collect()
    }

    fn newest_first(&self, chat: ChatId) -> Vec<Message> {
        let mut out: Vec<Message> = self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.chat_id == chat)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.id.cmp(&a.id));
        out
    }
}

#[async_trait]
impl ChatPlatform for FakePlatform {
    async fn recent_message(&self, chat: ChatId) -> Result<Option<Message>> {
        Ok(self.newest_first(chat).into_iter().next())
    }

    async fn messages_since(&self, chat: ChatId, min_id: MessageId) -> Result<Vec<Message>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        {
            let mut failures = self.fetch_failures.lock().unwrap();
            if failures.0 > 0 {
                failures.0 -= 1;
                return Err(Error::Platform {
                    message: "scripted fetch failure".to_string(),
                    transient: failures.1,
                });
            }
        }

        let inclusive = self.inclusive_fetch.load(Ordering::SeqCst);
        Ok(self
            .newest_first(chat)
            .into_iter()
            .filter(|m| if inclusive { m.id >= min_id } else { m.id > min_id })
            .collect())
    }

    async fn send_text(&self, chat: ChatId, text: &str) -> Result<MessageRef> {
        if let Some(marker) = self.send_failure_marker.lock().unwrap().as_deref() {
            if text.contains(marker) {
                return Err(Error::transient("scripted send failure"));
            }
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push((chat, text.to_string()));
        Ok(MessageRef {
            chat_id: chat,
            message_id: MessageId(sent.len() as i64),
        })
    }

    async fn resolve_chat(&self, chat: ChatId) -> Result<ChatReference> {
        self.chats
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == chat)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("chat {chat}")))
    }

    async fn list_dialogs(&self) -> Result<Vec<ChatReference>> {
        Ok(self.chats.lock().unwrap().clone())
    }
}
