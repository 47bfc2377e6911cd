//! Conversation and message-detail cache.
//!
//! The cache is the state the UI reads. The correlation layer writes to it
//! when stream messages arrive, and changes are broadcast as [`CacheEvent`]s.

use crate::api::MessageDetail;
use crate::message::TranslationStatus;
use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

const EVENT_BUFFER_SIZE: usize = 256;

/// One message row in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEntry {
    pub id: String,
    pub status: TranslationStatus,
    pub input_preview: Option<String>,
    pub output_preview: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl MessageEntry {
    pub fn new(id: impl Into<String>, status: TranslationStatus) -> Self {
        Self {
            id: id.into(),
            status,
            input_preview: None,
            output_preview: None,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub title: Option<String>,
    pub messages: Vec<MessageEntry>,
}

impl Conversation {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn message(&self, message_id: &str) -> Option<&MessageEntry> {
        self.messages.iter().find(|m| m.id == message_id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CacheEvent {
    ConversationUpdated { conversation_id: String },
    MessageUpdated { conversation_id: String, message_id: String },
    /// `None` marks the conversation list stale.
    Invalidated { conversation_id: Option<String> },
    DetailStored { message_id: String },
}

struct CacheInner {
    conversations: DashMap<String, Conversation>,
    details: DashMap<String, MessageDetail>,
    stale: DashSet<String>,
    list_stale: AtomicBool,
    events: broadcast::Sender<CacheEvent>,
}

/// Shared, cheaply cloneable cache handle.
#[derive(Clone)]
pub struct ConversationCache {
    inner: Arc<CacheInner>,
}

impl Default for ConversationCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationCache {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER_SIZE);
        Self {
            inner: Arc::new(CacheInner {
                conversations: DashMap::new(),
                details: DashMap::new(),
                stale: DashSet::new(),
                list_stale: AtomicBool::new(false),
                events,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.inner.events.subscribe()
    }

    fn emit(&self, event: CacheEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }

    /// Store a freshly loaded conversation; it is no longer stale.
    pub fn put_conversation(&self, conversation: Conversation) {
        let id = conversation.id.clone();
        self.inner.stale.remove(&id);
        self.inner.conversations.insert(id.clone(), conversation);
        self.emit(CacheEvent::ConversationUpdated { conversation_id: id });
    }

    pub fn conversation(&self, conversation_id: &str) -> Option<Conversation> {
        self.inner
            .conversations
            .get(conversation_id)
            .map(|entry| entry.value().clone())
    }

    pub fn message(&self, conversation_id: &str, message_id: &str) -> Option<MessageEntry> {
        self.inner
            .conversations
            .get(conversation_id)
            .and_then(|conversation| conversation.message(message_id).cloned())
    }

    /// Insert or replace a message entry.
    ///
    /// A conversation that was not cached is created holding just this
    /// message and marked stale, so readers refetch its full history.
    pub fn upsert_message(&self, conversation_id: &str, entry: MessageEntry) {
        let message_id = entry.id.clone();
        let created = {
            let mut created = false;
            let mut conversation = self
                .inner
                .conversations
                .entry(conversation_id.to_string())
                .or_insert_with(|| {
                    created = true;
                    Conversation::new(conversation_id)
                });
            match conversation.messages.iter_mut().find(|m| m.id == message_id) {
                Some(existing) => *existing = entry,
                None => conversation.messages.push(entry),
            }
            if created {
                self.inner.stale.insert(conversation_id.to_string());
            }
            created
        };
        self.emit(CacheEvent::MessageUpdated {
            conversation_id: conversation_id.to_string(),
            message_id,
        });
        if created {
            debug!("Conversation {} created from a single message, marked stale", conversation_id);
            self.emit(CacheEvent::Invalidated {
                conversation_id: Some(conversation_id.to_string()),
            });
        }
    }

    /// Apply `update` to one message. Returns `false` if the conversation or
    /// message is not cached; nothing is created in that case.
    pub fn update_message<F>(&self, conversation_id: &str, message_id: &str, update: F) -> bool
    where
        F: FnOnce(&mut MessageEntry),
    {
        let updated = {
            let Some(mut conversation) = self.inner.conversations.get_mut(conversation_id) else {
                warn!("Conversation {} not cached, skipping update for {}", conversation_id, message_id);
                return false;
            };
            match conversation.messages.iter_mut().find(|m| m.id == message_id) {
                Some(entry) => {
                    update(entry);
                    entry.updated_at = Utc::now();
                    true
                }
                None => false,
            }
        };

        if updated {
            self.emit(CacheEvent::MessageUpdated {
                conversation_id: conversation_id.to_string(),
                message_id: message_id.to_string(),
            });
        } else {
            debug!("Message {} not found in conversation {}", message_id, conversation_id);
        }
        updated
    }

    /// Mark a conversation stale so its next read refetches.
    pub fn invalidate(&self, conversation_id: &str) {
        self.inner.stale.insert(conversation_id.to_string());
        self.emit(CacheEvent::Invalidated {
            conversation_id: Some(conversation_id.to_string()),
        });
    }

    pub fn invalidate_list(&self) {
        self.inner.list_stale.store(true, Ordering::SeqCst);
        self.emit(CacheEvent::Invalidated { conversation_id: None });
    }

    pub fn is_stale(&self, conversation_id: &str) -> bool {
        self.inner.stale.contains(conversation_id)
    }

    pub fn is_list_stale(&self) -> bool {
        self.inner.list_stale.load(Ordering::SeqCst)
    }

    pub fn mark_list_fresh(&self) {
        self.inner.list_stale.store(false, Ordering::SeqCst);
    }

    pub fn put_detail(&self, detail: MessageDetail) {
        let message_id = detail.message_id.clone();
        self.inner.details.insert(message_id.clone(), detail);
        self.emit(CacheEvent::DetailStored { message_id });
    }

    pub fn detail(&self, message_id: &str) -> Option<MessageDetail> {
        self.inner.details.get(message_id).map(|d| d.value().clone())
    }
}
