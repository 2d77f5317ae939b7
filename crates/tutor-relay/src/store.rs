//! Persistence contract for messages, sources, and conversation activity

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use jiff::Timestamp;
use thiserror::Error;
use tutor_core::{ConversationId, Message, MessageId, NewMessage, Source};

/// Errors raised by a message store
#[derive(Debug, Error)]
pub enum StoreError {
    /// No message row with this id
    #[error("message not found: {0}")]
    NotFound(MessageId),

    /// The backing store failed
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Reads and writes the relay needs from the durable store
///
/// The relay never deletes or finalizes message content; moving an
/// assistant message out of `streaming` is an external step.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn create_message(&self, message: NewMessage) -> Result<Message, StoreError>;

    async fn get_message(&self, id: MessageId) -> Result<Message, StoreError>;

    /// Bump the conversation's last-activity time, optionally with a preview
    async fn touch_conversation(
        &self,
        conversation_id: ConversationId,
        preview: Option<&str>,
    ) -> Result<(), StoreError>;

    async fn create_sources(&self, message_id: MessageId, sources: &[Source]) -> Result<(), StoreError>;
}

/// Last recorded activity on a conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationActivity {
    pub last_activity: Timestamp,
    pub preview: Option<String>,
}

/// Store held in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    messages: DashMap<MessageId, (u64, Message)>,
    next_seq: AtomicU64,
    sources: DashMap<MessageId, Vec<Source>>,
    activity: DashMap<ConversationId, ConversationActivity>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages of a conversation, oldest first
    pub fn conversation_messages(&self, conversation_id: ConversationId) -> Vec<Message> {
        let mut messages: Vec<(u64, Message)> = self
            .messages
            .iter()
            .filter(|entry| entry.value().1.conversation_id == conversation_id)
            .map(|entry| entry.value().clone())
            .collect();
        messages.sort_by_key(|(seq, _)| *seq);
        messages.into_iter().map(|(_, message)| message).collect()
    }

    pub fn sources(&self, message_id: MessageId) -> Vec<Source> {
        self.sources
            .get(&message_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    pub fn activity(&self, conversation_id: ConversationId) -> Option<ConversationActivity> {
        self.activity.get(&conversation_id).map(|entry| entry.value().clone())
    }

    /// Apply an out-of-band edit, as a finalize step running elsewhere would
    pub fn update_message(&self, id: MessageId, update: impl FnOnce(&mut Message)) -> Result<(), StoreError> {
        let mut entry = self.messages.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        update(&mut entry.value_mut().1);
        Ok(())
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn create_message(&self, message: NewMessage) -> Result<Message, StoreError> {
        let message = Message {
            id: MessageId::new(),
            conversation_id: message.conversation_id,
            sender_type: message.sender_type,
            mode: message.mode,
            content: message.content,
            status: message.status,
            credits_used: message.credits_used,
            created_at: Timestamp::now(),
        };
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.messages.insert(message.id, (seq, message.clone()));
        Ok(message)
    }

    async fn get_message(&self, id: MessageId) -> Result<Message, StoreError> {
        self.messages
            .get(&id)
            .map(|entry| entry.value().1.clone())
            .ok_or(StoreError::NotFound(id))
    }

    async fn touch_conversation(
        &self,
        conversation_id: ConversationId,
        preview: Option<&str>,
    ) -> Result<(), StoreError> {
        self.activity.insert(
            conversation_id,
            ConversationActivity {
                last_activity: Timestamp::now(),
                preview: preview.map(str::to_owned),
            },
        );
        Ok(())
    }

    async fn create_sources(&self, message_id: MessageId, sources: &[Source]) -> Result<(), StoreError> {
        self.sources
            .entry(message_id)
            .or_default()
            .extend_from_slice(sources);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tutor_core::{MessageStatus, ResponseMode, SenderType, SourceKind};

    use super::*;

    #[tokio::test]
    async fn creates_and_reads_messages() {
        let store = MemoryStore::new();
        let conversation = ConversationId::new();

        let user = store
            .create_message(NewMessage::user(conversation, "Explain osmosis"))
            .await
            .unwrap();
        let ai = store
            .create_message(NewMessage::assistant_placeholder(conversation, ResponseMode::Validated))
            .await
            .unwrap();

        let fetched = store.get_message(ai.id).await.unwrap();
        assert_eq!(fetched.status, MessageStatus::Streaming);
        assert_eq!(fetched.sender_type, SenderType::Assistant);

        let all = store.conversation_messages(conversation);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, user.id);
    }

    #[tokio::test]
    async fn missing_message_is_not_found() {
        let store = MemoryStore::new();
        let err = store.get_message(MessageId::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn sources_accumulate_per_message() {
        let store = MemoryStore::new();
        let id = MessageId::new();
        let source = Source {
            kind: SourceKind::RetrievedDocument,
            title: "Osmosis".to_owned(),
            body: "Water moves across membranes".to_owned(),
            url: "https://course.example/osmosis".to_owned(),
            relevance_score: 0.8,
        };

        store.create_sources(id, &[source.clone()]).await.unwrap();

        assert_eq!(store.sources(id), vec![source]);
        assert!(store.sources(MessageId::new()).is_empty());
    }

    #[tokio::test]
    async fn touch_records_preview() {
        let store = MemoryStore::new();
        let conversation = ConversationId::new();

        store.touch_conversation(conversation, Some("Water moves")).await.unwrap();

        let activity = store.activity(conversation).unwrap();
        assert_eq!(activity.preview.as_deref(), Some("Water moves"));
    }
}
