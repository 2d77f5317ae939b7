//! Test doubles shared by the relay and router tests

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures_util::stream;
use tutor_core::{Balance, ConversationId, Message, MessageId, NewMessage, Source};

use crate::cancel::CancellationToken;
use crate::error::RelayError;
use crate::event::{ErrorPayload, EventSink, RelayEvent, SendOutcome};
use crate::relay::FrameStream;
use crate::store::{MemoryStore, MessageStore, StoreError};

pub fn frames(items: &[&str]) -> FrameStream {
    let items: Vec<Result<String, RelayError>> = items.iter().map(|s| Ok((*s).to_owned())).collect();
    Box::pin(stream::iter(items))
}

pub fn frames_then_error(items: &[&str], error: &str) -> FrameStream {
    let mut items: Vec<Result<String, RelayError>> = items.iter().map(|s| Ok((*s).to_owned())).collect();
    items.push(Err(RelayError::Upstream(error.to_owned())));
    Box::pin(stream::iter(items))
}

type StartedHook = Box<dyn Fn(MessageId) + Send + Sync>;

/// Sink that records every delivered event and can simulate disconnects
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<RelayEvent>>,
    chunk_attempts: AtomicUsize,
    chunks_delivered: AtomicUsize,
    fail_chunks_from: Option<usize>,
    fail_event: Option<&'static str>,
    abort_after: Option<(usize, CancellationToken)>,
    on_started: Option<StartedHook>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Abort `token` right after the `n`th chunk is delivered
    pub fn abort_after_chunks(mut self, n: usize, token: CancellationToken) -> Self {
        self.abort_after = Some((n, token));
        self
    }

    /// Fail every chunk delivery from the zero-based attempt `index` on
    pub const fn fail_chunks_from(mut self, index: usize) -> Self {
        self.fail_chunks_from = Some(index);
        self
    }

    pub const fn fail_event(mut self, name: &'static str) -> Self {
        self.fail_event = Some(name);
        self
    }

    pub fn on_started(mut self, hook: impl Fn(MessageId) + Send + Sync + 'static) -> Self {
        self.on_started = Some(Box::new(hook));
        self
    }

    pub fn events(&self) -> Vec<RelayEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(RelayEvent::name).collect()
    }

    pub fn chunks(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                RelayEvent::Chunk(chunk) => Some(chunk.content),
                _ => None,
            })
            .collect()
    }

    pub fn quotas(&self) -> Vec<Option<Balance>> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                RelayEvent::Chunk(chunk) => Some(chunk.user_quota.map(|q| q.balance)),
                _ => None,
            })
            .collect()
    }

    pub fn citation_urls(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                RelayEvent::Citation(citation) => Some(citation.url),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                RelayEvent::Error(error) => Some(error.error_type),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn try_send(&self, event: RelayEvent) -> SendOutcome {
        let is_chunk = matches!(event, RelayEvent::Chunk(_));

        if is_chunk {
            let attempt = self.chunk_attempts.fetch_add(1, Ordering::SeqCst);
            if self.fail_chunks_from.is_some_and(|from| attempt >= from) {
                return SendOutcome::Failed;
            }
        }
        if self.fail_event == Some(event.name()) {
            return SendOutcome::Failed;
        }
        if let (RelayEvent::Started(started), Some(hook)) = (&event, &self.on_started) {
            hook(started.ai_message.id);
        }

        self.events.lock().unwrap().push(event);

        if is_chunk {
            let delivered = self.chunks_delivered.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some((n, token)) = &self.abort_after
                && delivered == *n
            {
                token.abort();
            }
        }

        SendOutcome::Delivered
    }

    async fn report_error(&self, error: &RelayError) -> bool {
        self.events
            .lock()
            .unwrap()
            .push(RelayEvent::Error(ErrorPayload::from(error)));
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailAt {
    Create,
    Touch,
}

/// Memory store that fails one kind of write
pub struct FailingStore {
    inner: MemoryStore,
    fail_at: FailAt,
}

impl FailingStore {
    pub fn on_create() -> Self {
        Self {
            inner: MemoryStore::new(),
            fail_at: FailAt::Create,
        }
    }

    pub fn on_touch() -> Self {
        Self {
            inner: MemoryStore::new(),
            fail_at: FailAt::Touch,
        }
    }

    fn broken() -> StoreError {
        StoreError::Backend("database unavailable".to_owned())
    }
}

#[async_trait]
impl MessageStore for FailingStore {
    async fn create_message(&self, message: NewMessage) -> Result<Message, StoreError> {
        if self.fail_at == FailAt::Create {
            return Err(Self::broken());
        }
        self.inner.create_message(message).await
    }

    async fn get_message(&self, id: MessageId) -> Result<Message, StoreError> {
        self.inner.get_message(id).await
    }

    async fn touch_conversation(
        &self,
        conversation_id: ConversationId,
        preview: Option<&str>,
    ) -> Result<(), StoreError> {
        if self.fail_at == FailAt::Touch {
            return Err(Self::broken());
        }
        self.inner.touch_conversation(conversation_id, preview).await
    }

    async fn create_sources(&self, message_id: MessageId, sources: &[Source]) -> Result<(), StoreError> {
        self.inner.create_sources(message_id, sources).await
    }
}
