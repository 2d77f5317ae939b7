//! In-flight responses that can be aborted by id

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dashmap::DashMap;
use tutor_core::{MessageId, UserId};
use tutor_relay::{CancellationToken, EventSink, RelayError, RelayEvent, SendOutcome};

/// Cancellation handles of every response currently streaming
#[derive(Debug, Clone, Default)]
pub struct ActiveResponses {
    entries: Arc<DashMap<MessageId, (UserId, CancellationToken)>>,
}

impl ActiveResponses {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: MessageId, owner: UserId, cancel: CancellationToken) {
        self.entries.insert(id, (owner, cancel));
    }

    pub fn remove(&self, id: MessageId) {
        self.entries.remove(&id);
    }

    /// Abort `id` on behalf of `caller`
    ///
    /// Returns `false` if no such response is streaming for this caller.
    pub fn abort(&self, id: MessageId, caller: &UserId) -> bool {
        let Some(entry) = self.entries.get(&id) else {
            return false;
        };
        let (owner, cancel) = entry.value();
        if owner != caller {
            return false;
        }

        cancel.abort();
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Sink that registers the response once its id is known
///
/// The assistant message id is first seen on the `started` event; from
/// then until [`RegisteringSink::unregister`] the response is abortable.
pub struct RegisteringSink<S> {
    inner: S,
    registry: ActiveResponses,
    owner: UserId,
    cancel: CancellationToken,
    registered: Mutex<Option<MessageId>>,
}

impl<S: EventSink> RegisteringSink<S> {
    pub const fn new(inner: S, registry: ActiveResponses, owner: UserId, cancel: CancellationToken) -> Self {
        Self {
            inner,
            registry,
            owner,
            cancel,
            registered: Mutex::new(None),
        }
    }

    /// Drop the registry entry, if any
    pub fn unregister(&self) {
        let id = self.registered.lock().ok().and_then(|mut slot| slot.take());
        if let Some(id) = id {
            self.registry.remove(id);
        }
    }
}

#[async_trait]
impl<S: EventSink> EventSink for RegisteringSink<S> {
    async fn try_send(&self, event: RelayEvent) -> SendOutcome {
        if let RelayEvent::Started(started) = &event {
            let id = started.ai_message.id;
            self.registry.register(id, self.owner.clone(), self.cancel.clone());
            if let Ok(mut slot) = self.registered.lock() {
                *slot = Some(id);
            }
        }

        self.inner.try_send(event).await
    }

    async fn report_error(&self, error: &RelayError) -> bool {
        self.inner.report_error(error).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abort_requires_owner() {
        let registry = ActiveResponses::new();
        let id = MessageId::new();
        let cancel = CancellationToken::new();
        registry.register(id, UserId::new("usr_a"), cancel.clone());

        assert!(!registry.abort(id, &UserId::new("usr_b")));
        assert!(!cancel.is_cancelled());

        assert!(registry.abort(id, &UserId::new("usr_a")));
        assert!(cancel.is_cancelled());
    }

    #[test]
    fn unknown_response_is_not_abortable() {
        let registry = ActiveResponses::new();
        assert!(!registry.abort(MessageId::new(), &UserId::new("usr_a")));
    }

    #[test]
    fn unregister_without_started_is_noop() {
        let registry = ActiveResponses::new();
        let (channel, _receiver) = tutor_relay::ChannelSink::channel(4);
        let sink = RegisteringSink::new(channel, registry.clone(), UserId::new("u"), CancellationToken::new());

        sink.unregister();
        assert!(registry.is_empty());
    }
}
