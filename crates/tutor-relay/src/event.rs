//! Outbound events and the sinks that carry them to clients

use async_trait::async_trait;
use jiff::Timestamp;
use serde::Serialize;
use tokio::sync::mpsc;
use tutor_core::{Balance, Credits, HttpError, Message, MessageId, MessageStatus, ResponseMode, SenderType, Source};

use crate::citation::Citation;
use crate::error::RelayError;

/// User turn as shown to the client
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserMessageView {
    pub id: MessageId,
    pub sender_type: SenderType,
    pub content: String,
    pub created_at: Timestamp,
}

impl From<&Message> for UserMessageView {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id,
            sender_type: message.sender_type,
            content: message.content.clone(),
            created_at: message.created_at,
        }
    }
}

/// Assistant turn as shown to the client
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AiMessageView {
    pub id: MessageId,
    pub sender_type: SenderType,
    pub mode_type: Option<ResponseMode>,
    pub content: String,
    pub status: MessageStatus,
    pub credits_used: Credits,
    pub sources: Vec<Source>,
    pub created_at: Timestamp,
}

impl From<&Message> for AiMessageView {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id,
            sender_type: message.sender_type,
            mode_type: message.mode,
            content: message.content.clone(),
            status: message.status,
            credits_used: message.credits_used,
            sources: Vec::new(),
            created_at: message.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedPayload {
    pub user_message: UserMessageView,
    pub ai_message: AiMessageView,
}

/// Balance surfaced on the chunk that triggered metering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UserQuota {
    pub balance: Balance,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkPayload {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_quota: Option<UserQuota>,
}

/// Terminal payload; also the relay's return value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DonePayload {
    pub user_message: UserMessageView,
    pub ai_message: AiMessageView,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorPayload {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
}

impl From<&RelayError> for ErrorPayload {
    fn from(error: &RelayError) -> Self {
        Self {
            error_type: error.error_type().to_owned(),
            message: error.client_message(),
        }
    }
}

/// Event emitted to the client transport
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum RelayEvent {
    Started(StartedPayload),
    Chunk(ChunkPayload),
    Citation(Citation),
    Done(DonePayload),
    Error(ErrorPayload),
}

impl RelayEvent {
    /// Event name on the wire
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Started(_) => "started",
            Self::Chunk(_) => "chunk",
            Self::Citation(_) => "citation",
            Self::Done(_) => "done",
            Self::Error(_) => "error",
        }
    }

    /// JSON body of the event, without the name
    pub fn data(&self) -> serde_json::Result<String> {
        match self {
            Self::Started(payload) => serde_json::to_string(payload),
            Self::Chunk(payload) => serde_json::to_string(payload),
            Self::Citation(payload) => serde_json::to_string(payload),
            Self::Done(payload) => serde_json::to_string(payload),
            Self::Error(payload) => serde_json::to_string(payload),
        }
    }
}

/// Result of a single delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered,
    Failed,
}

impl SendOutcome {
    pub const fn is_delivered(self) -> bool {
        matches!(self, Self::Delivered)
    }
}

/// Destination for one response's events
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Attempt delivery; failure means the client is gone
    async fn try_send(&self, event: RelayEvent) -> SendOutcome;

    /// Error channel
    ///
    /// Returns `false` when the sink has no error handler, in which case the
    /// relay logs the error itself.
    async fn report_error(&self, _error: &RelayError) -> bool {
        false
    }
}

/// Sink over a bounded channel drained by the transport
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::Sender<RelayEvent>,
}

impl ChannelSink {
    pub const fn new(sender: mpsc::Sender<RelayEvent>) -> Self {
        Self { sender }
    }

    /// Sink plus the receiving half, with room for `buffer` pending events
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<RelayEvent>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        (Self::new(sender), receiver)
    }

    /// Whether the receiving half has been dropped
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Connection probe for a [`crate::CancellationToken`]
    pub fn connection_probe(&self) -> impl Fn() -> bool + Send + Sync + 'static {
        let sender = self.sender.clone();
        move || !sender.is_closed()
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn try_send(&self, event: RelayEvent) -> SendOutcome {
        match self.sender.send(event).await {
            Ok(()) => SendOutcome::Delivered,
            Err(_) => SendOutcome::Failed,
        }
    }

    async fn report_error(&self, error: &RelayError) -> bool {
        self.sender
            .send(RelayEvent::Error(ErrorPayload::from(error)))
            .await
            .is_ok()
    }
}
