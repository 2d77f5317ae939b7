use std::fmt;
use std::str::FromStr;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Credits charged for a single response
pub type Credits = u32;

/// Signed credit balance (may be driven negative by concurrent charges the
/// pre-stream balance check could not see)
pub type Balance = i64;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a fresh random identifier
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID
            pub const fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Underlying UUID
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

uuid_id!(
    /// Identity of a persisted message row
    MessageId
);

uuid_id!(
    /// Identity of a conversation
    ConversationId
);

/// Authenticated user identity, as resolved by the external auth layer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderType {
    User,
    Assistant,
}

/// Response mode requested for an assistant turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMode {
    /// Retrieval-augmented answer validated against course material
    Validated,
    /// Web research answer with live citations
    Research,
}

impl ResponseMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validated => "validated",
            Self::Research => "research",
        }
    }
}

impl fmt::Display for ResponseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResponseMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "validated" => Ok(Self::Validated),
            "research" => Ok(Self::Research),
            other => Err(format!("unknown response mode: {other}")),
        }
    }
}

/// Lifecycle status of a message row
///
/// The relay only ever writes `Completed` (user turns) and `Streaming`
/// (assistant placeholders). Moving an assistant message out of
/// `Streaming` belongs to the external finalize step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Completed,
    Streaming,
}

/// A persisted conversation turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_type: SenderType,
    /// Absent on user turns
    pub mode: Option<ResponseMode>,
    pub content: String,
    pub status: MessageStatus,
    pub credits_used: Credits,
    pub created_at: Timestamp,
}

/// Attributes supplied when creating a message row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub conversation_id: ConversationId,
    pub sender_type: SenderType,
    pub mode: Option<ResponseMode>,
    pub content: String,
    pub status: MessageStatus,
    pub credits_used: Credits,
}

impl NewMessage {
    /// A completed user turn
    pub fn user(conversation_id: ConversationId, content: impl Into<String>) -> Self {
        Self {
            conversation_id,
            sender_type: SenderType::User,
            mode: None,
            content: content.into(),
            status: MessageStatus::Completed,
            credits_used: 0,
        }
    }

    /// An empty assistant placeholder awaiting streamed content
    pub const fn assistant_placeholder(conversation_id: ConversationId, mode: ResponseMode) -> Self {
        Self {
            conversation_id,
            sender_type: SenderType::Assistant,
            mode: Some(mode),
            content: String::new(),
            status: MessageStatus::Streaming,
            credits_used: 0,
        }
    }
}

/// Where a source came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Chunk returned by the retrieval step
    RetrievedDocument,
    /// Result surfaced by a web-search provider
    WebSearch,
}

/// A citation attached to an assistant message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub kind: SourceKind,
    pub title: String,
    #[serde(default)]
    pub body: String,
    pub url: String,
    pub relevance_score: f64,
}
