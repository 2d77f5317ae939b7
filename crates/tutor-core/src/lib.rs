//! Shared domain types for the tutor response relay

#![allow(clippy::must_use_candidate)]

mod error;
pub mod model;

pub use error::HttpError;
pub use model::{
    Balance, ConversationId, Credits, Message, MessageId, MessageStatus, NewMessage, ResponseMode, SenderType, Source,
    SourceKind, UserId,
};
