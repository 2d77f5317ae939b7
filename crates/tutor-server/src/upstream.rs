//! Seam to the AI provider that produces the raw frame sequence

use async_trait::async_trait;
use tutor_core::{ConversationId, ResponseMode, Source, UserId};
use tutor_relay::{FrameStream, RelayError};

/// What the provider is asked to answer
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub user_id: UserId,
    pub conversation_id: ConversationId,
    pub mode: ResponseMode,
    pub content: String,
}

/// An opened provider stream
pub struct UpstreamResponse {
    /// Raw frames in the mode's wire format
    pub frames: FrameStream,
    /// Retrieved candidates the answer may reference by `[n]`
    pub candidate_sources: Vec<Source>,
}

impl UpstreamResponse {
    pub fn new(frames: FrameStream) -> Self {
        Self {
            frames,
            candidate_sources: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_sources(mut self, sources: Vec<Source>) -> Self {
        self.candidate_sources = sources;
        self
    }
}

impl std::fmt::Debug for UpstreamResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamResponse")
            .field("candidate_sources", &self.candidate_sources.len())
            .finish_non_exhaustive()
    }
}

/// Opens provider streams for incoming requests
///
/// Retrieval and prompt assembly happen behind this trait; the server only
/// relays what it returns.
#[async_trait]
pub trait UpstreamSource: Send + Sync {
    async fn open(&self, request: &UpstreamRequest) -> Result<UpstreamResponse, RelayError>;
}
