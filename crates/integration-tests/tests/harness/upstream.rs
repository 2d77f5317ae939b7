//! Scripted provider that replays canned frames

use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{StreamExt, stream};
use tutor_core::{ResponseMode, Source};
use tutor_relay::{FrameStream, RelayError};
use tutor_server::{UpstreamRequest, UpstreamResponse, UpstreamSource};

/// Provider double returning the same frames for every request of a mode
#[derive(Default)]
pub struct ScriptedUpstream {
    validated: Vec<String>,
    research: Vec<String>,
    candidates: Vec<Source>,
    frame_delay: Duration,
    stall_after: Option<usize>,
    unavailable: bool,
    open_count: AtomicU32,
    last_request: Mutex<Option<UpstreamRequest>>,
}

impl ScriptedUpstream {
    /// Plain-text tokens for validated responses
    pub fn validated(frames: &[&str]) -> Self {
        Self {
            validated: frames.iter().map(|f| (*f).to_owned()).collect(),
            ..Self::default()
        }
    }

    /// Delta-JSON frames for research responses
    pub fn research(frames: &[serde_json::Value]) -> Self {
        let mut research: Vec<String> = frames.iter().map(ToString::to_string).collect();
        research.push("[DONE]".to_owned());
        Self {
            research,
            ..Self::default()
        }
    }

    /// Provider that refuses every request
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    pub fn with_candidates(mut self, candidates: Vec<Source>) -> Self {
        self.candidates = candidates;
        self
    }

    /// Wait `delay` before yielding each frame
    pub fn with_frame_delay(mut self, delay: Duration) -> Self {
        self.frame_delay = delay;
        self
    }

    /// Go silent after `frames` frames without ending the stream
    pub fn with_stall_after(mut self, frames: usize) -> Self {
        self.stall_after = Some(frames);
        self
    }

    pub fn open_count(&self) -> u32 {
        self.open_count.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<UpstreamRequest> {
        self.last_request.lock().unwrap().clone()
    }
}

#[async_trait]
impl UpstreamSource for ScriptedUpstream {
    async fn open(&self, request: &UpstreamRequest) -> Result<UpstreamResponse, RelayError> {
        self.open_count.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());

        if self.unavailable {
            return Err(RelayError::Upstream("connection refused".to_owned()));
        }

        let frames = match request.mode {
            ResponseMode::Validated => self.validated.clone(),
            ResponseMode::Research => self.research.clone(),
        };
        let delay = self.frame_delay;
        let replay = stream::iter(frames).then(move |frame| async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Ok::<_, RelayError>(frame)
        });
        let frames: FrameStream = match self.stall_after {
            Some(n) => Box::pin(replay.take(n).chain(stream::pending())),
            None => Box::pin(replay),
        };

        Ok(UpstreamResponse::new(frames).with_sources(self.candidates.clone()))
    }
}
