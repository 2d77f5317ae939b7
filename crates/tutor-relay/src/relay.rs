//! The relay state machine: one upstream sequence to one client, for one response

use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{Stream, StreamExt};
use tutor_billing::{ChargeState, CreditMeter};
use tutor_config::RelayConfig;
use tutor_core::{ConversationId, Credits, Message, MessageStatus, NewMessage, ResponseMode, Source, UserId};
use tutor_telemetry::RelayMetrics;

use crate::adapter::UpstreamAdapter;
use crate::cancel::CancellationToken;
use crate::chunk::ChunkAccumulator;
use crate::citation::{CitationCandidate, CitationCollector, filter_used_sources};
use crate::error::RelayError;
use crate::event::{AiMessageView, ChunkPayload, DonePayload, EventSink, RelayEvent, StartedPayload, UserQuota};
use crate::session::{RelayState, StreamSession};
use crate::store::MessageStore;

/// Ordered provider-native frames for one response
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, RelayError>> + Send>>;

/// Tunables resolved from [`RelayConfig`]
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub chunk_size: usize,
    pub pacing_per_char: Duration,
    pub citation_cap: usize,
    pub citation_title_max_chars: usize,
    pub preview_max_chars: usize,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            chunk_size: 20,
            pacing_per_char: Duration::from_millis(1),
            citation_cap: 10,
            citation_title_max_chars: 100,
            preview_max_chars: 100,
        }
    }
}

impl TryFrom<&RelayConfig> for RelaySettings {
    type Error = RelayError;

    fn try_from(config: &RelayConfig) -> Result<Self, Self::Error> {
        Ok(Self {
            chunk_size: config.chunk_size,
            pacing_per_char: config.pacing_per_char().map_err(RelayError::Setup)?,
            citation_cap: config.citation_cap,
            citation_title_max_chars: config.citation_title_max_chars,
            preview_max_chars: config.preview_max_chars,
        })
    }
}

/// Which sources get persisted with the response
#[derive(Debug, Clone, PartialEq)]
pub enum SourcePolicy {
    /// Retrieved candidates, kept only if referenced by `[n]` in the text
    Referenced(Vec<Source>),
    /// Citations collected from the live stream
    Collected,
}

/// Everything the relay needs to know about one response
#[derive(Debug, Clone)]
pub struct RelayRequest {
    pub user_id: UserId,
    pub conversation_id: ConversationId,
    pub mode: ResponseMode,
    /// The user's turn
    pub content: String,
    pub cost: Credits,
    pub metered: bool,
    pub sources: SourcePolicy,
}

/// Result of a relay run
#[derive(Debug, Clone)]
pub struct Completion {
    /// Payload of the `done` event, returned whether or not it was delivered
    pub payload: DonePayload,
    pub aborted: bool,
    pub done_delivered: bool,
    pub state: RelayState,
}

/// Drives one response through `Starting → Streaming → Flushing → Completing → Done`
///
/// Shared across responses; all per-response state lives in a
/// [`StreamSession`] created by [`run`](Self::run).
#[derive(Clone)]
pub struct StreamRelay {
    store: Arc<dyn MessageStore>,
    meter: CreditMeter,
    settings: RelaySettings,
    metrics: RelayMetrics,
}

impl StreamRelay {
    pub fn new(store: Arc<dyn MessageStore>, meter: CreditMeter, settings: RelaySettings) -> Self {
        Self {
            store,
            meter,
            settings,
            metrics: RelayMetrics::global(),
        }
    }

    pub const fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    /// Relay `upstream` to `sink` until exhaustion or cancellation
    ///
    /// Disconnects are not errors: the response is completed with whatever
    /// reached the client. Setup, metering, and completion persistence
    /// failures are reported on the sink's error channel and returned.
    pub async fn run(
        &self,
        request: RelayRequest,
        adapter: &dyn UpstreamAdapter,
        upstream: FrameStream,
        sink: &dyn EventSink,
        cancel: &CancellationToken,
    ) -> Result<Completion, RelayError> {
        let started_at = Instant::now();
        let result = self.drive(&request, adapter, upstream, sink, cancel).await;

        match &result {
            Ok(completion) => {
                self.metrics
                    .stream_finished(request.mode.as_str(), started_at, completion.aborted);
                tracing::debug!(
                    user_id = %request.user_id,
                    conversation_id = %request.conversation_id,
                    message_id = %completion.payload.ai_message.id,
                    aborted = completion.aborted,
                    done_delivered = completion.done_delivered,
                    "response relayed"
                );
            }
            Err(e) => {
                if e.is_fatal() {
                    tracing::error!(
                        user_id = %request.user_id,
                        conversation_id = %request.conversation_id,
                        mode = %request.mode,
                        error = %e,
                        "relay failed"
                    );
                } else {
                    tracing::warn!(
                        user_id = %request.user_id,
                        conversation_id = %request.conversation_id,
                        mode = %request.mode,
                        error = %e,
                        "relay interrupted"
                    );
                }
                if !sink.report_error(e).await {
                    tracing::warn!(error = %e, "error channel unavailable, client was not notified");
                }
            }
        }

        result
    }

    async fn drive(
        &self,
        request: &RelayRequest,
        adapter: &dyn UpstreamAdapter,
        mut upstream: FrameStream,
        sink: &dyn EventSink,
        cancel: &CancellationToken,
    ) -> Result<Completion, RelayError> {
        let mut session = StreamSession::new(
            ChunkAccumulator::new(self.settings.chunk_size, self.settings.pacing_per_char),
            CitationCollector::new(self.settings.citation_title_max_chars),
            ChargeState::new(request.cost, request.metered),
        );

        let user_message = self
            .store
            .create_message(NewMessage::user(request.conversation_id, request.content.clone()))
            .await?;
        let ai_message = self
            .store
            .create_message(NewMessage::assistant_placeholder(request.conversation_id, request.mode))
            .await?;
        let reference = ai_message.id.to_string();

        let started = RelayEvent::Started(StartedPayload {
            user_message: (&user_message).into(),
            ai_message: (&ai_message).into(),
        });
        if !sink.try_send(started).await.is_delivered() {
            session.abort();
        }

        session.transition(RelayState::Streaming);
        while !session.is_aborted() {
            if cancel.is_cancelled() {
                session.abort();
                break;
            }

            let next = tokio::select! {
                next = upstream.next() => next,
                () = cancel.aborted() => {
                    session.abort();
                    break;
                }
            };
            let frame = match next {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => {
                    Self::report_upstream(request, sink, &e).await;
                    break;
                }
                None => break,
            };

            let decoded = adapter.decode(&frame);
            for candidate in decoded.citations {
                Self::collect_citation(&mut session, candidate, sink).await;
            }
            if let Some(delta) = decoded.text_delta.as_deref() {
                session.push_text(delta);
                self.drain_ready(&mut session, request, &reference, sink, cancel).await?;
            }
        }

        if !session.is_aborted() {
            session.transition(RelayState::Flushing);
            if cancel.is_cancelled() {
                session.abort();
            } else if let Some(remainder) = session.take_remainder() {
                self.deliver(&mut session, request, &reference, &remainder, sink).await?;
            }
        }

        session.transition(RelayState::Completing);
        let payload = self
            .complete(&session, request, adapter, &user_message, &ai_message)
            .await?;

        let done_delivered = sink.try_send(RelayEvent::Done(payload.clone())).await.is_delivered();
        if !done_delivered {
            tracing::debug!(message_id = %ai_message.id, "done event not delivered");
        }

        let aborted = session.is_aborted();
        session.transition(if aborted { RelayState::Aborted } else { RelayState::Done });

        Ok(Completion {
            payload,
            aborted,
            done_delivered,
            state: session.state(),
        })
    }

    /// Deliver every full chunk currently buffered, pacing between them
    async fn drain_ready(
        &self,
        session: &mut StreamSession,
        request: &RelayRequest,
        reference: &str,
        sink: &dyn EventSink,
        cancel: &CancellationToken,
    ) -> Result<(), RelayError> {
        while let Some(chunk) = session.next_chunk() {
            if cancel.is_cancelled() {
                session.abort();
                return Ok(());
            }
            if !self.deliver(session, request, reference, &chunk, sink).await? {
                return Ok(());
            }
            if !session.accumulator().pace(&chunk, cancel).await {
                session.abort();
                return Ok(());
            }
        }
        Ok(())
    }

    /// Hand one chunk to the sink, charging first if it is the first one
    ///
    /// Returns whether the chunk was delivered. A failed delivery aborts the
    /// session, and a charge made for that chunk is reversed.
    async fn deliver(
        &self,
        session: &mut StreamSession,
        request: &RelayRequest,
        reference: &str,
        chunk: &str,
        sink: &dyn EventSink,
    ) -> Result<bool, RelayError> {
        let balance = if session.first_chunk_sent() {
            None
        } else {
            let description = format!("AI response ({})", request.mode);
            self.meter
                .charge_on_first_chunk(session.charge_mut(), &request.user_id, reference, &description)
                .await?
        };

        let event = RelayEvent::Chunk(ChunkPayload {
            content: chunk.to_owned(),
            user_quota: balance.map(|balance| UserQuota { balance }),
        });

        if sink.try_send(event).await.is_delivered() {
            session.record_delivered(chunk);
            self.metrics.chunk_delivered(request.mode.as_str());
            if balance.is_some() {
                self.metrics
                    .credits_charged(request.mode.as_str(), session.charge().credits_used());
            }
            return Ok(true);
        }

        tracing::debug!(
            user_id = %request.user_id,
            chunks_delivered = session.chunks_delivered(),
            "chunk delivery failed, treating as disconnect"
        );
        if balance.is_some() {
            self.meter
                .reverse(session.charge_mut(), &request.user_id, reference)
                .await?;
        }
        session.abort();
        Ok(false)
    }

    async fn collect_citation(session: &mut StreamSession, candidate: CitationCandidate, sink: &dyn EventSink) {
        let Some(citation) = session.collector_mut().accept(candidate) else {
            return;
        };
        if session.is_aborted() {
            return;
        }
        if !sink.try_send(RelayEvent::Citation(citation)).await.is_delivered() {
            tracing::debug!("citation event not delivered");
        }
    }

    async fn report_upstream(request: &RelayRequest, sink: &dyn EventSink, error: &RelayError) {
        tracing::warn!(
            user_id = %request.user_id,
            conversation_id = %request.conversation_id,
            error = %error,
            "upstream failed mid-stream, finishing with received text"
        );
        if !sink.report_error(error).await {
            tracing::debug!("no error handler for upstream failure");
        }
    }

    /// Persist sources and activity, then build the terminal payload
    async fn complete(
        &self,
        session: &StreamSession,
        request: &RelayRequest,
        adapter: &dyn UpstreamAdapter,
        user_message: &Message,
        ai_message: &Message,
    ) -> Result<DonePayload, RelayError> {
        // An aborted response is only what the client actually saw
        let text = if session.is_aborted() {
            session.delivered_text().to_owned()
        } else {
            adapter.finalize_text(session.upstream_text())
        };

        let sources = match &request.sources {
            SourcePolicy::Referenced(candidates) => filter_used_sources(&text, candidates),
            SourcePolicy::Collected => session.collector().finish(self.settings.citation_cap),
        };
        if !sources.is_empty() {
            self.store.create_sources(ai_message.id, &sources).await?;
        }

        let preview = preview(&text, self.settings.preview_max_chars);
        self.store
            .touch_conversation(request.conversation_id, preview.as_deref())
            .await?;

        let current = self.store.get_message(ai_message.id).await?;
        let finalized = current.status != MessageStatus::Streaming;
        let mut ai_view = AiMessageView::from(&current);
        if !finalized {
            ai_view.content = text;
        }
        ai_view.credits_used = session.charge().credits_used();
        ai_view.sources = sources;

        Ok(DonePayload {
            user_message: user_message.into(),
            ai_message: ai_view,
        })
    }
}

/// Leading characters of the response for the conversation list
fn preview(text: &str, max_chars: usize) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty() && max_chars > 0).then(|| trimmed.chars().take(max_chars).collect())
}

impl std::fmt::Debug for StreamRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamRelay")
            .field("meter", &self.meter)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
