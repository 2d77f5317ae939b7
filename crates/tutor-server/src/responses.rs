//! Response creation and abort endpoints

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Extension, Json, Router};
use futures_util::Stream;
use futures_util::stream;
use http::StatusCode;
use serde::Deserialize;
use tokio::sync::mpsc;
use tutor_core::{ConversationId, MessageId, ResponseMode, UserId};
use tutor_relay::{CancellationToken, ChannelSink, RelayEvent, ResponseRequest, ResponseRouter};

use crate::error::ServerError;
use crate::registry::{ActiveResponses, RegisteringSink};
use crate::upstream::{UpstreamRequest, UpstreamSource};

/// Shared state of the response endpoints
#[derive(Clone)]
pub struct ResponsesState {
    pub router: ResponseRouter,
    pub upstream: Arc<dyn UpstreamSource>,
    pub active: ActiveResponses,
    pub sink_buffer: usize,
}

/// Body of `POST /v1/conversations/{conversation_id}/responses`
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateResponseBody {
    pub content: String,
    #[serde(default = "default_mode")]
    pub mode: ResponseMode,
}

const fn default_mode() -> ResponseMode {
    ResponseMode::Validated
}

pub fn responses_router(state: ResponsesState) -> Router {
    Router::new()
        .route("/v1/conversations/{conversation_id}/responses", post(create_response))
        .route("/v1/responses/{message_id}/abort", post(abort_response))
        .with_state(state)
}

/// Open the provider, then relay its answer as an SSE stream
///
/// The relay runs on its own task so that a dropped client connection is
/// observed through the channel instead of cancelling the relay mid-write.
async fn create_response(
    State(state): State<ResponsesState>,
    Extension(user_id): Extension<UserId>,
    Path(conversation_id): Path<ConversationId>,
    Json(body): Json<CreateResponseBody>,
) -> Result<Response, ServerError> {
    let content = body.content.trim();
    if content.is_empty() {
        return Err(ServerError::InvalidRequest("content must not be empty".to_owned()));
    }

    let upstream_request = UpstreamRequest {
        user_id: user_id.clone(),
        conversation_id,
        mode: body.mode,
        content: content.to_owned(),
    };
    let upstream = state.upstream.open(&upstream_request).await.map_err(|e| {
        tracing::warn!(%conversation_id, mode = %body.mode, error = %e, "failed to open upstream");
        ServerError::Upstream(e.to_string())
    })?;

    let (channel, receiver) = ChannelSink::channel(state.sink_buffer);
    let cancel = CancellationToken::with_probe(channel.connection_probe());
    let sink = RegisteringSink::new(channel, state.active.clone(), user_id.clone(), cancel.clone());

    let request = ResponseRequest {
        user_id,
        conversation_id,
        mode: body.mode,
        content: upstream_request.content,
        candidate_sources: upstream.candidate_sources,
    };
    let router = state.router;
    let abort_on_drop = cancel.clone();

    tokio::spawn(async move {
        let result = router.respond(request, upstream.frames, &sink, &cancel).await;
        sink.unregister();

        if let Err(e) = result {
            tracing::debug!(%conversation_id, error = %e, "response ended with error");
        }
    });

    Ok(Sse::new(event_stream(receiver, AbortOnDrop(abort_on_drop)))
        .keep_alive(KeepAlive::default())
        .into_response())
}

/// Abort an in-flight response owned by the caller
#[allow(clippy::unused_async)]
async fn abort_response(
    State(state): State<ResponsesState>,
    Extension(user_id): Extension<UserId>,
    Path(message_id): Path<MessageId>,
) -> Result<StatusCode, ServerError> {
    if state.active.abort(message_id, &user_id) {
        tracing::info!(%message_id, %user_id, "response aborted by client");
        Ok(StatusCode::ACCEPTED)
    } else {
        Err(ServerError::ResponseNotFound(message_id))
    }
}

/// Aborts the relay once the client's event stream is dropped
///
/// Wakes a relay that is waiting on a silent provider, which the
/// connection probe alone cannot do.
struct AbortOnDrop(CancellationToken);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn event_stream(
    receiver: mpsc::Receiver<RelayEvent>,
    guard: AbortOnDrop,
) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold((receiver, guard), |(mut receiver, guard)| async move {
        let event = receiver.recv().await?;
        Some((Ok(to_sse(&event)), (receiver, guard)))
    })
}

fn to_sse(event: &RelayEvent) -> Event {
    match event.data() {
        Ok(data) => Event::default().event(event.name()).data(data),
        Err(e) => {
            tracing::error!(event = event.name(), error = %e, "failed to serialize relay event");
            Event::default()
                .event("error")
                .data(r#"{"type":"internal_error","message":"failed to encode event"}"#)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_defaults_to_validated() {
        let body: CreateResponseBody = serde_json::from_str(r#"{"content":"hi"}"#).unwrap();
        assert_eq!(body.mode, ResponseMode::Validated);

        let body: CreateResponseBody = serde_json::from_str(r#"{"content":"hi","mode":"research"}"#).unwrap();
        assert_eq!(body.mode, ResponseMode::Research);
    }

    #[tokio::test]
    async fn dropping_the_event_stream_aborts_the_relay() {
        let (channel, receiver) = ChannelSink::channel(4);
        let cancel = CancellationToken::with_probe(channel.connection_probe());
        let events = event_stream(receiver, AbortOnDrop(cancel.clone()));
        assert!(!cancel.is_cancelled());

        drop(events);
        tokio::time::timeout(std::time::Duration::from_secs(1), cancel.aborted())
            .await
            .unwrap();
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(serde_json::from_str::<CreateResponseBody>(r#"{"content":"hi","model":"x"}"#).is_err());
    }
}
