//! Streaming relay for AI responses
//!
//! Takes an upstream provider's event sequence and re-emits it to one
//! connected client in paced, fixed-size chunks. Credits are charged once,
//! on first delivery. A client disconnect ends the response with exactly
//! what the client saw.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod adapter;
pub mod cancel;
pub mod chunk;
pub mod citation;
pub mod error;
pub mod event;
pub mod relay;
pub mod router;
pub mod session;
pub mod store;

#[cfg(test)]
mod testing;

pub use adapter::{Decoded, DeltaJsonAdapter, TokenStreamAdapter, UpstreamAdapter};
pub use cancel::{CancellationToken, ConnectionProbe};
pub use chunk::ChunkAccumulator;
pub use citation::{Citation, CitationCandidate, CitationCollector, filter_used_sources};
pub use error::RelayError;
pub use event::{ChannelSink, DonePayload, EventSink, RelayEvent, SendOutcome};
pub use relay::{Completion, FrameStream, RelayRequest, RelaySettings, SourcePolicy, StreamRelay};
pub use router::{Pricing, ResponseRequest, ResponseRouter};
pub use session::{RelayState, StreamSession};
pub use store::{MemoryStore, MessageStore, StoreError};
