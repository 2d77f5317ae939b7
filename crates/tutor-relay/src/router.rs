//! Mode-based selection of upstream adapter, pricing, and source policy

use tutor_config::{BillingConfig, ModeBillingConfig};
use tutor_core::{ConversationId, Credits, ResponseMode, Source, UserId};

use crate::adapter::{DeltaJsonAdapter, TokenStreamAdapter, UpstreamAdapter};
use crate::cancel::CancellationToken;
use crate::error::RelayError;
use crate::event::EventSink;
use crate::relay::{Completion, FrameStream, RelayRequest, SourcePolicy, StreamRelay};

/// A response to produce, before mode-specific policy is applied
#[derive(Debug, Clone)]
pub struct ResponseRequest {
    pub user_id: UserId,
    pub conversation_id: ConversationId,
    pub mode: ResponseMode,
    /// The user's turn
    pub content: String,
    /// Retrieved candidates for validated responses; ignored for research
    pub candidate_sources: Vec<Source>,
}

/// Cost of one response in a mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pricing {
    pub credits: Credits,
    pub metered: bool,
}

impl Pricing {
    pub const FREE: Self = Self {
        credits: 0,
        metered: false,
    };
}

impl From<ModeBillingConfig> for Pricing {
    fn from(config: ModeBillingConfig) -> Self {
        Self {
            credits: config.credits,
            metered: config.metered,
        }
    }
}

/// Composes the shared relay with the adapter and policy of each mode
#[derive(Debug, Clone)]
pub struct ResponseRouter {
    relay: StreamRelay,
    validated: Pricing,
    research: Pricing,
}

impl ResponseRouter {
    pub fn new(relay: StreamRelay, billing: &BillingConfig) -> Self {
        let (validated, research) = if billing.enabled {
            (billing.validated.into(), billing.research.into())
        } else {
            (Pricing::FREE, Pricing::FREE)
        };

        Self {
            relay,
            validated,
            research,
        }
    }

    pub const fn relay(&self) -> &StreamRelay {
        &self.relay
    }

    /// Adapter that understands the upstream frames of `mode`
    pub fn adapter_for(mode: ResponseMode) -> &'static dyn UpstreamAdapter {
        match mode {
            ResponseMode::Validated => &TokenStreamAdapter,
            ResponseMode::Research => &DeltaJsonAdapter,
        }
    }

    pub const fn pricing(&self, mode: ResponseMode) -> Pricing {
        match mode {
            ResponseMode::Validated => self.validated,
            ResponseMode::Research => self.research,
        }
    }

    /// Build the relay request for `request`, applying mode policy
    pub fn resolve(&self, request: ResponseRequest) -> RelayRequest {
        let pricing = self.pricing(request.mode);
        let sources = match request.mode {
            ResponseMode::Validated => SourcePolicy::Referenced(request.candidate_sources),
            ResponseMode::Research => SourcePolicy::Collected,
        };

        RelayRequest {
            user_id: request.user_id,
            conversation_id: request.conversation_id,
            mode: request.mode,
            content: request.content,
            cost: pricing.credits,
            metered: pricing.metered,
            sources,
        }
    }

    /// Resolve the mode's adapter and policy, then run the shared relay
    pub async fn respond(
        &self,
        request: ResponseRequest,
        upstream: FrameStream,
        sink: &dyn EventSink,
        cancel: &CancellationToken,
    ) -> Result<Completion, RelayError> {
        let adapter = Self::adapter_for(request.mode);
        tracing::debug!(
            user_id = %request.user_id,
            conversation_id = %request.conversation_id,
            mode = %request.mode,
            adapter = adapter.name(),
            "routing response"
        );

        let relay_request = self.resolve(request);
        self.relay.run(relay_request, adapter, upstream, sink, cancel).await
    }
}
