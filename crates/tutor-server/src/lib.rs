//! HTTP server for the tutor response relay
//!
//! Exposes response creation as a server-sent event stream and lets the
//! client abort an in-flight response by id.

#![allow(clippy::missing_errors_doc, clippy::must_use_candidate)]

mod error;
mod identity;
mod registry;
mod responses;
mod upstream;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use http::{HeaderName, StatusCode};
use tower_http::trace::TraceLayer;
use tutor_billing::{CreditLedger, CreditMeter, HttpLedger, MemoryLedger};
use tutor_config::{BillingConfig, Config};
use tutor_relay::{MessageStore, RelaySettings, ResponseRouter, StreamRelay};

pub use error::ServerError;
pub use registry::{ActiveResponses, RegisteringSink};
pub use upstream::{UpstreamRequest, UpstreamResponse, UpstreamSource};

/// Assembled server with all routes and middleware
pub struct Server {
    router: Router,
    listen_address: SocketAddr,
    active: ActiveResponses,
}

impl Server {
    /// Build the server from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the relay settings or the identity header name
    /// are invalid
    pub fn new(
        config: &Config,
        upstream: Arc<dyn UpstreamSource>,
        store: Arc<dyn MessageStore>,
        ledger: Arc<dyn CreditLedger>,
    ) -> anyhow::Result<Self> {
        let listen_address = config
            .server
            .listen_address
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

        let settings = RelaySettings::try_from(&config.relay)?;
        let relay = StreamRelay::new(store, CreditMeter::new(ledger), settings);
        let active = ActiveResponses::new();

        let state = responses::ResponsesState {
            router: ResponseRouter::new(relay, &config.billing),
            upstream,
            active: active.clone(),
            sink_buffer: config.relay.sink_buffer,
        };

        // Response routes require a resolved user
        let user_header = HeaderName::try_from(config.server.user_header.as_str())?;
        let mut app = responses::responses_router(state).layer(axum::middleware::from_fn(move |req, next| {
            let header = user_header.clone();
            async move { identity::user_identity_middleware(&header, req, next).await }
        }));

        // Health check
        if config.server.health.enabled {
            app = app.route(
                &config.server.health.path,
                axum::routing::get(|| async { (StatusCode::OK, "ok") }),
            );
        }

        // Tracing
        app = app.layer(TraceLayer::new_for_http());

        Ok(Self {
            router: app,
            listen_address,
            active,
        })
    }

    /// Get the configured listen address
    #[must_use]
    pub const fn listen_address(&self) -> SocketAddr {
        self.listen_address
    }

    /// Registry of responses currently streaming
    #[must_use]
    pub fn active_responses(&self) -> ActiveResponses {
        self.active.clone()
    }

    /// Consume the server and return the inner router
    ///
    /// Useful for testing when the caller manages the listener
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Start serving requests
    ///
    /// Blocks until the cancellation token is triggered.
    ///
    /// # Errors
    ///
    /// Returns an error if binding the TCP listener or serving fails
    pub async fn serve(self, shutdown: tokio_util::sync::CancellationToken) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.listen_address).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(%local_addr, "server listening");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
                tracing::info!("graceful shutdown initiated");
            })
            .await?;

        Ok(())
    }
}

/// Credit ledger selected by the billing configuration
///
/// Uses the remote ledger when `[billing.ledger]` is set, otherwise an
/// in-memory ledger that starts every user at zero.
///
/// # Errors
///
/// Returns an error if the remote ledger client cannot be built
pub fn build_ledger(config: &BillingConfig) -> anyhow::Result<Arc<dyn CreditLedger>> {
    let Some(ledger) = &config.ledger else {
        if config.enabled {
            tracing::warn!("billing enabled without a remote ledger; balances are kept in memory");
        }
        return Ok(Arc::new(MemoryLedger::new()));
    };

    let client = HttpLedger::new(
        ledger.url.clone(),
        ledger.app_id.clone(),
        ledger.entity_type.clone(),
        ledger.service_api_key.clone(),
    )?;
    tracing::info!(url = %ledger.url, app_id = %ledger.app_id, "using remote credit ledger");

    Ok(Arc::new(client))
}
