//! Test server wrapper that starts the relay on a random port

use std::net::SocketAddr;
use std::sync::Arc;

use tutor_billing::MemoryLedger;
use tutor_config::Config;
use tutor_core::ConversationId;
use tutor_relay::MemoryStore;
use tutor_server::{ActiveResponses, Server};
use tokio_util::sync::CancellationToken;

use super::upstream::ScriptedUpstream;

/// A running test server instance
pub struct TestServer {
    addr: SocketAddr,
    shutdown: CancellationToken,
    client: reqwest::Client,
    store: Arc<MemoryStore>,
    ledger: Arc<MemoryLedger>,
    upstream: Arc<ScriptedUpstream>,
    active: ActiveResponses,
}

impl TestServer {
    /// Start a test server with the given configuration and provider
    ///
    /// Binds to port 0 for automatic port assignment
    pub async fn start(config: Config, upstream: ScriptedUpstream) -> anyhow::Result<Self> {
        let store = Arc::new(MemoryStore::new());
        let ledger = Arc::new(MemoryLedger::new());
        let upstream = Arc::new(upstream);

        let server = Server::new(&config, upstream.clone(), store.clone(), ledger.clone())?;
        let active = server.active_responses();
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        // Bind the listener here so we know the actual port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        tokio::spawn(async move {
            axum::serve(listener, server.into_router())
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        let client = reqwest::Client::new();

        Ok(Self {
            addr,
            shutdown,
            client,
            store,
            ledger,
            upstream,
            active,
        })
    }

    /// Base URL of the running test server
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// Get a reference to the HTTP client
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    pub fn ledger(&self) -> &MemoryLedger {
        &self.ledger
    }

    pub fn upstream(&self) -> &ScriptedUpstream {
        &self.upstream
    }

    pub fn active(&self) -> &ActiveResponses {
        &self.active
    }

    /// Request a response as `user` in a fresh conversation
    pub async fn respond(
        &self,
        user: &str,
        body: serde_json::Value,
    ) -> anyhow::Result<(ConversationId, reqwest::Response)> {
        let conversation = ConversationId::new();
        let response = self
            .client
            .post(self.url(&format!("/v1/conversations/{conversation}/responses")))
            .header("x-user-id", user)
            .json(&body)
            .send()
            .await?;
        Ok((conversation, response))
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
