//! Programmatic configuration builder for integration tests

use std::net::SocketAddr;

use tutor_config::{BillingConfig, Config, HealthConfig, ModeBillingConfig, RelayConfig, ServerConfig};

/// Builder for constructing test configurations
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with minimal defaults and no pacing
    pub fn new() -> Self {
        Self {
            config: Config {
                server: ServerConfig {
                    listen_address: Some(SocketAddr::from(([127, 0, 0, 1], 0))),
                    health: HealthConfig {
                        enabled: true,
                        ..HealthConfig::default()
                    },
                    ..ServerConfig::default()
                },
                relay: RelayConfig {
                    pacing: "0ms".to_owned(),
                    ..RelayConfig::default()
                },
                billing: BillingConfig::default(),
                telemetry: None,
            },
        }
    }

    /// Enable metering at the given per-mode costs
    pub fn with_billing(mut self, validated: u32, research: u32) -> Self {
        self.config.billing = BillingConfig {
            enabled: true,
            validated: ModeBillingConfig {
                credits: validated,
                metered: true,
            },
            research: ModeBillingConfig {
                credits: research,
                metered: true,
            },
            ledger: None,
        };
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.config.relay.chunk_size = chunk_size;
        self
    }

    pub fn with_pacing(mut self, pacing: &str) -> Self {
        self.config.relay.pacing = pacing.to_owned();
        self
    }

    pub fn with_user_header(mut self, header: &str) -> Self {
        self.config.server.user_header = header.to_owned();
        self
    }

    /// Disable health endpoint
    pub fn without_health(mut self) -> Self {
        self.config.server.health.enabled = false;
        self
    }

    /// Build the final config
    pub fn build(self) -> Config {
        self.config
    }
}
