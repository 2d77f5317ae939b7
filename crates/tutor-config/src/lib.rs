#![allow(clippy::must_use_candidate)]

pub mod billing;
mod env;
mod loader;
pub mod relay;
pub mod server;
pub mod telemetry;

use serde::Deserialize;

pub use billing::*;
pub use relay::*;
pub use server::*;
pub use telemetry::{ExportProtocol, ExporterConfig, MetricsConfig, TelemetryConfig, TracingConfig};

/// Top-level relay configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Chunking, pacing, and citation settings
    #[serde(default)]
    pub relay: RelayConfig,
    /// Per-mode credit costs and ledger backend
    #[serde(default)]
    pub billing: BillingConfig,
    /// Telemetry configuration
    #[serde(default)]
    pub telemetry: Option<TelemetryConfig>,
}
