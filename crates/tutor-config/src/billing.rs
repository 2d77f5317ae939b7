use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// Credit metering configuration
///
/// When `enabled` is false no response is metered, regardless of the
/// per-mode settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BillingConfig {
    /// Whether credit metering is enabled
    #[serde(default)]
    pub enabled: bool,
    /// Cost of a validated (retrieval-augmented) response
    #[serde(default = "default_validated")]
    pub validated: ModeBillingConfig,
    /// Cost of a research (web-search) response
    #[serde(default = "default_research")]
    pub research: ModeBillingConfig,
    /// Remote credit ledger; an in-memory ledger is used when absent
    #[serde(default)]
    pub ledger: Option<LedgerConfig>,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            validated: default_validated(),
            research: default_research(),
            ledger: None,
        }
    }
}

/// Per-mode credit cost
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ModeBillingConfig {
    /// Credits deducted per delivered response
    pub credits: u32,
    /// Whether responses in this mode are metered at all
    #[serde(default = "default_metered")]
    pub metered: bool,
}

/// Remote credit ledger connection
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LedgerConfig {
    /// Base URL of the ledger API
    pub url: Url,
    /// Application identifier registered with the ledger
    pub app_id: String,
    /// Service API key for authenticating with the ledger
    pub service_api_key: SecretString,
    /// Entity type that owns balances (default "user")
    #[serde(default = "default_entity_type")]
    pub entity_type: String,
}

impl BillingConfig {
    /// Validate billing configuration
    ///
    /// # Errors
    ///
    /// Returns an error if billing is enabled and a metered mode costs
    /// zero credits
    pub fn validate(&self) -> Result<(), String> {
        if !self.enabled {
            return Ok(());
        }

        for (mode, cost) in [("validated", self.validated), ("research", self.research)] {
            if cost.metered && cost.credits == 0 {
                return Err(format!("billing.{mode} is metered but costs 0 credits"));
            }
        }

        Ok(())
    }
}

const fn default_validated() -> ModeBillingConfig {
    ModeBillingConfig {
        credits: 1,
        metered: true,
    }
}

const fn default_research() -> ModeBillingConfig {
    ModeBillingConfig {
        credits: 3,
        metered: true,
    }
}

#[allow(clippy::missing_const_for_fn)]
fn default_metered() -> bool {
    true
}

fn default_entity_type() -> String {
    "user".to_owned()
}
