use http::StatusCode;
use thiserror::Error;
use tutor_billing::BillingError;
use tutor_core::HttpError;

use crate::store::StoreError;

/// Errors that end or interrupt a relayed response
#[derive(Debug, Error)]
pub enum RelayError {
    /// Persistence failed
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Credit metering failed
    #[error(transparent)]
    Billing(#[from] BillingError),

    /// Upstream provider sequence failed
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Response could not be set up
    #[error("setup failed: {0}")]
    Setup(String),
}

impl RelayError {
    /// Whether the relay must stop instead of finishing the response
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::Upstream(_))
    }
}

impl HttpError for RelayError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Store(_) | Self::Setup(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Billing(BillingError::CircuitOpen | BillingError::Unavailable(_)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::Billing(BillingError::Rejected { .. }) => StatusCode::PAYMENT_REQUIRED,
            Self::Billing(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_type(&self) -> &str {
        match self {
            Self::Store(_) => "persistence_error",
            Self::Billing(_) => "billing_error",
            Self::Upstream(_) => "upstream_error",
            Self::Setup(_) => "setup_error",
        }
    }

    fn client_message(&self) -> String {
        match self {
            Self::Store(_) | Self::Setup(_) => "the response could not be saved".to_owned(),
            Self::Billing(BillingError::Rejected { .. }) => "insufficient credits for this response".to_owned(),
            Self::Billing(_) => "credits could not be charged".to_owned(),
            Self::Upstream(_) => "the AI provider failed while responding".to_owned(),
        }
    }
}
