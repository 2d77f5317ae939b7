/// Errors returned by credit ledgers and the meter
#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    /// HTTP transport or connection error
    #[error("ledger request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The ledger returned a non-success status
    #[error("ledger API error ({status}): {message}")]
    Api {
        /// HTTP status from the ledger
        status: u16,
        /// Error message from the response body
        message: String,
    },

    /// The ledger answered but refused to apply the change
    #[error("ledger rejected {operation} for {user_id}")]
    Rejected {
        /// Operation that was refused (`deduct` or `refund`)
        operation: &'static str,
        /// Account the change targeted
        user_id: String,
    },

    /// Too many consecutive ledger failures; calls are short-circuited
    #[error("ledger circuit is open")]
    CircuitOpen,

    /// The ledger backend failed internally
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}
