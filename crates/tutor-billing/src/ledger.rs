//! Credit ledger contract and backends

mod circuit;
pub mod http;
pub mod memory;

use async_trait::async_trait;
use tutor_core::{Balance, UserId};

use crate::error::BillingError;
use crate::types::{ChargeRequest, CreditTransaction};

/// Store of user credit balances and their transaction history
///
/// Each mutating call is one atomic unit of work: read the balance, write
/// the new balance, append the transaction record. Implementations must
/// serialize concurrent changes for the same user so no update is lost.
#[async_trait]
pub trait CreditLedger: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &str;

    /// Deduct `request.amount` and record a negative transaction
    async fn deduct(&self, request: &ChargeRequest) -> Result<CreditTransaction, BillingError>;

    /// Credit `request.amount` back and record a positive transaction
    async fn refund(&self, request: &ChargeRequest) -> Result<CreditTransaction, BillingError>;

    /// Current balance for a user
    async fn balance(&self, user_id: &UserId) -> Result<Balance, BillingError>;
}
