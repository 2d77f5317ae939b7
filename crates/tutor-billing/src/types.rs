use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use tutor_core::{Balance, Credits, UserId};

/// Settlement state of a ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Completed,
}

/// Immutable ledger entry describing one balance change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditTransaction {
    pub id: String,
    pub user_id: UserId,
    pub balance_before: Balance,
    pub balance_after: Balance,
    /// Negative for deductions, positive for refunds
    pub amount: i64,
    pub description: String,
    pub status: TransactionStatus,
    pub idempotency_key: String,
    pub created_at: Timestamp,
}

/// A balance change to apply to a user's account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeRequest {
    pub user_id: UserId,
    pub amount: Credits,
    pub description: String,
    /// Repeated requests with the same key apply at most once
    pub idempotency_key: String,
}

// -- Ledger API wire types --

/// Request body for deducting or refunding credits
#[derive(Debug, Clone, Serialize)]
pub(crate) struct LedgerChangeRequest<'a> {
    pub amount: Credits,
    pub description: &'a str,
    pub idempotency_key: &'a str,
    pub reference_type: &'static str,
}

/// Response from a deduct or refund call
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct LedgerChangeResponse {
    /// Whether the change was applied
    pub success: bool,
    #[serde(default, alias = "balanceBefore")]
    pub balance_before: Balance,
    #[serde(default, alias = "balance", alias = "balanceAfter")]
    pub balance_after: Balance,
    #[serde(default, alias = "transactionId")]
    pub transaction_id: Option<String>,
}

/// Response from a balance lookup
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct BalanceResponse {
    pub balance: Balance,
}
