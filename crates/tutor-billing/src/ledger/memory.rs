//! In-process ledger used for tests and single-node deployments

use std::collections::HashMap;

use async_trait::async_trait;
use jiff::Timestamp;
use tokio::sync::Mutex;
use tutor_core::{Balance, UserId};

use super::CreditLedger;
use crate::error::BillingError;
use crate::types::{ChargeRequest, CreditTransaction, TransactionStatus};

#[derive(Debug, Default)]
struct LedgerState {
    balances: HashMap<UserId, Balance>,
    transactions: Vec<CreditTransaction>,
}

/// Ledger held in memory behind a single async mutex
///
/// The mutex spans the whole read-modify-append sequence, so concurrent
/// charges for the same user are applied one after another.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: Mutex<LedgerState>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a user's opening balance
    pub async fn set_balance(&self, user_id: &UserId, balance: Balance) {
        self.state.lock().await.balances.insert(user_id.clone(), balance);
    }

    /// Snapshot of every recorded transaction in insertion order
    pub async fn transactions(&self) -> Vec<CreditTransaction> {
        self.state.lock().await.transactions.clone()
    }

    async fn apply(&self, request: &ChargeRequest, delta: i64) -> CreditTransaction {
        let mut state = self.state.lock().await;

        if let Some(existing) = state
            .transactions
            .iter()
            .find(|tx| tx.idempotency_key == request.idempotency_key)
        {
            tracing::debug!(
                user_id = %request.user_id,
                idempotency_key = %request.idempotency_key,
                "replaying idempotent ledger change"
            );
            return existing.clone();
        }

        let balance_before = state.balances.get(&request.user_id).copied().unwrap_or_default();
        let balance_after = balance_before + delta;
        state.balances.insert(request.user_id.clone(), balance_after);

        let transaction = CreditTransaction {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: request.user_id.clone(),
            balance_before,
            balance_after,
            amount: delta,
            description: request.description.clone(),
            status: TransactionStatus::Completed,
            idempotency_key: request.idempotency_key.clone(),
            created_at: Timestamp::now(),
        };
        state.transactions.push(transaction.clone());

        transaction
    }
}

#[async_trait]
impl CreditLedger for MemoryLedger {
    fn name(&self) -> &str {
        "memory"
    }

    async fn deduct(&self, request: &ChargeRequest) -> Result<CreditTransaction, BillingError> {
        Ok(self.apply(request, -i64::from(request.amount)).await)
    }

    async fn refund(&self, request: &ChargeRequest) -> Result<CreditTransaction, BillingError> {
        Ok(self.apply(request, i64::from(request.amount)).await)
    }

    async fn balance(&self, user_id: &UserId) -> Result<Balance, BillingError> {
        Ok(self.state.lock().await.balances.get(user_id).copied().unwrap_or_default())
    }
}
