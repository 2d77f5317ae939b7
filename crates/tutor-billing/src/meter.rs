//! Pay-on-delivery credit metering

use std::sync::Arc;

use tutor_core::{Balance, Credits, UserId};

use crate::error::BillingError;
use crate::ledger::CreditLedger;
use crate::types::ChargeRequest;

/// A deduction that has been applied to the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedCharge {
    pub transaction_id: String,
    pub amount: Credits,
    pub balance_after: Balance,
}

/// Per-response metering state
///
/// Owned by the stream session; guarantees at most one live charge per
/// response no matter how many chunks are delivered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChargeState {
    cost: Credits,
    metered: bool,
    charged: Option<AppliedCharge>,
    reversed: bool,
}

impl ChargeState {
    pub const fn new(cost: Credits, metered: bool) -> Self {
        Self {
            cost,
            metered,
            charged: None,
            reversed: false,
        }
    }

    /// Metering disabled for this response
    pub const fn unmetered() -> Self {
        Self::new(0, false)
    }

    /// Whether a charge would actually move credits
    pub const fn requires_charge(&self) -> bool {
        self.metered && self.cost > 0
    }

    pub const fn charge(&self) -> Option<&AppliedCharge> {
        self.charged.as_ref()
    }

    /// Credits billed for this response (zero if never charged or reversed)
    pub fn credits_used(&self) -> Credits {
        self.charged.as_ref().map_or(0, |c| c.amount)
    }

    /// Balance reported by the ledger after the deduction, if one happened
    pub fn balance_after(&self) -> Option<Balance> {
        self.charged.as_ref().map(|c| c.balance_after)
    }

    pub const fn was_reversed(&self) -> bool {
        self.reversed
    }
}

/// Deducts a fixed per-response cost, tied to first delivery
#[derive(Clone)]
pub struct CreditMeter {
    ledger: Arc<dyn CreditLedger>,
}

impl CreditMeter {
    pub fn new(ledger: Arc<dyn CreditLedger>) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &Arc<dyn CreditLedger> {
        &self.ledger
    }

    /// Charge the response cost the first time a chunk is about to be sent
    ///
    /// No-op (returns `Ok(None)`) when metering is off, the cost is zero, or
    /// this response was already charged. `reference` identifies the response
    /// and keys the ledger's idempotency check.
    ///
    /// # Errors
    ///
    /// Propagates ledger failures; the caller must treat them as fatal
    pub async fn charge_on_first_chunk(
        &self,
        state: &mut ChargeState,
        user_id: &UserId,
        reference: &str,
        description: &str,
    ) -> Result<Option<Balance>, BillingError> {
        if !state.requires_charge() || state.charged.is_some() || state.reversed {
            return Ok(None);
        }

        let request = ChargeRequest {
            user_id: user_id.clone(),
            amount: state.cost,
            description: description.to_owned(),
            idempotency_key: format!("{reference}-charge"),
        };

        let transaction = self.ledger.deduct(&request).await.inspect_err(|e| {
            tracing::error!(
                ledger = self.ledger.name(),
                user_id = %user_id,
                reference,
                error = %e,
                "credit deduction failed"
            );
        })?;

        tracing::info!(
            ledger = self.ledger.name(),
            user_id = %user_id,
            reference,
            amount = state.cost,
            balance_after = transaction.balance_after,
            "charged response credits"
        );

        state.charged = Some(AppliedCharge {
            transaction_id: transaction.id,
            amount: state.cost,
            balance_after: transaction.balance_after,
        });

        Ok(Some(transaction.balance_after))
    }

    /// Undo a charge whose triggering chunk never reached the client
    ///
    /// Returns the balance after the refund, or `None` if nothing was charged.
    ///
    /// # Errors
    ///
    /// Propagates ledger failures
    pub async fn reverse(
        &self,
        state: &mut ChargeState,
        user_id: &UserId,
        reference: &str,
    ) -> Result<Option<Balance>, BillingError> {
        let Some(charge) = state.charged.take() else {
            return Ok(None);
        };

        let request = ChargeRequest {
            user_id: user_id.clone(),
            amount: charge.amount,
            description: format!("Refund for undelivered response ({})", charge.transaction_id),
            idempotency_key: format!("{reference}-refund"),
        };

        match self.ledger.refund(&request).await {
            Ok(transaction) => {
                tracing::info!(
                    ledger = self.ledger.name(),
                    user_id = %user_id,
                    reference,
                    amount = charge.amount,
                    "reversed charge for undelivered chunk"
                );
                state.reversed = true;
                Ok(Some(transaction.balance_after))
            }
            Err(e) => {
                // Keep the charge on record so the caller reports it truthfully
                state.charged = Some(charge);
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for CreditMeter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreditMeter")
            .field("ledger", &self.ledger.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::ledger::memory::MemoryLedger;
    use crate::types::CreditTransaction;

    async fn meter_with_balance(user: &UserId, balance: Balance) -> (CreditMeter, Arc<MemoryLedger>) {
        let ledger = Arc::new(MemoryLedger::new());
        ledger.set_balance(user, balance).await;
        (CreditMeter::new(Arc::clone(&ledger) as Arc<dyn CreditLedger>), ledger)
    }

    #[tokio::test]
    async fn charges_exactly_once() {
        let user = UserId::new("usr_1");
        let (meter, ledger) = meter_with_balance(&user, 10).await;
        let mut state = ChargeState::new(3, true);

        let first = meter
            .charge_on_first_chunk(&mut state, &user, "msg-1", "AI response")
            .await
            .unwrap();
        let second = meter
            .charge_on_first_chunk(&mut state, &user, "msg-1", "AI response")
            .await
            .unwrap();

        assert_eq!(first, Some(7));
        assert_eq!(second, None);
        assert_eq!(state.credits_used(), 3);
        assert_eq!(ledger.transactions().await.len(), 1);
    }

    #[tokio::test]
    async fn unmetered_response_is_free() {
        let user = UserId::new("usr_1");
        let (meter, ledger) = meter_with_balance(&user, 10).await;
        let mut state = ChargeState::new(3, false);

        let balance = meter
            .charge_on_first_chunk(&mut state, &user, "msg-1", "AI response")
            .await
            .unwrap();

        assert!(balance.is_none());
        assert_eq!(state.credits_used(), 0);
        assert!(ledger.transactions().await.is_empty());
    }

    #[tokio::test]
    async fn zero_cost_is_free() {
        let user = UserId::new("usr_1");
        let (meter, ledger) = meter_with_balance(&user, 10).await;
        let mut state = ChargeState::new(0, true);

        meter
            .charge_on_first_chunk(&mut state, &user, "msg-1", "AI response")
            .await
            .unwrap();

        assert!(ledger.transactions().await.is_empty());
    }

    #[tokio::test]
    async fn reverse_refunds_and_blocks_recharge() {
        let user = UserId::new("usr_1");
        let (meter, ledger) = meter_with_balance(&user, 10).await;
        let mut state = ChargeState::new(3, true);

        meter
            .charge_on_first_chunk(&mut state, &user, "msg-1", "AI response")
            .await
            .unwrap();
        let after_refund = meter.reverse(&mut state, &user, "msg-1").await.unwrap();

        assert_eq!(after_refund, Some(10));
        assert_eq!(state.credits_used(), 0);
        assert!(state.was_reversed());

        let again = meter
            .charge_on_first_chunk(&mut state, &user, "msg-1", "AI response")
            .await
            .unwrap();
        assert!(again.is_none());
        assert_eq!(ledger.transactions().await.len(), 2);
    }

    #[tokio::test]
    async fn reverse_without_charge_is_noop() {
        let user = UserId::new("usr_1");
        let (meter, ledger) = meter_with_balance(&user, 10).await;
        let mut state = ChargeState::new(3, true);

        assert_eq!(meter.reverse(&mut state, &user, "msg-1").await.unwrap(), None);
        assert!(ledger.transactions().await.is_empty());
    }

    struct BrokenLedger;

    #[async_trait]
    impl CreditLedger for BrokenLedger {
        fn name(&self) -> &str {
            "broken"
        }

        async fn deduct(&self, _request: &ChargeRequest) -> Result<CreditTransaction, BillingError> {
            Err(BillingError::Unavailable("database down".to_owned()))
        }

        async fn refund(&self, _request: &ChargeRequest) -> Result<CreditTransaction, BillingError> {
            Err(BillingError::Unavailable("database down".to_owned()))
        }

        async fn balance(&self, _user_id: &UserId) -> Result<Balance, BillingError> {
            Err(BillingError::Unavailable("database down".to_owned()))
        }
    }

    #[tokio::test]
    async fn ledger_failure_propagates_and_leaves_state_uncharged() {
        let meter = CreditMeter::new(Arc::new(BrokenLedger));
        let mut state = ChargeState::new(3, true);

        let err = meter
            .charge_on_first_chunk(&mut state, &UserId::new("usr_1"), "msg-1", "AI response")
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::Unavailable(_)));
        assert!(state.charge().is_none());
    }
}
