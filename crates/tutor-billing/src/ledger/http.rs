//! Ledger backed by a remote credits API

use async_trait::async_trait;
use jiff::Timestamp;
use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tutor_core::{Balance, UserId};
use url::Url;

use super::CreditLedger;
use super::circuit::CircuitBreaker;
use crate::error::BillingError;
use crate::types::{
    BalanceResponse, ChargeRequest, CreditTransaction, LedgerChangeRequest, LedgerChangeResponse, TransactionStatus,
};

/// Async HTTP client for a remote credit ledger
///
/// The remote side performs the deduction and the transaction append in a
/// single database transaction per user; this client only forwards the
/// change with an idempotency key so retried requests cannot double-charge.
#[derive(Clone)]
pub struct HttpLedger {
    http: reqwest::Client,
    base_url: Url,
    app_id: String,
    entity_type: String,
    service_api_key: SecretString,
    circuit: CircuitBreaker,
}

impl HttpLedger {
    /// Create a new ledger client
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built
    pub fn new(
        base_url: Url,
        app_id: String,
        entity_type: String,
        service_api_key: SecretString,
    ) -> Result<Self, BillingError> {
        let http = reqwest::Client::builder().build().map_err(BillingError::Request)?;

        Ok(Self {
            http,
            base_url,
            app_id,
            entity_type,
            service_api_key,
            circuit: CircuitBreaker::default(),
        })
    }

    fn account_url(&self, user_id: &UserId, action: &str) -> Result<Url, BillingError> {
        self.base_url
            .join(&format!(
                "credits/{}/{}/{}/{action}",
                self.app_id, self.entity_type, user_id
            ))
            .map_err(|e| BillingError::Api {
                status: 0,
                message: format!("invalid URL: {e}"),
            })
    }

    /// Send one request through the circuit breaker
    async fn call<B, R>(&self, method: Method, url: Url, body: Option<&B>) -> Result<R, BillingError>
    where
        B: Serialize + Sync + ?Sized,
        R: DeserializeOwned,
    {
        self.circuit.check()?;

        let result = self.send(method, url, body).await;
        match &result {
            Ok(_) => self.circuit.record_success(),
            // Client errors are answers, not outages
            Err(BillingError::Api { status, .. }) if (400..500).contains(status) => self.circuit.record_success(),
            Err(_) => self.circuit.record_failure(),
        }

        result
    }

    async fn send<B, R>(&self, method: Method, url: Url, body: Option<&B>) -> Result<R, BillingError>
    where
        B: Serialize + Sync + ?Sized,
        R: DeserializeOwned,
    {
        let mut builder = self
            .http
            .request(method, url)
            .header("x-service-api-key", self.service_api_key.expose_secret());

        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;

        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            Err(BillingError::Api { status, message })
        }
    }

    async fn change(
        &self,
        operation: &'static str,
        request: &ChargeRequest,
        signed_amount: i64,
    ) -> Result<CreditTransaction, BillingError> {
        let url = self.account_url(&request.user_id, operation)?;
        let body = LedgerChangeRequest {
            amount: request.amount,
            description: &request.description,
            idempotency_key: &request.idempotency_key,
            reference_type: "ai_response",
        };

        let response: LedgerChangeResponse = self.call(Method::POST, url, Some(&body)).await?;

        if !response.success {
            tracing::warn!(
                ledger = "http",
                user_id = %request.user_id,
                operation,
                "ledger rejected credit change"
            );
            return Err(BillingError::Rejected {
                operation,
                user_id: request.user_id.to_string(),
            });
        }

        Ok(CreditTransaction {
            id: response
                .transaction_id
                .unwrap_or_else(|| request.idempotency_key.clone()),
            user_id: request.user_id.clone(),
            balance_before: response.balance_before,
            balance_after: response.balance_after,
            amount: signed_amount,
            description: request.description.clone(),
            status: TransactionStatus::Completed,
            idempotency_key: request.idempotency_key.clone(),
            created_at: Timestamp::now(),
        })
    }
}

#[async_trait]
impl CreditLedger for HttpLedger {
    fn name(&self) -> &str {
        "http"
    }

    async fn deduct(&self, request: &ChargeRequest) -> Result<CreditTransaction, BillingError> {
        self.change("deduct", request, -i64::from(request.amount)).await
    }

    async fn refund(&self, request: &ChargeRequest) -> Result<CreditTransaction, BillingError> {
        self.change("refund", request, i64::from(request.amount)).await
    }

    async fn balance(&self, user_id: &UserId) -> Result<Balance, BillingError> {
        let url = self.account_url(user_id, "balance")?;
        let response: BalanceResponse = self.call::<(), _>(Method::GET, url, None).await?;
        Ok(response.balance)
    }
}

impl std::fmt::Debug for HttpLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpLedger")
            .field("base_url", &self.base_url)
            .field("app_id", &self.app_id)
            .field("entity_type", &self.entity_type)
            .finish_non_exhaustive()
    }
}
