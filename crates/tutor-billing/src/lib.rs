//! Credit metering for streamed AI responses
//!
//! Provides the [`CreditMeter`], which charges a response's cost once, on
//! first delivery, and the [`CreditLedger`] contract with in-memory and
//! HTTP-backed implementations.

#![allow(clippy::missing_errors_doc, clippy::must_use_candidate)]

pub mod error;
pub mod ledger;
pub mod meter;
pub mod types;

pub use error::BillingError;
pub use ledger::CreditLedger;
pub use ledger::http::HttpLedger;
pub use ledger::memory::MemoryLedger;
pub use meter::{AppliedCharge, ChargeState, CreditMeter};
pub use types::{ChargeRequest, CreditTransaction, TransactionStatus};
