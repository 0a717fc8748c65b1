//! Order flows on top of the wallet's remote services.
//!
//! This crate provides:
//! - `services`: capability traits for every collaborator, with in-memory doubles
//! - `reservation`: the reserve / provider call / confirm-or-cancel protocol
//! - `flows`: the product flows and the `FlowEngine` that runs them
//! - `refund`: rule-driven refunds
//! - `reconciliation`: late provider results
//! - `reaper`: cancellation of expired orders

pub mod classification;
pub mod error;
pub mod flows;
pub mod reaper;
pub mod reconciliation;
pub mod refund;
pub mod request;
pub mod reservation;
pub mod services;

pub use classification::{Outcome, classify, classify_code};
pub use error::{OrchestratorError, Result, ServiceError};
pub use flows::{DEFAULT_ORDER_TTL_SECS, Flow, FlowEngine, FlowKind, FlowResponse};
pub use reaper::ExpiryReaper;
pub use reconciliation::{
    BankStatusCallback, NapasCashInCallback, Reconciler, VaBalanceCallback, encode_payload,
};
pub use refund::{RefundRequest, RefundService};
pub use request::OrderRequest;
pub use reservation::{Progress, Requirements, Reservation};
pub use services::{InMemoryServices, Services};
