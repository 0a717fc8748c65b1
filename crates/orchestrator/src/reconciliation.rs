//! Late results from providers: bank callbacks and status polls.
//!
//! Callback payloads are base64-encoded JSON. Every handler reads the
//! order's ledger transaction before acting, since the ledger may already
//! have settled it. Terminal orders are left alone, so duplicate callbacks
//! are harmless.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use common::OrderId;
use domain::{EventPublisher, Money, Order, OrderRepository, OrderStatus, OrderType};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::classification::{Outcome, classify, classify_code};
use crate::error::{OrchestratorError, Result};
use crate::reservation::Reservation;
use crate::services::{LedgerStatus, providers};

/// Bank-side result of a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankStatusCallback {
    pub order_id: OrderId,
    pub error_code: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub bank_trans_id: Option<String>,
}

/// Balance change on a virtual account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaBalanceCallback {
    pub order_id: OrderId,
    pub amount: Money,
    pub error_code: String,
}

/// NAPAS card result of a cash-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NapasCashInCallback {
    pub order_id: OrderId,
    pub response_code: String,
}

/// Encodes a callback the way providers send it.
pub fn encode_payload<T: Serialize>(payload: &T) -> Result<String> {
    let json = serde_json::to_vec(payload)
        .map_err(|e| OrchestratorError::InvalidPayload(e.to_string()))?;
    Ok(STANDARD.encode(json))
}

fn decode_payload<T: DeserializeOwned>(encoded: &str) -> Result<T> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| OrchestratorError::InvalidPayload(format!("invalid base64: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| OrchestratorError::InvalidPayload(format!("invalid callback: {e}")))
}

pub struct Reconciler<R: OrderRepository, P: EventPublisher> {
    reservation: Reservation<R, P>,
}

impl<R: OrderRepository, P: EventPublisher> Clone for Reconciler<R, P> {
    fn clone(&self) -> Self {
        Self {
            reservation: self.reservation.clone(),
        }
    }
}

impl<R: OrderRepository, P: EventPublisher> Reconciler<R, P> {
    pub fn new(reservation: Reservation<R, P>) -> Self {
        Self { reservation }
    }

    #[tracing::instrument(skip_all)]
    pub async fn update_bank_status(&self, encoded: &str) -> Result<Order> {
        let callback: BankStatusCallback = decode_payload(encoded)?;
        let mut order = self.reservation.orders().load(&callback.order_id).await?;
        if let (Some(reference), Some(bank)) = (callback.bank_trans_id, order.bank.as_mut()) {
            bank.bank_trans_id = Some(reference);
        }

        let table = self
            .reservation
            .services()
            .wallet_config
            .provider_codes(providers::BANK)
            .await?;
        let message = callback.message.unwrap_or_default();
        let outcome = classify_code(&table, &callback.error_code, &message);
        self.resolve("bank_status", order, outcome).await
    }

    /// Polls the bank gateway for a credit payment's result.
    #[tracing::instrument(skip(self))]
    pub async fn update_credit_payment_order(&self, order_id: &OrderId) -> Result<Order> {
        let order = self.reservation.orders().load(order_id).await?;
        if order.status.is_terminal() {
            return Ok(self.noop("credit", order));
        }

        let services = self.reservation.services();
        let table = services.wallet_config.provider_codes(providers::CREDIT).await?;
        let result = services.bank.retrieve_order_status(order_id).await;
        let outcome = classify(&table, &result);
        self.resolve("credit", order, outcome).await
    }

    /// A VA top-up for a different amount than ordered is not applied.
    #[tracing::instrument(skip_all)]
    pub async fn update_balance_va(&self, encoded: &str) -> Result<Order> {
        let callback: VaBalanceCallback = decode_payload(encoded)?;
        let order = self.reservation.orders().load(&callback.order_id).await?;
        if callback.amount != order.amount {
            tracing::warn!(
                order_id = %order.order_id,
                expected = %order.amount,
                received = %callback.amount,
                "VA amount mismatch, order left untouched"
            );
            metrics::counter!("reconciliation_total", "source" => "va", "outcome" => "amount_mismatch")
                .increment(1);
            return Ok(order);
        }

        let table = self
            .reservation
            .services()
            .wallet_config
            .provider_codes(providers::VA)
            .await?;
        let outcome = classify_code(&table, &callback.error_code, "");
        self.resolve("va", order, outcome).await
    }

    #[tracing::instrument(skip_all)]
    pub async fn cash_in_napas(&self, encoded: &str) -> Result<Order> {
        let callback: NapasCashInCallback = decode_payload(encoded)?;
        let order = self.reservation.orders().load(&callback.order_id).await?;
        if order.order_type != OrderType::CashIn {
            return Err(OrchestratorError::InvalidPayload(format!(
                "order {} is not a cash-in order",
                order.order_id
            )));
        }

        let table = self
            .reservation
            .services()
            .wallet_config
            .provider_codes(providers::NAPAS)
            .await?;
        let outcome = classify_code(&table, &callback.response_code, "");
        self.resolve("napas", order, outcome).await
    }

    async fn resolve(&self, source: &'static str, order: Order, outcome: Outcome) -> Result<Order> {
        if order.status.is_terminal() {
            return Ok(self.noop(source, order));
        }
        let Some(transaction_id) = order.transaction_id.clone() else {
            tracing::warn!(order_id = %order.order_id, status = %order.status, "no reservation to reconcile");
            return Ok(self.noop(source, order));
        };

        let orders = self.reservation.orders();
        let transaction = self
            .reservation
            .services()
            .ledger
            .get_transaction(&transaction_id)
            .await?;
        let (label, order) = match transaction.status {
            LedgerStatus::Finished => ("success", orders.success_order(&order).await?),
            LedgerStatus::Cancelled => {
                // The reservation is already released; only the voucher is left
                match orders
                    .try_failed_order(&order, "Transaction cancelled by ledger")
                    .await?
                {
                    Some(failed) => {
                        self.reservation.reverse_voucher(&failed).await;
                        ("failure", failed)
                    }
                    None => ("failure", orders.load(&order.order_id).await?),
                }
            }
            LedgerStatus::Pending => match outcome {
                Outcome::Indeterminate(_) if order.status == OrderStatus::Verifying => {
                    ("pending", order)
                }
                outcome => (outcome.as_str(), self.reservation.finish(order, outcome).await?),
            },
        };

        tracing::info!(order_id = %order.order_id, source, status = %order.status, "order reconciled");
        metrics::counter!("reconciliation_total", "source" => source, "outcome" => label)
            .increment(1);
        Ok(order)
    }

    fn noop(&self, source: &'static str, order: Order) -> Order {
        tracing::debug!(order_id = %order.order_id, status = %order.status, "nothing to reconcile");
        metrics::counter!("reconciliation_total", "source" => source, "outcome" => "noop")
            .increment(1);
        order
    }
}
