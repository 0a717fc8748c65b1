//! The reservation protocol shared by every money-moving flow.
//!
//! ```text
//! pre-check ──► quota/fee ──► init ──► provider call ──┬──► confirm  ──► SUCCESS
//!     │             │           │                      ├──► cancel   ──► FAILED
//!     └─────────────┴───────────┴──► FAILED            └──► (keep)   ──► VERIFYING
//! ```
//!
//! Every step persists the order before returning. Compensation is
//! best-effort: a failed cancel or voucher reversal is logged and counted
//! but never changes the status already decided.

use common::TransactionId;
use domain::{EventPublisher, Order, OrderRepository, OrderService, OrderStatus, SourceOfFund};

use crate::classification::Outcome;
use crate::error::Result;
use crate::services::{
    InitTransactionRequest, QuotaRequest, Services, UserDetail, VoucherRequest,
};

/// Whether a protocol step lets the flow continue.
#[derive(Debug, Clone, PartialEq)]
pub enum Progress {
    /// The step succeeded; continue with the returned order.
    Continue(Order),
    /// The order reached its outcome for this request.
    Done(Order),
}

impl Progress {
    pub fn into_order(self) -> Order {
        match self {
            Progress::Continue(order) | Progress::Done(order) => order,
        }
    }
}

/// Checks a flow needs before funds are reserved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Requirements {
    pub kyc: bool,
    pub bank_link: bool,
    pub merchant_fee: bool,
    /// The reservation needs an OTP before the provider is called.
    pub otp: bool,
}

impl Requirements {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn kyc(mut self) -> Self {
        self.kyc = true;
        self
    }

    pub fn bank_link(mut self) -> Self {
        self.bank_link = true;
        self
    }

    pub fn merchant_fee(mut self) -> Self {
        self.merchant_fee = true;
        self
    }

    pub fn otp(mut self) -> Self {
        self.otp = true;
        self
    }

    /// Returns why `user` cannot run the flow, if anything.
    fn violation(&self, user: &UserDetail) -> Option<&'static str> {
        if user.locked {
            Some("Account is locked")
        } else if self.kyc && !user.kyc_verified {
            Some("Account is not KYC verified")
        } else if self.bank_link && !user.bank_linked {
            Some("No linked bank account")
        } else {
            None
        }
    }
}

/// Runs the protocol steps against an order.
pub struct Reservation<R: OrderRepository, P: EventPublisher> {
    orders: OrderService<R, P>,
    services: Services,
}

impl<R: OrderRepository, P: EventPublisher> Clone for Reservation<R, P> {
    fn clone(&self) -> Self {
        Self {
            orders: self.orders.clone(),
            services: self.services.clone(),
        }
    }
}

impl<R: OrderRepository, P: EventPublisher> Reservation<R, P> {
    pub fn new(orders: OrderService<R, P>, services: Services) -> Self {
        Self { orders, services }
    }

    pub fn orders(&self) -> &OrderService<R, P> {
        &self.orders
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Fetches the user, checks the flow's requirements and applies the
    /// voucher, if any.
    #[tracing::instrument(skip(self, order), fields(order_id = %order.order_id))]
    pub async fn pre_check(&self, mut order: Order, needs: Requirements) -> Result<Progress> {
        let user = match self.services.users.get_user_detail(&order.user_id).await {
            Ok(user) => user,
            Err(e) => return self.fail(order, e.reason()).await,
        };

        if let Some(reason) = needs.violation(&user) {
            return self.fail(order, reason).await;
        }

        if let Some(code) = order.voucher_code.clone() {
            let request = VoucherRequest {
                order_id: order.order_id.clone(),
                user_id: order.user_id.clone(),
                voucher_code: code,
                amount: order.amount,
            };
            match self.services.promotions.use_voucher(&request).await {
                Ok(applied) => {
                    order.voucher_id = Some(applied.voucher_id);
                    order.discount_amount = applied.discount;
                    order = match self.persist(order).await? {
                        Progress::Continue(order) => order,
                        done => return Ok(done),
                    };
                }
                Err(e) => return self.fail(order, e.reason()).await,
            }
        }

        if order.source_of_fund == SourceOfFund::Wallet && user.balance < order.payable_amount() {
            return self.fail(order, "Not enough balance").await;
        }

        Ok(Progress::Continue(order))
    }

    /// Checks quotas and records the fee.
    ///
    /// A refusal here fails the order without compensation.
    #[tracing::instrument(skip(self, order), fields(order_id = %order.order_id))]
    pub async fn check_quota(&self, mut order: Order, needs: Requirements) -> Result<Progress> {
        let request = QuotaRequest {
            user_id: order.user_id.clone(),
            order_type: order.order_type,
            source_of_fund: order.source_of_fund,
            amount: order.amount,
        };
        let mut fee = match self
            .services
            .ledger
            .check_transaction_quota_and_fee(&request)
            .await
        {
            Ok(fee) => fee,
            Err(e) => return self.reject(order, e.reason()).await,
        };

        if needs.merchant_fee {
            let Some(merchant_id) = order.merchant_id.clone() else {
                return self.reject(order, "Merchant is required").await;
            };
            match self
                .services
                .merchants
                .check_merchant_quota_and_fee(&merchant_id, order.amount)
                .await
            {
                Ok(merchant_fee) => fee += merchant_fee,
                Err(e) => return self.reject(order, e.reason()).await,
            }
        }

        order.fee = fee;
        self.persist(order).await
    }

    /// Reserves funds and moves the order to `Processing`.
    #[tracing::instrument(skip(self, order), fields(order_id = %order.order_id))]
    pub async fn init(&self, mut order: Order) -> Result<Progress> {
        let request = InitTransactionRequest {
            order_id: order.order_id.clone(),
            user_id: order.user_id.clone(),
            to_user_id: order.to_user_id.clone(),
            order_type: order.order_type,
            source_of_fund: order.source_of_fund,
            amount: order.amount.saturating_sub(order.discount_amount),
            fee: order.fee,
        };

        let transaction_id = match self.services.ledger.init_transaction(&request).await {
            Ok(id) => id,
            Err(e) => return self.fail(order, e.reason()).await,
        };
        tracing::info!(%transaction_id, "funds reserved");

        order.transaction_id = Some(transaction_id.clone());
        let order = self.orders.processing_order(&order).await?;

        if order.status != OrderStatus::Processing
            || order.transaction_id.as_ref() != Some(&transaction_id)
        {
            // Someone else finished the order first; the reservation is ours to release
            tracing::warn!(status = %order.status, "order moved during init");
            self.cancel_transaction(&transaction_id).await;
            return Ok(Progress::Done(order));
        }
        Ok(Progress::Continue(order))
    }

    /// Runs the pre-check, quota and init steps in order.
    pub async fn reserve(&self, order: Order, needs: Requirements) -> Result<Progress> {
        let order = match self.pre_check(order, needs).await? {
            Progress::Continue(order) => order,
            done => return Ok(done),
        };
        let order = match self.check_quota(order, needs).await? {
            Progress::Continue(order) => order,
            done => return Ok(done),
        };
        self.init(order).await
    }

    /// Applies a classified provider result to a reserved order.
    #[tracing::instrument(skip(self, order), fields(order_id = %order.order_id, outcome = outcome.as_str()))]
    pub async fn finish(&self, mut order: Order, outcome: Outcome) -> Result<Order> {
        match outcome {
            Outcome::Success => {
                if let Some(transaction_id) = order.transaction_id.clone()
                    && let Err(e) = self
                        .services
                        .ledger
                        .confirm_transaction(&transaction_id)
                        .await
                {
                    // The provider acted; leave the ledger to reconciliation
                    tracing::error!(%transaction_id, error = %e, "confirm failed");
                    order.message = Some(e.reason());
                    return Ok(self.orders.verifying_order(&order).await?);
                }
                Ok(self.orders.success_order(&order).await?)
            }
            Outcome::HardFailure(reason) => {
                Ok(self.fail(order, reason).await?.into_order())
            }
            Outcome::Indeterminate(reason) => {
                order.message = Some(reason);
                Ok(self.orders.verifying_order(&order).await?)
            }
        }
    }

    /// Fails the order and compensates whatever it holds, if this call
    /// failed it.
    ///
    /// An order some other writer already finished is returned as stored.
    pub async fn fail(&self, order: Order, reason: impl Into<String>) -> Result<Progress> {
        let reason = reason.into();
        match self.orders.try_failed_order(&order, reason.as_str()).await? {
            Some(failed) => {
                tracing::warn!(order_id = %failed.order_id, %reason, "order failed");
                self.compensate(&failed).await;
                Ok(Progress::Done(failed))
            }
            None => Ok(Progress::Done(self.orders.load(&order.order_id).await?)),
        }
    }

    /// Fails the order without touching its reservation or voucher.
    async fn reject(&self, order: Order, reason: impl Into<String>) -> Result<Progress> {
        let reason = reason.into();
        tracing::warn!(order_id = %order.order_id, %reason, "order rejected");
        let order = self.orders.failed_order(&order, reason).await?;
        Ok(Progress::Done(order))
    }

    /// Cancels the order and compensates it, if this call cancelled it.
    ///
    /// Returns `None` when the order was already past cancellation.
    pub async fn cancel(&self, order: &Order, reason: &str) -> Result<Option<Order>> {
        match self.orders.try_cancel_order(order, reason).await? {
            Some(cancelled) => {
                self.compensate(&cancelled).await;
                Ok(Some(cancelled))
            }
            None => Ok(None),
        }
    }

    /// Releases the reservation and reverses the voucher. Never fails.
    pub async fn compensate(&self, order: &Order) {
        if let Some(transaction_id) = &order.transaction_id {
            self.cancel_transaction(transaction_id).await;
        }
        self.reverse_voucher(order).await;
    }

    async fn cancel_transaction(&self, transaction_id: &TransactionId) {
        metrics::counter!("compensations_total", "action" => "cancel_transaction").increment(1);
        if let Err(e) = self
            .services
            .ledger
            .cancel_transaction(transaction_id)
            .await
        {
            metrics::counter!("compensation_failures_total", "action" => "cancel_transaction")
                .increment(1);
            tracing::error!(%transaction_id, error = %e, "failed to cancel transaction");
        }
    }

    /// Gives back the order's voucher, if one was applied. Never fails.
    pub async fn reverse_voucher(&self, order: &Order) {
        let Some(voucher_id) = &order.voucher_id else {
            return;
        };
        metrics::counter!("compensations_total", "action" => "reverse_wallet").increment(1);
        if let Err(e) = self
            .services
            .promotions
            .reverse_wallet(&order.order_id, &order.user_id, voucher_id)
            .await
        {
            metrics::counter!("compensation_failures_total", "action" => "reverse_wallet")
                .increment(1);
            tracing::error!(order_id = %order.order_id, voucher_id, error = %e, "failed to reverse voucher");
        }
    }

    /// Saves non-status fields, stopping if the order moved meanwhile.
    async fn persist(&self, order: Order) -> Result<Progress> {
        let expected = order.status;
        let saved = self.orders.update_order(&order).await?;
        if saved.status == expected {
            return Ok(Progress::Continue(saved));
        }
        // Whoever moved the order could not see what this request applied
        if saved.voucher_id.is_none() {
            self.reverse_voucher(&order).await;
        }
        Ok(Progress::Done(saved))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::InMemoryServices;
    use common::{PrefixCounter, TaskPool};
    use domain::{InMemoryEventPublisher, InMemoryOrderRepository, Money, NewOrder, OrderType};

    type TestReservation = Reservation<InMemoryOrderRepository, InMemoryEventPublisher>;

    fn setup() -> (TestReservation, InMemoryServices) {
        let doubles = InMemoryServices::new();
        doubles
            .users
            .add_user(UserDetail::verified("u1", Money::new(100_000)));
        doubles.promotions.add_voucher("SALE", Money::new(1_000));

        let orders = OrderService::new(
            InMemoryOrderRepository::new(),
            InMemoryEventPublisher::new(),
            PrefixCounter::new(),
            TaskPool::new("reservation-test", 4),
        );
        (Reservation::new(orders, doubles.services()), doubles)
    }

    async fn order(reservation: &TestReservation, voucher: bool) -> Order {
        let mut new_order = NewOrder::new(OrderType::BuyCard, "u1", Money::new(10_000));
        if voucher {
            new_order = new_order.with_voucher("SALE");
        }
        reservation.orders().init_order(new_order).await.unwrap()
    }

    #[tokio::test]
    async fn test_reserve_applies_voucher_and_fee() {
        let (reservation, doubles) = setup();
        doubles.ledger.set_fee(Money::new(200));
        let order = order(&reservation, true).await;

        let Progress::Continue(order) = reservation
            .reserve(order, Requirements::none())
            .await
            .unwrap()
        else {
            panic!("reservation should continue");
        };

        assert_eq!(order.status, OrderStatus::Processing);
        assert_eq!(order.discount_amount, Money::new(1_000));
        assert_eq!(order.fee, Money::new(200));
        let tx = order.transaction_id.clone().unwrap();
        assert_eq!(
            doubles.ledger.transaction(&tx).unwrap().amount,
            Money::new(9_200)
        );
    }

    #[tokio::test]
    async fn test_kyc_requirement_fails_before_any_call() {
        let (reservation, doubles) = setup();
        let mut user = UserDetail::verified("u1", Money::new(100_000));
        user.kyc_verified = false;
        doubles.users.add_user(user);
        let order = order(&reservation, false).await;

        let progress = reservation
            .reserve(order, Requirements::none().kyc())
            .await
            .unwrap();
        let order = progress.into_order();
        assert_eq!(order.status, OrderStatus::Failed);
        assert_eq!(order.message.as_deref(), Some("Account is not KYC verified"));
        assert_eq!(doubles.ledger.init_count(), 0);
    }

    #[tokio::test]
    async fn test_quota_failure_compensates_nothing() {
        let (reservation, doubles) = setup();
        doubles.ledger.set_quota_error(Some("Daily limit exceeded"));
        let order = order(&reservation, true).await;

        let order = reservation
            .reserve(order, Requirements::none())
            .await
            .unwrap()
            .into_order();
        assert_eq!(order.status, OrderStatus::Failed);
        assert_eq!(order.message.as_deref(), Some("Daily limit exceeded"));
        assert_eq!(doubles.promotions.reverse_count(), 0);
        assert_eq!(doubles.ledger.cancel_count(), 0);
        assert_eq!(doubles.ledger.init_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_merchant_compensates_nothing() {
        let (reservation, doubles) = setup();
        let order = order(&reservation, true).await;

        let order = reservation
            .reserve(order, Requirements::none().merchant_fee())
            .await
            .unwrap()
            .into_order();
        assert_eq!(order.status, OrderStatus::Failed);
        assert_eq!(order.message.as_deref(), Some("Merchant is required"));
        assert_eq!(doubles.promotions.reverse_count(), 0);
        assert_eq!(doubles.ledger.init_count(), 0);
    }

    #[tokio::test]
    async fn test_insufficient_wallet_balance() {
        let (reservation, doubles) = setup();
        doubles
            .users
            .add_user(UserDetail::verified("u1", Money::new(5_000)));
        let order = order(&reservation, false).await;

        let order = reservation
            .reserve(order, Requirements::none())
            .await
            .unwrap()
            .into_order();
        assert_eq!(order.status, OrderStatus::Failed);
        assert_eq!(order.message.as_deref(), Some("Not enough balance"));
    }

    #[tokio::test]
    async fn test_finish_outcomes() {
        let (reservation, doubles) = setup();

        let reserved = |voucher| {
            let reservation = reservation.clone();
            async move {
                let order = order(&reservation, voucher).await;
                reservation
                    .reserve(order, Requirements::none())
                    .await
                    .unwrap()
                    .into_order()
            }
        };

        let order = reservation
            .finish(reserved(false).await, Outcome::Success)
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Success);
        assert_eq!(doubles.ledger.confirm_count(), 1);

        let order = reservation
            .finish(reserved(true).await, Outcome::HardFailure("declined".into()))
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Failed);
        assert_eq!(doubles.ledger.cancel_count(), 1);
        assert_eq!(doubles.promotions.reverse_count(), 1);

        let order = reservation
            .finish(reserved(false).await, Outcome::Indeterminate("timeout".into()))
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Verifying);
        assert_eq!(doubles.ledger.cancel_count(), 1);
    }

    #[tokio::test]
    async fn test_compensation_failure_keeps_failed_status() {
        let (reservation, doubles) = setup();
        doubles.promotions.set_fail_on_reverse(true);
        let order = order(&reservation, true).await;
        let order = reservation
            .reserve(order, Requirements::none())
            .await
            .unwrap()
            .into_order();

        let order = reservation
            .finish(order, Outcome::HardFailure("declined".into()))
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Failed);
        assert_eq!(order.message.as_deref(), Some("declined"));
    }

    #[tokio::test]
    async fn test_failure_after_cancel_compensates_once() {
        let (reservation, doubles) = setup();
        let order = order(&reservation, true).await;
        let held = reservation
            .reserve(order, Requirements::none())
            .await
            .unwrap()
            .into_order();

        reservation.cancel(&held, "expired").await.unwrap();
        let order = reservation
            .finish(held, Outcome::HardFailure("declined".into()))
            .await
            .unwrap();

        assert_eq!(order.status, OrderStatus::Cancel);
        assert_eq!(order.message.as_deref(), Some("expired"));
        assert_eq!(doubles.ledger.cancel_count(), 1);
        assert_eq!(doubles.promotions.reverse_count(), 1);
    }

    #[tokio::test]
    async fn test_cancel_compensates_once() {
        let (reservation, doubles) = setup();
        let order = order(&reservation, true).await;
        let order = reservation
            .reserve(order, Requirements::none())
            .await
            .unwrap()
            .into_order();

        let cancelled = reservation.cancel(&order, "expired").await.unwrap();
        assert_eq!(cancelled.unwrap().status, OrderStatus::Cancel);
        assert!(reservation.cancel(&order, "expired").await.unwrap().is_none());

        assert_eq!(doubles.ledger.cancel_count(), 1);
        assert_eq!(doubles.promotions.reverse_count(), 1);
    }
}
