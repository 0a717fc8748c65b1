//! The engine that runs a [`Flow`] through the reservation protocol.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use common::OrderId;
use domain::{
    DomainError, EventPublisher, Money, Order, OrderError, OrderRepository, OrderStatus, OrderType,
};
use serde::{Deserialize, Serialize};

use super::{Flow, FlowKind, default_flows};
use crate::classification::classify;
use crate::error::{OrchestratorError, Result};
use crate::request::OrderRequest;
use crate::reservation::{Progress, Reservation};
use crate::services::ledger::{OTP_MAX_ATTEMPTS, OTP_OK};
use crate::services::Services;

/// Seconds after which an unfinished order is cancelled by the reaper.
pub const DEFAULT_ORDER_TTL_SECS: i64 = 15 * 60;

/// Result of running a flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowResponse {
    pub order: Order,
    /// The reservation is held until `verify_otp` is called.
    pub otp_required: bool,
}

impl FlowResponse {
    fn done(order: Order) -> Self {
        Self {
            order,
            otp_required: false,
        }
    }
}

/// Runs flows through the reservation protocol.
pub struct FlowEngine<R: OrderRepository, P: EventPublisher> {
    reservation: Reservation<R, P>,
    flows: Arc<HashMap<FlowKind, Arc<dyn Flow>>>,
    order_ttl: Duration,
}

impl<R: OrderRepository, P: EventPublisher> Clone for FlowEngine<R, P> {
    fn clone(&self) -> Self {
        Self {
            reservation: self.reservation.clone(),
            flows: self.flows.clone(),
            order_ttl: self.order_ttl,
        }
    }
}

impl<R: OrderRepository, P: EventPublisher> FlowEngine<R, P> {
    /// Creates an engine running the built-in flows.
    pub fn new(reservation: Reservation<R, P>) -> Self {
        Self::with_flows(reservation, default_flows())
    }

    pub fn with_flows(reservation: Reservation<R, P>, flows: Vec<Arc<dyn Flow>>) -> Self {
        let flows = flows.into_iter().map(|f| (f.kind(), f)).collect();
        Self {
            reservation,
            flows: Arc::new(flows),
            order_ttl: Duration::seconds(DEFAULT_ORDER_TTL_SECS),
        }
    }

    pub fn with_order_ttl(mut self, ttl: Duration) -> Self {
        self.order_ttl = ttl;
        self
    }

    pub fn reservation(&self) -> &Reservation<R, P> {
        &self.reservation
    }

    fn services(&self) -> &Services {
        self.reservation.services()
    }

    /// Order type created by `kind`, or `Payment` if it is not registered.
    fn order_type_of(&self, kind: FlowKind) -> OrderType {
        self.flows
            .get(&kind)
            .map_or(OrderType::Payment, |flow| flow.order_type())
    }

    fn flow(&self, kind: FlowKind) -> Result<Arc<dyn Flow>> {
        self.flows.get(&kind).cloned().ok_or_else(|| {
            OrchestratorError::InvalidRequest(format!("flow {kind} is not registered"))
        })
    }

    /// Initializes an order for `request` and runs `kind` on it.
    #[tracing::instrument(skip(self, request), fields(flow = %kind, user_id = %request.user_id))]
    pub async fn execute(&self, kind: FlowKind, request: &OrderRequest) -> Result<FlowResponse> {
        let flow = self.flow(kind)?;

        let mut new_order = request
            .to_new_order(flow.order_type())
            .with_flow(kind.as_str());
        flow.prepare(&mut new_order);
        new_order.expired_at = Some(Utc::now() + self.order_ttl);
        let order = self.reservation.orders().init_order(new_order).await?;

        let checked = if token_missing(flow.as_ref(), request) {
            Err(OrderError::MissingPayload("payment token"))
        } else {
            check(flow.as_ref(), &order)
        };

        let response = match checked {
            Ok(()) => self.run(flow.as_ref(), order).await?,
            Err(e) => {
                let order = self
                    .reservation
                    .orders()
                    .failed_order(&order, e.to_string())
                    .await?;
                FlowResponse::done(order)
            }
        };
        record(kind, &response);
        Ok(response)
    }

    /// Creates a `Pending` order to be confirmed later.
    ///
    /// The amount may still be unknown, e.g. for a dynamic QR payment. The
    /// flow is resolved now and recorded on the order, so confirmation runs
    /// the same flow.
    #[tracing::instrument(skip(self, request), fields(user_id = %request.user_id))]
    pub async fn init_order(&self, request: &OrderRequest) -> Result<Order> {
        let order_type = request
            .trans_type
            .or_else(|| request.flow.map(|kind| self.order_type_of(kind)))
            .unwrap_or(OrderType::Payment);
        let kind = match request.flow {
            Some(kind) => kind,
            None => FlowKind::for_order_type(order_type)
                .ok_or(OrchestratorError::UnsupportedOrderType(order_type))?,
        };
        let flow = self.flow(kind)?;
        if flow.order_type() != order_type {
            return Err(OrchestratorError::InvalidRequest(format!(
                "flow {kind} does not create {order_type} orders"
            )));
        }
        if token_missing(flow.as_ref(), request) {
            return Err(DomainError::from(OrderError::MissingPayload("payment token")).into());
        }

        let mut new_order = request.to_new_order(order_type).with_flow(kind.as_str());
        flow.prepare(&mut new_order);
        new_order.expired_at = Some(Utc::now() + self.order_ttl);
        Ok(self.reservation.orders().init_order(new_order).await?)
    }

    /// Runs the protocol on an order created by [`Self::init_order`].
    ///
    /// An order that is no longer `Pending` is returned as stored.
    #[tracing::instrument(skip(self))]
    pub async fn confirm_order(
        &self,
        order_id: &OrderId,
        amount: Option<Money>,
    ) -> Result<FlowResponse> {
        let orders = self.reservation.orders();
        let mut order = orders.load(order_id).await?;
        if order.status != OrderStatus::Pending {
            tracing::warn!(status = %order.status, "order already confirmed");
            return Ok(FlowResponse::done(order));
        }
        if order.is_expired(Utc::now()) {
            return Err(OrchestratorError::InvalidRequest(format!(
                "order {order_id} has expired"
            )));
        }

        let kind = FlowKind::for_order(&order)
            .ok_or(OrchestratorError::UnsupportedOrderType(order.order_type))?;
        let flow = self.flow(kind)?;

        if let Some(amount) = amount {
            order.amount = amount;
            order = orders.update_order(&order).await?;
            if order.status != OrderStatus::Pending {
                return Ok(FlowResponse::done(order));
            }
        }

        let response = match check(flow.as_ref(), &order) {
            Ok(()) => self.run(flow.as_ref(), order).await?,
            Err(e) => FlowResponse::done(orders.failed_order(&order, e.to_string()).await?),
        };
        record(kind, &response);
        Ok(response)
    }

    /// Completes an OTP-gated order whose funds are already reserved.
    #[tracing::instrument(skip(self, otp))]
    pub async fn verify_otp(&self, order_id: &OrderId, otp: &str) -> Result<FlowResponse> {
        let order = self.reservation.orders().load(order_id).await?;
        if order.status != OrderStatus::Processing {
            return Err(OrchestratorError::InvalidRequest(format!(
                "order {order_id} is {}",
                order.status
            )));
        }

        let kind = FlowKind::for_order(&order)
            .ok_or(OrchestratorError::UnsupportedOrderType(order.order_type))?;
        let flow = self.flow(kind)?;
        if !flow.requirements().otp {
            return Err(OrchestratorError::InvalidRequest(format!(
                "order {order_id} does not take an OTP"
            )));
        }
        let Some(transaction_id) = order.transaction_id.clone() else {
            return Err(OrchestratorError::InvalidRequest(format!(
                "order {order_id} has no reservation"
            )));
        };

        let order = match self.services().ledger.verify_otp(&transaction_id, otp).await {
            Ok(code) if code == OTP_OK => self.provider_step(flow.as_ref(), order).await?,
            Ok(code) if code == OTP_MAX_ATTEMPTS => {
                self.reservation
                    .fail(order, "OTP attempts exceeded")
                    .await?
                    .into_order()
            }
            Ok(code) => {
                tracing::info!(code, "OTP rejected");
                self.reservation.fail(order, "Wrong OTP").await?.into_order()
            }
            Err(e) if e.is_transport() => return Err(e.into()),
            Err(e) => self.reservation.fail(order, e.reason()).await?.into_order(),
        };

        let response = FlowResponse::done(order);
        record(kind, &response);
        Ok(response)
    }

    /// Cancels an order on behalf of the user and releases its reservation.
    ///
    /// An order past cancellation is returned as stored.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(&self, order_id: &OrderId) -> Result<Order> {
        let order = self.reservation.orders().load(order_id).await?;
        match self.reservation.cancel(&order, "Cancelled by user").await? {
            Some(cancelled) => Ok(cancelled),
            None => Ok(self.reservation.orders().load(order_id).await?),
        }
    }

    pub async fn get_order(&self, order_id: &OrderId) -> Result<Order> {
        Ok(self.reservation.orders().load(order_id).await?)
    }

    async fn run(&self, flow: &dyn Flow, order: Order) -> Result<FlowResponse> {
        let needs = flow.requirements();
        let order = match self.reservation.reserve(order, needs).await? {
            Progress::Continue(order) => order,
            Progress::Done(order) => return Ok(FlowResponse::done(order)),
        };

        if needs.otp {
            tracing::info!(order_id = %order.order_id, "waiting for OTP");
            return Ok(FlowResponse {
                order,
                otp_required: true,
            });
        }
        Ok(FlowResponse::done(self.provider_step(flow, order).await?))
    }

    async fn provider_step(&self, flow: &dyn Flow, mut order: Order) -> Result<Order> {
        let table = match self
            .services()
            .wallet_config
            .provider_codes(flow.provider())
            .await
        {
            Ok(table) => table,
            Err(e) => return Ok(self.reservation.fail(order, e.reason()).await?.into_order()),
        };

        let result = flow.call_provider(self.services(), &order).await;
        if let Ok(response) = &result {
            flow.apply_response(&mut order, response);
        }
        let outcome = classify(&table, &result);
        tracing::info!(
            order_id = %order.order_id,
            provider = flow.provider(),
            outcome = outcome.as_str(),
            "provider call classified"
        );
        self.reservation.finish(order, outcome).await
    }
}

fn token_missing(flow: &dyn Flow, request: &OrderRequest) -> bool {
    flow.needs_payment_token() && request.payment_token.as_deref().is_none_or(str::is_empty)
}

fn check(flow: &dyn Flow, order: &Order) -> std::result::Result<(), OrderError> {
    if !order.amount.is_positive() {
        return Err(OrderError::InvalidAmount {
            amount: order.amount.amount(),
        });
    }
    flow.validate(order)
}

fn record(kind: FlowKind, response: &FlowResponse) {
    metrics::counter!(
        "flow_executions_total",
        "flow" => kind.as_str(),
        "outcome" => response.order.status.as_str()
    )
    .increment(1);
}
