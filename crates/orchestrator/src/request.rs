//! The request envelope shared by every flow.

use domain::{BankInfo, BillInfo, CardInfo, Money, NewOrder, OrderType, SourceOfFund};
use serde::{Deserialize, Serialize};

use crate::flows::FlowKind;

/// Client request for any money-moving flow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderRequest {
    pub amount: Money,
    pub user_id: String,
    pub service_id: String,
    pub sub_trans_type: String,
    /// Order type of a deferred order; other flows get it from the route.
    pub trans_type: Option<OrderType>,
    /// Flow a deferred order is confirmed through. Defaults to the one for
    /// `trans_type`.
    pub flow: Option<FlowKind>,
    pub source_of_fund: SourceOfFund,
    pub voucher_code: Option<String>,
    pub merchant_id: Option<String>,
    pub device_id: Option<String>,
    pub ref_id: Option<String>,
    pub to_user_id: Option<String>,
    pub card: Option<CardInfo>,
    pub bill: Option<BillInfo>,
    pub bank: Option<BankInfo>,
    /// Pre-authorized payment token; lets a flow skip the OTP gate.
    pub payment_token: Option<String>,
}

impl OrderRequest {
    pub fn new(user_id: impl Into<String>, amount: Money) -> Self {
        Self {
            user_id: user_id.into(),
            amount,
            ..Self::default()
        }
    }

    /// Builds the order to initialize for this request.
    pub fn to_new_order(&self, order_type: OrderType) -> NewOrder {
        let mut new_order = NewOrder::new(order_type, self.user_id.clone(), self.amount);
        new_order.service_id = self.service_id.clone();
        new_order.sub_order_type = self.sub_trans_type.clone();
        new_order.source_of_fund = self.source_of_fund;
        new_order.voucher_code = self.voucher_code.clone().filter(|c| !c.is_empty());
        new_order.merchant_id = self.merchant_id.clone();
        new_order.device_id = self.device_id.clone();
        new_order.ref_id = self.ref_id.clone();
        new_order.to_user_id = self.to_user_id.clone();
        new_order.card = self.card.clone();
        new_order.bill = self.bill.clone();
        new_order.bank = self.bank.clone();
        new_order
    }
}
