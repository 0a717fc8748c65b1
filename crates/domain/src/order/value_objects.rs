//! Value objects for the order domain.

use serde::{Deserialize, Serialize};

use common::OrderId;

/// Money amount in integer minor units.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub fn new(amount: i64) -> Self {
        Self(amount)
    }

    pub fn zero() -> Self {
        Self(0)
    }

    /// Returns the amount in minor units.
    pub fn amount(&self) -> i64 {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Subtracts `other`, flooring at zero. Used for discounts.
    pub fn saturating_sub(&self, other: Money) -> Money {
        Money((self.0 - other.0).max(0))
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Money {
    fn from(amount: i64) -> Self {
        Self(amount)
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Money(self.0 - rhs.0)
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

/// Where the money for an order comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceOfFund {
    #[default]
    Wallet,
    Bank,
    Credit,
}

impl SourceOfFund {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceOfFund::Wallet => "WALLET",
            SourceOfFund::Bank => "BANK",
            SourceOfFund::Credit => "CREDIT",
        }
    }
}

impl std::fmt::Display for SourceOfFund {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The product flow an order belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    /// Initialized ahead of its amount or OTP, confirmed later.
    Payment,
    BuyCard,
    TopUp,
    PayBill,
    #[serde(rename = "WAL2BANK")]
    Wal2Bank,
    #[serde(rename = "WAL2WAL")]
    Wal2Wal,
    CashIn,
    CashOut,
    Ibft,
    StaticQr,
    Refund,
}

impl OrderType {
    /// Prefix of generated order IDs.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            OrderType::Payment => "PM",
            OrderType::BuyCard => "BC",
            OrderType::TopUp => "TU",
            OrderType::PayBill => "PB",
            OrderType::Wal2Bank => "WB",
            OrderType::Wal2Wal => "WW",
            OrderType::CashIn => "CI",
            OrderType::CashOut => "CO",
            OrderType::Ibft => "IB",
            OrderType::StaticQr => "QR",
            OrderType::Refund => "RF",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Payment => "PAYMENT",
            OrderType::BuyCard => "BUY_CARD",
            OrderType::TopUp => "TOP_UP",
            OrderType::PayBill => "PAY_BILL",
            OrderType::Wal2Bank => "WAL2BANK",
            OrderType::Wal2Wal => "WAL2WAL",
            OrderType::CashIn => "CASH_IN",
            OrderType::CashOut => "CASH_OUT",
            OrderType::Ibft => "IBFT",
            OrderType::StaticQr => "STATIC_QR",
            OrderType::Refund => "REFUND",
        }
    }
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A card delivered by the card provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchasedCard {
    pub serial: String,
    pub pin: String,
    pub expired_at: Option<String>,
}

/// Telco card and top-up fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardInfo {
    pub telco: String,
    /// Face value of one card.
    pub card_value: Money,
    pub quantity: u32,
    /// Subscriber number, for top-ups.
    pub phone_number: Option<String>,
    #[serde(default)]
    pub cards: Vec<PurchasedCard>,
}

/// Bill payment fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillInfo {
    pub bill_code: String,
    pub provider_code: String,
    pub customer_name: Option<String>,
}

/// Bank transfer fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankInfo {
    pub bank_code: String,
    pub account_number: String,
    pub account_name: Option<String>,
    /// Reference assigned by the bank gateway.
    pub bank_trans_id: Option<String>,
}

/// Who bears a refund.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefundType {
    /// Reverses the original ledger transaction.
    #[default]
    Direct,
    /// Paid out of the merchant's settlement and cash balance.
    Indirect,
}

/// How a refund is carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefundMode {
    Auto,
    Manual,
}

/// Refund fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundInfo {
    pub original_order_id: OrderId,
    pub refund_type: RefundType,
    /// Decided by the refund rules once the order is initialized.
    pub refund_mode: Option<RefundMode>,
}
