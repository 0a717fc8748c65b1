//! Wallet configuration service: provider code tables and refund rules.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use domain::{Money, RefundMode, SourceOfFund};
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

use super::merchant::PaymentStatus;

/// Provider names used to look up code tables.
pub mod providers {
    pub const CARD: &str = "card";
    pub const TOP_UP: &str = "topup";
    pub const BILL: &str = "bill";
    pub const BANK: &str = "bank";
    pub const IBFT: &str = "ibft";
    pub const CASH_IN: &str = "cash_in";
    pub const CASH_OUT: &str = "cash_out";
    pub const CREDIT: &str = "credit";
    pub const VA: &str = "va";
    pub const NAPAS: &str = "napas";
    pub const WALLET: &str = "wallet";
    pub const MERCHANT: &str = "merchant";
    pub const REFUND: &str = "refund";
}

/// Result codes of one provider integration.
///
/// Codes in `success` confirm the reservation, codes in `pending` leave the
/// order for reconciliation, anything else is a hard failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCodeTable {
    pub success: Vec<String>,
    #[serde(default)]
    pub pending: Vec<String>,
}

impl ProviderCodeTable {
    pub fn new(success: &[&str], pending: &[&str]) -> Self {
        Self {
            success: success.iter().map(|c| c.to_string()).collect(),
            pending: pending.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn is_success(&self, code: &str) -> bool {
        self.success.iter().any(|c| c == code)
    }

    pub fn is_pending(&self, code: &str) -> bool {
        self.pending.iter().any(|c| c == code)
    }
}

impl Default for ProviderCodeTable {
    fn default() -> Self {
        Self::new(&["00"], &[])
    }
}

/// Code tables shipped with the service; overridable per provider.
pub fn default_code_tables() -> HashMap<String, ProviderCodeTable> {
    use providers::*;

    [
        (CARD, ProviderCodeTable::new(&["00"], &["09", "99"])),
        (TOP_UP, ProviderCodeTable::new(&["00"], &["09", "99"])),
        (BILL, ProviderCodeTable::new(&["00", "SUCCESS"], &["PENDING", "01"])),
        (BANK, ProviderCodeTable::new(&["00"], &["68", "PROCESSING"])),
        (IBFT, ProviderCodeTable::new(&["00"], &["68", "PROCESSING"])),
        (CASH_IN, ProviderCodeTable::new(&["00"], &["68", "PROCESSING"])),
        (CASH_OUT, ProviderCodeTable::new(&["00"], &["68", "PROCESSING"])),
        (
            CREDIT,
            ProviderCodeTable::new(&["00", "SUCCESS"], &["PENDING", "PROCESSING"]),
        ),
        (VA, ProviderCodeTable::new(&["00"], &["01"])),
        (NAPAS, ProviderCodeTable::new(&["00"], &["PENDING"])),
        (WALLET, ProviderCodeTable::default()),
        (MERCHANT, ProviderCodeTable::default()),
        (REFUND, ProviderCodeTable::default()),
    ]
    .into_iter()
    .map(|(name, table)| (name.to_string(), table))
    .collect()
}

/// Comparison of a refund amount against a rule value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefundCondition {
    Lt,
    Le,
    Eq,
    Ge,
    Gt,
}

impl RefundCondition {
    /// Returns true if `amount <condition> value`.
    pub fn holds(&self, amount: Money, value: Money) -> bool {
        match self {
            RefundCondition::Lt => amount < value,
            RefundCondition::Le => amount <= value,
            RefundCondition::Eq => amount == value,
            RefundCondition::Ge => amount >= value,
            RefundCondition::Gt => amount > value,
        }
    }
}

/// One entry of a merchant's ordered refund rule list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundRule {
    /// Matches any source of fund when absent.
    pub source_of_fund: Option<SourceOfFund>,
    pub payment_status: PaymentStatus,
    pub condition: RefundCondition,
    pub value: Money,
    pub mode: RefundMode,
}

impl RefundRule {
    pub fn matches(
        &self,
        source_of_fund: SourceOfFund,
        payment_status: PaymentStatus,
        amount: Money,
    ) -> bool {
        self.source_of_fund.is_none_or(|s| s == source_of_fund)
            && self.payment_status == payment_status
            && self.condition.holds(amount, self.value)
    }
}

/// Trait for wallet configuration lookups. Nothing here is cached.
#[async_trait]
pub trait WalletConfigService: Send + Sync {
    async fn provider_codes(&self, provider: &str) -> Result<ProviderCodeTable, ServiceError>;

    async fn refund_rules(&self, merchant_id: &str) -> Result<Vec<RefundRule>, ServiceError>;
}

#[derive(Debug, Default)]
struct InMemoryWalletConfigState {
    tables: HashMap<String, ProviderCodeTable>,
    refund_rules: HashMap<String, Vec<RefundRule>>,
}

/// In-memory wallet configuration, seeded with the default code tables.
#[derive(Debug, Clone)]
pub struct InMemoryWalletConfigService {
    state: Arc<RwLock<InMemoryWalletConfigState>>,
}

impl Default for InMemoryWalletConfigService {
    fn default() -> Self {
        Self::with_tables(HashMap::new())
    }
}

impl InMemoryWalletConfigService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the defaults, then applies `overrides` on top.
    pub fn with_tables(overrides: HashMap<String, ProviderCodeTable>) -> Self {
        let mut tables = default_code_tables();
        tables.extend(overrides);
        Self {
            state: Arc::new(RwLock::new(InMemoryWalletConfigState {
                tables,
                refund_rules: HashMap::new(),
            })),
        }
    }

    pub fn set_provider_codes(&self, provider: &str, table: ProviderCodeTable) {
        self.state
            .write()
            .unwrap()
            .tables
            .insert(provider.to_string(), table);
    }

    pub fn set_refund_rules(&self, merchant_id: &str, rules: Vec<RefundRule>) {
        self.state
            .write()
            .unwrap()
            .refund_rules
            .insert(merchant_id.to_string(), rules);
    }
}

#[async_trait]
impl WalletConfigService for InMemoryWalletConfigService {
    async fn provider_codes(&self, provider: &str) -> Result<ProviderCodeTable, ServiceError> {
        let table = self.state.read().unwrap().tables.get(provider).cloned();
        Ok(table.unwrap_or_else(|| {
            tracing::warn!(provider, "no code table configured, using defaults");
            ProviderCodeTable::default()
        }))
    }

    async fn refund_rules(&self, merchant_id: &str) -> Result<Vec<RefundRule>, ServiceError> {
        Ok(self
            .state
            .read()
            .unwrap()
            .refund_rules
            .get(merchant_id)
            .cloned()
            .unwrap_or_default())
    }
}
