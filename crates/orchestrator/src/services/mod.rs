//! Remote collaborator traits and in-memory implementations.
//!
//! Every remote service the flows depend on is a narrow capability trait.
//! The in-memory implementations keep their state behind `Arc<RwLock<_>>`
//! and expose setters to script failures in tests.

pub mod bank;
pub mod ledger;
pub mod merchant;
pub mod promotion;
pub mod provider;
pub mod users;
pub mod wallet_config;

use std::collections::HashMap;
use std::sync::Arc;

pub use bank::{BankGateway, BankTransfer, InMemoryBankGateway};
pub use ledger::{
    InMemoryLedgerService, InitTransactionRequest, LedgerService, LedgerStatus,
    LedgerTransaction, QuotaRequest, RefundTransactionRequest,
};
pub use merchant::{InMemoryMerchantFeeService, MerchantBalance, MerchantFeeService, PaymentStatus};
pub use promotion::{AppliedVoucher, InMemoryPromotionService, PromotionService, VoucherRequest};
pub use provider::{
    BillPayment, CardBillProvider, CardPurchase, InMemoryCardBillProvider, ProviderResponse,
    Scripted, TopUpRequest,
};
pub use users::{InMemoryUserService, UserDetail, UserService};
pub use wallet_config::{
    InMemoryWalletConfigService, ProviderCodeTable, RefundCondition, RefundRule,
    WalletConfigService, providers,
};

/// The set of collaborators a flow can call.
#[derive(Clone)]
pub struct Services {
    pub users: Arc<dyn UserService>,
    pub ledger: Arc<dyn LedgerService>,
    pub promotions: Arc<dyn PromotionService>,
    pub providers: Arc<dyn CardBillProvider>,
    pub bank: Arc<dyn BankGateway>,
    pub merchants: Arc<dyn MerchantFeeService>,
    pub wallet_config: Arc<dyn WalletConfigService>,
}

/// In-memory collaborators with handles kept for scripting and assertions.
#[derive(Clone, Default)]
pub struct InMemoryServices {
    pub users: InMemoryUserService,
    pub ledger: InMemoryLedgerService,
    pub promotions: InMemoryPromotionService,
    pub providers: InMemoryCardBillProvider,
    pub bank: InMemoryBankGateway,
    pub merchants: InMemoryMerchantFeeService,
    pub wallet_config: InMemoryWalletConfigService,
}

impl InMemoryServices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `tables` on top of the default provider code tables.
    pub fn with_code_tables(tables: HashMap<String, ProviderCodeTable>) -> Self {
        Self {
            wallet_config: InMemoryWalletConfigService::with_tables(tables),
            ..Self::default()
        }
    }

    /// Returns trait-object handles sharing state with `self`.
    pub fn services(&self) -> Services {
        Services {
            users: Arc::new(self.users.clone()),
            ledger: Arc::new(self.ledger.clone()),
            promotions: Arc::new(self.promotions.clone()),
            providers: Arc::new(self.providers.clone()),
            bank: Arc::new(self.bank.clone()),
            merchants: Arc::new(self.merchants.clone()),
            wallet_config: Arc::new(self.wallet_config.clone()),
        }
    }
}
