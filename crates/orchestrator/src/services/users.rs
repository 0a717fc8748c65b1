//! Identity and balance service.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use domain::Money;
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

const SERVICE: &str = "identity";

/// What the identity service knows about a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDetail {
    pub user_id: String,
    /// Available wallet balance.
    pub balance: Money,
    pub kyc_verified: bool,
    pub bank_linked: bool,
    pub locked: bool,
}

impl UserDetail {
    /// A verified, unlocked user with a linked bank account.
    pub fn verified(user_id: impl Into<String>, balance: Money) -> Self {
        Self {
            user_id: user_id.into(),
            balance,
            kyc_verified: true,
            bank_linked: true,
            locked: false,
        }
    }
}

/// Trait for user lookups.
#[async_trait]
pub trait UserService: Send + Sync {
    async fn get_user_detail(&self, user_id: &str) -> Result<UserDetail, ServiceError>;
}

#[derive(Debug, Default)]
struct InMemoryUserState {
    users: HashMap<String, UserDetail>,
    unavailable: bool,
}

/// In-memory identity service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryUserService {
    state: Arc<RwLock<InMemoryUserState>>,
}

impl InMemoryUserService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a user.
    pub fn add_user(&self, user: UserDetail) {
        self.state
            .write()
            .unwrap()
            .users
            .insert(user.user_id.clone(), user);
    }

    /// Simulates the service being unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.write().unwrap().unavailable = unavailable;
    }
}

#[async_trait]
impl UserService for InMemoryUserService {
    async fn get_user_detail(&self, user_id: &str) -> Result<UserDetail, ServiceError> {
        let state = self.state.read().unwrap();
        if state.unavailable {
            return Err(ServiceError::unavailable(SERVICE, "connection refused"));
        }
        state
            .users
            .get(user_id)
            .cloned()
            .ok_or_else(|| ServiceError::not_found(SERVICE, format!("user {user_id}")))
    }
}
