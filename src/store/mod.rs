//! Account storage.
//!
//! The forwarder only ever reads accounts through [`AccountStore`]; the
//! write helpers on the concrete stores exist for the CLI.

mod json;
mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{AccountConfig, AccountSummary};

pub use json::{AccountsFile, JsonAccountStore};
pub use memory::MemoryAccountStore;

/// Errors that can occur while reading or writing accounts.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to access account store: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse account store: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Account not found: {0}")]
    NotFound(String),
}

/// Read contract the supervisor reconciles against.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Lists every registered account.
    async fn list_accounts(&self) -> Result<Vec<AccountSummary>, StoreError>;

    /// Fetches the full record of one account.
    async fn get_account(&self, key: &str) -> Result<Option<AccountConfig>, StoreError>;
}
