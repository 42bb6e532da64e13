//! In-process account store.

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{AccountStore, StoreError};
use crate::config::{AccountConfig, AccountSummary};

/// Account store holding its records in memory.
#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    accounts: RwLock<Vec<AccountConfig>>,
}

impl MemoryAccountStore {
    #[must_use]
    pub fn new(accounts: Vec<AccountConfig>) -> Self {
        Self {
            accounts: RwLock::new(accounts),
        }
    }

    /// Inserts a record, or replaces the one with the same key.
    pub async fn upsert(&self, account: AccountConfig) {
        let mut accounts = self.accounts.write().await;
        match accounts
            .iter_mut()
            .find(|a| a.account_key == account.account_key)
        {
            Some(existing) => *existing = account,
            None => accounts.push(account),
        }
    }

    /// Removes the record with the given key. Returns whether it existed.
    pub async fn remove(&self, key: &str) -> bool {
        let mut accounts = self.accounts.write().await;
        let before = accounts.len();
        accounts.retain(|a| a.account_key != key);
        accounts.len() != before
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn list_accounts(&self) -> Result<Vec<AccountSummary>, StoreError> {
        let accounts = self.accounts.read().await;
        Ok(accounts.iter().map(AccountConfig::summary).collect())
    }

    async fn get_account(&self, key: &str) -> Result<Option<AccountConfig>, StoreError> {
        let accounts = self.accounts.read().await;
        Ok(accounts.iter().find(|a| a.account_key == key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credentials;

    #[tokio::test]
    async fn test_upsert_replaces_by_key() {
        let store = MemoryAccountStore::default();
        let mut acc = AccountConfig::new("+1", Credentials::new(1, "h".to_owned()));
        store.upsert(acc.clone()).await;

        acc.delay_seconds = 60;
        store.upsert(acc).await;

        assert_eq!(store.list_accounts().await.unwrap().len(), 1);
        let fetched = store.get_account("+1").await.unwrap().unwrap();
        assert_eq!(fetched.delay_seconds, 60);

        assert!(store.remove("+1").await);
        assert!(store.get_account("+1").await.unwrap().is_none());
    }
}
