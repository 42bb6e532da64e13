//! JSON file backed account store.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use super::{AccountStore, StoreError};
use crate::config::{AccountConfig, AccountSummary};

/// On-disk layout of the accounts file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountsFile {
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
}

/// Account store reading a JSON file on every call.
///
/// Re-reading keeps the supervisor in step with edits made by other
/// processes (the CLI, or an operator editing the file by hand).
#[derive(Debug)]
pub struct JsonAccountStore {
    path: PathBuf,

    /// Serializes read-modify-write cycles from this process.
    write_lock: Mutex<()>,
}

impl JsonAccountStore {
    /// Creates a store for the given file. The file may not exist yet.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads every record. A missing file is an empty store.
    pub async fn load(&self) -> Result<AccountsFile, StoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(AccountsFile::default()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Account store {} does not exist yet", self.path.display());
                Ok(AccountsFile::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Inserts a record, or replaces the one with the same key.
    pub async fn upsert(&self, account: AccountConfig) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut file = self.load().await?;

        match file
            .accounts
            .iter_mut()
            .find(|a| a.account_key == account.account_key)
        {
            Some(existing) => *existing = account,
            None => file.accounts.push(account),
        }

        self.save(&file).await
    }

    /// Applies `change` to the record with the given key and saves it.
    pub async fn update<F>(&self, key: &str, change: F) -> Result<AccountConfig, StoreError>
    where
        F: FnOnce(&mut AccountConfig) + Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut file = self.load().await?;

        let account = file
            .accounts
            .iter_mut()
            .find(|a| a.account_key == key)
            .ok_or_else(|| StoreError::NotFound(key.to_owned()))?;
        change(account);
        let updated = account.clone();

        self.save(&file).await?;
        Ok(updated)
    }

    /// Removes the record with the given key. Returns whether it existed.
    pub async fn remove(&self, key: &str) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut file = self.load().await?;

        let before = file.accounts.len();
        file.accounts.retain(|a| a.account_key != key);
        let removed = file.accounts.len() != before;

        if removed {
            self.save(&file).await?;
        }
        Ok(removed)
    }

    /// Writes the file through a temporary sibling so readers never see a
    /// half-written document.
    async fn save(&self, file: &AccountsFile) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(file)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl AccountStore for JsonAccountStore {
    async fn list_accounts(&self) -> Result<Vec<AccountSummary>, StoreError> {
        let file = self.load().await?;
        Ok(file.accounts.iter().map(AccountConfig::summary).collect())
    }

    async fn get_account(&self, key: &str) -> Result<Option<AccountConfig>, StoreError> {
        let file = self.load().await?;
        Ok(file.accounts.into_iter().find(|a| a.account_key == key))
    }
}
