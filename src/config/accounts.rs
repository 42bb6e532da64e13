//! Account records and their validation.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::targets::{TargetParseError, parse_target};

/// Delay between forwarding passes used when a record does not set one.
pub const DEFAULT_DELAY_SECS: u64 = 5;

/// Errors found while validating account records.
#[derive(Debug, Error)]
pub enum AccountValidationError {
    #[error("Account at index {index} has an empty phone number")]
    EmptyKey { index: usize },

    #[error("Duplicate account found: {key}")]
    DuplicateKey { key: String },

    #[error("Account {key} has invalid delay: {delay_seconds} seconds (must be >= 1)")]
    InvalidDelay { key: String, delay_seconds: u64 },

    #[error("Account {key} has an invalid target #{position}: {source}")]
    InvalidTarget {
        key: String,
        position: usize,
        #[source]
        source: TargetParseError,
    },
}

/// API credentials used to open an account's MTProto session.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Telegram API ID (obtain from <https://my.telegram.org>).
    pub api_id: i32,

    /// Telegram API hash (obtain from <https://my.telegram.org>).
    pub api_hash: String,
}

impl Credentials {
    /// Creates a new credentials pair.
    #[must_use]
    pub const fn new(api_id: i32, api_hash: String) -> Self {
        Self { api_id, api_hash }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_id", &self.api_id)
            .field("api_hash", &"<redacted>")
            .finish()
    }
}

/// Full stored record of one registered account.
///
/// Equality is by value: the supervisor restarts a worker whenever the
/// stored record stops being equal to the one the worker was started with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Phone number; the unique key of the account.
    #[serde(rename = "phone")]
    pub account_key: String,

    /// API credentials.
    #[serde(flatten)]
    pub credentials: Credentials,

    /// Raw target strings, in forwarding order.
    #[serde(default)]
    pub targets: Vec<String>,

    /// Seconds between the starts of two forwarding passes.
    #[serde(default = "default_delay")]
    pub delay_seconds: u64,

    /// Whether the account's worker should run at all.
    #[serde(default, rename = "auto_forwarding")]
    pub forwarding_enabled: bool,

    /// Optional chat receiving this account's run reports.
    #[serde(default)]
    pub log_channel: Option<i64>,
}

fn default_delay() -> u64 {
    DEFAULT_DELAY_SECS
}

impl AccountConfig {
    /// Creates a fresh record with no targets and forwarding disabled.
    #[must_use]
    pub fn new(account_key: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            account_key: account_key.into(),
            credentials,
            targets: Vec::new(),
            delay_seconds: DEFAULT_DELAY_SECS,
            forwarding_enabled: false,
            log_channel: None,
        }
    }

    /// Delay actually used by a worker (never below one second).
    #[must_use]
    pub fn effective_delay_secs(&self) -> u64 {
        self.delay_seconds.max(1)
    }

    /// Whether a worker for this record has anything to do.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.forwarding_enabled && !self.targets.is_empty()
    }

    /// Lightweight listing entry for this record.
    #[must_use]
    pub fn summary(&self) -> AccountSummary {
        AccountSummary {
            key: self.account_key.clone(),
            api_id: self.credentials.api_id,
            target_count: self.targets.len(),
            forwarding_enabled: self.forwarding_enabled,
        }
    }

    /// Checks the record itself, including every target string.
    ///
    /// Returns every problem found rather than stopping at the first one.
    #[must_use]
    pub fn validate(&self, index: usize) -> Vec<AccountValidationError> {
        let mut errors = Vec::new();

        if self.account_key.trim().is_empty() {
            errors.push(AccountValidationError::EmptyKey { index });
        }

        if self.delay_seconds == 0 {
            errors.push(AccountValidationError::InvalidDelay {
                key: self.account_key.clone(),
                delay_seconds: self.delay_seconds,
            });
        }

        for (position, raw) in self.targets.iter().enumerate() {
            if let Err(source) = parse_target(raw) {
                errors.push(AccountValidationError::InvalidTarget {
                    key: self.account_key.clone(),
                    position: position + 1,
                    source,
                });
            }
        }

        errors
    }
}

/// Lightweight listing entry returned by `AccountStore::list_accounts`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSummary {
    pub key: String,
    pub api_id: i32,
    pub target_count: usize,
    pub forwarding_enabled: bool,
}

/// Validates a whole set of records, including key uniqueness.
#[must_use]
pub fn validate_accounts(accounts: &[AccountConfig]) -> Vec<AccountValidationError> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for (index, account) in accounts.iter().enumerate() {
        if !seen.insert(account.account_key.as_str()) {
            errors.push(AccountValidationError::DuplicateKey {
                key: account.account_key.clone(),
            });
        }
        errors.extend(account.validate(index));
    }

    errors
}
