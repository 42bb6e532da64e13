//! Configuration module for the forwarder.
//!
//! Handles account records (the data the supervisor reconciles against)
//! and the process settings read from the environment.

mod accounts;
mod settings;

pub use accounts::{
    AccountConfig, AccountSummary, AccountValidationError, Credentials, DEFAULT_DELAY_SECS,
    validate_accounts,
};
pub use settings::{BotApiConfig, ConfigError, ForwarderSettings};
