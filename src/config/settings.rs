//! Process settings loaded from the environment.

use std::path::PathBuf;
use std::time::Duration;

/// Bot API configuration for run reports.
#[derive(Clone)]
pub struct BotApiConfig {
    /// Token of the bot that posts run reports.
    pub token: String,

    /// Chat receiving every account's run reports and alerts.
    pub admin_log_channel: Option<i64>,
}

impl BotApiConfig {
    /// Creates configuration from environment variables.
    ///
    /// Expects `BOT_TOKEN` to be set; `ADMIN_LOG_CHANNEL` is optional.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is missing or the channel id is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let token =
            std::env::var("BOT_TOKEN").map_err(|_| ConfigError::MissingEnvVar("BOT_TOKEN"))?;

        let admin_log_channel = match std::env::var("ADMIN_LOG_CHANNEL") {
            Ok(raw) if !raw.trim().is_empty() => Some(
                raw.trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidChatId("ADMIN_LOG_CHANNEL"))?,
            ),
            _ => None,
        };

        Ok(Self {
            token,
            admin_log_channel,
        })
    }
}

impl std::fmt::Debug for BotApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotApiConfig")
            .field("admin_log_channel", &self.admin_log_channel)
            .finish_non_exhaustive()
    }
}

/// Paths and intervals used by the forwarder process.
#[derive(Debug, Clone)]
pub struct ForwarderSettings {
    /// Path to the accounts JSON file.
    pub accounts_path: PathBuf,

    /// Directory holding one session file per account.
    pub sessions_dir: PathBuf,

    /// Seconds between two supervisor reconciliations.
    pub poll_interval_secs: u64,
}

fn default_accounts_path() -> PathBuf {
    PathBuf::from("accounts.json")
}

fn default_sessions_dir() -> PathBuf {
    PathBuf::from("sessions")
}

fn default_poll_interval() -> u64 {
    3
}

impl Default for ForwarderSettings {
    fn default() -> Self {
        Self {
            accounts_path: default_accounts_path(),
            sessions_dir: default_sessions_dir(),
            poll_interval_secs: default_poll_interval(),
        }
    }
}

impl ForwarderSettings {
    /// Creates settings from environment variables with defaults.
    #[must_use]
    pub fn from_env_with_defaults() -> Self {
        Self {
            accounts_path: std::env::var("ACCOUNTS_PATH")
                .map_or_else(|_| default_accounts_path(), PathBuf::from),
            sessions_dir: std::env::var("SESSIONS_DIR")
                .map_or_else(|_| default_sessions_dir(), PathBuf::from),
            poll_interval_secs: std::env::var("POLL_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|secs| *secs > 0)
                .unwrap_or_else(default_poll_interval),
        }
    }

    /// Poll interval as a duration.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Invalid chat id in {0} (must be an integer)")]
    InvalidChatId(&'static str),
}
