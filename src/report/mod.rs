//! Run reports and alerts posted through the Bot API.
//!
//! Reporting is strictly best-effort: a report that cannot be delivered is
//! logged and dropped, it never interrupts forwarding.

mod format;

use std::sync::Arc;

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::ChatId;
use thiserror::Error;
use tracing::{debug, warn};

pub use format::{Alert, RunSummary};

/// Errors that can occur while delivering a report.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Bot API request failed: {0}")]
    Api(#[from] teloxide::RequestError),

    #[error("Report rejected: {0}")]
    Rejected(String),
}

/// Destination-agnostic report delivery.
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn send_report(&self, destination: i64, text: &str) -> Result<(), ReportError>;
}

/// Sends reports as plain text messages from a bot.
#[derive(Debug, Clone)]
pub struct BotApiSink {
    bot: Bot,
}

impl BotApiSink {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            bot: Bot::new(token),
        }
    }
}

#[async_trait]
impl ReportSink for BotApiSink {
    async fn send_report(&self, destination: i64, text: &str) -> Result<(), ReportError> {
        self.bot.send_message(ChatId(destination), text).await?;
        Ok(())
    }
}

/// Fans reports out to the admin log chat and per-account log chats.
#[derive(Clone)]
pub struct Reporter {
    sink: Arc<dyn ReportSink>,
    admin_channel: Option<i64>,
}

impl Reporter {
    #[must_use]
    pub fn new(sink: Arc<dyn ReportSink>, admin_channel: Option<i64>) -> Self {
        Self {
            sink,
            admin_channel,
        }
    }

    /// Posts a pass summary to the admin chat and, if set, the account's own chat.
    pub async fn run_summary(&self, summary: &RunSummary, account_channel: Option<i64>) {
        let text = summary.render();
        if let Some(admin) = self.admin_channel {
            self.deliver(admin, &text).await;
        }
        if let Some(channel) = account_channel {
            self.deliver(channel, &text).await;
        }
    }

    /// Posts an alert to the admin chat.
    pub async fn alert(&self, alert: &Alert) {
        match self.admin_channel {
            Some(admin) => self.deliver(admin, &alert.render()).await,
            None => debug!("No admin log channel configured, alert not posted"),
        }
    }

    async fn deliver(&self, destination: i64, text: &str) {
        if let Err(e) = self.sink.send_report(destination, text).await {
            warn!(destination, error = %e, "Failed to post report");
        }
    }
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter")
            .field("admin_channel", &self.admin_channel)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use tokio::sync::Mutex;

    use super::*;

    /// Sink that records every report and can be told to fail.
    #[derive(Debug, Default)]
    pub struct RecordingSink {
        pub sent: Mutex<Vec<(i64, String)>>,
        pub fail: bool,
    }

    impl RecordingSink {
        pub fn failing() -> Self {
            Self {
                sent: Mutex::default(),
                fail: true,
            }
        }

        pub async fn to(&self, destination: i64) -> Vec<String> {
            self.sent
                .lock()
                .await
                .iter()
                .filter(|(d, _)| *d == destination)
                .map(|(_, text)| text.clone())
                .collect()
        }
    }

    #[async_trait]
    impl ReportSink for RecordingSink {
        async fn send_report(&self, destination: i64, text: &str) -> Result<(), ReportError> {
            if self.fail {
                return Err(ReportError::Rejected("sink offline".to_owned()));
            }
            self.sent.lock().await.push((destination, text.to_owned()));
            Ok(())
        }
    }
}
