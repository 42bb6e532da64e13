//! Report texts.

use chrono::{DateTime, Local};

/// Longest error excerpt included in an alert.
const MAX_ERROR_LEN: usize = 100;

/// Outcome of one forwarding pass, as reported to the log chats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub account_key: String,
    pub target_count: usize,
    pub success: usize,
    pub failed: usize,
    pub at: DateTime<Local>,
}

impl RunSummary {
    /// Creates a summary stamped with the current local time.
    #[must_use]
    pub fn now(account_key: &str, target_count: usize, success: usize, failed: usize) -> Self {
        Self {
            account_key: account_key.to_owned(),
            target_count,
            success,
            failed,
            at: Local::now(),
        }
    }

    #[must_use]
    pub fn render(&self) -> String {
        format!(
            "📨 Saved Messages\n\
             👤 User: {}\n\
             📊 Total Targets: {}\n\
             ✅ Success: {}\n\
             ❌ Failed: {}\n\
             ⏰ Time: {}",
            self.account_key,
            self.target_count,
            self.success,
            self.failed,
            self.at.format("%H:%M:%S"),
        )
    }
}

/// A condition that needs operator attention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub title: &'static str,
    pub account_key: Option<String>,
    pub detail: String,
    pub at: DateTime<Local>,
}

impl Alert {
    /// The account's session is unusable (expired, revoked, 2FA needed).
    #[must_use]
    pub fn authentication(account_key: &str, reason: &str) -> Self {
        Self::new(
            "🚨 Authentication Error",
            Some(account_key),
            format!("Session expired or 2FA required ({})", excerpt(reason)),
        )
    }

    /// The worker could not open a client for the account.
    #[must_use]
    pub fn startup(account_key: &str, error: &str) -> Self {
        Self::new(
            "🚨 Critical Worker Error",
            Some(account_key),
            excerpt(error),
        )
    }

    /// The worker gave up after too many failed passes in a row.
    #[must_use]
    pub fn too_many_failures(account_key: &str, attempts: u32, last_error: &str) -> Self {
        Self::new(
            "🚨 Worker Error Alert",
            Some(account_key),
            format!(
                "Too many consecutive failures ({attempts})\n📝 Last Error: {}",
                excerpt(last_error)
            ),
        )
    }

    /// The supervisor stopped itself after repeated failed polls.
    #[must_use]
    pub fn supervisor_stopped(attempts: u32, last_error: &str) -> Self {
        Self::new(
            "🛑 Forwarder Supervisor Stopped",
            None,
            format!(
                "Account store unavailable for {attempts} polls in a row\n📝 Last Error: {}",
                excerpt(last_error)
            ),
        )
    }

    fn new(title: &'static str, account_key: Option<&str>, detail: String) -> Self {
        Self {
            title,
            account_key: account_key.map(str::to_owned),
            detail,
            at: Local::now(),
        }
    }

    #[must_use]
    pub fn render(&self) -> String {
        let mut text = format!("{}\n", self.title);
        if let Some(account) = &self.account_key {
            text.push_str(&format!("👤 User: {account}\n"));
        }
        text.push_str(&format!(
            "❌ Error: {}\n⏰ Time: {}",
            self.detail,
            self.at.format("%H:%M:%S")
        ));
        text
    }
}

fn excerpt(s: &str) -> String {
    s.chars().take(MAX_ERROR_LEN).collect()
}
