//! The messaging capabilities the forwarder needs from an account client.

use async_trait::async_trait;

use super::TelegramError;
use crate::config::Credentials;
use crate::targets::TargetDescriptor;

/// The newest message an account sent to its own Saved Messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfMessage {
    pub id: i32,
    /// Text of the message; empty for media without caption.
    pub text: String,
}

impl SelfMessage {
    /// Short preview for logs.
    #[must_use]
    pub fn preview(&self, max_len: usize) -> String {
        if self.text.is_empty() {
            "[Media/File]".to_owned()
        } else if self.text.chars().count() <= max_len {
            self.text.clone()
        } else {
            format!("{}...", self.text.chars().take(max_len).collect::<String>())
        }
    }
}

/// An open, per-account messaging client.
#[async_trait]
pub trait MessagingClient: Send + Sync {
    /// Handle of a chat messages can be forwarded to.
    type Peer: Send + Sync;

    /// Whether the stored session is signed in.
    async fn is_authorized(&self) -> Result<bool, TelegramError>;

    /// Fetches the newest Saved Messages entry, if any.
    async fn fetch_last_self_message(&self) -> Result<Option<SelfMessage>, TelegramError>;

    /// Resolves a parsed target into something `forward` accepts.
    async fn resolve_target(&self, target: &TargetDescriptor)
    -> Result<Self::Peer, TelegramError>;

    /// Forwards `message` from Saved Messages to `peer`, into `topic_id`
    /// when set.
    async fn forward(
        &self,
        message: &SelfMessage,
        peer: &Self::Peer,
        topic_id: Option<i32>,
    ) -> Result<(), TelegramError>;

    /// Releases the connection. Never fails; problems are only logged.
    /// Calling it more than once is harmless.
    async fn close(&self);
}

/// Opens messaging clients for accounts.
#[async_trait]
pub trait ClientFactory: Send + Sync + 'static {
    type Client: MessagingClient + 'static;

    /// Opens a client for `account_key` using its stored session.
    async fn open(
        &self,
        credentials: &Credentials,
        account_key: &str,
    ) -> Result<Self::Client, TelegramError>;
}
