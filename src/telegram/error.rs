//! Errors raised by the messaging client and how the forwarder treats them.

use grammers_client::client::PasswordToken;
use thiserror::Error;

/// Errors that can occur during Telegram operations.
#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("Not authorized. Please sign in first.")]
    NotAuthorized,

    #[error("Session expired or revoked: {0}")]
    SessionExpired(String),

    #[error("Two-factor authentication required")]
    SecondFactorRequired,

    #[error("Sign in failed: {0}")]
    SignInFailed(String),

    #[error("Password required for 2FA")]
    PasswordRequired(PasswordToken),

    #[error("Invalid password")]
    InvalidPassword(PasswordToken),

    #[error("Flood wait required: {0} seconds")]
    FloodWait(u32),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Could not resolve target: {0}")]
    Resolution(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("API invocation error: {0}")]
    Invocation(String),
}

/// How the forwarder reacts to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The API demands a pause of this many seconds.
    RateLimited(u32),
    /// Not a member, banned, admin rights missing, chat gone.
    AccessDenied,
    /// The session cannot be used without operator action.
    FatalAuth,
    /// Anything else; worth retrying later.
    Other,
}

impl TelegramError {
    /// Classifies the error. Every variant maps to exactly one class.
    #[must_use]
    pub fn class(&self) -> FailureClass {
        match self {
            Self::FloodWait(seconds) => FailureClass::RateLimited(*seconds),
            Self::AccessDenied(_) => FailureClass::AccessDenied,
            Self::NotAuthorized
            | Self::SessionExpired(_)
            | Self::SecondFactorRequired
            | Self::PasswordRequired(_)
            | Self::InvalidPassword(_) => FailureClass::FatalAuth,
            Self::SignInFailed(_)
            | Self::Resolution(_)
            | Self::Connection(_)
            | Self::Session(_)
            | Self::Invocation(_) => FailureClass::Other,
        }
    }

    /// Whether this error ends a worker immediately.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.class() == FailureClass::FatalAuth
    }
}

/// Maps an RPC error name (as reported by the server) to a tagged error.
pub(crate) fn from_rpc(name: &str, value: Option<u32>, message: String) -> TelegramError {
    match name {
        "FLOOD_WAIT" | "FLOOD_PREMIUM_WAIT" | "SLOWMODE_WAIT" => {
            TelegramError::FloodWait(value.unwrap_or(1))
        }
        "CHANNEL_PRIVATE"
        | "CHAT_ADMIN_REQUIRED"
        | "USER_BANNED_IN_CHANNEL"
        | "CHAT_WRITE_FORBIDDEN"
        | "CHAT_FORBIDDEN"
        | "CHAT_SEND_PLAIN_FORBIDDEN"
        | "CHAT_SEND_MEDIA_FORBIDDEN"
        | "CHAT_GUEST_SEND_FORBIDDEN"
        | "USER_NOT_PARTICIPANT"
        | "CHANNEL_INVALID"
        | "CHAT_ID_INVALID"
        | "TOPIC_CLOSED"
        | "TOPIC_DELETED"
        | "USER_IS_BLOCKED" => TelegramError::AccessDenied(message),
        "AUTH_KEY_UNREGISTERED"
        | "AUTH_KEY_INVALID"
        | "AUTH_KEY_PERM_EMPTY"
        | "SESSION_REVOKED"
        | "SESSION_EXPIRED"
        | "USER_DEACTIVATED"
        | "USER_DEACTIVATED_BAN" => TelegramError::SessionExpired(message),
        "SESSION_PASSWORD_NEEDED" => TelegramError::SecondFactorRequired,
        "USERNAME_NOT_OCCUPIED"
        | "USERNAME_INVALID"
        | "PEER_ID_INVALID"
        | "INVITE_HASH_EXPIRED"
        | "INVITE_HASH_INVALID"
        | "INVITE_HASH_EMPTY" => TelegramError::Resolution(message),
        _ => TelegramError::Invocation(message),
    }
}
