//! Telegram account client module.
//!
//! Defines the capabilities the forwarder needs from an account client,
//! the errors they raise, and the grammers-backed implementation.

mod capability;
mod client;
mod error;

pub use capability::{ClientFactory, MessagingClient, SelfMessage};
pub use client::{GrammersClient, GrammersFactory, LoginToken, PasswordToken, mask_phone};
pub use error::{FailureClass, TelegramError};
