//! Saved Messages Forwarder Library
//!
//! A Telegram userbot supervisor that forwards each account's newest
//! Saved Messages entry to a list of chats on a fixed delay.
//!
//! This crate provides the core functionality for:
//! - Loading, storing and validating per-account forwarding configuration
//! - Parsing forwarding targets (links, usernames, chat ids)
//! - Connecting to Telegram via `MTProto`
//! - Running and reconciling one forwarding worker per account
//! - Posting run reports and alerts through the Bot API

pub mod config;
pub mod forwarder;
pub mod report;
pub mod store;
pub mod targets;
pub mod telegram;
