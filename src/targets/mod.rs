//! Forwarding target parsing.
//!
//! Targets are persisted as the raw strings an operator typed (links,
//! `@usernames`, numeric chat ids) and are parsed again on every pass.

use std::fmt;

use thiserror::Error;

/// Prefix Telegram adds to channel and supergroup ids in Bot API form.
const CHANNEL_ID_PREFIX: i64 = 1_000_000_000_000;

/// Errors that can occur while parsing a target string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TargetParseError {
    #[error("target is empty")]
    Empty,

    #[error("invalid chat id: {0}")]
    InvalidChatId(String),

    #[error("invalid topic id: {0}")]
    InvalidTopicId(String),

    #[error("invalid username: {0}")]
    InvalidUsername(String),

    #[error("unrecognized target format: {0}")]
    Unrecognized(String),
}

/// Syntax a target was written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    /// `https://t.me/c/<id>`
    PrivateChannel,
    /// `https://t.me/c/<id>/<topic>`
    PrivateChannelTopic,
    /// `https://t.me/<name>`
    PublicChannel,
    /// `https://t.me/<name>/<topic>`
    PublicChannelTopic,
    /// `https://t.me/+<hash>` or `https://t.me/joinchat/<hash>`
    InviteLink,
    /// `@name`
    Username,
    /// `-1001234567890`
    ChatId,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PrivateChannel => "private channel",
            Self::PrivateChannelTopic => "private channel topic",
            Self::PublicChannel => "public channel",
            Self::PublicChannelTopic => "public channel topic",
            Self::InviteLink => "invite link",
            Self::Username => "username",
            Self::ChatId => "chat id",
        };
        f.write_str(name)
    }
}

/// A parsed forwarding target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDescriptor {
    pub kind: TargetKind,
    /// Normalized identifier: a username without `@`, an invite hash,
    /// or a Bot API style chat id (`-100…` for channels).
    pub identifier: String,
    /// Forum topic (thread) to post into.
    pub topic_id: Option<i32>,
}

/// How a descriptor has to be looked up on the MTProto side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetLookup<'a> {
    Username(&'a str),
    Invite(&'a str),
    /// Bare channel id (Bot API prefix stripped).
    Channel(i64),
    /// Basic group id (sign removed).
    Chat(i64),
    User(i64),
}

impl TargetDescriptor {
    /// Returns how this target has to be resolved.
    #[must_use]
    pub fn lookup(&self) -> TargetLookup<'_> {
        match self.kind {
            TargetKind::PublicChannel | TargetKind::PublicChannelTopic | TargetKind::Username => {
                TargetLookup::Username(&self.identifier)
            }
            TargetKind::InviteLink => TargetLookup::Invite(&self.identifier),
            TargetKind::PrivateChannel | TargetKind::PrivateChannelTopic | TargetKind::ChatId => {
                // Identifiers of these kinds are always numeric after parsing.
                let id: i64 = self.identifier.parse().unwrap_or_default();
                split_bot_api_id(id)
            }
        }
    }
}

impl fmt::Display for TargetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.identifier)?;
        if let Some(topic) = self.topic_id {
            write!(f, " (topic {topic})")?;
        }
        Ok(())
    }
}

/// Maps a Bot API style id onto the peer type it denotes.
fn split_bot_api_id<'a>(id: i64) -> TargetLookup<'a> {
    if id <= -CHANNEL_ID_PREFIX {
        TargetLookup::Channel(-(id + CHANNEL_ID_PREFIX))
    } else if id < 0 {
        TargetLookup::Chat(-id)
    } else {
        TargetLookup::User(id)
    }
}

/// Parses a raw target string.
///
/// This is a pure function: the same input always yields the same result.
pub fn parse_target(raw: &str) -> Result<TargetDescriptor, TargetParseError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(TargetParseError::Empty);
    }

    if let Some(path) = strip_link_prefix(raw) {
        return parse_link_path(raw, path);
    }

    if let Some(name) = raw.strip_prefix('@') {
        let name = name.trim_end_matches('/');
        return Ok(TargetDescriptor {
            kind: TargetKind::Username,
            identifier: parse_username(name)?.to_owned(),
            topic_id: None,
        });
    }

    if looks_numeric(raw) {
        let id: i64 = raw
            .parse()
            .map_err(|_| TargetParseError::InvalidChatId(raw.to_owned()))?;
        return Ok(TargetDescriptor {
            kind: TargetKind::ChatId,
            identifier: id.to_string(),
            topic_id: None,
        });
    }

    Err(TargetParseError::Unrecognized(raw.to_owned()))
}

fn strip_link_prefix(raw: &str) -> Option<&str> {
    let rest = raw
        .strip_prefix("https://")
        .or_else(|| raw.strip_prefix("http://"))?;
    rest.strip_prefix("t.me/")
        .or_else(|| rest.strip_prefix("telegram.me/"))
}

fn parse_link_path(raw: &str, path: &str) -> Result<TargetDescriptor, TargetParseError> {
    let path = path.trim_end_matches('/');
    let segments: Vec<&str> = path.split('/').collect();

    let descriptor = match segments.as_slice() {
        ["c", id] => TargetDescriptor {
            kind: TargetKind::PrivateChannel,
            identifier: parse_private_id(id)?.to_string(),
            topic_id: None,
        },
        ["c", id, topic] => TargetDescriptor {
            kind: TargetKind::PrivateChannelTopic,
            identifier: parse_private_id(id)?.to_string(),
            topic_id: Some(parse_topic(topic)?),
        },
        ["joinchat", hash] => invite(raw, hash)?,
        [hash] if hash.starts_with('+') => invite(raw, hash.trim_start_matches('+'))?,
        [name] => TargetDescriptor {
            kind: TargetKind::PublicChannel,
            identifier: parse_username(name)?.to_owned(),
            topic_id: None,
        },
        [name, topic] => TargetDescriptor {
            kind: TargetKind::PublicChannelTopic,
            identifier: parse_username(name)?.to_owned(),
            topic_id: Some(parse_topic(topic)?),
        },
        _ => return Err(TargetParseError::Unrecognized(raw.to_owned())),
    };

    Ok(descriptor)
}

fn invite(raw: &str, hash: &str) -> Result<TargetDescriptor, TargetParseError> {
    let valid = !hash.is_empty()
        && hash
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid {
        return Err(TargetParseError::Unrecognized(raw.to_owned()));
    }
    Ok(TargetDescriptor {
        kind: TargetKind::InviteLink,
        identifier: hash.to_owned(),
        topic_id: None,
    })
}

/// Private links carry the bare channel id; positive ids get the `-100` prefix.
fn parse_private_id(segment: &str) -> Result<i64, TargetParseError> {
    let id: i64 = segment
        .parse()
        .map_err(|_| TargetParseError::InvalidChatId(segment.to_owned()))?;
    if id > 0 {
        id.checked_add(CHANNEL_ID_PREFIX)
            .map(|prefixed| -prefixed)
            .ok_or_else(|| TargetParseError::InvalidChatId(segment.to_owned()))
    } else if id < 0 {
        Ok(id)
    } else {
        Err(TargetParseError::InvalidChatId(segment.to_owned()))
    }
}

fn parse_topic(segment: &str) -> Result<i32, TargetParseError> {
    segment
        .parse::<i32>()
        .ok()
        .filter(|topic| *topic > 0)
        .ok_or_else(|| TargetParseError::InvalidTopicId(segment.to_owned()))
}

fn parse_username(name: &str) -> Result<&str, TargetParseError> {
    let valid = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(name)
    } else {
        Err(TargetParseError::InvalidUsername(name.to_owned()))
    }
}

fn looks_numeric(raw: &str) -> bool {
    let digits = raw.strip_prefix('-').unwrap_or(raw);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> TargetDescriptor {
        parse_target(raw).unwrap()
    }

    #[test]
    fn test_private_channel_gets_prefix() {
        let target = parse("https://t.me/c/1234567890");
        assert_eq!(target.kind, TargetKind::PrivateChannel);
        assert_eq!(target.identifier, "-1001234567890");
        assert_eq!(target.topic_id, None);
    }

    #[test]
    fn test_private_channel_topic() {
        let target = parse("https://t.me/c/1234567890/42/");
        assert_eq!(target.kind, TargetKind::PrivateChannelTopic);
        assert_eq!(target.identifier, "-1001234567890");
        assert_eq!(target.topic_id, Some(42));
    }

    #[test]
    fn test_public_channel_and_topic() {
        let target = parse("https://t.me/rustlang");
        assert_eq!(target.kind, TargetKind::PublicChannel);
        assert_eq!(target.identifier, "rustlang");

        let target = parse("http://t.me/rustlang/7");
        assert_eq!(target.kind, TargetKind::PublicChannelTopic);
        assert_eq!(target.topic_id, Some(7));
    }

    #[test]
    fn test_public_names_starting_with_c() {
        let target = parse("https://t.me/cryptonews");
        assert_eq!(target.kind, TargetKind::PublicChannel);
        assert_eq!(target.identifier, "cryptonews");
    }

    #[test]
    fn test_invite_links() {
        let target = parse("https://t.me/+AbC_d-9");
        assert_eq!(target.kind, TargetKind::InviteLink);
        assert_eq!(target.identifier, "AbC_d-9");

        let target = parse("https://t.me/joinchat/XyZ");
        assert_eq!(target.kind, TargetKind::InviteLink);
        assert_eq!(target.identifier, "XyZ");
    }

    #[test]
    fn test_username_and_chat_id() {
        let target = parse("  @chan1 ");
        assert_eq!(target.kind, TargetKind::Username);
        assert_eq!(target.identifier, "chan1");

        let target = parse("-1001234567890");
        assert_eq!(target.kind, TargetKind::ChatId);
        assert_eq!(target.identifier, "-1001234567890");
    }

    #[test]
    fn test_rejects_garbage() {
        assert_eq!(parse_target(""), Err(TargetParseError::Empty));
        assert!(matches!(
            parse_target("hello world"),
            Err(TargetParseError::Unrecognized(_))
        ));
        assert!(matches!(
            parse_target("https://t.me/c/abc"),
            Err(TargetParseError::InvalidChatId(_))
        ));
        assert!(matches!(
            parse_target("https://t.me/chan/0"),
            Err(TargetParseError::InvalidTopicId(_))
        ));
        assert!(matches!(
            parse_target("@bad name"),
            Err(TargetParseError::InvalidUsername(_))
        ));
    }

    #[test]
    fn test_parsing_is_idempotent() {
        for raw in [
            "@chan1",
            "-1001234567890",
            "https://t.me/c/55/3",
            "https://t.me/+hash",
            "nonsense",
        ] {
            assert_eq!(parse_target(raw), parse_target(raw));
        }
    }

    #[test]
    fn test_lookup_splits_bot_api_ids() {
        assert_eq!(
            parse("-1001234567890").lookup(),
            TargetLookup::Channel(1_234_567_890)
        );
        assert_eq!(parse("-4567").lookup(), TargetLookup::Chat(4567));
        assert_eq!(parse("777").lookup(), TargetLookup::User(777));
        assert_eq!(parse("@chan").lookup(), TargetLookup::Username("chan"));
        assert_eq!(
            parse("https://t.me/+abc").lookup(),
            TargetLookup::Invite("abc")
        );
    }
}
