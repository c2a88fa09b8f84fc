//! Channel trait: the abstraction over the chat platform.
//!
//! A Channel connects lorebot to a messaging platform. The core never owns
//! platform messages: it holds [`MessageRef`] lookup keys and asks the
//! channel to reply, edit, delete, or react through them.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;

/// A platform user identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl UserId {
    /// Render as a platform mention (`<@123>`).
    pub fn mention(&self) -> String {
        format!("<@{}>", self.0)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for UserId {
    type Err = std::num::ParseIntError;

    /// Accepts a bare id (`123`) or a mention (`<@123>`, `<@!123>`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s
            .trim()
            .trim_start_matches("<@")
            .trim_start_matches('!')
            .trim_end_matches('>');
        trimmed.parse().map(UserId)
    }
}

/// Lookup key for a message on the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef {
    pub channel_id: u64,
    pub message_id: u64,
}

impl MessageRef {
    pub fn new(channel_id: u64, message_id: u64) -> Self {
        Self {
            channel_id,
            message_id,
        }
    }
}

impl std::fmt::Display for MessageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.channel_id, self.message_id)
    }
}

/// A message as observed on the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformMessage {
    /// Where the message lives
    pub reference: MessageRef,

    /// Who wrote it
    pub author: UserId,

    /// Whether the author is a bot account
    #[serde(default)]
    pub author_is_bot: bool,

    /// Text content with the bot mention already stripped
    pub content: String,

    /// Permalink to the message
    pub link: String,

    /// Whether the message mentions this bot
    #[serde(default)]
    pub mentions_bot: bool,
}

/// The core Channel trait.
///
/// Every operation is a suspension point: callers must not hold component
/// locks across these calls.
#[async_trait]
pub trait Channel: Send + Sync {
    /// A human-readable name for this channel (e.g., "discord").
    fn name(&self) -> &str;

    /// The bot's own user id on this platform.
    fn bot_user_id(&self) -> UserId;

    /// Maximum number of characters in a single message.
    fn message_limit(&self) -> usize {
        2000
    }

    /// Reply to `anchor` with `content`, which must already fit the limit.
    async fn reply(&self, anchor: &MessageRef, content: &str) -> Result<MessageRef, ChannelError>;

    /// Replace the content of a message the bot sent.
    async fn edit(&self, message: &MessageRef, content: &str) -> Result<(), ChannelError>;

    /// Delete a message.
    async fn delete(&self, message: &MessageRef) -> Result<(), ChannelError>;

    /// React to a message with an emoji.
    async fn add_reaction(&self, message: &MessageRef, emoji: &str) -> Result<(), ChannelError>;

    /// Look up a message by reference. `Ok(None)` if it no longer exists.
    async fn fetch(&self, message: &MessageRef) -> Result<Option<PlatformMessage>, ChannelError>;

    /// Resolve a permalink into the message it points at.
    ///
    /// `Ok(None)` means the link is well-formed but the message does not exist.
    async fn fetch_by_link(&self, link: &str) -> Result<Option<PlatformMessage>, ChannelError>;

    /// Whether the platform considers `user` an owner of this bot.
    async fn is_owner(&self, user: UserId) -> bool;

    /// Round-trip latency to the platform, if known.
    fn latency(&self) -> Option<Duration> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_parses_mentions() {
        assert_eq!("123".parse::<UserId>().unwrap(), UserId(123));
        assert_eq!("<@456>".parse::<UserId>().unwrap(), UserId(456));
        assert_eq!("<@!789>".parse::<UserId>().unwrap(), UserId(789));
        assert!("not-a-user".parse::<UserId>().is_err());
    }

    #[test]
    fn user_id_mention_round_trips() {
        let id = UserId(42);
        assert_eq!(id.mention().parse::<UserId>().unwrap(), id);
    }

    #[test]
    fn message_ref_serializes_as_struct() {
        let r = MessageRef::new(1, 2);
        let json = serde_json::to_string(&r).unwrap();
        assert_eq!(json, r#"{"channel_id":1,"message_id":2}"#);
    }
}
