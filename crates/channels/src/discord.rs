//! Discord channel adapter (stub).
//!
//! Implements the Channel trait for the Discord Bot API.
//! In production, this would use `serenity` for the WebSocket gateway and
//! REST calls. Currently a stub: messages live in an in-process store and
//! platform events are injected through [`DiscordChannel::inject`], which
//! is also what the tests drive.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use lorebot_config::DiscordConfig;
use lorebot_core::channel::{Channel, MessageRef, PlatformMessage, UserId};
use lorebot_core::error::ChannelError;
use lorebot_core::event::PlatformEvent;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info};

const LINK_PREFIX: &str = "https://discord.com/channels";

/// Parse a message permalink of the form
/// `https://discord.com/channels/<guild>/<channel>/<message>`.
pub fn parse_message_link(link: &str) -> Result<MessageRef, ChannelError> {
    let parts: Vec<&str> = link.trim().split('/').collect();
    if parts.len() != 7 || parts[3] != "channels" {
        return Err(ChannelError::InvalidLink(link.to_string()));
    }
    let channel_id = parts[5]
        .parse()
        .map_err(|_| ChannelError::InvalidLink(link.to_string()))?;
    let message_id = parts[6]
        .parse()
        .map_err(|_| ChannelError::InvalidLink(link.to_string()))?;
    Ok(MessageRef::new(channel_id, message_id))
}

/// Build the permalink for a message in `guild_id`.
pub fn message_link(guild_id: u64, message: &MessageRef) -> String {
    format!(
        "{LINK_PREFIX}/{guild_id}/{}/{}",
        message.channel_id, message.message_id
    )
}

/// A message held by the stub transport.
#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub message: PlatformMessage,
    pub reply_to: Option<MessageRef>,
    pub reactions: Vec<String>,
    pub edits: usize,
}

/// Discord channel adapter.
pub struct DiscordChannel {
    bot_token: Option<String>,
    guild_id: u64,
    bot_user_id: UserId,
    owners: HashSet<UserId>,
    message_limit: usize,
    next_id: AtomicU64,
    messages: Mutex<HashMap<MessageRef, StoredMessage>>,
    inject_tx: tokio::sync::Mutex<Option<mpsc::Sender<PlatformEvent>>>,
}

impl std::fmt::Debug for DiscordChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordChannel")
            .field("bot_token", &self.bot_token.as_ref().map(|_| "[REDACTED]"))
            .field("guild_id", &self.guild_id)
            .field("bot_user_id", &self.bot_user_id)
            .field("message_limit", &self.message_limit)
            .finish()
    }
}

impl DiscordChannel {
    pub fn new(config: &DiscordConfig, guild_id: u64, bot_user_id: UserId) -> Self {
        Self {
            bot_token: config.bot_token.clone(),
            guild_id,
            bot_user_id,
            owners: HashSet::new(),
            message_limit: config.message_limit,
            next_id: AtomicU64::new(1),
            messages: Mutex::new(HashMap::new()),
            inject_tx: tokio::sync::Mutex::new(None),
        }
    }

    /// Users the platform reports as application owners.
    pub fn with_owners(mut self, owners: impl IntoIterator<Item = UserId>) -> Self {
        self.owners = owners.into_iter().collect();
        self
    }

    pub fn with_message_limit(mut self, limit: usize) -> Self {
        self.message_limit = limit;
        self
    }

    /// Begin receiving platform events.
    pub async fn start(&self) -> Result<mpsc::Receiver<PlatformEvent>, ChannelError> {
        if self.bot_token.as_deref().is_some_and(str::is_empty) {
            return Err(ChannelError::NotConfigured("empty bot token".into()));
        }
        info!(guild_id = self.guild_id, "Discord channel starting (stub mode)");
        let (tx, rx) = mpsc::channel(64);
        *self.inject_tx.lock().await = Some(tx);
        Ok(rx)
    }

    pub async fn stop(&self) {
        info!("Discord channel stopping");
        *self.inject_tx.lock().await = None;
    }

    /// Inject an event as if it came from Discord.
    pub async fn inject(&self, event: PlatformEvent) -> Result<(), ChannelError> {
        let guard = self.inject_tx.lock().await;
        match guard.as_ref() {
            Some(tx) => tx
                .send(event)
                .await
                .map_err(|_| ChannelError::ConnectionLost("Event channel closed".into())),
            None => Err(ChannelError::ConnectionLost("Channel not started".into())),
        }
    }

    fn allocate(&self, channel_id: u64) -> MessageRef {
        MessageRef::new(channel_id, self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Store a message written by `author` and return it.
    pub fn post(&self, channel_id: u64, author: UserId, content: &str) -> PlatformMessage {
        let reference = self.allocate(channel_id);
        let message = PlatformMessage {
            reference,
            author,
            author_is_bot: author == self.bot_user_id,
            content: content.to_string(),
            link: message_link(self.guild_id, &reference),
            mentions_bot: false,
        };
        self.messages.lock().insert(
            reference,
            StoredMessage {
                message: message.clone(),
                reply_to: None,
                reactions: Vec::new(),
                edits: 0,
            },
        );
        message
    }

    pub fn get(&self, message: &MessageRef) -> Option<StoredMessage> {
        self.messages.lock().get(message).cloned()
    }

    pub fn exists(&self, message: &MessageRef) -> bool {
        self.messages.lock().contains_key(message)
    }

    /// Messages the bot has sent and not deleted, oldest first.
    pub fn bot_messages(&self) -> Vec<StoredMessage> {
        let mut out: Vec<StoredMessage> = self
            .messages
            .lock()
            .values()
            .filter(|m| m.message.author == self.bot_user_id)
            .cloned()
            .collect();
        out.sort_by_key(|m| m.message.reference.message_id);
        out
    }

    pub fn guild_id(&self) -> u64 {
        self.guild_id
    }
}

#[async_trait]
impl Channel for DiscordChannel {
    fn name(&self) -> &str {
        "discord"
    }

    fn bot_user_id(&self) -> UserId {
        self.bot_user_id
    }

    fn message_limit(&self) -> usize {
        self.message_limit
    }

    async fn reply(&self, anchor: &MessageRef, content: &str) -> Result<MessageRef, ChannelError> {
        if content.chars().count() > self.message_limit {
            return Err(ChannelError::DeliveryFailed {
                channel: "discord".into(),
                reason: format!("message exceeds {} characters", self.message_limit),
            });
        }
        let message = self.post(anchor.channel_id, self.bot_user_id, content);
        if let Some(stored) = self.messages.lock().get_mut(&message.reference) {
            stored.reply_to = Some(*anchor);
        }
        debug!(anchor = %anchor, message = %message.reference, content_len = content.len(), "Discord reply (stub)");
        Ok(message.reference)
    }

    async fn edit(&self, message: &MessageRef, content: &str) -> Result<(), ChannelError> {
        if content.chars().count() > self.message_limit {
            return Err(ChannelError::DeliveryFailed {
                channel: "discord".into(),
                reason: format!("edit exceeds {} characters", self.message_limit),
            });
        }
        let mut messages = self.messages.lock();
        let stored = messages
            .get_mut(message)
            .ok_or_else(|| ChannelError::MessageNotFound(message.to_string()))?;
        stored.message.content = content.to_string();
        stored.edits += 1;
        debug!(message = %message, "Discord edit (stub)");
        Ok(())
    }

    async fn delete(&self, message: &MessageRef) -> Result<(), ChannelError> {
        self.messages
            .lock()
            .remove(message)
            .map(|_| debug!(message = %message, "Discord delete (stub)"))
            .ok_or_else(|| ChannelError::MessageNotFound(message.to_string()))
    }

    async fn add_reaction(&self, message: &MessageRef, emoji: &str) -> Result<(), ChannelError> {
        let mut messages = self.messages.lock();
        let stored = messages
            .get_mut(message)
            .ok_or_else(|| ChannelError::MessageNotFound(message.to_string()))?;
        stored.reactions.push(emoji.to_string());
        Ok(())
    }

    async fn fetch(&self, message: &MessageRef) -> Result<Option<PlatformMessage>, ChannelError> {
        Ok(self.get(message).map(|s| s.message))
    }

    async fn fetch_by_link(&self, link: &str) -> Result<Option<PlatformMessage>, ChannelError> {
        let reference = parse_message_link(link)?;
        self.fetch(&reference).await
    }

    async fn is_owner(&self, user: UserId) -> bool {
        self.owners.contains(&user)
    }

    fn latency(&self) -> Option<Duration> {
        self.inject_tx
            .try_lock()
            .ok()
            .and_then(|tx| tx.as_ref().map(|_| Duration::ZERO))
    }
}
