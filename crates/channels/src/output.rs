//! Delivery helpers that keep every platform message within the channel's
//! length limit.
//!
//! Long content is split at sentence boundaries and sent as a chain of
//! replies, each answering the previous segment.

use lorebot_core::channel::{Channel, MessageRef};
use lorebot_core::error::ChannelError;
use lorebot_core::event::{Invocation, InvocationKind};
use lorebot_core::text::split_into_sentences;

pub const SUCCESS_EMOJI: &str = "✅";
pub const FAILURE_EMOJI: &str = "❌";

fn segments(channel: &dyn Channel, content: &str) -> Vec<String> {
    let mut parts: Vec<String> = split_into_sentences(content, channel.message_limit(), false)
        .into_iter()
        .map(|s| s.trim_start().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if parts.is_empty() {
        parts.push(content.to_string());
    }
    parts
}

/// Reply to `anchor`, splitting `content` as needed.
///
/// Returns every message sent, in order; the last one is the tail of the chain.
pub async fn reply_within_limit(
    channel: &dyn Channel,
    anchor: &MessageRef,
    content: &str,
) -> Result<Vec<MessageRef>, ChannelError> {
    let mut sent = Vec::new();
    let mut previous = *anchor;
    for part in segments(channel, content) {
        previous = channel.reply(&previous, &part).await?;
        sent.push(previous);
    }
    Ok(sent)
}

/// Rewrite a chain of messages with `content`, in order.
///
/// Each message in `chain` takes the next segment. Extra segments continue
/// as chained replies to the last message; messages left without a segment
/// are deleted. Returns the chain as it now stands.
pub async fn edit_within_limit(
    channel: &dyn Channel,
    chain: &[MessageRef],
    content: &str,
) -> Result<Vec<MessageRef>, ChannelError> {
    let parts = segments(channel, content);
    let kept = parts.len().min(chain.len());

    let mut sent = Vec::with_capacity(parts.len());
    for (message, part) in chain.iter().zip(&parts) {
        channel.edit(message, part).await?;
        sent.push(*message);
    }
    if let Some(&last) = sent.last() {
        let mut previous = last;
        for part in &parts[kept..] {
            previous = channel.reply(&previous, part).await?;
            sent.push(previous);
        }
    }
    for message in &chain[kept..] {
        channel.delete(message).await?;
    }
    Ok(sent)
}

/// Reply to whatever triggered `invocation`.
pub async fn respond(
    channel: &dyn Channel,
    invocation: &Invocation,
    content: &str,
) -> Result<Vec<MessageRef>, ChannelError> {
    reply_within_limit(channel, &invocation.anchor, content).await
}

/// Signal that a command succeeded.
///
/// A mention gets a reaction, plus a reply when `text` is given. A slash
/// command always gets a reply: `text`, or the emoji alone.
pub async fn indicate_success(
    channel: &dyn Channel,
    invocation: &Invocation,
    text: Option<&str>,
) -> Result<(), ChannelError> {
    indicate(channel, invocation, SUCCESS_EMOJI, text).await
}

/// Signal that a command failed, optionally explaining why.
pub async fn indicate_failure(
    channel: &dyn Channel,
    invocation: &Invocation,
    text: Option<&str>,
) -> Result<(), ChannelError> {
    indicate(channel, invocation, FAILURE_EMOJI, text).await
}

async fn indicate(
    channel: &dyn Channel,
    invocation: &Invocation,
    emoji: &str,
    text: Option<&str>,
) -> Result<(), ChannelError> {
    if invocation.kind == InvocationKind::Mention {
        channel.add_reaction(&invocation.anchor, emoji).await?;
        if text.is_none() {
            return Ok(());
        }
    }
    respond(channel, invocation, text.unwrap_or(emoji)).await.map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discord::DiscordChannel;
    use lorebot_config::DiscordConfig;
    use lorebot_core::channel::UserId;

    const BOT: UserId = UserId(999);

    fn channel(limit: usize) -> DiscordChannel {
        DiscordChannel::new(&DiscordConfig::default(), 1, BOT).with_message_limit(limit)
    }

    #[tokio::test]
    async fn short_content_is_one_reply() {
        let ch = channel(2000);
        let anchor = ch.post(1, UserId(1), "hi");
        let sent = reply_within_limit(&ch, &anchor.reference, "Hello there.").await.unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(ch.get(&sent[0]).unwrap().message.content, "Hello there.");
    }

    #[tokio::test]
    async fn long_content_is_chained() {
        let ch = channel(20);
        let anchor = ch.post(1, UserId(1), "hi");
        let text = "First sentence here. Second sentence here. Third one.";
        let sent = reply_within_limit(&ch, &anchor.reference, text).await.unwrap();
        assert!(sent.len() >= 3);

        // each segment answers the previous one
        assert_eq!(ch.get(&sent[0]).unwrap().reply_to, Some(anchor.reference));
        for pair in sent.windows(2) {
            assert_eq!(ch.get(&pair[1]).unwrap().reply_to, Some(pair[0]));
        }
        for r in &sent {
            assert!(ch.get(r).unwrap().message.content.chars().count() <= 20);
        }
        assert_eq!(ch.get(&sent[0]).unwrap().message.content, "First sentence here.");
    }

    #[tokio::test]
    async fn edit_overflow_becomes_replies() {
        let ch = channel(20);
        let anchor = ch.post(1, UserId(1), "hi");
        let display = ch.reply(&anchor.reference, "short").await.unwrap();

        let all = edit_within_limit(&ch, &[display], "First sentence here. Second one.")
            .await
            .unwrap();
        assert_eq!(all[0], display);
        assert_eq!(all.len(), 2);
        assert_eq!(ch.get(&display).unwrap().edits, 1);
        assert_eq!(ch.get(&all[1]).unwrap().reply_to, Some(display));
    }

    #[tokio::test]
    async fn edit_rewrites_every_segment_in_order() {
        let ch = channel(20);
        let anchor = ch.post(1, UserId(1), "hi");
        let chain = reply_within_limit(&ch, &anchor.reference, "Old first one. Old second one.")
            .await
            .unwrap();
        assert_eq!(chain.len(), 2);

        let all = edit_within_limit(&ch, &chain, "New first one. New second one. New third.")
            .await
            .unwrap();
        assert_eq!(&all[..2], &chain[..]);
        assert_eq!(all.len(), 3);
        let contents: Vec<String> = all
            .iter()
            .map(|m| ch.get(m).unwrap().message.content)
            .collect();
        assert_eq!(contents, vec!["New first one.", "New second one.", "New third."]);
    }

    #[tokio::test]
    async fn edit_deletes_segments_it_no_longer_needs() {
        let ch = channel(20);
        let anchor = ch.post(1, UserId(1), "hi");
        let chain = reply_within_limit(&ch, &anchor.reference, "Old first one. Old second one.")
            .await
            .unwrap();

        let all = edit_within_limit(&ch, &chain, "Short now.").await.unwrap();
        assert_eq!(all, vec![chain[0]]);
        assert_eq!(ch.get(&chain[0]).unwrap().message.content, "Short now.");
        assert!(!ch.exists(&chain[1]));
    }

    #[tokio::test]
    async fn indication_depends_on_invocation_kind() {
        let ch = channel(2000);
        let mention = ch.post(1, UserId(1), "@bot add");
        let inv = Invocation {
            user: UserId(1),
            anchor: mention.reference,
            kind: InvocationKind::Mention,
        };
        indicate_success(&ch, &inv, None).await.unwrap();
        assert_eq!(ch.get(&mention.reference).unwrap().reactions, vec![SUCCESS_EMOJI]);
        assert!(ch.bot_messages().is_empty());

        indicate_failure(&ch, &inv, Some("Nope.")).await.unwrap();
        assert_eq!(
            ch.get(&mention.reference).unwrap().reactions,
            vec![SUCCESS_EMOJI, FAILURE_EMOJI]
        );
        assert_eq!(ch.bot_messages()[0].message.content, "Nope.");

        let slash = Invocation {
            kind: InvocationKind::Slash,
            ..inv
        };
        indicate_failure(&ch, &slash, None).await.unwrap();
        let replies = ch.bot_messages();
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[1].message.content, FAILURE_EMOJI);
    }
}
