//! Chat platform adapters for Lorebot.
//!
//! Each adapter implements [`lorebot_core::Channel`] and turns platform
//! traffic into [`lorebot_core::PlatformEvent`]s. The `output` helpers
//! apply the platform's message length limit uniformly.

pub mod discord;
pub mod output;

pub use discord::{DiscordChannel, StoredMessage, message_link, parse_message_link};
pub use output::{
    FAILURE_EMOJI, SUCCESS_EMOJI, edit_within_limit, indicate_failure, indicate_success,
    reply_within_limit, respond,
};
