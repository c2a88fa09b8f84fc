//! `lorebot run`: connect to Discord and handle events until Ctrl-C.

use std::sync::Arc;

use anyhow::Context;
use lorebot_agent::build_orchestrator;
use lorebot_channels::DiscordChannel;
use lorebot_config::AppConfig;
use lorebot_core::channel::UserId;
use tracing::info;

pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    let discord = &config.discord;
    let channel = Arc::new(
        DiscordChannel::new(discord, discord.guild_id, UserId(discord.bot_user_id))
            .with_owners(config.groups.owner_ids.iter().copied().map(UserId)),
    );

    let events = channel
        .start()
        .await
        .context("Failed to start the Discord channel")?;
    let orchestrator = build_orchestrator(&config, channel.clone())
        .await
        .context("Failed to build the bot")?;

    println!("Lorebot running in guild {}", discord.guild_id);
    println!(
        "   AI answers: {}",
        if orchestrator.ask_pipeline().ai_enabled() {
            "enabled"
        } else {
            "disabled"
        }
    );
    println!("   Press Ctrl-C to stop. Nothing is saved automatically.");

    tokio::select! {
        () = orchestrator.run(events) => {}
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            info!("Shutdown requested");
        }
    }

    channel.stop().await;
    Ok(())
}
