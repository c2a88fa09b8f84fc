//! `lorebot ask`: answer one query against the local corpus.

use anyhow::Context;
use lorebot_agent::build_components;
use lorebot_config::AppConfig;

pub async fn run(config: AppConfig, query: &str) -> anyhow::Result<()> {
    let query = query.trim();
    anyhow::ensure!(!query.is_empty(), "The query must not be empty");

    let components = build_components(&config)
        .await
        .context("Failed to build the answer pipeline")?;
    let outcome = components.ask.ask(query).await;
    println!("{}", outcome.render(components.ask.ai_enabled()));
    Ok(())
}
